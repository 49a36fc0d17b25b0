use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

/// Every request/response pair of the RA protocol.
///
/// A request and its response carry the same opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Opcode {
    Login = 1,
    Logout = 2,
    GetDir = 3,
    GetExtensions = 4,
    FetchFile = 5,
    PutFile = 6,
    MkDir = 7,
    Unlink = 8,
    DelTree = 9,
    PrototypeObject = 10,
    RenameObject = 11,
    ArchiveObject = 12,
    ArchiveBlock = 13,
    PasteObject = 14,
    GetUuid = 15,
    ReconcileUuids = 16,
    SearchBegin = 17,
    SearchContinue = 18,
    SearchEnd = 19,
}

impl Opcode {
    pub const ALL: [Opcode; 19] = [
        Self::Login,
        Self::Logout,
        Self::GetDir,
        Self::GetExtensions,
        Self::FetchFile,
        Self::PutFile,
        Self::MkDir,
        Self::Unlink,
        Self::DelTree,
        Self::PrototypeObject,
        Self::RenameObject,
        Self::ArchiveObject,
        Self::ArchiveBlock,
        Self::PasteObject,
        Self::GetUuid,
        Self::ReconcileUuids,
        Self::SearchBegin,
        Self::SearchContinue,
        Self::SearchEnd,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> ProtocolResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.code() == code)
            .ok_or(ProtocolError::UnknownOpcode(code))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Login => "Login",
            Self::Logout => "Logout",
            Self::GetDir => "GetDir",
            Self::GetExtensions => "GetExtensions",
            Self::FetchFile => "FetchFile",
            Self::PutFile => "PutFile",
            Self::MkDir => "MkDir",
            Self::Unlink => "Unlink",
            Self::DelTree => "DelTree",
            Self::PrototypeObject => "PrototypeObject",
            Self::RenameObject => "RenameObject",
            Self::ArchiveObject => "ArchiveObject",
            Self::ArchiveBlock => "ArchiveBlock",
            Self::PasteObject => "PasteObject",
            Self::GetUuid => "GetUuid",
            Self::ReconcileUuids => "ReconcileUuids",
            Self::SearchBegin => "SearchBegin",
            Self::SearchContinue => "SearchContinue",
            Self::SearchEnd => "SearchEnd",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_unique_and_roundtrip() {
        let mut codes: Vec<i32> = Opcode::ALL.iter().map(|op| op.code()).collect();
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_code(op.code()).unwrap(), op);
        }
        let len = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), len, "opcodes should be unique");
    }

    #[test]
    fn unknown_code_rejected() {
        assert!(matches!(
            Opcode::from_code(0),
            Err(ProtocolError::UnknownOpcode(0))
        ));
        assert!(Opcode::from_code(-7).is_err());
        assert!(Opcode::from_code(999).is_err());
    }

    #[test]
    fn names_match_display() {
        assert_eq!(Opcode::ArchiveBlock.to_string(), "ArchiveBlock");
        assert_eq!(Opcode::GetUuid.name(), "GetUuid");
    }
}
