use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// What a child entry of an object is.
///
/// The kinds are mutually exclusive. Each has a fixed bit used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    /// A plain object carrying its own files.
    Object,
    /// An alias resolving to another object through a GUID.
    Hyperobject,
    /// A filesystem link whose target exists.
    Link,
    /// A filesystem link whose target is missing.
    BrokenLink,
}

impl ExtensionKind {
    /// The wire encoding of this kind.
    pub fn bits(self) -> u32 {
        match self {
            Self::Object => 0x1,
            Self::Hyperobject => 0x2,
            Self::Link => 0x4,
            Self::BrokenLink => 0x8,
        }
    }

    /// Decode the wire encoding. Exactly one bit must be set.
    pub fn from_bits(bits: u32) -> Result<Self, TypeError> {
        match bits {
            0x1 => Ok(Self::Object),
            0x2 => Ok(Self::Hyperobject),
            0x4 => Ok(Self::Link),
            0x8 => Ok(Self::BrokenLink),
            other => Err(TypeError::UnknownKind(other)),
        }
    }

    /// Whether a walk may descend into entries of this kind.
    pub fn is_traversable(self) -> bool {
        matches!(self, Self::Object)
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Object => "object",
            Self::Hyperobject => "hyperobject",
            Self::Link => "link",
            Self::BrokenLink => "broken-link",
        };
        f.write_str(s)
    }
}

/// One child of an object, as reported by `GetExtensions`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub name: String,
    pub path: String,
    pub kind: ExtensionKind,
}

impl Extension {
    pub fn new(name: impl Into<String>, path: impl Into<String>, kind: ExtensionKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
        }
    }
}
