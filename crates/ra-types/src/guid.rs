use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Stable identity of an object in a store.
///
/// A `Guid` is an opaque 128-bit value. Paths move, GUIDs do not: every
/// alias (hyperobject) refers to its target through one. The persistent
/// form is the braced, upper-case hyphenated string
/// `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Guid(uuid::Uuid);

impl Guid {
    /// Mint a new random GUID.
    pub fn new_random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// The nil GUID (all zeros).
    pub const fn nil() -> Self {
        Self(uuid::Uuid::nil())
    }

    /// Returns `true` if this is the nil GUID.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Wrap an existing UUID value.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Parse the braced or bare hyphenated form, in any case.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let trimmed = s.trim();
        let inner = match (trimmed.strip_prefix('{'), trimmed.ends_with('}')) {
            (Some(rest), true) => &rest[..rest.len() - 1],
            (None, false) => trimmed,
            _ => return Err(TypeError::InvalidGuid(s.to_string())),
        };
        // Only the 8-4-4-4-12 layout is accepted, not the simple or URN forms.
        if inner.len() != 36 {
            return Err(TypeError::InvalidGuid(s.to_string()));
        }
        uuid::Uuid::parse_str(inner)
            .map(Self)
            .map_err(|_| TypeError::InvalidGuid(s.to_string()))
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:X}}}", self.0.hyphenated())
    }
}

impl FromStr for Guid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Guid {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Guid> for String {
    fn from(guid: Guid) -> Self {
        guid.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_braced_upper_case() {
        let guid = Guid::parse("6f9619ff-8b86-d011-b42d-00c04fc964ff").unwrap();
        assert_eq!(guid.to_string(), "{6F9619FF-8B86-D011-B42D-00C04FC964FF}");
    }

    #[test]
    fn string_roundtrip() {
        let guid = Guid::new_random();
        let parsed: Guid = guid.to_string().parse().unwrap();
        assert_eq!(parsed, guid);
    }

    #[test]
    fn parse_accepts_lower_case_braced() {
        let a = Guid::parse("{6f9619ff-8b86-d011-b42d-00c04fc964ff}").unwrap();
        let b = Guid::parse("6F9619FF-8B86-D011-B42D-00C04FC964FF").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parse_tolerates_surrounding_whitespace() {
        assert!(Guid::parse("  {6f9619ff-8b86-d011-b42d-00c04fc964ff}\r").is_ok());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Guid::parse("").is_err());
        assert!(Guid::parse("{6f9619ff-8b86-d011-b42d-00c04fc964ff").is_err());
        assert!(Guid::parse("6f9619ff8b86d011b42d00c04fc964ff").is_err());
        assert!(Guid::parse("{zzzzzzzz-8b86-d011-b42d-00c04fc964ff}").is_err());
    }

    #[test]
    fn random_guids_differ() {
        assert_ne!(Guid::new_random(), Guid::new_random());
    }

    #[test]
    fn nil_is_nil() {
        assert!(Guid::nil().is_nil());
        assert!(!Guid::new_random().is_nil());
    }

    #[test]
    fn serde_uses_string_form() {
        let guid = Guid::parse("{6F9619FF-8B86-D011-B42D-00C04FC964FF}").unwrap();
        let json = serde_json::to_string(&guid).unwrap();
        assert_eq!(json, "\"{6F9619FF-8B86-D011-B42D-00C04FC964FF}\"");
        let back: Guid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, guid);
    }
}
