//! Identity and hyperobject marker files.
//!
//! Both files share one format: the GUID in braced form on line 1 and the
//! display name on line 2. A plain object's identity file records the GUID
//! minted for it; a hyperobject's marker records the GUID it refers to.
//! Markers are written once and never rewritten in place.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use ra_types::Guid;

use crate::error::{RegistryError, Result};

/// Contents of an identity or hyperobject marker file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Marker {
    pub guid: Guid,
    pub name: String,
}

impl Marker {
    pub fn new(guid: Guid, name: impl Into<String>) -> Self {
        Self {
            guid,
            name: name.into(),
        }
    }

    /// Parse marker text. `origin` only labels errors.
    pub fn parse(text: &str, origin: &str) -> Result<Self> {
        let mut lines = text.lines();
        let first = lines.next().ok_or_else(|| RegistryError::MalformedMarker {
            path: origin.to_string(),
            reason: "empty marker".into(),
        })?;
        let guid = Guid::parse(first).map_err(|e| RegistryError::MalformedMarker {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
        let name = lines.next().unwrap_or("").trim_end_matches('\r').to_string();
        Ok(Self { guid, name })
    }

    pub fn render(&self) -> String {
        format!("{}\n{}\n", self.guid, self.name)
    }

    /// Read a marker file. A missing file is `Ok(None)`.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, &path.display().to_string()).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a new marker file. Fails if one already exists.
    pub fn create(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(self.render().as_bytes())?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_parse_roundtrip() {
        let marker = Marker::new(Guid::new_random(), "fern");
        let parsed = Marker::parse(&marker.render(), "test").unwrap();
        assert_eq!(parsed, marker);
    }

    #[test]
    fn render_layout() {
        let guid = Guid::parse("{6F9619FF-8B86-D011-B42D-00C04FC964FF}").unwrap();
        assert_eq!(
            Marker::new(guid, "fern").render(),
            "{6F9619FF-8B86-D011-B42D-00C04FC964FF}\nfern\n"
        );
    }

    #[test]
    fn parse_tolerates_crlf_and_missing_name() {
        let text = "{6F9619FF-8B86-D011-B42D-00C04FC964FF}\r\nfern\r\n";
        assert_eq!(Marker::parse(text, "t").unwrap().name, "fern");
        let bare = "{6F9619FF-8B86-D011-B42D-00C04FC964FF}";
        assert_eq!(Marker::parse(bare, "t").unwrap().name, "");
    }

    #[test]
    fn parse_rejects_bad_guid() {
        assert!(matches!(
            Marker::parse("not-a-guid\nfern\n", "t"),
            Err(RegistryError::MalformedMarker { .. })
        ));
        assert!(Marker::parse("", "t").is_err());
    }

    #[test]
    fn read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Marker::read(&dir.path().join(".uuid")).unwrap().is_none());
    }

    #[test]
    fn create_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".hyperobject");
        let marker = Marker::new(Guid::new_random(), "link to fern");
        marker.create(&path).unwrap();
        assert_eq!(Marker::read(&path).unwrap(), Some(marker));
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".uuid");
        Marker::new(Guid::new_random(), "a").create(&path).unwrap();
        assert!(Marker::new(Guid::new_random(), "b").create(&path).is_err());
    }
}
