//! The GUID → path registry of one store.
//!
//! The registry file holds one `GUID relative-path` pair per line. It is
//! read fully into memory when a connection starts and kept there until an
//! explicit reload. Paths are relative to the store root and `/`-separated,
//! so the file reads the same on every platform. Lookups are linear scans.
//!
//! The registry is not rename-aware: moving an object leaves its entry
//! pointing at the path recorded when the GUID was minted.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use ra_types::Guid;
use tracing::{debug, warn};

use crate::error::Result;

/// In-memory copy of a store's registry file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UuidRegistry {
    entries: Vec<(Guid, String)>,
}

impl UuidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse registry text. Malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let Some((guid, path)) = line.split_once(' ') else {
                warn!(line = lineno + 1, "registry line without a path, skipped");
                continue;
            };
            match Guid::parse(guid) {
                Ok(guid) => entries.push((guid, path.to_string())),
                Err(e) => warn!(line = lineno + 1, error = %e, "registry line skipped"),
            }
        }
        Self { entries }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (guid, path) in &self.entries {
            out.push_str(&format!("{guid} {path}\n"));
        }
        out
    }

    /// Load a registry file. A missing file is an empty registry.
    pub fn load(file: &Path) -> Result<Self> {
        match fs::read_to_string(file) {
            Ok(text) => {
                let registry = Self::parse(&text);
                debug!(file = %file.display(), entries = registry.len(), "registry loaded");
                Ok(registry)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite the registry file from memory.
    ///
    /// The new contents go to a temporary file in the same directory which
    /// then replaces the old file, so readers never see a half-written file.
    pub fn save(&self, file: &Path) -> Result<()> {
        let dir = file.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(self.render().as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(file).map_err(|e| e.error)?;
        debug!(file = %file.display(), entries = self.len(), "registry saved");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Guid, &str)> {
        self.entries.iter().map(|(g, p)| (g, p.as_str()))
    }

    /// Relative path recorded for `guid`. "Not found" is a normal outcome.
    pub fn lookup(&self, guid: &Guid) -> Option<&str> {
        self.entries
            .iter()
            .find(|(g, _)| g == guid)
            .map(|(_, p)| p.as_str())
    }

    /// GUIDs recorded for a relative path.
    pub fn guids_at(&self, relative: &str) -> Vec<Guid> {
        self.entries
            .iter()
            .filter(|(_, p)| p == relative)
            .map(|(g, _)| *g)
            .collect()
    }

    pub fn contains(&self, guid: &Guid) -> bool {
        self.lookup(guid).is_some()
    }

    /// Append an entry for a GUID not yet registered.
    ///
    /// Returns `false` (and changes nothing) if the GUID already has one.
    pub fn insert(&mut self, guid: Guid, relative: impl Into<String>) -> bool {
        if self.contains(&guid) {
            return false;
        }
        self.entries.push((guid, relative.into()));
        true
    }

    /// Point an existing entry at a new path, or append one.
    pub fn set(&mut self, guid: Guid, relative: impl Into<String>) {
        let relative = relative.into();
        match self.entries.iter_mut().find(|(g, _)| *g == guid) {
            Some(entry) => entry.1 = relative,
            None => self.entries.push((guid, relative)),
        }
    }

    /// Remove the entry for `guid`. Returns `true` if one existed.
    pub fn remove(&mut self, guid: &Guid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(g, _)| g != guid);
        self.entries.len() != before
    }

    /// Keep only entries matching `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&Guid, &str) -> bool) {
        self.entries.retain(|(g, p)| keep(g, p));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guid(n: u8) -> Guid {
        Guid::parse(&format!("{{{n:02X}000000-0000-0000-0000-000000000000}}")).unwrap()
    }

    #[test]
    fn parse_render_roundtrip() {
        let mut reg = UuidRegistry::new();
        reg.insert(guid(1), "ext/fern");
        reg.insert(guid(2), "ext/fern/ext/frond with space");
        let parsed = UuidRegistry::parse(&reg.render());
        assert_eq!(parsed, reg);
        assert_eq!(parsed.lookup(&guid(2)), Some("ext/fern/ext/frond with space"));
    }

    #[test]
    fn parse_skips_malformed_lines() {
        let text = format!("garbage\n\n{} ext/a\nnot-a-guid ext/b\r\n", guid(3));
        let reg = UuidRegistry::parse(&text);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup(&guid(3)), Some("ext/a"));
    }

    #[test]
    fn lookup_missing_is_none() {
        assert_eq!(UuidRegistry::new().lookup(&guid(9)), None);
    }

    #[test]
    fn insert_does_not_duplicate() {
        let mut reg = UuidRegistry::new();
        assert!(reg.insert(guid(1), "ext/a"));
        assert!(!reg.insert(guid(1), "ext/b"));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup(&guid(1)), Some("ext/a"));
    }

    #[test]
    fn set_repoints_or_appends() {
        let mut reg = UuidRegistry::new();
        reg.set(guid(1), "ext/a");
        reg.set(guid(1), "ext/b");
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup(&guid(1)), Some("ext/b"));
    }

    #[test]
    fn remove_and_retain() {
        let mut reg = UuidRegistry::new();
        reg.insert(guid(1), "ext/a");
        reg.insert(guid(2), "ext/b");
        reg.insert(guid(3), "ext/a");
        assert_eq!(reg.guids_at("ext/a"), vec![guid(1), guid(3)]);
        assert!(reg.remove(&guid(2)));
        assert!(!reg.remove(&guid(2)));
        reg.retain(|g, _| *g != guid(3));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = UuidRegistry::load(&dir.path().join(".dbase")).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".dbase");
        let mut reg = UuidRegistry::new();
        reg.insert(guid(7), "ext/tree");
        reg.save(&file).unwrap();
        assert_eq!(UuidRegistry::load(&file).unwrap(), reg);

        reg.insert(guid(8), "ext/bush");
        reg.save(&file).unwrap();
        assert_eq!(UuidRegistry::load(&file).unwrap().len(), 2);
    }
}
