//! Ordering records on the local filesystem.
//!
//! The record of an object lives in its extension directory as
//! [`ORDERING_FILE`]. Writes always replace the whole record with the list
//! given; nothing is merged with what was there before.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ra_types::layout::ORDERING_FILE;
use tracing::debug;

use crate::error::{OrderingError, OrderingResult};
use crate::order::{parse, render};

/// Reads and writes the ordering record of one extension directory.
#[derive(Clone, Debug)]
pub struct OrderingStore {
    file: PathBuf,
}

impl OrderingStore {
    /// The record kept in `ext_dir`.
    pub fn new(ext_dir: &Path) -> Self {
        Self {
            file: ext_dir.join(ORDERING_FILE),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// The listed names. A missing record is an empty list.
    pub fn read(&self) -> OrderingResult<Vec<String>> {
        match fs::read_to_string(&self.file) {
            Ok(text) => Ok(parse(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist `names` as the complete record.
    pub fn write<S: AsRef<str>>(&self, names: &[S]) -> OrderingResult<()> {
        for name in names {
            let name = name.as_ref();
            if name.is_empty() || name.contains('\n') || name.contains('\r') {
                return Err(OrderingError::InvalidName(name.to_string()));
            }
        }
        if let Some(dir) = self.file.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.file, render(names))?;
        debug!(file = %self.file.display(), count = names.len(), "ordering written");
        Ok(())
    }

    /// Replace `old` by `new` in the record, keeping its position.
    ///
    /// Returns `false` if there is no record or `old` is not listed.
    pub fn rename_entry(&self, old: &str, new: &str) -> OrderingResult<bool> {
        let mut names = self.read()?;
        let mut changed = false;
        for name in names.iter_mut().filter(|n| n.as_str() == old) {
            *name = new.to_string();
            changed = true;
        }
        if changed {
            self.write(&names)?;
        }
        Ok(changed)
    }
}
