use std::path::Path;

use ra_registry::Marker;
use ra_types::layout::IDENTITY_FILE;
use ra_types::{Extension, Guid, PathRules};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::RaResult;
use crate::search::SearchOptions;

/// What a hyperobject marker says about its referent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperobjectInfo {
    pub guid: Guid,
    /// Where the registry places the referent, if it knows.
    pub target_path: Option<String>,
    pub name: String,
}

/// Capability interface over one object store.
///
/// Implemented by [`LocalConnection`](crate::LocalConnection) against the
/// local filesystem and by [`RemoteConnection`](crate::RemoteConnection)
/// against a server. Callers hold a `&mut dyn Connection` and never need to
/// know which one they have.
///
/// Conventions shared by every implementation:
/// - Paths are strings in this connection's separator and must pass
///   [`PathRules::validate`]; a bad path is a validation error raised before
///   any I/O.
/// - A failed operation (missing file, name taken) is `Ok(false)` or
///   `Ok(None)`. `Err` means the transport broke, a precondition was
///   violated, or the capability is missing.
/// - Calls are synchronous and never overlap: `&mut self` guarantees at
///   most one request in flight.
pub trait Connection: Send {
    /// Short backend label for logs.
    fn backend(&self) -> &'static str;

    /// Separator and root of this connection's paths.
    fn rules(&self) -> &PathRules;

    fn separator(&self) -> char {
        self.rules().separator()
    }

    fn root(&self) -> &str {
        self.rules().root()
    }

    fn is_valid_path(&self, path: &str) -> bool {
        self.rules().is_valid(path)
    }

    // ---- Capability probes ----

    /// Native same-connection subtree copy via [`paste`](Self::paste).
    fn supports_copy_paste(&self) -> bool;

    /// [`archive`](Self::archive) / [`dearchive`](Self::dearchive).
    fn supports_tar(&self) -> bool;

    /// Creating hyperobjects that alias objects of this connection.
    fn supports_hyper_copy(&self) -> bool;

    // ---- Browsing ----

    fn has_extensions(&mut self, path: &str) -> RaResult<bool> {
        Ok(!self.get_extensions(path)?.is_empty())
    }

    /// Child objects of `path`, sorted by name.
    fn get_extensions(&mut self, path: &str) -> RaResult<Vec<Extension>>;

    /// Leaf file names of `path`, sorted; bookkeeping files are hidden.
    fn get_file_list(&mut self, path: &str) -> RaResult<Vec<String>>;

    /// Effective display order of the children of `path`.
    fn get_ordering(&mut self, path: &str) -> RaResult<Vec<String>>;

    /// Persist `names` as the complete ordering record of `path`.
    fn write_ordering(&mut self, path: &str, names: &[String]) -> RaResult<bool>;

    /// The object containing `path`, or `None` at the root.
    fn get_parent_path(&self, path: &str) -> RaResult<Option<String>> {
        self.rules().validate(path)?;
        Ok(self.rules().parent_of(path))
    }

    // ---- Mutation ----

    /// Rename the object at `path` to `new_name`, updating `path` in place.
    fn rename_obj(&mut self, path: &mut String, new_name: &str) -> RaResult<bool>;

    /// Copy the file at `path` to the local file `local`.
    ///
    /// With `convert`, text files (decided by name) get CRLF line endings.
    fn get_file(&mut self, path: &str, local: &Path, convert: bool) -> RaResult<bool>;

    /// Copy the local file `local` to `path`.
    ///
    /// With `convert`, text files (decided by name) get LF line endings.
    fn put_file(&mut self, local: &Path, path: &str, convert: bool) -> RaResult<bool>;

    /// Fetch `path` into a fresh local temporary file, removed on drop.
    fn get_tmp_file(&mut self, path: &str, convert: bool) -> RaResult<Option<NamedTempFile>> {
        self.rules().validate(path)?;
        let name = self.rules().name_of(path).to_string();
        let tmp = tempfile::Builder::new()
            .prefix("ra-")
            .suffix(&format!("-{name}"))
            .tempfile()?;
        if self.get_file(path, tmp.path(), convert)? {
            Ok(Some(tmp))
        } else {
            Ok(None)
        }
    }

    /// Create the child object `name` under `parent`; returns its path.
    fn make_ext(&mut self, parent: &str, name: &str) -> RaResult<Option<String>>;

    /// Create a hyperobject `name` under `parent` aliasing `guid`.
    fn make_hyperobject(&mut self, parent: &str, name: &str, guid: Guid)
        -> RaResult<Option<String>>;

    /// Delete the object at `path` with everything below it.
    fn del_tree(&mut self, path: &str) -> RaResult<bool>;

    /// Materialize into `path` the leaf files it inherits from its parent.
    fn prototype_object(&mut self, path: &str) -> RaResult<bool>;

    /// Whether two files of this connection have identical contents.
    fn compare_files(&mut self, a: &str, b: &str) -> RaResult<bool>;

    fn delete_file(&mut self, path: &str) -> RaResult<bool>;

    // ---- Transfer ----

    /// Copy the object `src` under `dst_parent` on this same connection.
    fn paste(&mut self, src: &str, dst_parent: &str, recursive: bool)
        -> RaResult<Option<String>>;

    /// Snapshot the object `src` into the local file `blob`.
    fn archive(&mut self, src: &str, recursive: bool, blob: &Path) -> RaResult<bool>;

    /// Unpack a snapshot produced by any connection's `archive` under
    /// `dst_parent`; returns the new object's path.
    fn dearchive(&mut self, blob: &Path, dst_parent: &str) -> RaResult<Option<String>>;

    // ---- Search ----

    /// Start a depth-first name search below `start`; returns the first hit.
    fn search_begin(
        &mut self,
        start: &str,
        pattern: &str,
        options: SearchOptions,
    ) -> RaResult<Option<String>>;

    /// Next hit of the running search.
    fn search_next(&mut self) -> RaResult<Option<String>>;

    /// Discard the running search.
    fn search_end(&mut self) -> RaResult<()>;

    /// First object below `start` whose name matches.
    fn find_object(
        &mut self,
        start: &str,
        pattern: &str,
        options: SearchOptions,
    ) -> RaResult<Option<String>> {
        let hit = self.search_begin(start, pattern, options)?;
        self.search_end()?;
        Ok(hit)
    }

    /// Every object below `start` whose name matches, in search order.
    fn find_all(
        &mut self,
        start: &str,
        pattern: &str,
        options: SearchOptions,
    ) -> RaResult<Vec<String>> {
        let mut hits = Vec::new();
        let mut next = self.search_begin(start, pattern, options);
        while let Some(path) = next? {
            hits.push(path);
            next = self.search_next();
        }
        self.search_end()?;
        Ok(hits)
    }

    // ---- Identity ----

    fn is_hyperobject(&mut self, path: &str) -> RaResult<bool>;

    fn get_hyperobject_info(&mut self, path: &str) -> RaResult<Option<HyperobjectInfo>>;

    /// Where the in-memory registry places `guid`.
    fn lookup_path(&self, guid: &Guid) -> Option<String>;

    /// The GUID of `path`, minting and persisting one for a plain object
    /// that has none yet.
    fn get_uuid(&mut self, path: &str) -> RaResult<Option<Guid>>;

    /// The GUID `path` already carries, if any. Never mints.
    fn read_uuid(&mut self, path: &str) -> RaResult<Option<Guid>> {
        if let Some(info) = self.get_hyperobject_info(path)? {
            return Ok(Some(info.guid));
        }
        let file = self.rules().join(path, IDENTITY_FILE);
        let Some(tmp) = self.get_tmp_file(&file, false)? else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(tmp.path())?;
        Ok(Marker::parse(&text, &file).ok().map(|m| m.guid))
    }

    /// Repair duplicated and unregistered identities below `path`.
    fn reconcile_guids(&mut self, path: &str) -> RaResult<bool>;

    /// Rebuild the registry from the whole store.
    fn fix_oofs(&mut self) -> RaResult<bool>;

    /// Read the registry into memory.
    fn load_uuid_base(&mut self) -> RaResult<()>;

    /// Drop the in-memory registry and read it again.
    fn reload_uuid_base(&mut self) -> RaResult<()> {
        self.load_uuid_base()
    }
}
