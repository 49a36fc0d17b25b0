//! Connection backend over the local filesystem.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ra_ordering::{effective_order, OrderingStore};
use ra_registry::{Marker, RegistryError, UuidRegistry};
use ra_types::layout::{is_control_file, EXT_DIR, HYPEROBJECT_FILE, IDENTITY_FILE, REGISTRY_FILE};
use ra_types::text::{to_crlf, to_lf};
use ra_types::{validate_object_name, Extension, ExtensionKind, Guid, PathRules, TextRules, TypeError};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive;
use crate::connection::{Connection, HyperobjectInfo};
use crate::error::{RaError, RaResult};
use crate::search::SearchOptions;

/// Map the I/O outcomes that mean "the operation did not happen" to `None`.
fn soft<T>(res: io::Result<T>) -> RaResult<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::NotFound | ErrorKind::AlreadyExists | ErrorKind::PermissionDenied
            ) =>
        {
            debug!(error = %e, "filesystem operation failed");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

struct LocalSearch {
    pending: Vec<Extension>,
    pattern: String,
    options: SearchOptions,
}

/// The in-memory registry of one store, shared by every connection opened
/// on it with [`LocalConnection::open_shared`].
///
/// Mints and repairs happen with the lock held, and the `.dbase` file is
/// rewritten before it is released.
pub type SharedRegistry = Arc<Mutex<UuidRegistry>>;

/// A store on the local filesystem.
///
/// Object paths are native filesystem paths below the store root. The
/// registry is read once by [`open`](Self::open) and rewritten whenever a
/// GUID is minted or repaired.
pub struct LocalConnection {
    rules: PathRules,
    text: TextRules,
    registry: SharedRegistry,
    search: Option<LocalSearch>,
}

impl LocalConnection {
    /// Open the store rooted at the directory `root`.
    pub fn open(root: impl AsRef<Path>, text: TextRules) -> RaResult<Self> {
        let mut conn = Self::open_shared(root, text, SharedRegistry::default())?;
        conn.load_uuid_base()?;
        let entries = conn.lock_registry().len();
        info!(root = conn.rules.root(), entries, "local store opened");
        Ok(conn)
    }

    /// Open the store rooted at `root` on an already loaded registry.
    ///
    /// Every connection sharing `registry` must be opened on the same root.
    pub fn open_shared(
        root: impl AsRef<Path>,
        text: TextRules,
        registry: SharedRegistry,
    ) -> RaResult<Self> {
        let root = std::path::absolute(root.as_ref())?;
        if !root.is_dir() {
            return Err(RaError::Config(format!(
                "store root {} is not a directory",
                root.display()
            )));
        }
        let root_str = root
            .to_str()
            .ok_or_else(|| RaError::Config(format!("store root {} is not UTF-8", root.display())))?;
        Ok(Self {
            rules: PathRules::native(root_str),
            text,
            registry,
            search: None,
        })
    }

    pub fn text_rules(&self) -> &TextRules {
        &self.text
    }

    /// A snapshot of the registry.
    pub fn registry(&self) -> UuidRegistry {
        self.lock_registry().clone()
    }

    /// Handle for opening further connections on this store's registry.
    pub fn shared_registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    fn lock_registry(&self) -> MutexGuard<'_, UuidRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_file(&self) -> PathBuf {
        Path::new(self.rules.root()).join(REGISTRY_FILE)
    }

    fn save_registry(&self, registry: &UuidRegistry) -> RaResult<()> {
        registry.save(&self.registry_file())?;
        Ok(())
    }

    fn relative(&self, path: &str) -> RaResult<String> {
        self.rules.relative(path).ok_or_else(|| {
            RaError::Validation(TypeError::InvalidPath {
                path: path.to_string(),
                reason: "not inside the store root".into(),
            })
        })
    }

    /// Contents of the file at `path`, or `None` if there is no such file.
    pub fn read_file(&self, path: &str) -> RaResult<Option<Vec<u8>>> {
        self.rules.validate(path)?;
        if Path::new(path).is_dir() {
            return Ok(None);
        }
        soft(fs::read(path))
    }

    /// Write `data` to the file at `path`, replacing it. The containing
    /// directory must exist.
    pub fn write_file(&self, path: &str, data: &[u8]) -> RaResult<bool> {
        self.rules.validate(path)?;
        if path == self.rules.root() || Path::new(path).is_dir() {
            return Ok(false);
        }
        Ok(soft(fs::write(path, data))?.is_some())
    }

    /// Every regular file directly inside `path`, bookkeeping files
    /// included, sorted. `None` if `path` is not a directory.
    pub fn list_files_raw(&self, path: &str) -> RaResult<Option<Vec<String>>> {
        self.rules.validate(path)?;
        let Some(entries) = soft(fs::read_dir(path))? else {
            return Ok(None);
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => warn!(?name, "skipping non-UTF-8 file name"),
            }
        }
        names.sort();
        Ok(Some(names))
    }

    /// Create the directory `path`. The object owning it must exist; an
    /// intermediate extension directory is created as needed. Fails if
    /// `path` already exists.
    pub fn make_dir(&self, path: &str) -> RaResult<bool> {
        self.rules.validate(path)?;
        if Path::new(path).symlink_metadata().is_ok() {
            return Ok(false);
        }
        match self.rules.parent_of(path) {
            Some(owner) if Path::new(&owner).is_dir() => {}
            _ => return Ok(false),
        }
        Ok(soft(fs::create_dir_all(path))?.is_some())
    }

    /// The GUID of `path` and whether it was minted by this call.
    pub fn get_or_mint_uuid(&mut self, path: &str) -> RaResult<Option<(Guid, bool)>> {
        self.rules.validate(path)?;
        let dir = Path::new(path);
        if !dir.is_dir() {
            return Ok(None);
        }
        // Held from the marker check to the registry rewrite.
        let mut registry = self.lock_registry();
        if let Some(marker) = Marker::read(&dir.join(HYPEROBJECT_FILE))? {
            return Ok(Some((marker.guid, false)));
        }
        if let Some(marker) = Marker::read(&dir.join(IDENTITY_FILE))? {
            return Ok(Some((marker.guid, false)));
        }
        let guid = Guid::new_random();
        Marker::new(guid, self.rules.name_of(path)).create(&dir.join(IDENTITY_FILE))?;
        let relative = self.relative(path)?;
        registry.insert(guid, relative);
        self.save_registry(&registry)?;
        info!(path, %guid, "identity minted");
        Ok(Some((guid, true)))
    }

    fn list_extensions(&self, path: &str) -> RaResult<Vec<Extension>> {
        let ext_dir = self.rules.ext_dir(path);
        let Some(entries) = soft(fs::read_dir(&ext_dir))? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                warn!(dir = %ext_dir, "skipping non-UTF-8 extension name");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type()?;
            let kind = if file_type.is_symlink() {
                if fs::metadata(entry.path()).is_ok() {
                    ExtensionKind::Link
                } else {
                    ExtensionKind::BrokenLink
                }
            } else if file_type.is_dir() {
                if entry.path().join(HYPEROBJECT_FILE).is_file() {
                    ExtensionKind::Hyperobject
                } else {
                    ExtensionKind::Object
                }
            } else {
                continue;
            };
            let child = self.rules.join(&ext_dir, &name);
            out.push(Extension::new(name, child, kind));
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// `start` and every plain object below it, pre-order.
    fn object_tree(&self, start: &str) -> RaResult<Vec<String>> {
        let mut out = Vec::new();
        let mut stack = vec![start.to_string()];
        while let Some(path) = stack.pop() {
            let mut children: Vec<String> = self
                .list_extensions(&path)?
                .into_iter()
                .filter(|e| e.kind.is_traversable())
                .map(|e| e.path)
                .collect();
            children.reverse();
            stack.extend(children);
            out.push(path);
        }
        Ok(out)
    }

    fn read_identity(&self, object: &str) -> RaResult<Option<Marker>> {
        match Marker::read(&Path::new(object).join(IDENTITY_FILE)) {
            Ok(marker) => Ok(marker),
            Err(RegistryError::MalformedMarker { path, reason }) => {
                warn!(%path, %reason, "ignoring malformed identity file");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the object recorded at `relative` still carries `guid`.
    fn carries_identity(&self, relative: &str, guid: &Guid) -> bool {
        let object = self.rules.absolute(relative);
        matches!(self.read_identity(&object), Ok(Some(m)) if m.guid == *guid)
    }

    /// Give `object` a fresh identity, replacing its identity file.
    fn remint(&self, object: &str) -> RaResult<Guid> {
        let file = Path::new(object).join(IDENTITY_FILE);
        let guid = Guid::new_random();
        fs::remove_file(&file)?;
        Marker::new(guid, self.rules.name_of(object)).create(&file)?;
        debug!(object, %guid, "duplicate identity reminted");
        Ok(guid)
    }

    fn copy_tree(&self, src: &Path, dst: &Path, recursive: bool) -> RaResult<()> {
        fs::create_dir_all(dst)?;
        let walker = WalkDir::new(src)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| recursive || e.depth() > 1 || e.file_name() != EXT_DIR);
        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            if !recursive && entry.depth() > 1 {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
            let target = dst.join(rel);
            let file_type = entry.file_type();
            if file_type.is_dir() {
                fs::create_dir_all(&target)?;
            } else if file_type.is_symlink() {
                copy_link(entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn copy_link(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(not(unix))]
fn copy_link(src: &Path, _dst: &Path) -> io::Result<()> {
    warn!(link = %src.display(), "links are not copied on this platform");
    Ok(())
}

impl Connection for LocalConnection {
    fn backend(&self) -> &'static str {
        "local"
    }

    fn rules(&self) -> &PathRules {
        &self.rules
    }

    fn supports_copy_paste(&self) -> bool {
        true
    }

    fn supports_tar(&self) -> bool {
        true
    }

    fn supports_hyper_copy(&self) -> bool {
        true
    }

    fn get_extensions(&mut self, path: &str) -> RaResult<Vec<Extension>> {
        self.rules.validate(path)?;
        self.list_extensions(path)
    }

    fn get_file_list(&mut self, path: &str) -> RaResult<Vec<String>> {
        let files = self.list_files_raw(path)?.unwrap_or_default();
        Ok(files.into_iter().filter(|f| !is_control_file(f)).collect())
    }

    fn get_ordering(&mut self, path: &str) -> RaResult<Vec<String>> {
        self.rules.validate(path)?;
        let actual: Vec<String> = self
            .list_extensions(path)?
            .into_iter()
            .map(|e| e.name)
            .collect();
        let listed = OrderingStore::new(Path::new(&self.rules.ext_dir(path))).read()?;
        Ok(effective_order(&listed, &actual))
    }

    fn write_ordering(&mut self, path: &str, names: &[String]) -> RaResult<bool> {
        self.rules.validate(path)?;
        if !Path::new(path).is_dir() {
            return Ok(false);
        }
        OrderingStore::new(Path::new(&self.rules.ext_dir(path))).write(names)?;
        Ok(true)
    }

    fn rename_obj(&mut self, path: &mut String, new_name: &str) -> RaResult<bool> {
        self.rules.validate(path)?;
        validate_object_name(new_name)?;
        if path.as_str() == self.rules.root() {
            return Ok(false);
        }
        let sep = self.rules.separator();
        let Some(idx) = path.rfind(sep) else {
            return Ok(false);
        };
        let dir = &path[..idx];
        let old_name = self.rules.name_of(path).to_string();
        let new_path = format!("{}{sep}{new_name}", dir);
        if Path::new(&new_path).symlink_metadata().is_ok() {
            debug!(path = %path, new_name, "rename target exists");
            return Ok(false);
        }
        if soft(fs::rename(path.as_str(), &new_path))?.is_none() {
            return Ok(false);
        }
        if self.rules.name_of(dir) == EXT_DIR {
            OrderingStore::new(Path::new(dir)).rename_entry(&old_name, new_name)?;
        }
        info!(from = %path, to = %new_path, "object renamed");
        *path = new_path;
        Ok(true)
    }

    fn get_file(&mut self, path: &str, local: &Path, convert: bool) -> RaResult<bool> {
        let Some(data) = self.read_file(path)? else {
            return Ok(false);
        };
        let data = if convert && self.text.is_text(path) {
            to_crlf(&data)
        } else {
            data
        };
        fs::write(local, data)?;
        Ok(true)
    }

    fn put_file(&mut self, local: &Path, path: &str, convert: bool) -> RaResult<bool> {
        self.rules.validate(path)?;
        let Some(data) = soft(fs::read(local))? else {
            return Ok(false);
        };
        let data = if convert && self.text.is_text(path) {
            to_lf(&data)
        } else {
            data
        };
        self.write_file(path, &data)
    }

    fn make_ext(&mut self, parent: &str, name: &str) -> RaResult<Option<String>> {
        self.rules.validate(parent)?;
        validate_object_name(name)?;
        if !Path::new(parent).is_dir() {
            return Ok(None);
        }
        fs::create_dir_all(self.rules.ext_dir(parent))?;
        let child = self.rules.child(parent, name);
        if soft(fs::create_dir(&child))?.is_none() {
            return Ok(None);
        }
        debug!(path = %child, "extension created");
        Ok(Some(child))
    }

    fn make_hyperobject(
        &mut self,
        parent: &str,
        name: &str,
        guid: Guid,
    ) -> RaResult<Option<String>> {
        let Some(child) = self.make_ext(parent, name)? else {
            return Ok(None);
        };
        Marker::new(guid, name).create(&Path::new(&child).join(HYPEROBJECT_FILE))?;
        info!(path = %child, %guid, "hyperobject created");
        Ok(Some(child))
    }

    fn del_tree(&mut self, path: &str) -> RaResult<bool> {
        self.rules.validate(path)?;
        if path == self.rules.root() {
            warn!("refusing to delete the store root");
            return Ok(false);
        }
        let Some(meta) = soft(fs::symlink_metadata(path))? else {
            return Ok(false);
        };
        let removed = if meta.is_dir() {
            soft(fs::remove_dir_all(path))?
        } else {
            soft(fs::remove_file(path))?
        };
        if removed.is_some() {
            info!(path, "tree deleted");
        }
        Ok(removed.is_some())
    }

    fn prototype_object(&mut self, path: &str) -> RaResult<bool> {
        self.rules.validate(path)?;
        let Some(parent) = self.rules.parent_of(path) else {
            return Ok(false);
        };
        if !Path::new(path).is_dir() {
            return Ok(false);
        }
        let inherited = self.get_file_list(&parent)?;
        let own = self.get_file_list(path)?;
        let mut copied = 0usize;
        for name in inherited.iter().filter(|n| !own.contains(n)) {
            let from = Path::new(&parent).join(name);
            let to = Path::new(path).join(name);
            if soft(fs::copy(&from, &to))?.is_some() {
                copied += 1;
            }
        }
        debug!(path, copied, "object prototyped");
        Ok(true)
    }

    fn compare_files(&mut self, a: &str, b: &str) -> RaResult<bool> {
        let left = self.read_file(a)?;
        let right = self.read_file(b)?;
        Ok(matches!((left, right), (Some(l), Some(r)) if l == r))
    }

    fn delete_file(&mut self, path: &str) -> RaResult<bool> {
        self.rules.validate(path)?;
        match soft(fs::symlink_metadata(path))? {
            Some(meta) if !meta.is_dir() => Ok(soft(fs::remove_file(path))?.is_some()),
            _ => Ok(false),
        }
    }

    fn paste(&mut self, src: &str, dst_parent: &str, recursive: bool) -> RaResult<Option<String>> {
        self.rules.validate(src)?;
        self.rules.validate(dst_parent)?;
        if src == self.rules.root() || !Path::new(src).is_dir() || !Path::new(dst_parent).is_dir()
        {
            return Ok(None);
        }
        let inside = format!("{src}{}", self.rules.separator());
        if dst_parent == src || dst_parent.starts_with(&inside) {
            debug!(src, dst_parent, "refusing to paste an object into itself");
            return Ok(None);
        }
        let target = self.rules.child(dst_parent, self.rules.name_of(src));
        if Path::new(&target).symlink_metadata().is_ok() {
            return Ok(None);
        }
        self.copy_tree(Path::new(src), Path::new(&target), recursive)?;
        info!(src, dst = %target, recursive, "object pasted");
        Ok(Some(target))
    }

    fn archive(&mut self, src: &str, recursive: bool, blob: &Path) -> RaResult<bool> {
        self.rules.validate(src)?;
        if !Path::new(src).is_dir() {
            return Ok(false);
        }
        archive::pack_to_file(Path::new(src), self.rules.name_of(src), recursive, blob)?;
        Ok(true)
    }

    fn dearchive(&mut self, blob: &Path, dst_parent: &str) -> RaResult<Option<String>> {
        self.rules.validate(dst_parent)?;
        if !Path::new(dst_parent).is_dir() {
            return Ok(None);
        }
        let name = match archive::archive_top_name(blob) {
            Ok(name) => name,
            Err(e) => {
                warn!(blob = %blob.display(), error = %e, "unreadable archive");
                return Ok(None);
            }
        };
        if let Err(e) = validate_object_name(&name) {
            warn!(error = %e, "archive carries an invalid object name");
            return Ok(None);
        }
        let target = self.rules.child(dst_parent, &name);
        if Path::new(&target).symlink_metadata().is_ok() {
            return Ok(None);
        }
        let ext_dir = self.rules.ext_dir(dst_parent);
        fs::create_dir_all(&ext_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(".ra-unpack-")
            .tempdir_in(&ext_dir)?;
        if let Err(e) = archive::unpack(blob, staging.path()) {
            warn!(blob = %blob.display(), error = %e, "archive could not be unpacked");
            return Ok(None);
        }
        fs::rename(staging.path().join(&name), &target)?;
        info!(dst = %target, "archive unpacked");
        Ok(Some(target))
    }

    fn search_begin(
        &mut self,
        start: &str,
        pattern: &str,
        options: SearchOptions,
    ) -> RaResult<Option<String>> {
        self.rules.validate(start)?;
        let mut pending = self.list_extensions(start)?;
        pending.reverse();
        self.search = Some(LocalSearch {
            pending,
            pattern: pattern.to_string(),
            options,
        });
        self.search_next()
    }

    fn search_next(&mut self) -> RaResult<Option<String>> {
        loop {
            let Some(ext) = self.search.as_mut().and_then(|s| s.pending.pop()) else {
                return Ok(None);
            };
            if ext.kind.is_traversable() {
                let mut children = self.list_extensions(&ext.path)?;
                children.reverse();
                if let Some(state) = self.search.as_mut() {
                    state.pending.extend(children);
                }
            }
            let hit = self
                .search
                .as_ref()
                .is_some_and(|s| s.options.matches(&ext.name, &s.pattern));
            if hit {
                return Ok(Some(ext.path));
            }
        }
    }

    fn search_end(&mut self) -> RaResult<()> {
        self.search = None;
        Ok(())
    }

    fn is_hyperobject(&mut self, path: &str) -> RaResult<bool> {
        self.rules.validate(path)?;
        Ok(Path::new(path).join(HYPEROBJECT_FILE).is_file())
    }

    fn get_hyperobject_info(&mut self, path: &str) -> RaResult<Option<HyperobjectInfo>> {
        self.rules.validate(path)?;
        let Some(marker) = Marker::read(&Path::new(path).join(HYPEROBJECT_FILE))? else {
            return Ok(None);
        };
        Ok(Some(HyperobjectInfo {
            target_path: self.lookup_path(&marker.guid),
            guid: marker.guid,
            name: marker.name,
        }))
    }

    fn lookup_path(&self, guid: &Guid) -> Option<String> {
        let registry = self.lock_registry();
        registry
            .lookup(guid)
            .map(|relative| self.rules.absolute(relative))
    }

    fn get_uuid(&mut self, path: &str) -> RaResult<Option<Guid>> {
        Ok(self.get_or_mint_uuid(path)?.map(|(guid, _)| guid))
    }

    fn read_uuid(&mut self, path: &str) -> RaResult<Option<Guid>> {
        if let Some(info) = self.get_hyperobject_info(path)? {
            return Ok(Some(info.guid));
        }
        Ok(self.read_identity(path)?.map(|m| m.guid))
    }

    fn reconcile_guids(&mut self, path: &str) -> RaResult<bool> {
        self.rules.validate(path)?;
        if !Path::new(path).is_dir() {
            return Ok(false);
        }
        let mut registry = self.lock_registry();
        let mut changed = 0usize;
        for object in self.object_tree(path)? {
            let Some(marker) = self.read_identity(&object)? else {
                continue;
            };
            let relative = self.relative(&object)?;
            let recorded = registry.lookup(&marker.guid).map(str::to_string);
            match recorded {
                None => {
                    registry.insert(marker.guid, relative);
                }
                Some(recorded) if recorded == relative => continue,
                Some(recorded) if self.carries_identity(&recorded, &marker.guid) => {
                    let fresh = self.remint(&object)?;
                    registry.insert(fresh, relative);
                }
                Some(_) => registry.set(marker.guid, relative),
            }
            changed += 1;
        }
        if changed > 0 {
            self.save_registry(&registry)?;
        }
        debug!(path, changed, "identities reconciled");
        Ok(true)
    }

    fn fix_oofs(&mut self) -> RaResult<bool> {
        let mut registry = self.lock_registry();
        let mut rebuilt = UuidRegistry::new();
        for (guid, relative) in registry.iter() {
            if self.carries_identity(relative, guid) {
                rebuilt.insert(*guid, relative);
            }
        }
        let dropped = registry.len() - rebuilt.len();

        let root = self.rules.root().to_string();
        let mut added = 0usize;
        for object in self.object_tree(&root)? {
            let Some(marker) = self.read_identity(&object)? else {
                continue;
            };
            let relative = self.relative(&object)?;
            match rebuilt.lookup(&marker.guid) {
                Some(recorded) if recorded == relative => continue,
                Some(_) => {
                    let fresh = self.remint(&object)?;
                    rebuilt.insert(fresh, relative);
                }
                None => {
                    rebuilt.insert(marker.guid, relative);
                }
            }
            added += 1;
        }

        *registry = rebuilt;
        self.save_registry(&registry)?;
        info!(dropped, added, entries = registry.len(), "registry rebuilt");
        Ok(true)
    }

    fn load_uuid_base(&mut self) -> RaResult<()> {
        let loaded = UuidRegistry::load(&self.registry_file())?;
        *self.lock_registry() = loaded;
        Ok(())
    }
}
