//! Moving object subtrees within and between connections.
//!
//! A paste picks the cheapest strategy both ends support:
//!
//! 1. [`PasteStrategy::Native`] -- one connection copying within itself
//! 2. [`PasteStrategy::Archive`] -- snapshot into a local temporary blob,
//!    unpack at the destination
//! 3. [`PasteStrategy::Staged`] -- file by file through a private local
//!    directory (the lab table)
//!
//! Every temporary is removed when the operation ends, whatever the outcome.
//! Cancellation leaves whatever was already copied in place.

use std::fs;
use std::path::Path;

use ra_connection::{Connection, RaError, RaResult};
use ra_types::ExtensionKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::progress::TransferContext;

/// The connections a transfer reads from and writes to.
pub enum Endpoints<'a> {
    /// Source and destination are the same connection.
    Same(&'a mut dyn Connection),
    /// Two distinct connections.
    Pair {
        src: &'a mut dyn Connection,
        dst: &'a mut dyn Connection,
    },
}

impl<'a> Endpoints<'a> {
    pub fn is_same(&self) -> bool {
        matches!(self, Self::Same(_))
    }

    pub fn src(&mut self) -> &mut dyn Connection {
        match self {
            Self::Same(conn) => &mut **conn,
            Self::Pair { src, .. } => &mut **src,
        }
    }

    pub fn dst(&mut self) -> &mut dyn Connection {
        match self {
            Self::Same(conn) => &mut **conn,
            Self::Pair { dst, .. } => &mut **dst,
        }
    }

    /// The strategy [`paste_object`] will use.
    pub fn strategy(&self) -> PasteStrategy {
        match self {
            Self::Same(conn) if conn.supports_copy_paste() => PasteStrategy::Native,
            Self::Same(conn) if conn.supports_tar() => PasteStrategy::Archive,
            Self::Pair { src, dst } if src.supports_tar() && dst.supports_tar() => {
                PasteStrategy::Archive
            }
            _ => PasteStrategy::Staged,
        }
    }
}

/// How a paste moves data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasteStrategy {
    Native,
    Archive,
    Staged,
}

/// Copy the object `src` under `dst_parent`.
///
/// Returns the new object's path, or `None` if either end refused. After a
/// successful paste the destination reconciles the identities of the copy;
/// a destination that cannot reconcile is left as is.
pub fn paste_object(
    mut endpoints: Endpoints<'_>,
    src: &str,
    dst_parent: &str,
    recursive: bool,
    ctx: &TransferContext,
) -> RaResult<Option<String>> {
    ctx.check()?;
    let strategy = endpoints.strategy();
    debug!(src, dst_parent, recursive, ?strategy, "paste started");

    let target = match strategy {
        PasteStrategy::Native => {
            ctx.report(src);
            endpoints.src().paste(src, dst_parent, recursive)?
        }
        PasteStrategy::Archive => paste_via_archive(&mut endpoints, src, dst_parent, recursive, ctx)?,
        PasteStrategy::Staged => {
            let lab = tempfile::Builder::new().prefix("ra-lab-").tempdir()?;
            stage_object(&mut endpoints, src, dst_parent, recursive, ctx, lab.path())?
        }
    };

    let Some(target) = target else {
        warn!(src, dst_parent, ?strategy, "paste refused");
        return Ok(None);
    };
    match endpoints.dst().reconcile_guids(&target) {
        Ok(_) => {}
        Err(e) if e.is_soft() => debug!(error = %e, "destination cannot reconcile identities"),
        Err(e) => return Err(e),
    }
    info!(src, dst = %target, ?strategy, "object pasted");
    Ok(Some(target))
}

fn paste_via_archive(
    endpoints: &mut Endpoints<'_>,
    src: &str,
    dst_parent: &str,
    recursive: bool,
    ctx: &TransferContext,
) -> RaResult<Option<String>> {
    let blob = tempfile::Builder::new()
        .prefix("ra-blob-")
        .suffix(".tar.zst")
        .tempfile()?;
    ctx.report(src);
    if !endpoints.src().archive(src, recursive, blob.path())? {
        return Ok(None);
    }
    ctx.check()?;
    endpoints.dst().dearchive(blob.path(), dst_parent)
}

/// Recreate `src` under `dst_parent` one file at a time through `lab`.
fn stage_object(
    endpoints: &mut Endpoints<'_>,
    src: &str,
    dst_parent: &str,
    recursive: bool,
    ctx: &TransferContext,
    lab: &Path,
) -> RaResult<Option<String>> {
    ctx.check()?;
    ctx.report(src);
    let name = endpoints.src().rules().name_of(src).to_string();
    let Some(target) = endpoints.dst().make_ext(dst_parent, &name)? else {
        return Ok(None);
    };

    for file in endpoints.src().get_file_list(src)? {
        ctx.check()?;
        let from = endpoints.src().rules().join(src, &file);
        let staged = lab.join(&file);
        if !endpoints.src().get_file(&from, &staged, false)? {
            warn!(file = %from, "source file vanished during paste");
            continue;
        }
        let to = endpoints.dst().rules().join(&target, &file);
        if !endpoints.dst().put_file(&staged, &to, false)? {
            warn!(file = %to, "destination refused file");
        }
        fs::remove_file(&staged)?;
    }

    if recursive {
        for child in endpoints.src().get_extensions(src)? {
            match child.kind {
                ExtensionKind::Object => {
                    stage_object(endpoints, &child.path, &target, true, ctx, lab)?;
                }
                ExtensionKind::Hyperobject => {
                    ctx.check()?;
                    ctx.report(&child.path);
                    if let Some(info) = endpoints.src().get_hyperobject_info(&child.path)? {
                        endpoints
                            .dst()
                            .make_hyperobject(&target, &child.name, info.guid)?;
                    }
                }
                ExtensionKind::Link | ExtensionKind::BrokenLink => {
                    debug!(path = %child.path, "links are not carried across connections");
                }
            }
        }
        let order = endpoints.src().get_ordering(src)?;
        if !order.is_empty() {
            endpoints.dst().write_ordering(&target, &order)?;
        }
    }
    Ok(Some(target))
}

/// Create under `dst_parent` a hyperobject aliasing `src`.
///
/// No content is copied. A hyperobject source yields a new marker with the
/// same GUID; a plain object is given a GUID first if it has none. Aliases
/// only make sense within one store, so [`Endpoints::Pair`] is refused.
pub fn hyper_paste(
    endpoints: Endpoints<'_>,
    src: &str,
    dst_parent: &str,
    ctx: &TransferContext,
) -> RaResult<Option<String>> {
    let Endpoints::Same(conn) = endpoints else {
        return Err(RaError::NotSupported("hyper-copy across connections"));
    };
    if !conn.supports_hyper_copy() {
        return Err(RaError::NotSupported("hyper-copy"));
    }
    ctx.check()?;
    ctx.report(src);
    let guid = if conn.is_hyperobject(src)? {
        conn.get_hyperobject_info(src)?.map(|info| info.guid)
    } else {
        conn.get_uuid(src)?
    };
    let Some(guid) = guid else {
        return Ok(None);
    };
    let name = conn.rules().name_of(src).to_string();
    conn.make_hyperobject(dst_parent, &name, guid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_connection::LocalConnection;
    use ra_types::TextRules;

    struct Store {
        _dir: tempfile::TempDir,
        conn: LocalConnection,
    }

    impl Store {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let conn = LocalConnection::open(dir.path(), TextRules::default()).unwrap();
            Self { _dir: dir, conn }
        }

        fn root(&self) -> String {
            self.conn.root().to_string()
        }

        fn file(&self, object: &str, name: &str, data: &str) {
            let path = self.conn.rules().join(object, name);
            assert!(self.conn.write_file(&path, data.as_bytes()).unwrap());
        }

        fn read(&self, object: &str, name: &str) -> String {
            let path = self.conn.rules().join(object, name);
            String::from_utf8(self.conn.read_file(&path).unwrap().unwrap()).unwrap()
        }
    }

    /// `plant` with two files, a child `leaf` with one file, a hyperobject
    /// child aliasing `leaf`, and an explicit child order.
    fn sample(store: &mut Store) -> String {
        let root = store.root();
        let plant = store.conn.make_ext(&root, "plant").unwrap().unwrap();
        store.file(&plant, "plant.l", "axiom\n");
        store.file(&plant, "plant.v", "view\n");
        let leaf = store.conn.make_ext(&plant, "leaf").unwrap().unwrap();
        store.file(&leaf, "leaf.a", "anim\n");
        let guid = store.conn.get_uuid(&leaf).unwrap().unwrap();
        store
            .conn
            .make_hyperobject(&plant, "alias", guid)
            .unwrap()
            .unwrap();
        store
            .conn
            .write_ordering(&plant, &["leaf".to_string(), "alias".to_string()])
            .unwrap();
        plant
    }

    #[test]
    fn strategy_selection() {
        let mut a = Store::new();
        let mut b = Store::new();
        assert_eq!(Endpoints::Same(&mut a.conn).strategy(), PasteStrategy::Native);
        let pair = Endpoints::Pair {
            src: &mut a.conn,
            dst: &mut b.conn,
        };
        assert!(!pair.is_same());
        assert_eq!(pair.strategy(), PasteStrategy::Archive);
    }

    #[test]
    fn native_paste_within_one_store() {
        let mut store = Store::new();
        let plant = sample(&mut store);
        let root = store.root();
        let dst = store.conn.make_ext(&root, "dst").unwrap().unwrap();

        let copy = paste_object(
            Endpoints::Same(&mut store.conn),
            &plant,
            &dst,
            true,
            &TransferContext::new(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            store.conn.get_file_list(&copy).unwrap(),
            vec!["plant.l", "plant.v"]
        );
        assert_eq!(store.conn.get_ordering(&copy).unwrap(), vec!["leaf", "alias"]);

        // The copied leaf got a fresh identity; the alias still points home.
        let leaf = store.conn.rules().child(&plant, "leaf");
        let leaf_copy = store.conn.rules().child(&copy, "leaf");
        let original = store.conn.get_uuid(&leaf).unwrap().unwrap();
        let copied = store.conn.get_uuid(&leaf_copy).unwrap().unwrap();
        assert_ne!(original, copied);
        assert_eq!(store.conn.lookup_path(&original), Some(leaf));
        assert_eq!(store.conn.lookup_path(&copied), Some(leaf_copy));
        let alias_copy = store.conn.rules().child(&copy, "alias");
        assert_eq!(store.conn.read_uuid(&alias_copy).unwrap(), Some(original));
    }

    #[test]
    fn archive_paste_between_stores() {
        let mut src = Store::new();
        let mut dst = Store::new();
        let plant = sample(&mut src);
        let dst_root = dst.root();

        let copy = paste_object(
            Endpoints::Pair {
                src: &mut src.conn,
                dst: &mut dst.conn,
            },
            &plant,
            &dst_root,
            true,
            &TransferContext::new(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(dst.read(&copy, "plant.l"), "axiom\n");
        let leaf_copy = dst.conn.rules().child(&copy, "leaf");
        assert_eq!(dst.read(&leaf_copy, "leaf.a"), "anim\n");
        // Unknown to the destination registry, so registered as is.
        let guid = dst.conn.get_uuid(&leaf_copy).unwrap().unwrap();
        assert_eq!(dst.conn.lookup_path(&guid), Some(leaf_copy));
    }

    #[test]
    fn staged_copy_through_lab_table() {
        let mut src = Store::new();
        let mut dst = Store::new();
        let plant = sample(&mut src);
        let dst_root = dst.root();
        let lab = tempfile::tempdir().unwrap();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let ctx = {
            let seen = std::sync::Arc::clone(&seen);
            TransferContext::new().with_progress(move |p: &str| seen.lock().unwrap().push(p.to_string()))
        };

        let mut endpoints = Endpoints::Pair {
            src: &mut src.conn,
            dst: &mut dst.conn,
        };
        let copy = stage_object(&mut endpoints, &plant, &dst_root, true, &ctx, lab.path())
            .unwrap()
            .unwrap();

        assert_eq!(dst.conn.get_file_list(&copy).unwrap(), vec!["plant.l", "plant.v"]);
        assert_eq!(dst.read(&copy, "plant.v"), "view\n");
        let alias = dst.conn.rules().child(&copy, "alias");
        assert!(dst.conn.is_hyperobject(&alias).unwrap());
        assert_eq!(dst.conn.get_ordering(&copy).unwrap(), vec!["leaf", "alias"]);
        assert_eq!(std::fs::read_dir(lab.path()).unwrap().count(), 0);
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn paste_into_taken_name_is_refused() {
        let mut store = Store::new();
        let plant = sample(&mut store);
        let root = store.root();
        let result = paste_object(
            Endpoints::Same(&mut store.conn),
            &plant,
            &root,
            true,
            &TransferContext::new(),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn cancelled_paste_stops_early() {
        let mut src = Store::new();
        let mut dst = Store::new();
        let plant = sample(&mut src);
        let dst_root = dst.root();
        let ctx = TransferContext::new();
        ctx.cancel_flag().cancel();
        let err = paste_object(
            Endpoints::Pair {
                src: &mut src.conn,
                dst: &mut dst.conn,
            },
            &plant,
            &dst_root,
            true,
            &ctx,
        )
        .unwrap_err();
        assert!(matches!(err, RaError::Cancelled));
        assert!(dst.conn.get_extensions(&dst_root).unwrap().is_empty());
    }

    #[test]
    fn hyper_paste_aliases_without_copying() {
        let mut store = Store::new();
        let plant = sample(&mut store);
        let root = store.root();
        let shelf = store.conn.make_ext(&root, "shelf").unwrap().unwrap();
        let ctx = TransferContext::new();

        let alias = hyper_paste(Endpoints::Same(&mut store.conn), &plant, &shelf, &ctx)
            .unwrap()
            .unwrap();
        assert!(store.conn.is_hyperobject(&alias).unwrap());
        assert!(store.conn.get_file_list(&alias).unwrap().is_empty());
        let info = store.conn.get_hyperobject_info(&alias).unwrap().unwrap();
        assert_eq!(info.target_path, Some(plant.clone()));

        // Aliasing an alias keeps the original GUID.
        let first_alias = store.conn.rules().child(&plant, "alias");
        let leaf_guid = store.conn.read_uuid(&first_alias).unwrap();
        let second = hyper_paste(Endpoints::Same(&mut store.conn), &first_alias, &shelf, &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(store.conn.read_uuid(&second).unwrap(), leaf_guid);
    }

    #[test]
    fn hyper_paste_across_stores_is_not_supported() {
        let mut a = Store::new();
        let mut b = Store::new();
        let plant = sample(&mut a);
        let b_root = b.root();
        let err = hyper_paste(
            Endpoints::Pair {
                src: &mut a.conn,
                dst: &mut b.conn,
            },
            &plant,
            &b_root,
            &TransferContext::new(),
        )
        .unwrap_err();
        assert!(err.is_soft());
    }
}
