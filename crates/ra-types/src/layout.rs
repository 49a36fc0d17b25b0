//! On-disk layout of an object store.
//!
//! An object is a directory. Its leaf files sit directly inside it and its
//! child objects live under the [`EXT_DIR`] sub-directory. A handful of
//! dot-files carry the store's bookkeeping and are never shown as leaves.

/// Sub-directory of an object holding its child objects.
pub const EXT_DIR: &str = "ext";

/// Ordering record, inside an object's [`EXT_DIR`].
pub const ORDERING_FILE: &str = ".ordering";

/// Identity file of a plain object: GUID on line 1, display name on line 2.
pub const IDENTITY_FILE: &str = ".uuid";

/// Marker turning a directory into a hyperobject. Same format as
/// [`IDENTITY_FILE`].
pub const HYPEROBJECT_FILE: &str = ".hyperobject";

/// GUID registry, at the store root.
pub const REGISTRY_FILE: &str = ".dbase";

/// Whether `name` is one of the store's bookkeeping files.
pub fn is_control_file(name: &str) -> bool {
    matches!(
        name,
        ORDERING_FILE | IDENTITY_FILE | HYPEROBJECT_FILE | REGISTRY_FILE
    )
}
