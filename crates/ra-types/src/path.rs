//! Object path rules.
//!
//! Object paths are plain strings in the owning backend's separator. They
//! are never portable across backends: a path minted by one connection is
//! only meaningful to that connection. [`PathRules`] captures the separator
//! and store root of one connection and answers every structural question
//! about its paths.
//!
//! A valid path:
//! - is the root itself, or begins with the root followed by the separator
//! - contains no foreign separator (`\` on `/` backends and vice versa)
//! - does not end with the separator (unless it is a bare separator root)
//! - has no empty, `.` or `..` component below the root
//!
//! A valid object name is non-empty, contains neither separator, and does
//! not start with `.` (dot-names are reserved for bookkeeping files).

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::layout::EXT_DIR;

/// Separator and root of one connection's object paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRules {
    separator: char,
    root: String,
}

impl PathRules {
    /// Rules for a store rooted at `root` using `separator`.
    ///
    /// A trailing separator on the root is dropped, except for a root that
    /// is only the separator.
    pub fn new(separator: char, root: impl Into<String>) -> Self {
        let mut root = root.into();
        while root.len() > separator.len_utf8() && root.ends_with(separator) {
            root.pop();
        }
        Self { separator, root }
    }

    /// Rules using the platform's native separator.
    pub fn native(root: impl Into<String>) -> Self {
        Self::new(std::path::MAIN_SEPARATOR, root)
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// The separator this backend must never see.
    pub fn foreign_separator(&self) -> char {
        if self.separator == '/' {
            '\\'
        } else {
            '/'
        }
    }

    fn root_prefix(&self) -> String {
        if self.root.ends_with(self.separator) {
            self.root.clone()
        } else {
            format!("{}{}", self.root, self.separator)
        }
    }

    /// Check the validity predicate for `path`.
    pub fn validate(&self, path: &str) -> Result<(), TypeError> {
        let invalid = |reason: &str| TypeError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        if path.is_empty() {
            return Err(invalid("path must not be empty"));
        }
        if path.contains(self.foreign_separator()) {
            return Err(invalid("contains a foreign separator"));
        }
        if path == self.root {
            return Ok(());
        }
        if path.ends_with(self.separator) {
            return Err(invalid("must not end with a separator"));
        }
        let Some(rest) = path.strip_prefix(&self.root_prefix()) else {
            return Err(invalid("not inside the store root"));
        };
        if rest
            .split(self.separator)
            .any(|c| c.is_empty() || c == "." || c == "..")
        {
            return Err(invalid("escapes the store root"));
        }
        Ok(())
    }

    pub fn is_valid(&self, path: &str) -> bool {
        self.validate(path).is_ok()
    }

    /// `parent` + separator + `name`.
    pub fn join(&self, parent: &str, name: &str) -> String {
        if parent.ends_with(self.separator) {
            format!("{parent}{name}")
        } else {
            format!("{parent}{}{name}", self.separator)
        }
    }

    /// The directory holding the child objects of `object`.
    pub fn ext_dir(&self, object: &str) -> String {
        self.join(object, EXT_DIR)
    }

    /// Path of the child object `name` of `parent`.
    pub fn child(&self, parent: &str, name: &str) -> String {
        self.join(&self.ext_dir(parent), name)
    }

    /// The last component of `path`.
    pub fn name_of<'a>(&self, path: &'a str) -> &'a str {
        match path.rfind(self.separator) {
            Some(idx) => &path[idx + self.separator.len_utf8()..],
            None => path,
        }
    }

    fn strip_last<'a>(&self, path: &'a str) -> Option<&'a str> {
        let idx = path.rfind(self.separator)?;
        if idx == 0 {
            Some(&path[..self.separator.len_utf8()])
        } else {
            Some(&path[..idx])
        }
    }

    /// The object containing `path`.
    ///
    /// For a child object this skips the intermediate [`EXT_DIR`]; for a
    /// leaf file it is the directory holding the file. Returns `None` for
    /// the root and for anything that would leave the store.
    pub fn parent_of(&self, path: &str) -> Option<String> {
        if path == self.root || self.validate(path).is_err() {
            return None;
        }
        let mut parent = self.strip_last(path)?;
        if self.name_of(parent) == EXT_DIR && parent != self.root {
            parent = self.strip_last(parent)?;
        }
        if self.is_valid(parent) {
            Some(parent.to_string())
        } else {
            None
        }
    }

    /// `path` relative to the root, always `/`-separated.
    ///
    /// The root itself is the empty string.
    pub fn relative(&self, path: &str) -> Option<String> {
        if path == self.root {
            return Some(String::new());
        }
        let rest = path.strip_prefix(&self.root_prefix())?;
        Some(rest.replace(self.separator, "/"))
    }

    /// Inverse of [`relative`](Self::relative).
    pub fn absolute(&self, relative: &str) -> String {
        if relative.is_empty() {
            return self.root.clone();
        }
        let native = relative.replace('/', &self.separator.to_string());
        self.join(&self.root, &native)
    }
}

/// Validate an object name before it becomes a path component.
pub fn validate_object_name(name: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("must not contain a separator"));
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if name.contains('\0') || name.contains('\n') || name.contains('\r') {
        return Err(invalid("must not contain NUL or line breaks"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> PathRules {
        PathRules::new('/', "/home/lab/oofs")
    }

    #[test]
    fn root_trailing_separator_dropped() {
        assert_eq!(PathRules::new('/', "/home/lab/oofs/").root(), "/home/lab/oofs");
        assert_eq!(PathRules::new('/', "/").root(), "/");
    }

    #[test]
    fn valid_paths() {
        let r = rules();
        assert!(r.is_valid("/home/lab/oofs"));
        assert!(r.is_valid("/home/lab/oofs/ext/fern"));
        assert!(r.is_valid("/home/lab/oofs/ext/fern/plant.l"));
    }

    #[test]
    fn reject_foreign_separator() {
        assert!(rules().validate("/home/lab/oofs\\ext").is_err());
        let win = PathRules::new('\\', "C:\\oofs");
        assert!(win.is_valid("C:\\oofs\\ext\\a"));
        assert!(win.validate("C:\\oofs/ext").is_err());
    }

    #[test]
    fn reject_trailing_separator() {
        assert!(rules().validate("/home/lab/oofs/ext/").is_err());
    }

    #[test]
    fn reject_outside_root() {
        let r = rules();
        assert!(r.validate("/home/lab").is_err());
        assert!(r.validate("/home/lab/oofs2/ext").is_err());
        assert!(r.validate("").is_err());
    }

    #[test]
    fn reject_dot_components() {
        let r = rules();
        assert!(r.validate("/home/lab/oofs/../secret/passwd").is_err());
        assert!(r.validate("/home/lab/oofs/ext/fern/../../..").is_err());
        assert!(r.validate("/home/lab/oofs/./ext").is_err());
        assert!(r.validate("/home/lab/oofs//ext").is_err());
        assert_eq!(r.parent_of("/home/lab/oofs/ext/.."), None);
        // Dots inside a name are fine.
        assert!(r.is_valid("/home/lab/oofs/ext/fern/plant..l"));
        assert!(r.is_valid("/home/lab/oofs/ext/fern/..plant"));

        let win = PathRules::new('\\', "C:\\oofs");
        assert!(win.validate("C:\\oofs\\..\\x").is_err());
        let bare = PathRules::new('/', "/");
        assert!(bare.validate("/../etc").is_err());
    }

    #[test]
    fn bare_separator_root() {
        let r = PathRules::new('/', "/");
        assert!(r.is_valid("/"));
        assert!(r.is_valid("/ext/a"));
        assert_eq!(r.child("/", "a"), "/ext/a");
        assert_eq!(r.parent_of("/ext/a").as_deref(), Some("/"));
        assert_eq!(r.relative("/ext/a").as_deref(), Some("ext/a"));
        assert_eq!(r.absolute("ext/a"), "/ext/a");
    }

    #[test]
    fn child_and_parent() {
        let r = rules();
        let child = r.child("/home/lab/oofs", "fern");
        assert_eq!(child, "/home/lab/oofs/ext/fern");
        assert_eq!(r.parent_of(&child).as_deref(), Some("/home/lab/oofs"));
        let grandchild = r.child(&child, "frond");
        assert_eq!(r.parent_of(&grandchild).as_deref(), Some(child.as_str()));
    }

    #[test]
    fn parent_of_leaf_file_is_its_object() {
        let r = rules();
        assert_eq!(
            r.parent_of("/home/lab/oofs/ext/fern/plant.l").as_deref(),
            Some("/home/lab/oofs/ext/fern")
        );
    }

    #[test]
    fn parent_of_root_is_none() {
        assert_eq!(rules().parent_of("/home/lab/oofs"), None);
    }

    #[test]
    fn name_of_last_component() {
        let r = rules();
        assert_eq!(r.name_of("/home/lab/oofs/ext/fern"), "fern");
        assert_eq!(r.name_of("fern"), "fern");
    }

    #[test]
    fn relative_and_absolute_roundtrip() {
        let r = rules();
        let path = "/home/lab/oofs/ext/fern/ext/frond";
        let rel = r.relative(path).unwrap();
        assert_eq!(rel, "ext/fern/ext/frond");
        assert_eq!(r.absolute(&rel), path);
        assert_eq!(r.relative("/home/lab/oofs").as_deref(), Some(""));
        assert_eq!(r.relative("/elsewhere/x"), None);
    }

    #[test]
    fn relative_is_slash_separated_on_backslash_backends() {
        let r = PathRules::new('\\', "C:\\oofs");
        assert_eq!(r.relative("C:\\oofs\\ext\\a").as_deref(), Some("ext/a"));
        assert_eq!(r.absolute("ext/a"), "C:\\oofs\\ext\\a");
    }

    #[test]
    fn object_names() {
        assert!(validate_object_name("fern").is_ok());
        assert!(validate_object_name("my plant 2").is_ok());
        assert!(validate_object_name("").is_err());
        assert!(validate_object_name("a/b").is_err());
        assert!(validate_object_name("a\\b").is_err());
        assert!(validate_object_name(".hidden").is_err());
        assert!(validate_object_name("a\nb").is_err());
    }
}
