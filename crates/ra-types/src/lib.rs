//! Foundation types for the RA (Remote Access) connection layer.
//!
//! Every other `ra-*` crate depends on `ra-types`.
//!
//! # Key Types
//!
//! - [`Guid`] -- stable 128-bit object identity
//! - [`Extension`] / [`ExtensionKind`] -- one child entry of an object
//! - [`PathRules`] -- separator, root, and validity predicate of a backend
//! - [`TextRules`] -- name-based table deciding CRLF conversion
//! - [`layout`] -- names of the store's directories and bookkeeping files

pub mod error;
pub mod extension;
pub mod guid;
pub mod layout;
pub mod path;
pub mod text;

pub use error::TypeError;
pub use extension::{Extension, ExtensionKind};
pub use guid::Guid;
pub use path::{validate_object_name, PathRules};
pub use text::TextRules;
