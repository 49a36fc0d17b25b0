//! GUID registry and hyperobject markers.
//!
//! GUIDs are the only stable identity in a store. This crate provides the
//! two persistent pieces that carry them:
//!
//! - [`UuidRegistry`] -- the store-wide `GUID → relative path` table
//! - [`Marker`] -- the per-object file holding a GUID and display name,
//!   used both as a plain object's identity file and as a hyperobject's
//!   alias marker
//!
//! Neither type knows about connections; backends decide where the files
//! live and how they are transported.

pub mod error;
pub mod marker;
pub mod registry;

pub use error::{RegistryError, Result};
pub use marker::Marker;
pub use registry::UuidRegistry;
