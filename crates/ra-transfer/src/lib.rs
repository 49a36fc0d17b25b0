//! Transfers between RA connections.
//!
//! Everything here is written against `&mut dyn Connection` and works the
//! same for any mix of local and remote stores.
//!
//! # Operations
//!
//! - [`paste_object`] -- copy a subtree, picking the cheapest strategy
//! - [`hyper_paste`] -- alias an object without copying it
//! - [`expand_all`] -- walk a subtree in display order
//!
//! Long operations poll a [`CancelFlag`] between steps and report each
//! visited path to an optional [`ProgressSink`].

pub mod expand;
pub mod paste;
pub mod progress;

pub use expand::{expand_all, ordered_children, TreeNode};
pub use paste::{hyper_paste, paste_object, Endpoints, PasteStrategy};
pub use progress::{CancelFlag, ProgressSink, TransferContext};
