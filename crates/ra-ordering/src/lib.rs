//! Child ordering records for the RA connection layer.
//!
//! An object may carry an explicit display order for its children. The
//! record can be partial: names it lists come first, everything else follows
//! in case-insensitive alphabetical order, and every child shows up exactly
//! once.
//!
//! # Key Types
//!
//! - [`effective_order`] -- merges a record with the actual children
//! - [`OrderingStore`] -- reads and writes records on the local filesystem

pub mod error;
pub mod order;
pub mod store;

pub use error::{OrderingError, OrderingResult};
pub use order::{alphabetical, effective_order, parse, render};
pub use store::OrderingStore;
