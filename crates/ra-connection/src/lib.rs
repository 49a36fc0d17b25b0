//! The RA connection layer: one capability interface over two kinds of
//! object store.
//!
//! A browsing front-end holds a `&mut dyn Connection` and works the same
//! whether the store sits on the local disk or behind a server.
//!
//! # Backends
//!
//! - [`LocalConnection`] -- a store on the local filesystem
//! - [`RemoteConnection`] -- a store served over the wire protocol
//!
//! # Design Rules
//!
//! 1. Paths belong to the connection that produced them and are validated
//!    before any I/O.
//! 2. Operation failures are `false`/`None`; errors are transport breakage,
//!    validation, or a missing capability ([`RaError::NotSupported`]).
//! 3. One request at a time per connection.
//! 4. The GUID registry is read at connect time and only re-read on
//!    [`Connection::reload_uuid_base`].

pub mod archive;
pub mod config;
pub mod connection;
pub mod error;
pub mod local;
pub mod remote;
pub mod search;

pub use config::{ClientConfig, ConnectionTarget};
pub use connection::{Connection, HyperobjectInfo};
pub use error::{RaError, RaResult};
pub use local::{LocalConnection, SharedRegistry};
pub use remote::RemoteConnection;
pub use search::SearchOptions;
