//! Blocking TCP server for RA object stores.
//!
//! Serves one store directory over the RA wire protocol. Each client gets
//! a thread and a [`LocalConnection`](ra_connection::LocalConnection) of its
//! own; all of them mint GUIDs into one shared registry.

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod session;

pub use auth::{AllowAllAuth, AuthProvider, Identity, StaticAuth};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::RaServer;
pub use session::Session;
