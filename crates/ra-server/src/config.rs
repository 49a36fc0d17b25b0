use std::collections::BTreeMap;
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use ra_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Server configuration, usually read from a TOML file:
///
/// ```toml
/// bind_addr = "0.0.0.0:4401"
/// store_root = "/srv/plants"
/// allow_anonymous = false
///
/// [users]
/// grower = "secret"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory holding the served store.
    pub store_root: PathBuf,
    /// Accepted `user = "password"` pairs.
    pub users: BTreeMap<String, String>,
    /// Accept the `anonymous` user with any password.
    pub allow_anonymous: bool,
    /// Sessions beyond this many are refused at accept time.
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            store_root: PathBuf::from("."),
            users: BTreeMap::new(),
            allow_anonymous: false,
            max_sessions: 64,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:4401".parse::<SocketAddr>().unwrap());
        assert_eq!(c.store_root, PathBuf::from("."));
        assert!(c.users.is_empty());
        assert!(!c.allow_anonymous);
        assert_eq!(c.max_sessions, 64);
    }

    #[test]
    fn parse_toml() {
        let c = ServerConfig::from_toml_str(
            r#"
            bind_addr = "0.0.0.0:5000"
            store_root = "/srv/plants"

            [users]
            grower = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 5000);
        assert_eq!(c.store_root, PathBuf::from("/srv/plants"));
        assert_eq!(c.users.get("grower").map(String::as_str), Some("secret"));
        assert_eq!(c.max_sessions, 64);
    }

    #[test]
    fn bad_address_is_config_error() {
        let err = ServerConfig::from_toml_str("bind_addr = \"nowhere\"").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }
}
