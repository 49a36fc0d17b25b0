use std::fs;
use std::path::{Path, PathBuf};

use ra_protocol::{Credentials, DEFAULT_PORT};
use ra_types::TextRules;
use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::{RaError, RaResult};
use crate::local::LocalConnection;
use crate::remote::RemoteConnection;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_user() -> String {
    Credentials::anonymous().user
}

/// Which store a client talks to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionTarget {
    /// A store on the local filesystem.
    Local { root: PathBuf },
    /// A store behind an `ra` server.
    Remote {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
        #[serde(default = "default_user")]
        user: String,
        #[serde(default)]
        password: String,
    },
}

impl Default for ConnectionTarget {
    fn default() -> Self {
        Self::Local {
            root: PathBuf::from("."),
        }
    }
}

/// Client-side configuration, usually read from a TOML file:
///
/// ```toml
/// [target]
/// kind = "remote"
/// host = "lab.example.org"
/// user = "grower"
///
/// [text]
/// suffixes = ["l", "v", "txt"]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub target: ConnectionTarget,
    /// Which files get line-ending conversion on transfer.
    pub text: TextRules,
}

impl ClientConfig {
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            target: ConnectionTarget::Local { root: root.into() },
            ..Default::default()
        }
    }

    pub fn remote(host: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            target: ConnectionTarget::Remote {
                host: host.into(),
                port,
                user: credentials.user,
                password: credentials.password,
            },
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> RaResult<Self> {
        toml::from_str(text).map_err(|e| RaError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> RaResult<String> {
        toml::to_string_pretty(self).map_err(|e| RaError::Config(e.to_string()))
    }

    /// Read a configuration file.
    pub fn load(path: &Path) -> RaResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| RaError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Open a connection to the configured target.
    pub fn connect(&self) -> RaResult<Box<dyn Connection>> {
        match &self.target {
            ConnectionTarget::Local { root } => {
                Ok(Box::new(LocalConnection::open(root, self.text.clone())?))
            }
            ConnectionTarget::Remote {
                host,
                port,
                user,
                password,
            } => {
                let credentials = Credentials::new(user.clone(), password.clone());
                Ok(Box::new(RemoteConnection::connect(
                    host,
                    *port,
                    &credentials,
                    self.text.clone(),
                )?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.text, TextRules::default());
    }

    #[test]
    fn remote_target_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            [target]
            kind = "remote"
            host = "lab"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.target,
            ConnectionTarget::Remote {
                host: "lab".into(),
                port: DEFAULT_PORT,
                user: "anonymous".into(),
                password: String::new(),
            }
        );
    }

    #[test]
    fn text_rules_override() {
        let config = ClientConfig::from_toml_str(
            r#"
            [text]
            suffixes = ["l"]
            names = []
            "#,
        )
        .unwrap();
        assert!(config.text.is_text("plant.l"));
        assert!(!config.text.is_text("notes.txt"));
    }

    #[test]
    fn toml_roundtrip() {
        let config = ClientConfig::remote("lab", 5000, Credentials::new("grower", "pw"));
        let text = config.to_toml_string().unwrap();
        assert_eq!(ClientConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = ClientConfig::from_toml_str("[target]\nkind = \"ftp\"").unwrap_err();
        assert!(matches!(err, RaError::Config(_)));
    }

    #[test]
    fn local_target_connects() {
        let dir = tempfile::tempdir().unwrap();
        let conn = ClientConfig::local(dir.path()).connect().unwrap();
        assert_eq!(conn.backend(), "local");
        assert!(conn.supports_copy_paste());
    }
}
