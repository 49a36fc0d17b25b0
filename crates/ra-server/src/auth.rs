use std::collections::BTreeMap;

use ra_protocol::Credentials;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
}

impl Identity {
    pub fn anonymous() -> Self { Self { name: Credentials::anonymous().user } }
    pub fn user(name: impl Into<String>) -> Self { Self { name: name.into() } }
}

/// Decides who may log in.
pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
}

/// Checks logins against a fixed user table.
#[derive(Clone, Debug, Default)]
pub struct StaticAuth {
    users: BTreeMap<String, String>,
    allow_anonymous: bool,
}

impl StaticAuth {
    pub fn new(users: BTreeMap<String, String>, allow_anonymous: bool) -> Self {
        Self { users, allow_anonymous }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.users.clone(), config.allow_anonymous)
    }
}

impl AuthProvider for StaticAuth {
    fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        if credentials.is_anonymous() {
            return if self.allow_anonymous {
                Ok(Identity::anonymous())
            } else {
                Err(ServerError::AuthFailed("anonymous login is disabled".into()))
            };
        }
        match self.users.get(&credentials.user) {
            Some(password) if *password == credentials.password => {
                Ok(Identity::user(&credentials.user))
            }
            _ => Err(ServerError::AuthFailed(format!(
                "bad credentials for {}",
                credentials.user
            ))),
        }
    }
}

/// Lets everyone in under the name they give.
pub struct AllowAllAuth;

impl AuthProvider for AllowAllAuth {
    fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        if credentials.is_anonymous() {
            Ok(Identity::anonymous())
        } else {
            Ok(Identity::user(&credentials.user))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> StaticAuth {
        let users = BTreeMap::from([("grower".to_string(), "secret".to_string())]);
        StaticAuth::new(users, false)
    }

    #[test]
    fn identity_variants() {
        assert_eq!(Identity::anonymous().name, "anonymous");
        assert_eq!(Identity::user("grower").name, "grower");
    }

    #[test]
    fn static_auth_checks_password() {
        let auth = table();
        let id = auth.authenticate(&Credentials::new("grower", "secret")).unwrap();
        assert_eq!(id, Identity::user("grower"));
        assert!(matches!(
            auth.authenticate(&Credentials::new("grower", "guess")),
            Err(ServerError::AuthFailed(_))
        ));
        assert!(matches!(
            auth.authenticate(&Credentials::new("stranger", "secret")),
            Err(ServerError::AuthFailed(_))
        ));
    }

    #[test]
    fn anonymous_needs_opt_in() {
        assert!(table().authenticate(&Credentials::anonymous()).is_err());
        let open = StaticAuth::new(BTreeMap::new(), true);
        assert_eq!(
            open.authenticate(&Credentials::anonymous()).unwrap(),
            Identity::anonymous()
        );
    }

    #[test]
    fn allow_all_auth() {
        let id = AllowAllAuth.authenticate(&Credentials::new("anyone", "")).unwrap();
        assert_eq!(id.name, "anyone");
    }
}
