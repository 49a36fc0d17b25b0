use crate::error::{ProtocolError, ProtocolResult};

/// Literal prefix of a successful login response.
pub const LOGIN_CONFIRMATION: &[u8] = b"RA-OK";

/// Credentials sent in the login exchange as `user:password`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new("anonymous", "")
    }

    pub fn is_anonymous(&self) -> bool {
        self.user == "anonymous"
    }

    pub fn to_payload(&self) -> Vec<u8> {
        format!("{}:{}", self.user, self.password).into_bytes()
    }

    /// Parse `user:password`. The password may itself contain `:`.
    pub fn from_payload(data: &[u8]) -> ProtocolResult<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| ProtocolError::MalformedPayload(format!("login is not UTF-8: {e}")))?;
        let (user, password) = text
            .split_once(':')
            .ok_or_else(|| ProtocolError::MalformedPayload("login lacks ':'".into()))?;
        Ok(Self::new(user, password))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What the server announces after accepting a login: the separator and
/// root of the store it serves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginGreeting {
    pub separator: char,
    pub root: String,
}

impl LoginGreeting {
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = LOGIN_CONFIRMATION.to_vec();
        let mut sep = [0u8; 4];
        out.extend_from_slice(self.separator.encode_utf8(&mut sep).as_bytes());
        out.extend_from_slice(self.root.as_bytes());
        out
    }

    /// Parse a login response. `Ok(None)` means the server refused.
    pub fn from_payload(data: &[u8]) -> ProtocolResult<Option<Self>> {
        let Some(rest) = data.strip_prefix(LOGIN_CONFIRMATION) else {
            return Ok(None);
        };
        let text = std::str::from_utf8(rest)
            .map_err(|e| ProtocolError::MalformedPayload(format!("greeting is not UTF-8: {e}")))?;
        let mut chars = text.chars();
        let separator = chars
            .next()
            .ok_or_else(|| ProtocolError::MalformedPayload("greeting lacks separator".into()))?;
        let root = chars.as_str().to_string();
        if root.is_empty() {
            return Err(ProtocolError::MalformedPayload("greeting lacks root".into()));
        }
        Ok(Some(Self { separator, root }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_payload_roundtrip() {
        let c = Credentials::new("lab", "se:cret");
        assert_eq!(c.to_payload(), b"lab:se:cret");
        assert_eq!(Credentials::from_payload(&c.to_payload()).unwrap(), c);
    }

    #[test]
    fn credentials_require_colon() {
        assert!(Credentials::from_payload(b"nocolon").is_err());
    }

    #[test]
    fn anonymous_credentials() {
        let c = Credentials::anonymous();
        assert!(c.is_anonymous());
        assert_eq!(c.to_payload(), b"anonymous:");
    }

    #[test]
    fn debug_hides_password() {
        let c = Credentials::new("lab", "hunter2");
        assert!(!format!("{c:?}").contains("hunter2"));
    }

    #[test]
    fn greeting_roundtrip() {
        let g = LoginGreeting {
            separator: '/',
            root: "/srv/oofs".into(),
        };
        let payload = g.to_payload();
        assert!(payload.starts_with(LOGIN_CONFIRMATION));
        assert_eq!(LoginGreeting::from_payload(&payload).unwrap(), Some(g));
    }

    #[test]
    fn refusal_is_none() {
        assert_eq!(LoginGreeting::from_payload(b"DENIED").unwrap(), None);
        assert_eq!(LoginGreeting::from_payload(b"").unwrap(), None);
    }

    #[test]
    fn truncated_greeting_is_malformed() {
        assert!(LoginGreeting::from_payload(b"RA-OK").is_err());
        assert!(LoginGreeting::from_payload(b"RA-OK/").is_err());
    }
}
