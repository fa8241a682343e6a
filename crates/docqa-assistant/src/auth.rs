//! Credential check.

use docqa_core::config::AuthConfig;

pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// Accepts exactly one configured username/password pair.
///
/// Values are compared as BLAKE3 digests, whose equality check runs in
/// constant time. An unset username or password accepts nobody.
pub struct StaticCredentials {
    username: blake3::Hash,
    password: blake3::Hash,
    configured: bool,
}

impl StaticCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: blake3::hash(username.as_bytes()),
            password: blake3::hash(password.as_bytes()),
            configured: !username.is_empty() && !password.is_empty(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.username, config.password.expose())
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = blake3::hash(username.as_bytes()) == self.username;
        let pass_ok = blake3::hash(password.as_bytes()) == self.password;
        self.configured && user_ok && pass_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::config::Secret;

    #[test]
    fn accepts_only_the_configured_pair() {
        let creds = StaticCredentials::new("admin", "hunter2");
        assert!(creds.verify("admin", "hunter2"));
        assert!(!creds.verify("admin", "hunter3"));
        assert!(!creds.verify("root", "hunter2"));
    }

    #[test]
    fn unconfigured_accepts_nobody() {
        let creds = StaticCredentials::from_config(&AuthConfig::default());
        assert!(!creds.verify("", ""));

        let no_password = StaticCredentials::from_config(&AuthConfig {
            username: "admin".to_string(),
            password: Secret::default(),
        });
        assert!(!no_password.verify("admin", ""));
    }
}
