//! API credential handling.
//!
//! Credentials are wrapped in [`secrecy::SecretString`] so they cannot be
//! accidentally printed via `Debug` and are zeroed on drop. The value is
//! only reachable through an explicit [`ApiCredential::expose`] call.

use secrecy::{ExposeSecret, SecretString};

use super::JudgeError;

/// Where a credential came from, for debugging without exposing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    Programmatic,
}

/// A securely held API credential.
pub struct ApiCredential {
    secret: SecretString,
    source: CredentialSource,
    description: &'static str,
}

impl ApiCredential {
    /// Wrap a credential supplied programmatically.
    pub fn new(value: impl Into<String>, description: &'static str) -> Self {
        Self {
            secret: SecretString::from(value.into()),
            source: CredentialSource::Programmatic,
            description,
        }
    }

    /// Load a credential from an environment variable.
    pub fn from_env(var: &str, description: &'static str) -> Result<Self, JudgeError> {
        let value = std::env::var(var).map_err(|_| {
            JudgeError::NotConfigured(format!("{description} required: set {var}"))
        })?;
        if value.is_empty() {
            return Err(JudgeError::NotConfigured(format!(
                "{description} is empty: set {var}"
            )));
        }
        Ok(Self {
            secret: SecretString::from(value),
            source: CredentialSource::Environment,
            description,
        })
    }

    /// Expose the credential at the point of use.
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.secret.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl std::fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredential")
            .field("secret", &"[REDACTED]")
            .field("source", &self.source)
            .field("description", &self.description)
            .finish()
    }
}
