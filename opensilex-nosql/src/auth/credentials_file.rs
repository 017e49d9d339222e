use crate::auth::MongoAuthenticationService;
use crate::config::CredentialsFileConfig;
use crate::error::NoSqlError;
use crate::security::{SecretPassword, check_restrictive_permissions, verify_integrity};
use mongodb::options::Credential;
use std::path::Path;

/// Authenticates with a password stored in a dedicated file.
///
/// The file must be owned by the current user with no group or other
/// access. When a hash file is configured, the password digest must match
/// it before any credential is produced.
#[derive(Debug, Clone)]
pub struct CredentialsFileMongoAuthentication {
    config: CredentialsFileConfig,
}

impl CredentialsFileMongoAuthentication {
    /// Creates the strategy; files are only accessed by `read_credentials`.
    pub fn new(config: CredentialsFileConfig) -> Self {
        Self { config }
    }

    /// File holding the password.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Verifies a password obtained from this strategy's file and turns it
    /// into a credential. The secret is wiped on every path.
    pub(crate) fn credential_from_secret(&self, secret: SecretPassword) -> crate::Result<Credential> {
        if secret.is_empty() {
            return Err(NoSqlError::invalid_argument("Null or empty password"));
        }

        if let Some(hash_path) = &self.config.hash_path {
            verify_integrity(secret.as_bytes(), hash_path, self.config.hash_algorithm)?;
            tracing::debug!(
                hash_file = %hash_path.display(),
                algorithm = %self.config.hash_algorithm,
                "Credentials integrity verified"
            );
        }

        secret.into_credential(&self.config.username, self.config.auth_source.as_deref())
    }
}

impl MongoAuthenticationService for CredentialsFileMongoAuthentication {
    fn read_credentials(&self) -> crate::Result<Credential> {
        let path = &self.config.path;
        check_restrictive_permissions(path)?;

        let bytes = std::fs::read(path)
            .map_err(|e| NoSqlError::io(format!("reading credentials file {}", path.display()), e))?;

        self.credential_from_secret(SecretPassword::new(bytes))
    }

    fn username(&self) -> &str {
        &self.config.username
    }

    fn strategy_name(&self) -> &'static str {
        "credentials_file"
    }
}
