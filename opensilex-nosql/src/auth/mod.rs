//! MongoDB authentication strategies.
//!
//! Each strategy turns its configuration into a SCRAM-SHA-256 credential.
//! Credentials are read once, when the service builds its client; the
//! password buffers used along the way are wiped before the credential is
//! handed to the driver.
//!
//! # Strategies
//! - [`PasswordMongoAuthentication`]: password from configuration
//! - [`CredentialsFileMongoAuthentication`]: password file with permission
//!   check and optional digest verification
//! - [`EncryptedCredentialsFileMongoAuthentication`]: OpenSSL-encrypted
//!   password file, then the same checks as the credentials file strategy

mod credentials_file;
mod encrypted_file;
mod password;

pub use credentials_file::CredentialsFileMongoAuthentication;
pub use encrypted_file::EncryptedCredentialsFileMongoAuthentication;
pub use password::PasswordMongoAuthentication;

use crate::config::AuthenticationConfig;
use crate::error::NoSqlError;
use mongodb::options::Credential;

/// Produces the credential used to authenticate the MongoDB client.
///
/// Implementations may block on file system access or a subprocess; async
/// callers should run them through `tokio::task::spawn_blocking`.
pub trait MongoAuthenticationService: Send + Sync {
    /// Reads, verifies and returns the credential.
    ///
    /// # Errors
    /// Returns a security error for permission, integrity or decryption
    /// failures, an invalid argument error for an unusable password, and an
    /// I/O error for unreadable files.
    fn read_credentials(&self) -> crate::Result<Credential>;

    /// MongoDB user this strategy authenticates.
    fn username(&self) -> &str;

    /// Short strategy name, for logs.
    fn strategy_name(&self) -> &'static str;
}

/// Closed set of configured strategies.
#[derive(Debug, Clone)]
pub enum MongoAuthentication {
    /// Password from configuration
    Password(PasswordMongoAuthentication),
    /// Password file
    CredentialsFile(CredentialsFileMongoAuthentication),
    /// Encrypted password file
    EncryptedCredentialsFile(EncryptedCredentialsFileMongoAuthentication),
}

impl MongoAuthentication {
    /// Builds the strategy selected by `config`.
    ///
    /// # Errors
    /// Returns a configuration error for invalid settings and an invalid
    /// argument error for an empty configured password.
    pub fn from_config(config: &AuthenticationConfig) -> crate::Result<Self> {
        config.validate()?;

        Ok(match config {
            AuthenticationConfig::Password(config) => {
                Self::Password(PasswordMongoAuthentication::from_config(config)?)
            }
            AuthenticationConfig::CredentialsFile(config) => {
                Self::CredentialsFile(CredentialsFileMongoAuthentication::new(config.clone()))
            }
            AuthenticationConfig::EncryptedCredentialsFile(config) => Self::EncryptedCredentialsFile(
                EncryptedCredentialsFileMongoAuthentication::new(config.clone()),
            ),
        })
    }

    /// Runs the strategy on the blocking thread pool.
    ///
    /// # Errors
    /// Returns the strategy's error, or an I/O error if the blocking task
    /// could not complete.
    pub async fn load_credential(self) -> crate::Result<Credential> {
        let strategy = self.strategy_name();
        let username = self.username().to_string();

        let credential = tokio::task::spawn_blocking(move || self.read_credentials())
            .await
            .map_err(|e| {
                NoSqlError::io("reading MongoDB credentials", std::io::Error::other(e))
            })??;

        tracing::info!(strategy, username = %username, "MongoDB credentials loaded");
        Ok(credential)
    }

    fn service(&self) -> &dyn MongoAuthenticationService {
        match self {
            Self::Password(service) => service,
            Self::CredentialsFile(service) => service,
            Self::EncryptedCredentialsFile(service) => service,
        }
    }
}

impl MongoAuthenticationService for MongoAuthentication {
    fn read_credentials(&self) -> crate::Result<Credential> {
        self.service().read_credentials()
    }

    fn username(&self) -> &str {
        self.service().username()
    }

    fn strategy_name(&self) -> &'static str {
        self.service().strategy_name()
    }
}
