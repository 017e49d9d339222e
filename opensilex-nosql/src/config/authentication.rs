//! Authentication strategy configuration.
//!
//! The `type` key of the `[authentication]` table selects the strategy:
//! `password`, `credentials_file` or `encrypted_credentials_file`.

use crate::error::NoSqlError;
use crate::security::DigestAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Credential strategy used to authenticate against MongoDB.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthenticationConfig {
    /// Password stored in the main configuration
    Password(PasswordAuthConfig),
    /// Password stored in a dedicated, permission-checked file
    CredentialsFile(CredentialsFileConfig),
    /// Password stored in an OpenSSL-encrypted file
    EncryptedCredentialsFile(EncryptedCredentialsFileConfig),
}

/// Inputs of the plain password strategy.
#[derive(Clone, Serialize, Deserialize)]
pub struct PasswordAuthConfig {
    /// MongoDB user
    pub username: String,
    /// Database holding the user definition
    #[serde(default)]
    pub auth_source: Option<String>,
    /// Plain password, never serialized back
    #[serde(default, skip_serializing)]
    pub password: Zeroizing<String>,
}

/// Inputs of the credentials file strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsFileConfig {
    /// MongoDB user
    pub username: String,
    /// Database holding the user definition
    #[serde(default)]
    pub auth_source: Option<String>,
    /// File holding the password
    pub path: PathBuf,
    /// Text encoding of the password file
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Optional file holding the expected hex digest of the password
    #[serde(default)]
    pub hash_path: Option<PathBuf>,
    /// Digest algorithm used for the integrity check
    #[serde(default)]
    pub hash_algorithm: DigestAlgorithm,
}

/// Inputs of the encrypted credentials file strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedCredentialsFileConfig {
    /// Credentials file settings; `path` points to the encrypted file
    #[serde(flatten)]
    pub file: CredentialsFileConfig,
    /// File holding the OpenSSL passphrase
    pub key_path: PathBuf,
    /// OpenSSL cipher name, passed as `-<cipher>`
    #[serde(default = "default_cipher")]
    pub cipher: String,
    /// Message digest used by the key derivation, passed as `-md <digest>`
    #[serde(default = "default_digest")]
    pub digest: String,
    /// PBKDF2 iteration count; enables `-pbkdf2 -iter N` when set
    #[serde(default)]
    pub pbkdf2_iterations: Option<u32>,
    /// OpenSSL executable
    #[serde(default = "default_openssl_path")]
    pub openssl_path: PathBuf,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_cipher() -> String {
    "aes-256-cbc".to_string()
}

fn default_digest() -> String {
    "sha256".to_string()
}

fn default_openssl_path() -> PathBuf {
    PathBuf::from("openssl")
}

impl std::fmt::Debug for PasswordAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordAuthConfig")
            .field("username", &self.username)
            .field("auth_source", &self.auth_source)
            .field("password", &"****")
            .finish()
    }
}

impl std::fmt::Debug for AuthenticationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(config) => f.debug_tuple("Password").field(config).finish(),
            Self::CredentialsFile(config) => {
                f.debug_tuple("CredentialsFile").field(config).finish()
            }
            Self::EncryptedCredentialsFile(config) => f
                .debug_tuple("EncryptedCredentialsFile")
                .field(config)
                .finish(),
        }
    }
}

impl AuthenticationConfig {
    /// Plain password configuration.
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password(PasswordAuthConfig {
            username: username.into(),
            auth_source: None,
            password: Zeroizing::new(password.into()),
        })
    }

    /// Credentials file configuration with the default encoding and no hash file.
    pub fn credentials_file(username: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::CredentialsFile(CredentialsFileConfig::new(username, path))
    }

    /// MongoDB user configured for this strategy.
    pub fn username(&self) -> &str {
        match self {
            Self::Password(config) => &config.username,
            Self::CredentialsFile(config) => &config.username,
            Self::EncryptedCredentialsFile(config) => &config.file.username,
        }
    }

    /// Validates the non-secret parts of the configuration.
    ///
    /// The password itself is checked when the strategy is constructed.
    ///
    /// # Errors
    /// Returns a configuration error for empty usernames or paths, an
    /// unsupported encoding, an unsafe cipher/digest name or a zero
    /// iteration count.
    pub fn validate(&self) -> crate::Result<()> {
        if self.username().trim().is_empty() {
            return Err(NoSqlError::configuration(
                "authentication username cannot be empty",
            ));
        }

        match self {
            Self::Password(_) => Ok(()),
            Self::CredentialsFile(config) => config.validate(),
            Self::EncryptedCredentialsFile(config) => config.validate(),
        }
    }
}

impl CredentialsFileConfig {
    /// Creates a configuration with the default encoding and no hash file.
    pub fn new(username: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            auth_source: None,
            path: path.into(),
            encoding: default_encoding(),
            hash_path: None,
            hash_algorithm: DigestAlgorithm::default(),
        }
    }

    /// Builder method to enable the integrity check.
    pub fn with_hash(mut self, hash_path: impl Into<PathBuf>, algorithm: DigestAlgorithm) -> Self {
        self.hash_path = Some(hash_path.into());
        self.hash_algorithm = algorithm;
        self
    }

    fn validate(&self) -> crate::Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(NoSqlError::configuration(
                "credentials file path cannot be empty",
            ));
        }

        if !is_utf8_label(&self.encoding) {
            return Err(NoSqlError::configuration(format!(
                "unsupported credentials file encoding '{}', only utf-8 is supported",
                self.encoding
            )));
        }

        Ok(())
    }
}

impl EncryptedCredentialsFileConfig {
    /// Creates a configuration with the default cipher, digest and executable.
    pub fn new(file: CredentialsFileConfig, key_path: impl Into<PathBuf>) -> Self {
        Self {
            file,
            key_path: key_path.into(),
            cipher: default_cipher(),
            digest: default_digest(),
            pbkdf2_iterations: None,
            openssl_path: default_openssl_path(),
        }
    }

    /// Builder method to enable PBKDF2 key derivation.
    pub fn with_pbkdf2_iterations(mut self, iterations: u32) -> Self {
        self.pbkdf2_iterations = Some(iterations);
        self
    }

    /// Builder method to use another OpenSSL executable.
    pub fn with_openssl_path(mut self, openssl_path: impl Into<PathBuf>) -> Self {
        self.openssl_path = openssl_path.into();
        self
    }

    fn validate(&self) -> crate::Result<()> {
        self.file.validate()?;

        if self.key_path.as_os_str().is_empty() {
            return Err(NoSqlError::configuration("key file path cannot be empty"));
        }

        if !is_openssl_name(&self.cipher) {
            return Err(NoSqlError::configuration(format!(
                "invalid OpenSSL cipher name '{}'",
                self.cipher
            )));
        }

        if !is_openssl_name(&self.digest) {
            return Err(NoSqlError::configuration(format!(
                "invalid OpenSSL digest name '{}'",
                self.digest
            )));
        }

        if self.pbkdf2_iterations == Some(0) {
            return Err(NoSqlError::configuration(
                "pbkdf2_iterations must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn is_utf8_label(encoding: &str) -> bool {
    matches!(encoding.to_ascii_lowercase().as_str(), "utf-8" | "utf8")
}

/// Cipher and digest names end up as OpenSSL arguments.
fn is_openssl_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
