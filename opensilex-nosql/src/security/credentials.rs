//! Secret password container and SCRAM credential construction.
//!
//! # Security
//! - Password bytes are stored in a buffer cleared on drop
//! - `build_scram_credential` wipes the caller's buffer in place, on success
//!   and on failure
//! - Passwords are never exposed in debug output or logs

use crate::error::NoSqlError;
use mongodb::options::{AuthMechanism, Credential};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Password bytes read from configuration, a file or a decryption process.
///
/// Trailing line terminators are stripped on construction, so a password file
/// written with `echo` yields the same secret as one written without newline.
///
/// # Example
///
/// ```rust
/// use opensilex_nosql::security::SecretPassword;
///
/// let secret = SecretPassword::new(b"s3cret\n".to_vec());
/// assert_eq!(secret.as_bytes(), b"s3cret");
/// // Bytes are zeroed when `secret` is dropped or consumed
/// ```
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretPassword {
    bytes: Vec<u8>,
}

impl SecretPassword {
    /// Takes ownership of raw password bytes.
    pub fn new(mut bytes: Vec<u8>) -> Self {
        while matches!(bytes.last(), Some(b'\n' | b'\r')) {
            bytes.pop();
        }
        Self { bytes }
    }

    /// Borrows the password bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the password is empty once line terminators are stripped.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consumes the secret into a SCRAM-SHA-256 credential.
    ///
    /// # Errors
    /// Returns an invalid argument error if the password is not valid UTF-8.
    pub fn into_credential(
        mut self,
        username: &str,
        source: Option<&str>,
    ) -> crate::Result<Credential> {
        build_scram_credential(username, source, &mut self.bytes)
    }
}

impl std::fmt::Debug for SecretPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretPassword(****)")
    }
}

/// Builds a SCRAM-SHA-256 credential and wipes `password`.
///
/// The slice is zeroed before this function returns, whether the credential
/// could be built or not. The only remaining copy of the secret is the one
/// owned by the returned credential, which the driver consumes when the
/// client is built.
///
/// # Errors
/// Returns an invalid argument error if the password is not valid UTF-8.
pub fn build_scram_credential(
    username: &str,
    source: Option<&str>,
    password: &mut [u8],
) -> crate::Result<Credential> {
    let decoded = std::str::from_utf8(password).map(str::to_owned);
    password.zeroize();

    let password = decoded
        .map_err(|_| NoSqlError::invalid_argument("password is not valid UTF-8"))?;

    let mut credential = Credential::default();
    credential.username = Some(username.to_string());
    credential.password = Some(password);
    credential.source = source.map(str::to_string);
    credential.mechanism = Some(AuthMechanism::ScramSha256);
    Ok(credential)
}
