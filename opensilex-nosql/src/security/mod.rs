//! Security utilities for credential protection.
//!
//! This module provides security-focused utilities including:
//! - Secret password buffers with automatic memory clearing
//! - SCRAM-SHA-256 credential construction that wipes its input
//! - File ownership and permission checks for secret files
//! - Digest based integrity checks of credentials
//! - OpenSSL decryption through a guarded subprocess
//!
//! # Security Guarantees
//! - Passwords live in `Zeroize` containers and are cleared after a single use
//! - Permission checks happen before any read of a secret file
//! - Decryption subprocesses are killed and reaped on every exit path
//!
//! # Module Structure
//! - `credentials`: `SecretPassword` and `build_scram_credential`
//! - `permissions`: owner and mode checks for secret files
//! - `integrity`: `DigestAlgorithm` and hash file verification
//! - `openssl`: `OpensslDecryption` and its process guard

mod credentials;
mod integrity;
mod openssl;
mod permissions;

// Re-export public types
pub use credentials::{SecretPassword, build_scram_credential};
pub use integrity::{DigestAlgorithm, verify_integrity};
pub use openssl::OpensslDecryption;
pub use permissions::check_restrictive_permissions;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_password_to_credential() {
        let secret = SecretPassword::new(b"password\n".to_vec());
        let credential = secret.into_credential("user", Some("admin")).unwrap();
        assert_eq!(credential.username.as_deref(), Some("user"));
        assert_eq!(credential.password.as_deref(), Some("password"));
        assert_eq!(credential.source.as_deref(), Some("admin"));
    }

    #[test]
    fn test_digest_of_trimmed_secret_verifies() {
        let secret = SecretPassword::new(b"password\r\n".to_vec());
        let expected = DigestAlgorithm::Sha256.hex_digest(b"password");
        assert_eq!(DigestAlgorithm::Sha256.hex_digest(secret.as_bytes()), expected);
    }
}
