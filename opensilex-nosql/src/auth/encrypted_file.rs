use crate::auth::{CredentialsFileMongoAuthentication, MongoAuthenticationService};
use crate::config::EncryptedCredentialsFileConfig;
use crate::security::{OpensslDecryption, SecretPassword, check_restrictive_permissions};
use mongodb::options::Credential;

/// Authenticates with a password stored in an OpenSSL-encrypted file.
///
/// Both the encrypted file and the passphrase file must pass the permission
/// check before OpenSSL runs. The decrypted password then goes through the
/// same integrity check as [`CredentialsFileMongoAuthentication`].
#[derive(Debug, Clone)]
pub struct EncryptedCredentialsFileMongoAuthentication {
    file: CredentialsFileMongoAuthentication,
    decryption: OpensslDecryption,
}

impl EncryptedCredentialsFileMongoAuthentication {
    /// Creates the strategy; files are only accessed by `read_credentials`.
    pub fn new(config: EncryptedCredentialsFileConfig) -> Self {
        let decryption = OpensslDecryption::new(
            config.openssl_path,
            config.cipher,
            config.digest,
            config.key_path,
        )
        .with_pbkdf2_iterations(config.pbkdf2_iterations);

        Self {
            file: CredentialsFileMongoAuthentication::new(config.file),
            decryption,
        }
    }
}

impl MongoAuthenticationService for EncryptedCredentialsFileMongoAuthentication {
    fn read_credentials(&self) -> crate::Result<Credential> {
        let encrypted = self.file.path();
        check_restrictive_permissions(encrypted)?;
        check_restrictive_permissions(self.decryption.key_path())?;

        let mut plaintext = self.decryption.decrypt(encrypted)?;
        tracing::debug!(file = %encrypted.display(), "Credentials file decrypted");

        let secret = SecretPassword::new(std::mem::take(&mut *plaintext));
        self.file.credential_from_secret(secret)
    }

    fn username(&self) -> &str {
        self.file.username()
    }

    fn strategy_name(&self) -> &'static str {
        "encrypted_credentials_file"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::CredentialsFileConfig;
    use crate::error::NoSqlError;
    use crate::security::DigestAlgorithm;
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::process::Command;

    fn write_file(dir: &Path, name: &str, content: &[u8], mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        std::fs::set_permissions(&path, Permissions::from_mode(mode)).unwrap();
        path
    }

    /// Stand-in OpenSSL printing a fixed plaintext, or failing.
    fn fake_openssl(dir: &Path, body: &str) -> PathBuf {
        write_file(dir, "openssl", format!("#!/bin/sh\n{body}\n").as_bytes(), 0o700)
    }

    fn config(dir: &Path, openssl: PathBuf) -> EncryptedCredentialsFileConfig {
        let encrypted = write_file(dir, "mongo.enc", b"Salted__", 0o600);
        let key = write_file(dir, "mongo.key", b"passphrase\n", 0o600);
        EncryptedCredentialsFileConfig::new(CredentialsFileConfig::new("admin", encrypted), key)
            .with_openssl_path(openssl)
    }

    fn openssl_available() -> bool {
        Command::new("openssl")
            .arg("version")
            .output()
            .is_ok_and(|output| output.status.success())
    }

    #[test]
    fn test_decrypted_password_becomes_credential() {
        let dir = tempfile::tempdir().unwrap();
        let openssl = fake_openssl(dir.path(), "printf 'opensilex\\n'");
        let service = EncryptedCredentialsFileMongoAuthentication::new(config(dir.path(), openssl));

        let credential = service.read_credentials().unwrap();
        assert_eq!(credential.username.as_deref(), Some("admin"));
        assert_eq!(credential.password.as_deref(), Some("opensilex"));
    }

    #[test]
    fn test_decryption_failure_is_security_error() {
        let dir = tempfile::tempdir().unwrap();
        let openssl = fake_openssl(dir.path(), "echo 'bad decrypt' >&2\nexit 1");
        let service = EncryptedCredentialsFileMongoAuthentication::new(config(dir.path(), openssl));

        let error = service.read_credentials().unwrap_err();
        assert!(matches!(error, NoSqlError::Security { .. }));
        assert!(error.to_string().contains("aes-256-cbc"));
    }

    #[test]
    fn test_unrestricted_key_file_rejected_before_decryption() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let openssl = fake_openssl(
            dir.path(),
            &format!("touch '{}'\nprintf 'opensilex'", marker.display()),
        );
        let config = config(dir.path(), openssl);
        std::fs::set_permissions(&config.key_path, Permissions::from_mode(0o644)).unwrap();

        let error = EncryptedCredentialsFileMongoAuthentication::new(config)
            .read_credentials()
            .unwrap_err();
        assert!(matches!(error, NoSqlError::Security { .. }));
        assert!(!marker.exists());
    }

    #[test]
    fn test_decrypted_password_checked_against_hash() {
        let dir = tempfile::tempdir().unwrap();
        let openssl = fake_openssl(dir.path(), "printf 'opensilex'");
        let digest = DigestAlgorithm::Sha256.hex_digest(b"another");
        let hash = write_file(dir.path(), "mongo.sha256", digest.as_bytes(), 0o600);
        let mut config = config(dir.path(), openssl);
        config.file = config.file.with_hash(hash, DigestAlgorithm::Sha256);

        assert!(matches!(
            EncryptedCredentialsFileMongoAuthentication::new(config).read_credentials(),
            Err(NoSqlError::Security { .. })
        ));
    }

    #[test]
    fn test_openssl_round_trip() {
        if !openssl_available() {
            eprintln!("openssl not available, skipping round trip");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let plain = write_file(dir.path(), "mongo.pass", b"round-trip-secret\n", 0o600);
        let key = write_file(dir.path(), "mongo.key", b"passphrase\n", 0o600);
        let encrypted = dir.path().join("mongo.enc");

        let mut pass = std::ffi::OsString::from("file:");
        pass.push(&key);
        let status = Command::new("openssl")
            .args(["enc", "-aes-256-cbc", "-md", "sha256", "-salt", "-pbkdf2", "-iter", "1000"])
            .arg("-pass")
            .arg(pass)
            .arg("-in")
            .arg(&plain)
            .arg("-out")
            .arg(&encrypted)
            .status()
            .unwrap();
        assert!(status.success());
        std::fs::set_permissions(&encrypted, Permissions::from_mode(0o600)).unwrap();

        let digest = DigestAlgorithm::Sha256.hex_digest(b"round-trip-secret");
        let hash = write_file(dir.path(), "mongo.sha256", digest.as_bytes(), 0o600);
        let config = EncryptedCredentialsFileConfig::new(
            CredentialsFileConfig::new("admin", encrypted).with_hash(hash, DigestAlgorithm::Sha256),
            key,
        )
        .with_pbkdf2_iterations(1000);

        let credential = EncryptedCredentialsFileMongoAuthentication::new(config)
            .read_credentials()
            .unwrap();
        assert_eq!(credential.password.as_deref(), Some("round-trip-secret"));
    }
}
