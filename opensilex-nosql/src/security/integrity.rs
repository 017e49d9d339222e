//! Digest based integrity checks of credentials.
//!
//! A hash file holds the hex digest of the expected password as its first
//! whitespace-separated token, e.g. the output of `sha256sum`.

use crate::error::NoSqlError;
use crate::security::check_restrictive_permissions;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::path::Path;
use subtle::ConstantTimeEq;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-1, kept for hash files produced by older tooling
    Sha1,
    /// SHA-256
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
    /// MD5, kept for hash files produced by older tooling
    Md5,
}

impl DigestAlgorithm {
    /// All supported algorithms.
    pub const ALL: [Self; 5] = [
        Self::Sha1,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
        Self::Md5,
    ];

    /// Computes the raw digest of `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => sha1::Sha1::digest(data).to_vec(),
            Self::Sha256 => sha2::Sha256::digest(data).to_vec(),
            Self::Sha384 => sha2::Sha384::digest(data).to_vec(),
            Self::Sha512 => sha2::Sha512::digest(data).to_vec(),
            Self::Md5 => md5::Md5::digest(data).to_vec(),
        }
    }

    /// Computes the lowercase hex digest of `data`.
    pub fn hex_digest(self, data: &[u8]) -> String {
        hex::encode(self.digest(data))
    }

    /// Canonical lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
            Self::Md5 => "md5",
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = NoSqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "");
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == normalized)
            .ok_or_else(|| {
                NoSqlError::invalid_argument(format!("unsupported digest algorithm '{s}'"))
            })
    }
}

/// Checks `password` against the digest stored in `hash_path`.
///
/// The hash file goes through the same permission check as the password
/// file. The comparison is constant-time.
///
/// # Errors
/// Returns a security error if the hash file is not restricted, cannot be
/// parsed, or does not match; an I/O error if it cannot be read.
pub fn verify_integrity(
    password: &[u8],
    hash_path: &Path,
    algorithm: DigestAlgorithm,
) -> crate::Result<()> {
    check_restrictive_permissions(hash_path)?;

    let content = std::fs::read_to_string(hash_path)
        .map_err(|e| NoSqlError::io(format!("reading hash file {}", hash_path.display()), e))?;

    let expected_hex = content.split_whitespace().next().ok_or_else(|| {
        NoSqlError::security(format!("hash file {} is empty", hash_path.display()))
    })?;

    let expected = hex::decode(expected_hex).map_err(|_| {
        NoSqlError::security(format!(
            "hash file {} does not contain a hex digest",
            hash_path.display()
        ))
    })?;

    let actual = algorithm.digest(password);
    if bool::from(actual.ct_eq(&expected)) {
        Ok(())
    } else {
        Err(NoSqlError::security(format!(
            "{algorithm} digest of credentials does not match {}",
            hash_path.display()
        )))
    }
}
