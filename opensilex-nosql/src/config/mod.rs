//! Configuration types for the MongoDB service.
//!
//! This module contains all configuration structures used by the service:
//! - `MongoDbConfig`: server address, database and timeouts
//! - `AuthenticationConfig`: which credential strategy to use and its inputs
//! - `ServiceContext`: run mode and URI generation prefix supplied by the host
//!
//! # Security
//! Only the plain password strategy keeps a secret inside the configuration,
//! and it is held in a `Zeroizing` buffer. `Display` and `Debug` never print it.

mod authentication;
mod connection;
mod context;

pub use crate::security::DigestAlgorithm;
pub use authentication::{
    AuthenticationConfig, CredentialsFileConfig, EncryptedCredentialsFileConfig,
    PasswordAuthConfig,
};
pub use connection::MongoDbConfig;
pub use context::{RunMode, ServiceContext};
