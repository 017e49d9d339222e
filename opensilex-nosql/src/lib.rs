//! MongoDB service layer for OpenSILEX.
//!
//! This crate owns the MongoDB client of an OpenSILEX instance: it reads the
//! database credentials, checks the connection, creates the indexes declared
//! by DAOs, and provides sessions and transactions to them.
//!
//! # Security Guarantees
//! - Passwords are only held in zeroizing buffers and wiped after a single use
//! - Credentials, hash and key files must be owned by the current user with
//!   no group or other permission, checked before any read
//! - An integrity mismatch never yields a credential
//! - No error or log message contains a password
//!
//! # Architecture
//! - `config`: TOML configuration and host context
//! - `auth`: credential strategies producing SCRAM-SHA-256 credentials
//! - `service`: client lifecycle, indexes, sessions and transactions
//! - `dao`: generic read/write access over URI-identified models
//! - `logging`: subscriber setup and structured operation logs

pub mod auth;
pub mod config;
pub mod dao;
pub mod error;
pub mod logging;
pub mod security;
pub mod service;

// Re-export commonly used types
pub use auth::{MongoAuthentication, MongoAuthenticationService};
pub use config::{AuthenticationConfig, MongoDbConfig, RunMode, ServiceContext};
pub use dao::{MongoModel, MongoReadWriteDao};
pub use error::{NoSqlError, Result};
pub use service::{IndexDefinition, IndexRegistry, MongoDbService, TransactionFailure};
