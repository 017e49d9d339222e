//! Error types with credential sanitization.
//!
//! Error messages carry paths, collection names and index keys for context,
//! but never a password or the decrypted content of a credentials file.

use mongodb::error::{CommandError, ErrorKind, WriteFailure};
use thiserror::Error;

/// MongoDB server error code for `IndexKeySpecsConflict`.
pub const INDEX_KEY_SPECS_CONFLICT: i32 = 86;

/// MongoDB server error code for a duplicate key on a unique index.
pub const DUPLICATE_KEY: i32 = 11000;

/// Main error type for the OpenSILEX NoSQL layer.
///
/// # Security
/// No variant ever embeds secret material. Driver errors are wrapped as-is;
/// the driver itself never echoes credentials.
#[derive(Debug, Error)]
pub enum NoSqlError {
    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A caller supplied an invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The service was used before `startup`
    #[error("MongoDB service is not started")]
    NotStarted,

    /// `startup` was called on a service which already owns a client
    #[error("MongoDB service is already started")]
    AlreadyStarted,

    /// No server could be selected before the configured timeout
    #[error("MongoDB server unreachable after {timeout_ms}ms")]
    ServerUnreachable {
        timeout_ms: u64,
        #[source]
        source: mongodb::error::Error,
    },

    /// An operation did not complete within its time bound
    #[error("{operation} did not complete within {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The server rejected authentication or authorization
    #[error("MongoDB server rejected the credentials or the command")]
    Unauthorized {
        #[source]
        source: mongodb::error::Error,
    },

    /// Permission, integrity or decryption failure on secret material
    #[error("Security violation: {context}")]
    Security { context: String },

    /// Index creation or deletion failed
    #[error("Index operation failed on collection '{collection}' for keys {keys}")]
    Index {
        collection: String,
        keys: String,
        #[source]
        source: mongodb::error::Error,
    },

    /// No model with this URI exists in the collection
    #[error("Unknown URI: {uri}")]
    InvalidUri { uri: String },

    /// A model with this URI already exists in the collection
    #[error("URI already exists: {uri}")]
    AlreadyExistingUri { uri: String },

    /// A write was rejected by a unique index
    #[error("Unique index constraint violated")]
    UniqueIndexViolation {
        #[source]
        source: mongodb::error::Error,
    },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Any other driver error, passed through unchanged
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
}

/// Convenience type alias for Results with NoSqlError
pub type Result<T> = std::result::Result<T, NoSqlError>;

impl NoSqlError {
    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a security error
    pub fn security(context: impl Into<String>) -> Self {
        Self::Security {
            context: context.into(),
        }
    }

    /// Creates a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Classifies a driver error raised while reaching the server.
    ///
    /// Server selection failures become [`NoSqlError::ServerUnreachable`],
    /// authentication failures and `Unauthorized` (13) command errors become
    /// [`NoSqlError::Unauthorized`]; everything else is passed through.
    pub fn from_connection_error(error: mongodb::error::Error, timeout_ms: u64) -> Self {
        match error.kind.as_ref() {
            ErrorKind::ServerSelection { .. } => Self::ServerUnreachable {
                timeout_ms,
                source: error,
            },
            ErrorKind::Authentication { .. } => Self::Unauthorized { source: error },
            ErrorKind::Command(CommandError { code: 13, .. }) => {
                Self::Unauthorized { source: error }
            }
            _ => Self::Mongo(error),
        }
    }

    /// Returns the underlying driver error, if this error wraps one.
    pub fn driver_error(&self) -> Option<&mongodb::error::Error> {
        match self {
            Self::ServerUnreachable { source, .. }
            | Self::Unauthorized { source }
            | Self::Index { source, .. }
            | Self::UniqueIndexViolation { source }
            | Self::Mongo(source) => Some(source),
            _ => None,
        }
    }
}

/// Extracts the server error code of a command or single write error.
pub fn server_error_code(error: &mongodb::error::Error) -> Option<i32> {
    match error.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        ErrorKind::InsertMany(insert_many) => insert_many
            .write_errors
            .as_ref()
            .and_then(|errors| errors.first())
            .map(|first| first.code),
        _ => None,
    }
}

/// Returns `true` if the driver error is a duplicate key violation.
pub fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    server_error_code(error) == Some(DUPLICATE_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = NoSqlError::configuration("host cannot be empty");
        assert!(error.to_string().contains("host cannot be empty"));

        let error = NoSqlError::invalid_argument("Null or empty password");
        assert_eq!(
            error.to_string(),
            "Invalid argument: Null or empty password"
        );

        let error = NoSqlError::security("hash mismatch for /etc/mongo.pass");
        assert!(error.to_string().starts_with("Security violation"));
    }

    #[test]
    fn test_custom_driver_errors_pass_through() {
        let driver = mongodb::error::Error::custom("aborted by caller");
        let error = NoSqlError::from_connection_error(driver, 100);
        assert!(matches!(error, NoSqlError::Mongo(_)));
        assert_eq!(server_error_code(error.driver_error().unwrap()), None);
        assert!(!is_duplicate_key(error.driver_error().unwrap()));
    }

    #[test]
    fn test_non_driver_errors_have_no_source() {
        assert!(NoSqlError::NotStarted.driver_error().is_none());
        assert!(
            NoSqlError::InvalidUri {
                uri: "http://opensilex.test/id/1".to_string()
            }
            .driver_error()
            .is_none()
        );
    }
}
