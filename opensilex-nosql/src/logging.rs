//! Logging setup and structured operation logs.
//!
//! `init_logging` is called once by binaries. Library code only emits
//! `tracing` events; MongoDB operations go through [`OperationLogger`] so
//! that every operation reports the same `type`, `status`, `collection` and
//! `duration_ms` fields.

use crate::error::NoSqlError;
use std::fmt::Display;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Operation kinds reported in the `type` field.
pub mod kind {
    /// Transaction run through the service helpers
    pub const TRANSACTION: &str = "transaction";
    /// Index creation
    pub const CREATE_INDEX: &str = "create_index";
    /// Index deletion
    pub const DROP_INDEX: &str = "drop_index";
    /// Startup ping
    pub const CHECK_CONNECTION: &str = "mongo_server_check_connection";
    /// Single insert
    pub const INSERT_ONE: &str = "insert_one";
    /// Batch insert
    pub const INSERT_MANY: &str = "insert_many";
    /// Replacement of an existing document
    pub const UPDATE_ONE: &str = "update_one";
    /// Replacement or insertion
    pub const UPSERT_ONE: &str = "upsert_one";
    /// Single delete
    pub const DELETE_ONE: &str = "delete_one";
    /// Batch delete
    pub const DELETE_MANY: &str = "delete_many";
    /// Document count
    pub const COUNT: &str = "count";
    /// Lookup
    pub const FIND: &str = "find";
}

/// Terminal status of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStatus {
    /// Operation failed
    Error,
    /// Transaction aborted and rolled back
    Rollback,
}

impl FailureStatus {
    /// Value of the `status` field.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Rollback => "ROLLBACK",
        }
    }
}

/// Emits START / OK / ERROR events for MongoDB operations.
#[derive(Debug, Clone, Default)]
pub struct OperationLogger {
    collection: Option<String>,
}

impl OperationLogger {
    /// Logger for operations not tied to a collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logger for operations on `collection`.
    pub fn for_collection(collection: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
        }
    }

    /// Collection reported by this logger.
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Logs the start of an operation and returns its start time.
    pub fn start(&self, kind: &str, detail: impl Display) -> Instant {
        tracing::info!(
            r#type = kind,
            status = "START",
            collection = self.collection(),
            detail = %detail,
        );
        Instant::now()
    }

    /// Logs the successful end of an operation started at `start`.
    pub fn ok(&self, kind: &str, start: Instant, detail: impl Display) {
        tracing::info!(
            r#type = kind,
            status = "OK",
            collection = self.collection(),
            duration_ms = elapsed_ms(start),
            detail = %detail,
        );
    }

    /// Logs a failed or rolled back operation.
    pub fn error(
        &self,
        kind: &str,
        status: FailureStatus,
        error: &dyn Display,
        detail: impl Display,
    ) {
        tracing::error!(
            r#type = kind,
            status = status.as_str(),
            collection = self.collection(),
            detail = %detail,
            error = %error,
        );
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Maps CLI verbosity flags to a log level.
///
/// `quiet` wins over any verbosity; 0 is INFO, 1 is DEBUG, 2+ is TRACE.
pub fn level_for(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    }
}

/// Initializes structured logging based on verbosity level.
///
/// `RUST_LOG` takes precedence over the verbosity flags when set.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
/// * `quiet` - If true, only show ERROR level logs
/// * `json` - Emit one JSON object per event instead of human text
///
/// # Example
/// ```rust,no_run
/// use opensilex_nosql::logging::init_logging;
///
/// // Initialize at DEBUG level
/// init_logging(1, false, false).expect("Failed to initialize logging");
/// ```
///
/// # Errors
/// Returns a configuration error if a global subscriber is already set.
pub fn init_logging(verbose: u8, quiet: bool, json: bool) -> crate::Result<()> {
    let level = level_for(verbose, quiet);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| NoSqlError::configuration(format!("Failed to initialize logging: {e}")))
}
