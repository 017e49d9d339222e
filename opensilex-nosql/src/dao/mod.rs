//! Generic data access over collections of URI-identified models.
//!
//! # Module Structure
//! - `read_write`: [`MongoReadWriteDao`], CRUD operations with optional sessions

mod read_write;

pub use read_write::MongoReadWriteDao;

use crate::error::NoSqlError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

/// Document field holding the model URI.
pub const URI_FIELD: &str = "uri";

/// Model stored by a [`MongoReadWriteDao`].
///
/// The model's URI is serialized in the [`URI_FIELD`] field and is unique
/// within its collection.
pub trait MongoModel: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// URI of the model, if already assigned.
    fn uri(&self) -> Option<&Url>;

    /// Assigns the model URI.
    fn set_uri(&mut self, uri: Url);

    /// Mints a URI under `prefix`.
    ///
    /// `attempt` counts the previous URIs rejected because they already
    /// existed; deterministic generators use it to derive another candidate.
    /// The default appends a random UUID and ignores it.
    ///
    /// # Errors
    /// Returns an invalid argument error if the URI cannot be built.
    fn generate_uri(&self, prefix: &Url, attempt: u32) -> crate::Result<Url> {
        let _ = attempt;
        child_uri(prefix, &uuid::Uuid::new_v4().to_string())
    }
}

/// Appends one path segment to `base`, whether or not it ends with `/`.
///
/// # Errors
/// Returns an invalid argument error if the result is not a valid URL.
pub fn child_uri(base: &Url, segment: &str) -> crate::Result<Url> {
    let raw = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        segment.trim_matches('/')
    );
    Url::parse(&raw).map_err(|e| NoSqlError::invalid_argument(format!("invalid URI '{raw}': {e}")))
}
