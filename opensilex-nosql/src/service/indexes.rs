//! Index registration and creation.
//!
//! Indexes are registered per collection before startup and created once
//! the connection check succeeds. Registration is keyed by the index keys:
//! registering the same keys twice keeps the first definition.

use super::MongoDbService;
use crate::error::{INDEX_KEY_SPECS_CONFLICT, NoSqlError, server_error_code};
use crate::logging::{FailureStatus, OperationLogger, kind};
use futures::TryStreamExt;
use mongodb::IndexModel;
use mongodb::bson::Document;
use mongodb::options::IndexOptions;
use std::collections::BTreeMap;

/// Keys and options of one index.
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    /// Index keys, e.g. `{ "uri": 1 }`
    pub keys: Document,
    /// Options; `None` means a background index with server defaults
    pub options: Option<IndexOptions>,
}

impl IndexDefinition {
    /// Index with default options.
    pub fn new(keys: Document) -> Self {
        Self {
            keys,
            options: None,
        }
    }

    /// Index with explicit options.
    pub fn with_options(keys: Document, options: IndexOptions) -> Self {
        Self {
            keys,
            options: Some(options),
        }
    }

    /// Unique index on `keys`.
    pub fn unique(keys: Document) -> Self {
        Self::with_options(keys, IndexOptions::builder().unique(true).build())
    }
}

/// Whether two index key documents are the same, field order included.
///
/// `Document` equality ignores order, while `{ a: 1, b: 1 }` and
/// `{ b: 1, a: 1 }` are different indexes.
fn same_keys(left: &Document, right: &Document) -> bool {
    left.len() == right.len() && left.iter().eq(right.iter())
}

/// Options used when an index is created without explicit options.
///
/// Servers since 4.2 ignore `background` and always build with an optimized
/// process; the flag is still sent for older deployments.
#[allow(deprecated)]
fn default_index_options() -> IndexOptions {
    IndexOptions::builder().background(true).build()
}

/// Indexes to create, grouped by collection.
#[derive(Debug, Clone, Default)]
pub struct IndexRegistry {
    collections: BTreeMap<String, Vec<IndexDefinition>>,
}

impl IndexRegistry {
    /// Registers `indexes` on `collection`, skipping keys already registered.
    ///
    /// Returns the number of new entries.
    ///
    /// # Errors
    /// Returns an invalid argument error if `collection` is empty.
    pub fn register(
        &mut self,
        collection: &str,
        indexes: impl IntoIterator<Item = IndexDefinition>,
    ) -> crate::Result<usize> {
        if collection.trim().is_empty() {
            return Err(NoSqlError::invalid_argument(
                "index collection name cannot be empty",
            ));
        }

        let entries = self.collections.entry(collection.to_string()).or_default();
        let mut added = 0_usize;
        for index in indexes {
            if !entries.iter().any(|existing| same_keys(&existing.keys, &index.keys)) {
                entries.push(index);
                added = added.saturating_add(1);
            }
        }
        Ok(added)
    }

    /// Registered indexes of `collection`.
    pub fn get(&self, collection: &str) -> &[IndexDefinition] {
        self.collections
            .get(collection)
            .map_or(&[][..], Vec::as_slice)
    }

    /// Iterates over collections and their indexes, ordered by collection.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[IndexDefinition])> {
        self.collections
            .iter()
            .map(|(collection, indexes)| (collection.as_str(), indexes.as_slice()))
    }

    /// Total number of registered indexes.
    pub fn len(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    /// Whether no index is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MongoDbService {
    /// Registers indexes to be created at startup.
    ///
    /// # Errors
    /// Returns an invalid argument error if `collection` is empty.
    pub fn register_indexes(
        &mut self,
        collection: &str,
        indexes: impl IntoIterator<Item = IndexDefinition>,
    ) -> crate::Result<()> {
        let added = self.indexes.register(collection, indexes)?;
        tracing::debug!(collection, added, "Indexes registered");
        Ok(())
    }

    /// Read-only view of the registered indexes.
    pub fn index_register(&self) -> &IndexRegistry {
        &self.indexes
    }

    /// Creates every registered index; the first failure aborts.
    ///
    /// # Errors
    /// Returns `NotStarted` before startup, or the first index error.
    pub async fn create_indexes(&self) -> crate::Result<()> {
        for (collection, indexes) in self.indexes.iter() {
            for index in indexes {
                self.create_index(collection, index.keys.clone(), index.options.clone())
                    .await?;
            }
        }
        tracing::info!(count = self.indexes.len(), "MongoDB indexes ready");
        Ok(())
    }

    /// Creates one index.
    ///
    /// Options default to a background build. An `IndexKeySpecsConflict`
    /// answer means the index already exists and counts as success.
    ///
    /// # Errors
    /// Returns `NotStarted` before startup, or an index error carrying the
    /// collection, the keys and the driver error.
    pub async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: Option<IndexOptions>,
    ) -> crate::Result<()> {
        let database = self.database()?;
        let options = options.unwrap_or_else(default_index_options);
        let model = IndexModel::builder()
            .keys(keys.clone())
            .options(options)
            .build();

        let logger = OperationLogger::for_collection(collection);
        let start = logger.start(kind::CREATE_INDEX, &keys);

        match database
            .collection::<Document>(collection)
            .create_index(model)
            .await
        {
            Ok(_) => {
                logger.ok(kind::CREATE_INDEX, start, &keys);
                Ok(())
            }
            Err(error) if server_error_code(&error) == Some(INDEX_KEY_SPECS_CONFLICT) => {
                tracing::debug!(collection, index = %keys, "Index already exists");
                logger.ok(kind::CREATE_INDEX, start, &keys);
                Ok(())
            }
            Err(error) => {
                logger.error(kind::CREATE_INDEX, FailureStatus::Error, &error, &keys);
                Err(NoSqlError::Index {
                    collection: collection.to_string(),
                    keys: keys.to_string(),
                    source: error,
                })
            }
        }
    }

    /// Drops the index built on `keys`.
    ///
    /// # Errors
    /// Returns `NotStarted` before startup, an invalid argument error if no
    /// index has these keys, or an index error from the server.
    pub async fn drop_index(&self, collection: &str, keys: &Document) -> crate::Result<()> {
        let database = self.database()?;
        let handle = database.collection::<Document>(collection);
        let logger = OperationLogger::for_collection(collection);
        let start = logger.start(kind::DROP_INDEX, keys);

        let index_error = |source: mongodb::error::Error| NoSqlError::Index {
            collection: collection.to_string(),
            keys: keys.to_string(),
            source,
        };

        let existing: Vec<IndexModel> = handle
            .list_indexes()
            .await
            .map_err(index_error)?
            .try_collect()
            .await
            .map_err(index_error)?;

        let Some(name) = existing
            .into_iter()
            .find(|index| same_keys(&index.keys, keys))
            .and_then(|index| index.options.and_then(|options| options.name))
        else {
            let error = NoSqlError::invalid_argument(format!(
                "no index with keys {keys} on collection '{collection}'"
            ));
            logger.error(kind::DROP_INDEX, FailureStatus::Error, &error, keys);
            return Err(error);
        };

        match handle.drop_index(name).await {
            Ok(()) => {
                logger.ok(kind::DROP_INDEX, start, keys);
                Ok(())
            }
            Err(error) => {
                logger.error(kind::DROP_INDEX, FailureStatus::Error, &error, keys);
                Err(index_error(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use proptest::prelude::*;

    #[test]
    fn test_register_rejects_empty_collection() {
        let mut registry = IndexRegistry::default();
        let error = registry
            .register("", [IndexDefinition::new(doc! { "uri": 1 })])
            .unwrap_err();
        assert!(matches!(error, NoSqlError::InvalidArgument { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_keeps_first_definition() {
        let mut registry = IndexRegistry::default();
        registry
            .register("variable", [IndexDefinition::unique(doc! { "uri": 1 })])
            .unwrap();
        let added = registry
            .register("variable", [IndexDefinition::new(doc! { "uri": 1 })])
            .unwrap();

        assert_eq!(added, 0);
        let indexes = registry.get("variable");
        assert_eq!(indexes.len(), 1);
        assert_eq!(
            indexes[0].options.as_ref().and_then(|options| options.unique),
            Some(true)
        );
    }

    #[test]
    fn test_register_distinguishes_key_order_and_direction() {
        let mut registry = IndexRegistry::default();
        registry
            .register(
                "data",
                [
                    IndexDefinition::new(doc! { "target": 1, "date": -1 }),
                    IndexDefinition::new(doc! { "date": -1, "target": 1 }),
                    IndexDefinition::new(doc! { "target": -1, "date": -1 }),
                ],
            )
            .unwrap();
        assert_eq!(registry.get("data").len(), 3);
        assert!(registry.get("unknown").is_empty());
    }

    #[test]
    #[allow(deprecated)]
    fn test_default_index_options_request_background_build() {
        let options = default_index_options();
        assert_eq!(options.background, Some(true));
        assert_eq!(options.unique, None);
    }

    #[test]
    fn test_same_keys_respects_field_order() {
        let target_first = doc! { "target": 1, "date": -1 };
        assert!(same_keys(&target_first, &doc! { "target": 1, "date": -1 }));
        assert!(!same_keys(&target_first, &doc! { "date": -1, "target": 1 }));
        assert!(!same_keys(&target_first, &doc! { "target": 1 }));
        assert!(!same_keys(&target_first, &doc! { "target": 1, "date": 1 }));
    }

    fn keys_strategy() -> impl Strategy<Value = Document> {
        proptest::collection::vec(("[a-z]{1,8}", prop_oneof![Just(1_i32), Just(-1_i32)]), 1..4)
            .prop_map(|fields| {
                let mut keys = Document::new();
                for (field, direction) in fields {
                    keys.insert(field, direction);
                }
                keys
            })
    }

    proptest! {
        #[test]
        fn prop_registration_is_idempotent(
            collection in "[a-z_]{1,16}",
            keys in proptest::collection::vec(keys_strategy(), 1..8),
        ) {
            let mut once = IndexRegistry::default();
            once.register(&collection, keys.iter().cloned().map(IndexDefinition::new)).unwrap();

            let mut twice = once.clone();
            let added = twice
                .register(&collection, keys.iter().cloned().map(IndexDefinition::new))
                .unwrap();

            prop_assert_eq!(added, 0);
            let stored_once = once.get(&collection);
            let stored_twice = twice.get(&collection);
            prop_assert_eq!(stored_once.len(), stored_twice.len());
            for (first, second) in stored_once.iter().zip(stored_twice) {
                prop_assert!(same_keys(&first.keys, &second.keys));
            }
            prop_assert_eq!(once.len(), twice.len());
        }
    }
}
