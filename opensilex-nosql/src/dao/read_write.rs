use super::{MongoModel, URI_FIELD, child_uri};
use crate::error::{NoSqlError, is_duplicate_key};
use crate::logging::{FailureStatus, OperationLogger, kind};
use crate::service::{IndexDefinition, MongoDbService};
use futures::{FutureExt, TryStreamExt};
use mongodb::bson::{Document, doc};
use mongodb::{ClientSession, Collection};
use url::Url;

/// Read/write access to one collection of `T`.
///
/// Every operation accepts an optional session; without one, operations
/// touching several documents run in a service transaction.
pub struct MongoReadWriteDao<'a, T: MongoModel> {
    service: &'a MongoDbService,
    collection: Collection<T>,
    create_prefix: Url,
    check_uri_generation: bool,
    check_uri_existence: bool,
    logger: OperationLogger,
}

impl<T: MongoModel> std::fmt::Debug for MongoReadWriteDao<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoReadWriteDao")
            .field("collection", &self.collection.name())
            .field("create_prefix", &self.create_prefix.as_str())
            .field("check_uri_generation", &self.check_uri_generation)
            .field("check_uri_existence", &self.check_uri_existence)
            .finish()
    }
}

impl<'a, T: MongoModel> MongoReadWriteDao<'a, T> {
    /// Creates a DAO over `collection`; new URIs are minted under the
    /// service generation prefix followed by `uri_path`.
    ///
    /// URI generation is checked on batch inserts, URI existence is not.
    ///
    /// # Errors
    /// Returns `NotStarted` before startup, or an invalid argument error for
    /// an empty collection name or an unusable `uri_path`.
    pub fn new(service: &'a MongoDbService, collection: &str, uri_path: &str) -> crate::Result<Self> {
        if collection.trim().is_empty() {
            return Err(NoSqlError::invalid_argument("collection name cannot be empty"));
        }

        let prefix = service.generation_prefix_uri()?;
        let create_prefix = if uri_path.is_empty() {
            prefix.clone()
        } else {
            child_uri(prefix, uri_path)?
        };

        Ok(Self {
            service,
            collection: service.database()?.collection::<T>(collection),
            create_prefix,
            check_uri_generation: true,
            check_uri_existence: false,
            logger: OperationLogger::for_collection(collection),
        })
    }

    /// Builder method to toggle URI generation on batch inserts.
    pub fn with_uri_generation_check(mut self, check: bool) -> Self {
        self.check_uri_generation = check;
        self
    }

    /// Builder method to query the collection for existing URIs on insert.
    pub fn with_uri_existence_check(mut self, check: bool) -> Self {
        self.check_uri_existence = check;
        self
    }

    /// Prefix under which new URIs are minted.
    pub fn create_prefix(&self) -> &Url {
        &self.create_prefix
    }

    /// Underlying driver collection.
    pub fn collection(&self) -> &Collection<T> {
        &self.collection
    }

    /// Indexes this DAO relies on: a unique index on the URI.
    pub fn index_definitions() -> Vec<IndexDefinition> {
        vec![IndexDefinition::unique(doc! { URI_FIELD: 1 })]
    }

    fn id_filter(uri: &Url) -> Document {
        doc! { URI_FIELD: uri.as_str() }
    }

    /// Fetches the model with this URI.
    ///
    /// # Errors
    /// Returns `InvalidUri` if absent, or the driver error.
    pub async fn get(&self, session: Option<&mut ClientSession>, uri: &Url) -> crate::Result<T> {
        let action = self.collection.find_one(Self::id_filter(uri));
        let found = match session {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };

        found.ok_or_else(|| NoSqlError::InvalidUri {
            uri: uri.to_string(),
        })
    }

    /// Whether a model with this URI exists; only `_id` is fetched.
    ///
    /// # Errors
    /// Returns the driver error.
    pub async fn exists(&self, session: Option<&mut ClientSession>, uri: &Url) -> crate::Result<bool> {
        let ids = self.collection.clone_with_type::<Document>();
        let action = ids
            .find_one(Self::id_filter(uri))
            .projection(doc! { "_id": 1 });
        let found = match session {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };
        Ok(found.is_some())
    }

    /// Fetches at most `limit` models among `uris`.
    ///
    /// # Errors
    /// Returns an invalid argument error if `limit` is 0, or the driver error.
    pub async fn find_by_uris(&self, uris: &[Url], limit: usize) -> crate::Result<Vec<T>> {
        if limit == 0 {
            return Err(NoSqlError::invalid_argument("limit must be strictly positive"));
        }

        let candidates: Vec<&str> = uris.iter().take(limit).map(Url::as_str).collect();
        let start = self
            .logger
            .start(kind::FIND, format_args!("uris={}", candidates.len()));

        let cursor = self
            .collection
            .find(doc! { URI_FIELD: { "$in": candidates } })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await?;
        let models: Vec<T> = cursor.try_collect().await?;

        self.logger
            .ok(kind::FIND, start, format_args!("count={}", models.len()));
        Ok(models)
    }

    /// Assigns a URI to `model` if it has none, or validates its URI.
    async fn ensure_uri(&self, mut session: Option<&mut ClientSession>, model: &mut T) -> crate::Result<()> {
        if let Some(uri) = model.uri() {
            if self.check_uri_existence && self.exists(session, uri).await? {
                return Err(NoSqlError::AlreadyExistingUri {
                    uri: uri.to_string(),
                });
            }
            return Ok(());
        }

        let mut attempt = 0_u32;
        let mut uri = model.generate_uri(&self.create_prefix, attempt)?;
        while self.check_uri_existence && self.exists(session.as_deref_mut(), &uri).await? {
            attempt = attempt.saturating_add(1);
            uri = model.generate_uri(&self.create_prefix, attempt)?;
        }
        model.set_uri(uri);
        Ok(())
    }

    fn unique_violation(&self, kind: &str, error: mongodb::error::Error, detail: &str) -> NoSqlError {
        let error = if is_duplicate_key(&error) {
            NoSqlError::UniqueIndexViolation { source: error }
        } else {
            NoSqlError::Mongo(error)
        };
        self.logger.error(kind, FailureStatus::Error, &error, detail);
        error
    }

    /// Inserts `model`, assigning it a URI first if needed.
    ///
    /// Returns the model URI.
    ///
    /// # Errors
    /// Returns `AlreadyExistingUri` when existence checking is on and the
    /// URI is taken, `UniqueIndexViolation` on a duplicate key, or the driver
    /// error.
    pub async fn create(&self, mut session: Option<&mut ClientSession>, model: &mut T) -> crate::Result<Url> {
        let start = self.logger.start(kind::INSERT_ONE, "");
        self.ensure_uri(session.as_deref_mut(), model).await?;

        let uri = model
            .uri()
            .cloned()
            .ok_or_else(|| NoSqlError::invalid_argument("model URI was not assigned"))?;
        let detail = format!("uri={uri}");

        let action = self.collection.insert_one(&*model);
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        };

        match result {
            Ok(_) => {
                self.logger.ok(kind::INSERT_ONE, start, &detail);
                Ok(uri)
            }
            Err(error) => Err(self.unique_violation(kind::INSERT_ONE, error, &detail)),
        }
    }

    /// Inserts a batch of models.
    ///
    /// Without a session the batch is inserted in a transaction. Returns the
    /// number of inserted documents.
    ///
    /// # Errors
    /// Returns an invalid argument error for an empty batch, and the same
    /// errors as [`MongoReadWriteDao::create`].
    pub async fn create_many(
        &self,
        mut session: Option<&mut ClientSession>,
        models: &mut [T],
    ) -> crate::Result<usize> {
        if models.is_empty() {
            return Err(NoSqlError::invalid_argument(
                "models list can't be empty",
            ));
        }

        let start = self
            .logger
            .start(kind::INSERT_MANY, format_args!("count={}", models.len()));

        if self.check_uri_generation {
            for model in models.iter_mut() {
                self.ensure_uri(session.as_deref_mut(), model).await?;
            }
        }

        let result = match session {
            Some(session) => self
                .collection
                .insert_many(models.iter())
                .session(session)
                .await
                .map_err(NoSqlError::from),
            None => {
                let collection = self.collection.clone();
                let batch = models.to_vec();
                self.service
                    .compute_transaction(move |session| {
                        let collection = collection.clone();
                        let batch = batch.clone();
                        async move { collection.insert_many(batch).session(session).await }.boxed()
                    })
                    .await
            }
        };

        match result {
            Ok(inserted) => {
                let count = inserted.inserted_ids.len();
                self.logger
                    .ok(kind::INSERT_MANY, start, format_args!("count={count}"));
                Ok(count)
            }
            Err(NoSqlError::Mongo(error)) => {
                Err(self.unique_violation(kind::INSERT_MANY, error, ""))
            }
            Err(error) => {
                self.logger
                    .error(kind::INSERT_MANY, FailureStatus::Error, &error, "");
                Err(error)
            }
        }
    }

    fn model_uri(model: &T) -> crate::Result<&Url> {
        model
            .uri()
            .ok_or_else(|| NoSqlError::invalid_argument("model has no URI"))
    }

    /// Replaces the stored model having the same URI.
    ///
    /// # Errors
    /// Returns an invalid argument error if `model` has no URI, `InvalidUri`
    /// if no document matched, or the driver error.
    pub async fn update(&self, session: Option<&mut ClientSession>, model: &T) -> crate::Result<()> {
        let uri = Self::model_uri(model)?;
        let detail = format!("uri={uri}");
        let start = self.logger.start(kind::UPDATE_ONE, &detail);

        let action = self.collection.replace_one(Self::id_filter(uri), model);
        let result = match session {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };

        if result.matched_count == 0 {
            let error = NoSqlError::InvalidUri {
                uri: uri.to_string(),
            };
            self.logger
                .error(kind::UPDATE_ONE, FailureStatus::Error, &error, &detail);
            return Err(error);
        }

        self.logger.ok(kind::UPDATE_ONE, start, &detail);
        Ok(())
    }

    /// Replaces the stored model having the same URI, or inserts it.
    ///
    /// # Errors
    /// Returns an invalid argument error if `model` has no URI, or the driver
    /// error.
    pub async fn upsert(&self, session: Option<&mut ClientSession>, model: &T) -> crate::Result<()> {
        let uri = Self::model_uri(model)?;
        let detail = format!("uri={uri}");
        let start = self.logger.start(kind::UPSERT_ONE, &detail);

        let action = self
            .collection
            .replace_one(Self::id_filter(uri), model)
            .upsert(true);
        match session {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };

        self.logger.ok(kind::UPSERT_ONE, start, &detail);
        Ok(())
    }

    /// Deletes the model with this URI.
    ///
    /// # Errors
    /// Returns `InvalidUri` if nothing was deleted, or the driver error.
    pub async fn delete(&self, session: Option<&mut ClientSession>, uri: &Url) -> crate::Result<()> {
        let detail = format!("uri={uri}");
        let start = self.logger.start(kind::DELETE_ONE, &detail);

        let action = self.collection.delete_one(Self::id_filter(uri));
        let result = match session {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };

        if result.deleted_count == 0 {
            let error = NoSqlError::InvalidUri {
                uri: uri.to_string(),
            };
            self.logger
                .error(kind::DELETE_ONE, FailureStatus::Error, &error, &detail);
            return Err(error);
        }

        self.logger.ok(kind::DELETE_ONE, start, &detail);
        Ok(())
    }

    /// Deletes the models with these URIs and returns the deleted count.
    ///
    /// Without a session the deletion runs in a transaction.
    ///
    /// # Errors
    /// Returns an invalid argument error for an empty list, or the driver
    /// error.
    pub async fn delete_many(&self, session: Option<&mut ClientSession>, uris: &[Url]) -> crate::Result<u64> {
        if uris.is_empty() {
            return Err(NoSqlError::invalid_argument("uris list must not be empty"));
        }

        let filter = doc! { URI_FIELD: { "$in": uris.iter().map(Url::as_str).collect::<Vec<_>>() } };
        let detail = format!("count={}", uris.len());
        let start = self.logger.start(kind::DELETE_MANY, &detail);

        let result = match session {
            Some(session) => self.collection.delete_many(filter).session(session).await?,
            None => {
                let collection = self.collection.clone();
                self.service
                    .compute_transaction(move |session| {
                        let collection = collection.clone();
                        let filter = filter.clone();
                        async move { collection.delete_many(filter).session(session).await }.boxed()
                    })
                    .await?
            }
        };

        self.logger.ok(
            kind::DELETE_MANY,
            start,
            format_args!("deleted={}", result.deleted_count),
        );
        Ok(result.deleted_count)
    }

    /// Counts the documents matching `filter`, bounded by the read timeout.
    ///
    /// # Errors
    /// Returns the driver error.
    pub async fn count(&self, session: Option<&mut ClientSession>, filter: Document) -> crate::Result<u64> {
        let detail = filter.to_string();
        let start = self.logger.start(kind::COUNT, &detail);

        let action = self
            .collection
            .count_documents(filter)
            .max_time(self.service.config().read_timeout());
        let count = match session {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };

        self.logger
            .ok(kind::COUNT, start, format_args!("{detail} count={count}"));
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MongoDbConfig, RunMode, ServiceContext};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Germplasm {
        uri: Option<Url>,
        name: String,
    }

    impl MongoModel for Germplasm {
        fn uri(&self) -> Option<&Url> {
            self.uri.as_ref()
        }

        fn set_uri(&mut self, uri: Url) {
            self.uri = Some(uri);
        }
    }

    async fn started_service() -> MongoDbService {
        let context = ServiceContext::new(Url::parse("http://opensilex.test/id/").unwrap())
            .with_run_mode(RunMode::Test);
        let config = MongoDbConfig::new("127.0.0.1".to_string())
            .with_port(1)
            .with_server_selection_timeout_ms(100);
        let mut service = MongoDbService::new(config, context).unwrap();
        service.startup().await.unwrap();
        service
    }

    #[tokio::test]
    async fn test_dao_requires_started_service() {
        let context = ServiceContext::new(Url::parse("http://opensilex.test/id/").unwrap());
        let service = MongoDbService::new(MongoDbConfig::default(), context).unwrap();
        assert!(matches!(
            MongoReadWriteDao::<Germplasm>::new(&service, "germplasm", "germplasm"),
            Err(NoSqlError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_create_prefix_and_indexes() {
        let mut service = started_service().await;
        {
            let dao = MongoReadWriteDao::<Germplasm>::new(&service, "germplasm", "germplasm").unwrap();
            assert_eq!(dao.create_prefix().as_str(), "http://opensilex.test/id/germplasm");
            assert_eq!(dao.collection().name(), "germplasm");

            let root = MongoReadWriteDao::<Germplasm>::new(&service, "germplasm", "").unwrap();
            assert_eq!(root.create_prefix().as_str(), "http://opensilex.test/id/");
        }

        let indexes = MongoReadWriteDao::<Germplasm>::index_definitions();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].keys, doc! { "uri": 1 });
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_requests_fail_without_server() {
        let mut service = started_service().await;
        {
            let dao = MongoReadWriteDao::<Germplasm>::new(&service, "germplasm", "germplasm").unwrap();
            let uri = Url::parse("http://opensilex.test/id/germplasm/lancelot").unwrap();

            assert!(dao.exists(None, &uri).await.is_err());
            assert!(dao.delete_many(None, &[uri]).await.is_err());
        }
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_arguments_rejected_before_any_request() {
        let mut service = started_service().await;
        {
            assert!(matches!(
                MongoReadWriteDao::<Germplasm>::new(&service, " ", "germplasm"),
                Err(NoSqlError::InvalidArgument { .. })
            ));

            let dao = MongoReadWriteDao::<Germplasm>::new(&service, "germplasm", "germplasm").unwrap();
            assert!(matches!(
                dao.create_many(None, &mut []).await,
                Err(NoSqlError::InvalidArgument { .. })
            ));
            assert!(matches!(
                dao.find_by_uris(&[], 0).await,
                Err(NoSqlError::InvalidArgument { .. })
            ));
            assert!(matches!(
                dao.delete_many(None, &[]).await,
                Err(NoSqlError::InvalidArgument { .. })
            ));

            let orphan = Germplasm {
                uri: None,
                name: "Lancelot".to_string(),
            };
            assert!(matches!(
                dao.update(None, &orphan).await,
                Err(NoSqlError::InvalidArgument { .. })
            ));
            assert!(matches!(
                dao.upsert(None, &orphan).await,
                Err(NoSqlError::InvalidArgument { .. })
            ));
        }
        service.shutdown().await;
    }
}
