//! Sessions and transaction helpers.
//!
//! Every helper opens its own session, which is closed when the helper
//! returns, on success and on failure. Transactions go through the driver's
//! `and_run`, which retries on `TransientTransactionError` and
//! `UnknownTransactionCommitResult`.
//!
//! The throwing helpers accept operations failing with a caller error type.
//! Driver errors carried by that type are handed back to the driver so its
//! retry policy still applies; any other error aborts the transaction and is
//! returned to the caller unchanged.

use super::MongoDbService;
use crate::error::NoSqlError;
use crate::logging::{FailureStatus, OperationLogger, kind};
use futures::FutureExt;
use futures::future::BoxFuture;
use mongodb::ClientSession;

/// Error type usable with the throwing transaction helpers.
pub trait TransactionFailure: From<NoSqlError> + std::fmt::Display + Send + 'static {
    /// Gives back the driver error carried by this failure, if any.
    ///
    /// # Errors
    /// Returns `self` unchanged when it does not carry a driver error.
    fn into_driver_error(self) -> Result<mongodb::error::Error, Self>;
}

impl TransactionFailure for NoSqlError {
    fn into_driver_error(self) -> Result<mongodb::error::Error, Self> {
        match self {
            Self::Mongo(error) => Ok(error),
            other => Err(other),
        }
    }
}

/// Payload of the driver error used to abort a transaction on a caller error.
#[derive(Debug)]
struct CallerAbort;

impl MongoDbService {
    /// Opens a new session.
    ///
    /// # Errors
    /// Returns `NotStarted` before startup, or the driver error.
    pub async fn start_session(&self) -> crate::Result<ClientSession> {
        Ok(self.client()?.start_session().await?)
    }

    /// Runs `operation` with a fresh session, closed when it returns.
    ///
    /// # Errors
    /// Returns `NotStarted` before startup, or the operation's error.
    pub async fn with_session<R, F>(&self, operation: F) -> crate::Result<R>
    where
        R: 'static,
        F: for<'s> FnOnce(&'s mut ClientSession) -> BoxFuture<'s, crate::Result<R>>,
    {
        let mut session = self.start_session().await?;
        operation(&mut session).await
    }

    /// Runs `operation` in a transaction and returns its value.
    ///
    /// # Example
    /// ```rust,no_run
    /// use futures::FutureExt;
    /// use mongodb::bson::{Document, doc};
    /// # async fn example(service: &opensilex_nosql::service::MongoDbService) -> opensilex_nosql::Result<()> {
    /// let database = service.database()?.clone();
    /// let inserted = service
    ///     .compute_transaction(|session| {
    ///         let events = database.collection::<Document>("event");
    ///         async move {
    ///             events.insert_one(doc! { "uri": "test:1" }).session(&mut *session).await?;
    ///             events.insert_one(doc! { "uri": "test:2" }).session(&mut *session).await?;
    ///             Ok(2)
    ///         }
    ///         .boxed()
    ///     })
    ///     .await?;
    /// assert_eq!(inserted, 2);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns `NotStarted` before startup, or the driver error that aborted
    /// the transaction.
    pub async fn compute_transaction<R, F>(&self, mut operation: F) -> crate::Result<R>
    where
        R: Send + 'static,
        F: for<'s> FnMut(&'s mut ClientSession) -> BoxFuture<'s, mongodb::error::Result<R>>
            + Send,
    {
        self.compute_throwing_transaction(move |session| {
            let attempt = operation(session);
            async move { attempt.await.map_err(NoSqlError::from) }.boxed()
        })
        .await
    }

    /// Runs `operation` in a transaction.
    ///
    /// # Errors
    /// Same as [`MongoDbService::compute_transaction`].
    pub async fn run_transaction<F>(&self, operation: F) -> crate::Result<()>
    where
        F: for<'s> FnMut(&'s mut ClientSession) -> BoxFuture<'s, mongodb::error::Result<()>>
            + Send,
    {
        self.compute_transaction(operation).await
    }

    /// Runs a fallible `operation` in a transaction and returns its value.
    ///
    /// A caller error aborts the transaction, is logged as a rollback and is
    /// returned as is.
    ///
    /// # Errors
    /// Returns the caller error that aborted the transaction, or a
    /// [`NoSqlError`] converted into `E` for session and driver failures.
    pub async fn compute_throwing_transaction<R, E, F>(&self, mut operation: F) -> Result<R, E>
    where
        R: Send + 'static,
        E: TransactionFailure,
        F: for<'s> FnMut(&'s mut ClientSession) -> BoxFuture<'s, Result<R, E>> + Send,
    {
        let mut session = self.start_session().await?;
        let logger = OperationLogger::new();
        let start = logger.start(kind::TRANSACTION, "");

        let mut failure: Option<E> = None;
        let outcome = session
            .start_transaction()
            .and_run(&mut failure, |session, failure| {
                let attempt = operation(session);
                async move {
                    match attempt.await {
                        Ok(value) => Ok(value),
                        Err(error) => match error.into_driver_error() {
                            Ok(driver) => Err(driver),
                            Err(error) => {
                                **failure = Some(error);
                                Err(mongodb::error::Error::custom(CallerAbort))
                            }
                        },
                    }
                }
                .boxed()
            })
            .await;

        match (outcome, failure) {
            (Ok(value), _) => {
                logger.ok(kind::TRANSACTION, start, "");
                Ok(value)
            }
            (Err(_), Some(error)) => {
                logger.error(kind::TRANSACTION, FailureStatus::Rollback, &error, "");
                Err(error)
            }
            (Err(driver), None) => {
                logger.error(kind::TRANSACTION, FailureStatus::Error, &driver, "");
                Err(E::from(NoSqlError::Mongo(driver)))
            }
        }
    }

    /// Runs a fallible `operation` in a transaction.
    ///
    /// # Errors
    /// Same as [`MongoDbService::compute_throwing_transaction`].
    pub async fn run_throwing_transaction<E, F>(&self, operation: F) -> Result<(), E>
    where
        E: TransactionFailure,
        F: for<'s> FnMut(&'s mut ClientSession) -> BoxFuture<'s, Result<(), E>> + Send,
    {
        self.compute_throwing_transaction(operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MongoDbConfig, RunMode, ServiceContext};
    use url::Url;

    #[derive(Debug, thiserror::Error)]
    enum ImportError {
        #[error("row {0} is invalid")]
        InvalidRow(usize),
        #[error(transparent)]
        Store(#[from] NoSqlError),
    }

    impl TransactionFailure for ImportError {
        fn into_driver_error(self) -> Result<mongodb::error::Error, Self> {
            match self {
                Self::Store(error) => error.into_driver_error().map_err(Self::Store),
                other => Err(other),
            }
        }
    }

    #[test]
    fn test_driver_errors_are_handed_back() {
        let error = NoSqlError::Mongo(mongodb::error::Error::custom("transient"));
        assert!(error.into_driver_error().is_ok());

        let error = ImportError::Store(NoSqlError::Mongo(mongodb::error::Error::custom("x")));
        assert!(error.into_driver_error().is_ok());
    }

    #[test]
    fn test_caller_errors_are_kept() {
        let error = NoSqlError::invalid_argument("empty batch");
        assert!(matches!(
            error.into_driver_error(),
            Err(NoSqlError::InvalidArgument { .. })
        ));

        let error = ImportError::InvalidRow(3);
        assert!(matches!(
            error.into_driver_error(),
            Err(ImportError::InvalidRow(3))
        ));
    }

    #[tokio::test]
    async fn test_transactions_require_startup() {
        let context = ServiceContext::new(Url::parse("http://opensilex.test/id/").unwrap())
            .with_run_mode(RunMode::Test);
        let service = MongoDbService::new(MongoDbConfig::default(), context).unwrap();

        let result = service
            .compute_transaction(|_session| async { Ok(1) }.boxed())
            .await;
        assert!(matches!(result, Err(NoSqlError::NotStarted)));

        let result: Result<(), ImportError> = service
            .run_throwing_transaction(|_session| async { Err(ImportError::InvalidRow(1)) }.boxed())
            .await;
        assert!(matches!(result, Err(ImportError::Store(NoSqlError::NotStarted))));
    }
}
