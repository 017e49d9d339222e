//! MongoDB service: client lifecycle, indexes, sessions and transactions.
//!
//! # Lifecycle
//! 1. [`MongoDbService::new`] validates the configuration; no client exists yet
//! 2. indexes are registered with [`MongoDbService::register_indexes`]
//! 3. [`MongoDbService::startup`] builds the single client of the service,
//!    then in production mode pings the server and creates the indexes
//! 4. [`MongoDbService::shutdown`] closes the client
//!
//! # Module Structure
//! - `indexes`: index registry, creation and deletion
//! - `transaction`: sessions and transaction helpers

mod indexes;
mod transaction;

pub use indexes::{IndexDefinition, IndexRegistry};
pub use transaction::TransactionFailure;

use crate::auth::MongoAuthentication;
use crate::config::{MongoDbConfig, ServiceContext};
use crate::error::NoSqlError;
use crate::logging::{FailureStatus, OperationLogger, kind};
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, ServerAddress};
use mongodb::{Client, Database};
use url::Url;

/// Application name reported to the server.
fn app_name() -> String {
    format!("opensilex-nosql-{}", env!("CARGO_PKG_VERSION"))
}

/// Handles owned by a started service.
struct Connection {
    client: Client,
    database: Database,
    generation_prefix: Url,
}

/// MongoDB service owning one client for its lifetime.
///
/// # Example
/// ```rust,no_run
/// use opensilex_nosql::config::{MongoDbConfig, ServiceContext};
/// use opensilex_nosql::service::MongoDbService;
///
/// # async fn example() -> opensilex_nosql::Result<()> {
/// let config = MongoDbConfig::from_file(std::path::Path::new("/etc/opensilex/nosql.toml"))?;
/// let context = ServiceContext::new("http://opensilex.test/id/".parse().expect("valid URL"));
///
/// let mut service = MongoDbService::new(config, context)?;
/// service.startup().await?;
/// service.check_connection().await?;
/// service.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct MongoDbService {
    config: MongoDbConfig,
    context: ServiceContext,
    indexes: IndexRegistry,
    connection: Option<Connection>,
}

impl std::fmt::Debug for MongoDbService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDbService")
            .field("config", &self.config.to_string())
            .field("run_mode", &self.context.run_mode)
            .field("indexes", &self.indexes.len())
            .field("started", &self.is_started())
            .finish()
    }
}

impl MongoDbService {
    /// Creates a service; no connection is attempted.
    ///
    /// # Errors
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: MongoDbConfig, context: ServiceContext) -> crate::Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            context,
            indexes: IndexRegistry::default(),
            connection: None,
        })
    }

    /// Builds the client and, in production mode, checks the connection and
    /// creates the registered indexes.
    ///
    /// On any failure the client is shut down and the service stays
    /// unstarted.
    ///
    /// # Errors
    /// Returns `AlreadyStarted` on a second call, a credential error from the
    /// authentication chain, `ServerUnreachable`, `Unauthorized` or `Timeout`
    /// from the connection check, or the first index error.
    pub async fn startup(&mut self) -> crate::Result<()> {
        if self.connection.is_some() {
            return Err(NoSqlError::AlreadyStarted);
        }

        let client = self.build_client().await?;
        let database = client.database(&self.config.database);
        self.connection = Some(Connection {
            client,
            database,
            generation_prefix: self.context.generation_prefix.clone(),
        });

        tracing::info!(
            config = %self.config,
            run_mode = %self.context.run_mode,
            "MongoDB client created"
        );

        if self.context.run_mode.checks_server() {
            let prepared = match self.check_connection().await {
                Ok(()) => self.create_indexes().await,
                Err(error) => Err(error),
            };

            if let Err(error) = prepared {
                tracing::error!(config = %self.config, error = %error, "MongoDB startup failed");
                self.shutdown().await;
                return Err(error);
            }
        }

        Ok(())
    }

    /// Closes the client, if any. Calling it again is harmless.
    pub async fn shutdown(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.client.shutdown().await;
            tracing::info!(config = %self.config, "MongoDB client closed");
        }
    }

    /// Pings the configured database.
    ///
    /// Server selection is bounded by `server_selection_timeout_ms` and the
    /// whole call by `read_timeout_ms`.
    ///
    /// # Errors
    /// Returns `NotStarted` before startup, `ServerUnreachable` when no server
    /// could be selected, `Unauthorized` when the credentials or the command
    /// are rejected, and `Timeout` past the read timeout.
    pub async fn check_connection(&self) -> crate::Result<()> {
        let database = self.database()?;
        let logger = OperationLogger::new();
        let start = logger.start(kind::CHECK_CONNECTION, &self.config);

        let ping = async { database.run_command(doc! { "ping": 1 }).await };
        let result = match tokio::time::timeout(self.config.read_timeout(), ping).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(error)) => Err(NoSqlError::from_connection_error(
                error,
                self.config.server_selection_timeout_ms,
            )),
            Err(_) => Err(NoSqlError::timeout(
                kind::CHECK_CONNECTION,
                self.config.read_timeout_ms,
            )),
        };

        match &result {
            Ok(()) => logger.ok(kind::CHECK_CONNECTION, start, &self.config),
            Err(error) => logger.error(
                kind::CHECK_CONNECTION,
                FailureStatus::Error,
                error,
                &self.config,
            ),
        }
        result
    }

    /// Client options derived from the configuration, without credential.
    pub fn client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::default();
        options.hosts = vec![ServerAddress::Tcp {
            host: self.config.host.clone(),
            port: Some(self.config.port),
        }];
        options.server_selection_timeout = Some(self.config.server_selection_timeout());
        options.connect_timeout = Some(self.config.connect_timeout());
        options.direct_connection = self.config.direct_connection;
        options.repl_set_name = self.config.replica_set.clone();
        options.app_name = Some(app_name());
        options
    }

    async fn build_client(&self) -> crate::Result<Client> {
        let mut options = self.client_options();

        if let Some(authentication) = &self.config.authentication {
            let credential = MongoAuthentication::from_config(authentication)?
                .load_credential()
                .await?;
            options.credential = Some(credential);
        }

        Ok(Client::with_options(options)?)
    }

    /// Whether `startup` completed.
    pub fn is_started(&self) -> bool {
        self.connection.is_some()
    }

    fn connection(&self) -> crate::Result<&Connection> {
        self.connection.as_ref().ok_or(NoSqlError::NotStarted)
    }

    /// Driver client.
    ///
    /// # Errors
    /// Returns `NotStarted` before startup.
    pub fn client(&self) -> crate::Result<&Client> {
        Ok(&self.connection()?.client)
    }

    /// Configured database.
    ///
    /// # Errors
    /// Returns `NotStarted` before startup.
    pub fn database(&self) -> crate::Result<&Database> {
        Ok(&self.connection()?.database)
    }

    /// Base URI under which DAOs mint new URIs.
    ///
    /// # Errors
    /// Returns `NotStarted` before startup.
    pub fn generation_prefix_uri(&self) -> crate::Result<&Url> {
        Ok(&self.connection()?.generation_prefix)
    }

    /// Service configuration.
    pub fn config(&self) -> &MongoDbConfig {
        &self.config
    }

    /// Host context.
    pub fn context(&self) -> &ServiceContext {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthenticationConfig, RunMode};
    use std::time::{Duration, Instant};

    fn context(run_mode: RunMode) -> ServiceContext {
        ServiceContext::new(Url::parse("http://opensilex.test/id/").unwrap()).with_run_mode(run_mode)
    }

    fn unreachable_config() -> MongoDbConfig {
        MongoDbConfig::new("127.0.0.1".to_string())
            .with_port(1)
            .with_server_selection_timeout_ms(100)
            .with_direct_connection(true)
    }

    #[test]
    fn test_new_validates_config() {
        let config = MongoDbConfig::new(String::new());
        assert!(matches!(
            MongoDbService::new(config, context(RunMode::Test)),
            Err(NoSqlError::Configuration { .. })
        ));
    }

    #[test]
    fn test_accessors_fail_before_startup() {
        let service = MongoDbService::new(MongoDbConfig::default(), context(RunMode::Test)).unwrap();
        assert!(!service.is_started());
        assert!(matches!(service.client(), Err(NoSqlError::NotStarted)));
        assert!(matches!(service.database(), Err(NoSqlError::NotStarted)));
        assert!(matches!(
            service.generation_prefix_uri(),
            Err(NoSqlError::NotStarted)
        ));
        assert_eq!(service.config().database, "opensilex");
    }

    #[test]
    fn test_client_options_follow_config() {
        let mut config = unreachable_config();
        config.replica_set = Some("rs0".to_string());
        let service = MongoDbService::new(config, context(RunMode::Test)).unwrap();

        let options = service.client_options();
        assert_eq!(options.hosts.len(), 1);
        assert_eq!(options.hosts[0].to_string(), "127.0.0.1:1");
        assert_eq!(options.server_selection_timeout, Some(Duration::from_millis(100)));
        assert_eq!(options.connect_timeout, Some(Duration::from_millis(5000)));
        assert_eq!(options.direct_connection, Some(true));
        assert_eq!(options.repl_set_name.as_deref(), Some("rs0"));
        assert!(options.app_name.unwrap().starts_with("opensilex-nosql-"));
        assert!(options.credential.is_none());
    }

    #[tokio::test]
    async fn test_test_mode_startup_skips_server() {
        let mut service = MongoDbService::new(unreachable_config(), context(RunMode::Test)).unwrap();
        service.startup().await.unwrap();

        assert!(service.is_started());
        assert_eq!(
            service.generation_prefix_uri().unwrap().as_str(),
            "http://opensilex.test/id/"
        );
        assert_eq!(service.database().unwrap().name(), "opensilex");

        assert!(matches!(
            service.startup().await,
            Err(NoSqlError::AlreadyStarted)
        ));

        service.shutdown().await;
        service.shutdown().await;
        assert!(!service.is_started());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_fast() {
        let mut service = MongoDbService::new(unreachable_config(), context(RunMode::Test)).unwrap();
        service.startup().await.unwrap();

        let started = Instant::now();
        let error = service.check_connection().await.unwrap_err();

        assert!(
            matches!(error, NoSqlError::ServerUnreachable { timeout_ms: 100, .. }),
            "unexpected error: {error}"
        );
        assert!(
            started.elapsed() < Duration::from_millis(1000),
            "took {:?}",
            started.elapsed()
        );
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_production_startup_failure_leaves_service_unstarted() {
        let mut service =
            MongoDbService::new(unreachable_config(), context(RunMode::Production)).unwrap();

        let error = service.startup().await.unwrap_err();
        assert!(matches!(error, NoSqlError::ServerUnreachable { .. }));
        assert!(!service.is_started());
        assert!(matches!(service.database(), Err(NoSqlError::NotStarted)));
    }

    #[tokio::test]
    async fn test_credential_error_aborts_startup() {
        let dir = tempfile::tempdir().unwrap();
        let config = unreachable_config().with_authentication(
            AuthenticationConfig::credentials_file("admin", dir.path().join("absent")),
        );
        let mut service = MongoDbService::new(config, context(RunMode::Test)).unwrap();

        assert!(matches!(
            service.startup().await,
            Err(NoSqlError::Io { .. })
        ));
        assert!(!service.is_started());
    }

    #[tokio::test]
    async fn test_index_operations_require_startup() {
        let service = MongoDbService::new(MongoDbConfig::default(), context(RunMode::Test)).unwrap();
        assert!(matches!(
            service.create_index("variable", doc! { "uri": 1 }, None).await,
            Err(NoSqlError::NotStarted)
        ));
        assert!(matches!(
            service.drop_index("variable", &doc! { "uri": 1 }).await,
            Err(NoSqlError::NotStarted)
        ));
    }
}
