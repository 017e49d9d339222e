//! OpenSILEX MongoDB administration tool.
//!
//! This binary checks that the configured MongoDB server is reachable with
//! the configured credentials, and prepares credential hash files.
//!
//! # Security Guarantees
//! - Passwords are never printed or logged
//! - Credential and hash files are permission-checked before any read
//! - Password bytes are wiped once hashed or handed to the driver

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use opensilex_nosql::config::{MongoDbConfig, ServiceContext};
use opensilex_nosql::logging::init_logging;
use opensilex_nosql::security::{DigestAlgorithm, SecretPassword, check_restrictive_permissions};
use opensilex_nosql::{MongoAuthentication, MongoDbService};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use url::Url;

#[derive(Parser)]
#[command(name = "opensilex-nosql")]
#[command(about = "OpenSILEX MongoDB administration tool")]
#[command(version)]
#[command(long_about = "
OpenSILEX NoSQL - MongoDB service administration

Checks the MongoDB connection used by an OpenSILEX instance and prepares the
files of the credential chain.

SECURITY FEATURES:
- Passwords are never printed or logged
- Credential files must be owned by the current user with mode 600 or stricter

EXAMPLES:
  opensilex-nosql --config /etc/opensilex/mongo.toml check
  opensilex-nosql -c mongo.toml verify-credentials
  opensilex-nosql digest --algorithm sha256 /etc/opensilex/mongo.pass > mongo.sha256
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the service and ping the server
    Check(CheckArgs),
    /// Run the configured credential chain without connecting
    VerifyCredentials,
    /// Print the digest of a credentials file, as expected in its hash file
    Digest(DigestArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Prefix of the URIs minted by the service
    #[arg(long, default_value = "http://opensilex.dev/")]
    generation_prefix: Url,
}

#[derive(Args)]
struct DigestArgs {
    /// Digest algorithm
    #[arg(short, long, default_value_t = DigestAlgorithm::Sha256)]
    algorithm: DigestAlgorithm,

    /// Credentials file to hash
    #[arg(help = "Password file (trailing newlines are ignored)")]
    file: PathBuf,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "OPENSILEX_NOSQL_CONFIG",
        help = "TOML configuration file (defaults to localhost:27017 without authentication)"
    )]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_json)?;

    match &cli.command {
        Command::Check(args) => {
            let config = load_config(cli.global.config.as_deref())?;
            check_connection(config, args.generation_prefix.clone()).await
        }
        Command::VerifyCredentials => {
            let config = load_config(cli.global.config.as_deref())?;
            verify_credentials(&config).await
        }
        Command::Digest(args) => {
            println!("{}", credentials_digest(&args.file, args.algorithm)?);
            Ok(())
        }
    }
}

/// Loads the configuration file, or the defaults when none is given.
fn load_config(path: Option<&Path>) -> anyhow::Result<MongoDbConfig> {
    match path {
        Some(path) => MongoDbConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => {
            info!("No configuration file given, using defaults");
            Ok(MongoDbConfig::default())
        }
    }
}

/// Starts the service in production mode, which pings the server.
async fn check_connection(config: MongoDbConfig, generation_prefix: Url) -> anyhow::Result<()> {
    info!("Checking MongoDB connection to {}", config);

    let mut service = MongoDbService::new(config, ServiceContext::new(generation_prefix))?;
    if let Err(e) = service.startup().await {
        error!("Connection check failed: {}", e);
        return Err(e.into());
    }

    let target = service.config().to_string();
    service.shutdown().await;

    println!("Connection to {target} successful");
    Ok(())
}

/// Runs the credential chain and prints everything but the password.
async fn verify_credentials(config: &MongoDbConfig) -> anyhow::Result<()> {
    let authentication = config
        .authentication
        .as_ref()
        .context("No authentication section in the configuration")?;

    let credential = MongoAuthentication::from_config(authentication)?
        .load_credential()
        .await?;

    println!(
        "mechanism: {}",
        credential
            .mechanism
            .as_ref()
            .map_or("default", |mechanism| mechanism.as_str())
    );
    println!("username: {}", credential.username.as_deref().unwrap_or(""));
    println!(
        "source: {}",
        credential.source.as_deref().unwrap_or("(database default)")
    );
    Ok(())
}

/// Hex digest of a credentials file, trailing line terminators excluded.
fn credentials_digest(path: &Path, algorithm: DigestAlgorithm) -> anyhow::Result<String> {
    check_restrictive_permissions(path)?;

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
    let secret = SecretPassword::new(bytes);
    anyhow::ensure!(!secret.is_empty(), "{} is empty", path.display());

    Ok(algorithm.hex_digest(secret.as_bytes()))
}
