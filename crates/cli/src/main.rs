//! CLI entry point for the POI registry container.

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use poi_registry_bootstrap::command::CommandLine;
use poi_registry_bootstrap::error::{EXIT_CONFIG, EXIT_SOFTWARE};
use poi_registry_bootstrap::launch::{CommandServer, DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT};
use poi_registry_bootstrap::migrate::{
    CommandMigration, MigrationSource, MigrationStep, SkipMigration, SqlxMigration,
};
use poi_registry_bootstrap::settings::{parse_flag, DEBUG};
use poi_registry_bootstrap::wait::{wait_for_database, TcpProbe};
use poi_registry_bootstrap::{
    BootstrapError, BootstrapSettings, Coordinator, DbEndpoint, Settings, SettingsError,
};
use poi_registry_common::utils::dict_to_string;
use poi_registry_common::FieldCipher;
use poi_registry_db::stats::poi_statistics;
use poi_registry_db::DbPool;
use poi_registry_telemetry::{init_logging, Metrics};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "poi-registry")]
#[command(about = "Startup coordinator and maintenance tools for the POI registry service")]
struct Cli {
    /// Log level
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the database, apply migrations, then run the server
    Run {
        #[command(flatten)]
        wait: WaitArgs,

        #[command(flatten)]
        migration: MigrationArgs,

        /// Address the server binds to
        #[arg(long, env = "HOST", default_value = DEFAULT_SERVER_HOST)]
        host: String,

        /// Port the server binds to
        #[arg(long, env = "PORT", default_value_t = DEFAULT_SERVER_PORT)]
        port: u16,

        /// Metrics bind address; no metrics endpoint when unset
        #[arg(long, env = "METRICS_BIND_ADDRESS")]
        metrics_bind_address: Option<String>,

        /// Server command, given after `--`
        #[arg(last = true, required = true)]
        server: Vec<String>,
    },
    /// Block until the database accepts TCP connections
    WaitDb {
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Wait for the database, apply migrations once and exit
    Migrate {
        #[command(flatten)]
        wait: WaitArgs,

        #[command(flatten)]
        migration: MigrationArgs,
    },
    /// Validate the application settings and print them with secrets masked
    CheckConfig,
    /// Print a new field encryption key
    GenKey,
    /// Print POI statistics as JSON
    Stats {
        /// Report date (YYYY-MM-DD), defaults to today in UTC
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

#[derive(Args)]
struct WaitArgs {
    /// Delay between connection attempts in seconds
    #[arg(
        long,
        env = "DB_WAIT_INTERVAL_SECS",
        default_value = "1",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    wait_interval_secs: u64,

    /// Timeout for a single connection attempt in seconds
    #[arg(
        long,
        env = "DB_CONNECT_TIMEOUT_SECS",
        default_value = "3",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    connect_timeout_secs: u64,

    /// Database host, overrides the one in POSTGRES_DATABASE_URL
    #[arg(long, env = "DB_HOST")]
    db_host: Option<String>,

    /// Database port, overrides the one in POSTGRES_DATABASE_URL
    #[arg(long, env = "DB_PORT")]
    db_port: Option<u16>,
}

impl WaitArgs {
    fn endpoint(&self, database_url: &str) -> Result<DbEndpoint, SettingsError> {
        let mut endpoint = DbEndpoint::from_database_url(database_url)?;
        if let Some(host) = &self.db_host {
            endpoint.host = host.clone();
        }
        if let Some(port) = self.db_port {
            endpoint.port = port;
        }
        Ok(endpoint)
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.wait_interval_secs)
    }

    fn probe(&self) -> TcpProbe {
        TcpProbe::new(Duration::from_secs(self.connect_timeout_secs))
    }

    fn coordinator(
        &self,
        endpoint: DbEndpoint,
        step: Box<dyn MigrationStep>,
        metrics: Metrics,
    ) -> Coordinator {
        Coordinator::new(endpoint, step, metrics)
            .with_probe(Box::new(self.probe()))
            .with_interval(self.interval())
    }
}

#[derive(Args)]
struct MigrationArgs {
    /// External migration command, e.g. "alembic upgrade head"
    #[arg(long, env = "MIGRATE_CMD", conflicts_with_all = ["migrations_dir", "skip_migrations"])]
    migrate_cmd: Option<String>,

    /// Directory of SQL migrations to apply instead of the embedded schema
    #[arg(long, env = "MIGRATIONS_DIR", conflicts_with = "skip_migrations")]
    migrations_dir: Option<PathBuf>,

    /// Do not run any migration
    #[arg(long, default_value = "false")]
    skip_migrations: bool,
}

impl MigrationArgs {
    fn into_step(self, database_url: &str) -> Result<Box<dyn MigrationStep>, SettingsError> {
        if self.skip_migrations {
            return Ok(Box::new(SkipMigration));
        }

        if let Some(line) = self.migrate_cmd {
            let command = CommandLine::parse(&line).ok_or(SettingsError::Invalid {
                name: "MIGRATE_CMD",
                reason: "command is empty".to_string(),
            })?;
            return Ok(Box::new(CommandMigration::new(command)));
        }

        let source = match self.migrations_dir {
            Some(dir) => MigrationSource::Directory(dir),
            None => MigrationSource::Embedded,
        };
        Ok(Box::new(SqlxMigration::new(database_url, source)))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal inside the container.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env file: {e}");
        }
    }

    let cli = Cli::parse();

    // Settings are validated later; a bad DEBUG value only affects verbosity here.
    let debug = parse_flag(DEBUG, std::env::var(DEBUG).ok().as_deref()).unwrap_or(false);
    if let Err(e) = init_logging(cli.log_level.as_deref(), debug) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::from(EXIT_SOFTWARE as u8);
    }

    match dispatch(cli.command).await {
        Ok(code) => exit_code(code),
        Err(e) => {
            let code = failure_code(&e);
            error!(code, "Bootstrap failed: {e:#}");
            exit_code(code)
        }
    }
}

async fn dispatch(command: Commands) -> anyhow::Result<i32> {
    match command {
        Commands::Run {
            wait,
            migration,
            host,
            port,
            metrics_bind_address,
            server,
        } => {
            run_bootstrap(
                wait,
                migration,
                &host,
                port,
                metrics_bind_address.as_deref(),
                server,
            )
            .await
        }
        Commands::WaitDb { wait } => {
            let settings = BootstrapSettings::from_env()?;
            let endpoint = wait.endpoint(&settings.database_url)?;
            let metrics = Metrics::new()?;
            wait_for_database(&wait.probe(), &endpoint, wait.interval(), &metrics).await;
            Ok(0)
        }
        Commands::Migrate { wait, migration } => {
            let settings = BootstrapSettings::from_env()?;
            let endpoint = wait.endpoint(&settings.database_url)?;
            let step = migration.into_step(&settings.database_url)?;
            migrate_when_reachable(&wait, endpoint, step, Metrics::new()?).await?;
            Ok(0)
        }
        Commands::CheckConfig => {
            let settings = Settings::from_env()?;
            println!("{}", dict_to_string(settings.redacted()));
            Ok(0)
        }
        Commands::GenKey => {
            println!("{}", FieldCipher::generate_key());
            Ok(0)
        }
        Commands::Stats { today } => {
            let settings = BootstrapSettings::from_env()?;
            print_statistics(&settings.database_url, today).await?;
            Ok(0)
        }
    }
}

async fn run_bootstrap(
    wait: WaitArgs,
    migration: MigrationArgs,
    host: &str,
    port: u16,
    metrics_addr: Option<&str>,
    server: Vec<String>,
) -> anyhow::Result<i32> {
    let settings = BootstrapSettings::from_env()?;
    if settings.debug {
        warn!("DEBUG is enabled");
    }

    let endpoint = wait.endpoint(&settings.database_url)?;
    let server = CommandLine::from_words(server).ok_or(SettingsError::Invalid {
        name: "server command",
        reason: "command is empty".to_string(),
    })?;
    let server = CommandServer::new(server, host, port);
    let step = migration.into_step(&settings.database_url)?;

    let metrics = Metrics::new()?;
    if let Some(addr) = metrics_addr {
        start_metrics_server(addr, metrics.clone()).await?;
    }

    let code = wait.coordinator(endpoint, step, metrics).run(&server).await?;
    Ok(code)
}

/// Block until the database answers, then migrate. Never starts a server.
async fn migrate_when_reachable(
    wait: &WaitArgs,
    endpoint: DbEndpoint,
    step: Box<dyn MigrationStep>,
    metrics: Metrics,
) -> Result<(), BootstrapError> {
    let mut coordinator = wait.coordinator(endpoint, step, metrics);
    coordinator.wait_for_db().await?;
    coordinator.migrate().await
}

async fn print_statistics(database_url: &str, today: Option<NaiveDate>) -> anyhow::Result<()> {
    let db = DbPool::connect(database_url).await?;
    let today = today.unwrap_or_else(|| Utc::now().date_naive());
    let stats = poi_statistics(&db, today).await;
    db.close().await;

    let stats = stats.context("Failed to compute POI statistics")?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Exit code for a failed command.
fn failure_code(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<BootstrapError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<SettingsError>().is_some() {
        return EXIT_CONFIG;
    }
    1
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn start_metrics_server(addr: &str, metrics: Metrics) -> anyhow::Result<()> {
    use axum::{
        extract::State,
        http::StatusCode,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use std::sync::Arc;

    let metrics = Arc::new(metrics);

    async fn metrics_handler(
        State(metrics): State<Arc<Metrics>>,
    ) -> Result<impl IntoResponse, StatusCode> {
        match metrics.gather() {
            Ok(body) => Ok((StatusCode::OK, body)),
            Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    async fn healthz_handler() -> &'static str {
        "ok"
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {addr}"))?;
    info!("Metrics server listening on http://{}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}
