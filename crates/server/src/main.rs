use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use recordhook_core::Config;
use recordhook_engine::{Engine, Stores};
use recordhook_notify::{ReqwestTransport, SystemClock};
use recordhook_rules::validation::validate_yaml;
use recordhook_server::{build_router, AppState};
use recordhook_storage::postgres::{self, PgDeliveryLog, PgRuleStore, PgSchemaCatalog};
use recordhook_storage::MemorySchemaCatalog;

/// Record-change rules with webhook delivery.
#[derive(Parser, Debug)]
#[command(name = "recordhook", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve {
        /// Bind host (overrides HOST).
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides PORT).
        #[arg(long)]
        port: Option<u16>,

        /// YAML list of entity schemas, used when PostgreSQL is not configured.
        #[arg(long, env = "RECORDHOOK_SCHEMA_FILE")]
        schema_file: Option<PathBuf>,
    },
    /// Check a YAML or JSON rule definition and print the result.
    Validate {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    recordhook_core::config::load_dotenv();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            host,
            port,
            schema_file,
        } => {
            let mut config = Config::from_env();
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config, schema_file.as_deref()).await
        }
        Command::Validate { file } => validate(&file),
    }
}

async fn serve(config: Config, schema_file: Option<&Path>) -> anyhow::Result<()> {
    config.log_summary();

    let stores = if config.postgres.is_configured() {
        let pool = postgres::connect(&config.postgres)
            .await
            .context("failed to connect to PostgreSQL")?;
        info!("using PostgreSQL stores");
        Stores {
            rules: Arc::new(PgRuleStore::new(pool.clone())),
            log: Arc::new(PgDeliveryLog::new(pool.clone())),
            catalog: Arc::new(PgSchemaCatalog::new(pool)),
        }
    } else {
        warn!("PG_USERNAME not set, rules and delivery logs are kept in memory");
        let catalog = match schema_file {
            Some(path) => {
                let yaml = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                MemorySchemaCatalog::from_yaml(&yaml)
                    .with_context(|| format!("invalid schema file {}", path.display()))?
            }
            None => MemorySchemaCatalog::new(),
        };
        Stores::in_memory(catalog)
    };

    let transport = Arc::new(ReqwestTransport::new().context("failed to build HTTP client")?);
    let engine = Engine::start(
        &config.delivery,
        &config.dispatch,
        stores,
        transport,
        Arc::new(SystemClock),
    );

    let app = build_router(AppState::from_engine(&engine), &config.server.cors_origin);
    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining deliveries");
    engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn validate(file: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let result = validate_yaml(&text);

    for e in &result.errors {
        match &e.suggestion {
            Some(s) => println!("error   {}: {} ({s})", e.path, e.message),
            None => println!("error   {}: {}", e.path, e.message),
        }
    }
    for w in &result.warnings {
        println!("warning {}: {}", w.path, w.message);
    }

    if result.valid {
        println!("{}: ok", file.display());
        Ok(())
    } else {
        anyhow::bail!("{}: {} error(s)", file.display(), result.errors.len())
    }
}
