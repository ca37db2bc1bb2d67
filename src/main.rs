//! `corpusloader` — single-command CLI that loads configuration, runs one
//! ingestion pass over every configured project, then serves the hybrid
//! search engine over JSON-RPC 2.0 (stdio or HTTP/SSE) until shut down.

mod stats;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use corpusloader::config;
use corpusloader::embedding::create_provider;
use corpusloader::nlp::HeuristicNlpAnalyzer;
use corpusloader::pipeline::orchestrator::Orchestrator;
use corpusloader::pipeline::resource_manager::{install_signal_handlers, CancellationSignal};
use corpusloader::rpc::{self, RpcState};
use corpusloader::search::hybrid::HybridSearchEngine;
use corpusloader::state_store::StateStore;
use corpusloader::vector_store::{Distance, SqliteVectorStore};
use corpusloader::{db, migrate};

#[derive(Parser)]
#[command(name = "corpusloader", about = "A hybrid retrieval platform: ingestion pipeline + dense+sparse search over JSON-RPC", version)]
struct Cli {
    /// Minimum log level emitted to stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Path to the YAML configuration file.
    #[arg(long, global = true, default_value = "./config/corpusloader.yaml")]
    config: PathBuf,

    /// RPC transport to serve over.
    #[arg(long, global = true, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// HTTP bind host (ignored for the stdio transport).
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: String,

    /// HTTP bind port (ignored for the stdio transport).
    #[arg(long, global = true, default_value_t = 8080)]
    port: u16,

    /// Dotenv-style file loaded into the process environment before config
    /// parsing, so `${VAR}` substitution can see its values.
    #[arg(long, global = true)]
    env: Option<PathBuf>,

    /// Print the effective configuration, with secrets redacted, and exit.
    #[arg(long, global = true)]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print document/vector-point counts from the state database and exit.
    Stats,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "lower")]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            // tracing has no "critical" level; it collapses to error, matching
            // the case-insensitive five-level scale the CLI accepts.
            LogLevel::Error | LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
enum Transport {
    Stdio,
    Http,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(env_path) = &cli.env {
        config::load_env_file(env_path)?;
    }

    if cli.print_config {
        let config = config::load_config(&cli.config)?;
        println!("{}", config::print_config_redacted(&config)?);
        return Ok(());
    }

    init_tracing(cli.log_level);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main(cli))
}

/// stdout is reserved for JSON-RPC frames on the stdio transport, so all
/// diagnostics go to stderr regardless of which transport is selected.
fn init_tracing(log_level: LogLevel) {
    if std::env::var("MCP_DISABLE_CONSOLE_LOGGING").is_ok() {
        return;
    }
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.as_tracing_level().to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    let mut config = config::load_config(&cli.config)?;
    if cli.host != "127.0.0.1" {
        config.global.server.host = cli.host.clone();
    }
    if cli.port != 8080 {
        config.global.server.port = cli.port;
    }

    let pool = db::connect(&config).await?;
    migrate::run_migrations(&pool).await?;

    if let Some(Command::Stats) = cli.command {
        return stats::run_stats(&config, &pool).await;
    }

    let vector_store: Arc<dyn corpusloader::vector_store::VectorStoreClient> = Arc::new(SqliteVectorStore::new(pool.clone()));
    let state_store = StateStore::new(pool);
    let vector_size = config.global.vector_store.effective_vector_size();
    vector_store
        .ensure_collection(&config.global.vector_store.collection_name, vector_size, Distance::Cosine)
        .await?;

    let embedding_provider: Arc<dyn corpusloader::embedding::EmbeddingProvider> = Arc::from(create_provider(&config.global.embedding)?);
    let nlp: Arc<dyn corpusloader::nlp::NlpAnalyzer> = Arc::new(HeuristicNlpAnalyzer::new());

    let cancellation = CancellationSignal::new();
    install_signal_handlers(cancellation.clone());

    let orchestrator = Orchestrator::new(config.clone(), state_store, vector_store.clone(), embedding_provider.clone(), cancellation.clone());
    let results = orchestrator.process_all_projects().await?;
    for (project_id, result) in &results {
        tracing::info!(
            project_id = %project_id,
            success_count = result.success_count,
            error_count = result.error_count,
            "ingestion pass complete"
        );
        for error in &result.errors {
            tracing::warn!(project_id = %project_id, error = %error, "ingestion error");
        }
    }

    let engine = HybridSearchEngine::new(
        vector_store.clone(),
        embedding_provider.clone(),
        nlp.clone(),
        config.global.retrieval.clone(),
        config.global.vector_store.collection_name.clone(),
    );
    let rpc_state = Arc::new(RpcState {
        engine,
        nlp,
        vector_store,
        embedding_provider,
    });

    match cli.transport {
        Transport::Stdio => rpc::stdio::run(rpc_state, cancellation).await,
        Transport::Http => rpc::http::run(rpc_state, config.global.server.clone(), cancellation).await,
    }
}
