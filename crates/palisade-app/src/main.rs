//! Palisade - prompt injection detection service.
//!
//! This is the main binary that runs the Palisade sidecar: it loads the
//! threat corpus and the embedding model, builds the detection pipeline,
//! and serves the HTTP API until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use directories::ProjectDirs;
use palisade_core::semantic::DEFAULT_BLOCK_THRESHOLD;
use palisade_core::{
    DetectionPipeline, MiniLmConfig, MiniLmEmbedder, ModelFetcher, SemanticConfig, ThreatCorpus,
};
use palisade_server::{AppState, Server, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Palisade - prompt injection detection service
#[derive(Parser, Debug)]
#[command(name = "palisade", version, about)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to bind to
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Path to the ONNX embedding model (defaults to the fetched artifact)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Path to the tokenizer definition (defaults to the fetched artifact)
    #[arg(long)]
    tokenizer: Option<PathBuf>,

    /// Path to a JSON threat corpus (defaults to the bundled corpus)
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Semantic blocking threshold
    #[arg(long, default_value_t = DEFAULT_BLOCK_THRESHOLD)]
    threshold: f32,

    /// Download missing model artifacts before starting
    #[arg(long)]
    download: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "palisade", "Palisade").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("palisade={},warn", log_level)));

    // Try to set up file logging
    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("palisade")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stdout))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

/// Resolves the model and tokenizer paths: explicit flags win, then fetched
/// artifacts when present, then the local default layout.
fn resolve_artifacts(args: &Args, fetcher: Option<&ModelFetcher>) -> (String, String) {
    let defaults = MiniLmConfig::default();

    let model = match args.model {
        Some(ref path) => path.to_string_lossy().into_owned(),
        None => fetcher
            .map(|f| f.model_path())
            .filter(|p| p.exists())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or(defaults.model_path),
    };

    let tokenizer = match args.tokenizer {
        Some(ref path) => path.to_string_lossy().into_owned(),
        None => fetcher
            .map(|f| f.tokenizer_path())
            .filter(|p| p.exists())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or(defaults.tokenizer_path),
    };

    (model, tokenizer)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Palisade");

    let fetcher = ModelFetcher::new();

    if args.download {
        let fetcher = fetcher
            .as_ref()
            .ok_or_else(|| anyhow!("could not resolve a data directory for downloads"))?;
        fetcher
            .ensure_all()
            .await
            .context("failed to fetch model artifacts")?;
    }

    // Point the ONNX loader at the fetched runtime unless one is configured
    if std::env::var_os(ModelFetcher::runtime_env_var()).is_none() {
        if let Some(ref fetcher) = fetcher {
            fetcher.setup_environment();
        }
    }

    let corpus = match args.corpus {
        Some(ref path) => ThreatCorpus::from_file(path)
            .with_context(|| format!("failed to load corpus from {}", path.display()))?,
        None => ThreatCorpus::bundled(),
    };

    let (model_path, tokenizer_path) = resolve_artifacts(&args, fetcher.as_ref());
    let embedder = MiniLmEmbedder::new(MiniLmConfig {
        model_path,
        tokenizer_path,
        ..MiniLmConfig::default()
    })
    .context("failed to load the embedding model (run with --download to fetch artifacts)")?;

    // The engine must be fully built before the server accepts traffic
    let config = SemanticConfig::with_threshold(args.threshold);
    let pipeline = DetectionPipeline::new(Arc::new(embedder), &corpus, config)
        .context("failed to build the detection pipeline")?;

    let (lexical, semantic) = pipeline.corpus_counts();
    tracing::info!(
        lexical,
        semantic,
        threshold = pipeline.block_threshold(),
        "Detection pipeline ready"
    );

    let server_config = ServerConfig::default()
        .with_host(args.host)
        .with_port(args.port);
    let server = Server::with_state(server_config, AppState::new(pipeline))?;
    server.run().await?;

    Ok(())
}
