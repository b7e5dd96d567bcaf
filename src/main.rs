use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use fraudx_api::{AppState, RestApi};
use fraudx_core::config::resolve_config_path;
use fraudx_core::{ApplicationRecord, EmbeddingStore, Error, ModelConfig, StoredCase};
use fraudx_schema::{FittedEncoderState, StructuredEmbedder};
use fraudx_similarity::DecisionEngine;
use fraudx_storage::{load_corpus, DataDirLock, ModelArtifact, StorageManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Merchant onboarding fraud screening
#[derive(Parser, Debug)]
#[command(name = "fraudx")]
#[command(about = "Screen merchant applications against known fraud cases", long_about = None)]
struct Cli {
    /// Model configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the data directory
    #[arg(short, long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    /// Log level, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit the encoder on a labeled corpus and store its cases
    Fit {
        /// JSON or CSV corpus file
        #[arg(long)]
        corpus: PathBuf,

        /// Only write the model artifact; a running server picks it up
        /// through `POST /model/reload`
        #[arg(long)]
        model_only: bool,
    },
    /// Screen one application and print the decision
    Evaluate {
        /// JSON file holding a single application
        #[arg(long)]
        record: PathBuf,
    },
    /// Run the HTTP API
    Serve {
        /// HTTP API port
        #[arg(long, default_value_t = 8000)]
        http_port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let root = std::env::current_dir()?;
    let config_path = resolve_config_path(cli.config.as_deref(), &root)?;
    let config = ModelConfig::load(&config_path)?;
    info!(config = %config_path.display(), model = %config.name, "Loaded model configuration");

    match cli.command {
        Command::Fit { corpus, model_only } => fit(config, &cli.data_dir, &corpus, model_only),
        Command::Evaluate { record } => evaluate(config, &cli.data_dir, &record).await,
        Command::Serve { http_port } => serve(config, &cli.data_dir, http_port).await,
    }
}

fn fit(
    config: ModelConfig,
    data_dir: &Path,
    corpus_path: &Path,
    model_only: bool,
) -> anyhow::Result<()> {
    let corpus = load_corpus(corpus_path)?;
    let records: Vec<ApplicationRecord> =
        corpus.iter().map(|row| row.application.clone()).collect();
    let state = FittedEncoderState::fit(&config, &records)?;

    if model_only {
        let path = StorageManager::model_path_in(data_dir);
        let artifact = ModelArtifact::from_state(&state).save(path)?;
        println!("{}", serde_json::to_string_pretty(&artifact)?);
        return Ok(());
    }

    let _lock = DataDirLock::acquire(data_dir)?;
    let reembedded = StorageManager::reembed(data_dir, &state)?;
    let storage = StorageManager::open(data_dir, config.embedding_dim)?;
    let artifact = storage.save_model(&state)?;

    let mut stored = 0;
    let mut skipped = 0;
    for row in corpus {
        let embedding = match state.assemble(&row.application) {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(merchant_id = %row.merchant_id, error = %e, "Skipping corpus row");
                skipped += 1;
                continue;
            }
        };
        let mut case = StoredCase::new(row.merchant_id, embedding, row.application);
        case.fraud_reason = row.fraud_reason;

        match storage.put(case) {
            Ok(()) => stored += 1,
            Err(Error::DuplicateCase(id)) => {
                warn!(merchant_id = %id, "Case already stored");
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        stored,
        skipped,
        reembedded = reembedded.kept,
        quarantined = reembedded.quarantined,
        "Fit complete"
    );
    let summary = serde_json::json!({
        "artifact": artifact,
        "cases_stored": stored,
        "cases_skipped": skipped,
        "cases_reembedded": reembedded.kept,
        "cases_quarantined": reembedded.quarantined,
        "total_cases": storage.len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn evaluate(config: ModelConfig, data_dir: &Path, record_path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(record_path)
        .with_context(|| format!("reading application {}", record_path.display()))?;
    let record = ApplicationRecord::from_value(serde_json::from_str(&text)?)?;

    let storage = Arc::new(StorageManager::open(data_dir, config.embedding_dim)?);
    let artifact = storage
        .load_model()?
        .ok_or_else(|| {
            anyhow!("no model artifact in {}; run `fraudx fit` first", data_dir.display())
        })?;

    let embedder =
        StructuredEmbedder::with_state(Arc::new(config), artifact.into_state()?)?;
    let embedder = Arc::new(embedder);
    let engine = DecisionEngine::new(embedder, storage);
    let decision = engine.evaluate(&record).await?;

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

async fn serve(config: ModelConfig, data_dir: &Path, http_port: u16) -> anyhow::Result<()> {
    info!("Starting fraudx v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", data_dir);

    let _lock = DataDirLock::acquire(data_dir)?;
    let storage = Arc::new(StorageManager::open(data_dir, config.embedding_dim)?);
    let embedder = Arc::new(StructuredEmbedder::new(Arc::new(config)));
    match storage.load_model()? {
        Some(artifact) => {
            embedder.publish(artifact.into_state()?)?;
        }
        None => warn!("No model artifact yet; /evaluate returns 503 until one is reloaded"),
    }

    let engine = Arc::new(DecisionEngine::new(embedder, storage.clone()));
    let state = Arc::new(AppState::new(engine, storage));

    let http_handle = std::thread::spawn(move || {
        info!("Starting HTTP server on port {}", http_port);
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(state, http_port).await {
                eprintln!("HTTP server error: {}", e);
            }
        })
    });

    info!("HTTP API: http://localhost:{}/", http_port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("Shutting down...");
    Ok(())
}
