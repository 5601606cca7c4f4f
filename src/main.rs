mod chunk;
mod config;
mod embed;
mod error;
mod evaluation;
mod handlers;
mod ingest;
mod llm;
mod metrics;
mod query;
mod store;
mod variant;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::embed::VoyageEmbedder;
use crate::evaluation::orchestrator::load_for_patch;
use crate::evaluation::report::{render_matrix, render_table};
use crate::evaluation::{LlmJudge, Metric, Orchestrator, ResultsFile, RunConfig, RunMode};
use crate::llm::AnthropicLlm;
use crate::query::{EngineFactory, RetrievalEngineFactory};

const JUDGE_MAX_TOKENS: u32 = 2048;

#[derive(Parser)]
#[command(name = "rag-matrix")]
#[command(about = "RAG over regulatory documents, evaluated across chunking strategies and embedding models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every variant, resuming from existing results by default
    Evaluate {
        /// Discard existing results and re-score everything
        #[arg(long, conflicts_with = "questions")]
        fresh: bool,

        /// Re-score only these question indices in existing results
        #[arg(long, num_args = 1.., value_name = "IDX")]
        questions: Option<Vec<usize>>,
    },

    /// Chunk, embed and index documents for all variants
    Ingest {
        /// Directory of source documents (defaults to DATA_DIR)
        data_dir: Option<PathBuf>,

        /// File extensions to load
        #[arg(long = "ext", value_name = "EXT", default_value = "pdf")]
        extensions: Vec<String>,
    },

    /// Start the query API
    Serve,

    /// Print stored results
    Report {
        /// Also print a strategy x model grid per metric
        #[arg(long)]
        matrix: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rag_matrix=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::from_env());
    config.print_banner();

    match cli.command {
        Commands::Evaluate { fresh, questions } => {
            let mode = match (fresh, questions) {
                (true, _) => RunMode::Fresh,
                (false, Some(indices)) => RunMode::Patch(indices),
                (false, None) => RunMode::Resume,
            };
            evaluate(config, mode).await
        }
        Commands::Ingest {
            data_dir,
            extensions,
        } => {
            let dir = data_dir.unwrap_or_else(|| config.data_dir.clone());
            ingest(config, dir, extensions).await
        }
        Commands::Serve => serve(config).await,
        Commands::Report { matrix } => report(&config, matrix),
    }
}

async fn evaluate(config: Arc<Config>, mode: RunMode) -> anyhow::Result<()> {
    let file = ResultsFile::new(&config.results_file);
    if let RunMode::Patch(_) = mode {
        load_for_patch(&file)?;
    }

    let judge_llm = AnthropicLlm::new(config.anthropic_api_key()?, &config.evaluator_model)?
        .with_max_tokens(JUDGE_MAX_TOKENS);
    let judge_embedder = VoyageEmbedder::new(config.voyage_api_key()?, &config.evaluator_embed_model)?;
    let oracle = LlmJudge::new(Arc::new(judge_llm), Arc::new(judge_embedder), 3);
    let engines = RetrievalEngineFactory::new(config.clone())?;

    let orchestrator = Orchestrator::new(Arc::new(oracle), Arc::new(engines))
        .with_run_config(RunConfig::from_config(&config))
        .with_top_k(config.default_top_k);

    let summary = orchestrator
        .run(mode, &file)
        .await
        .with_context(|| format!("evaluation against {} failed", file.path().display()))?;

    println!("\n--- Results ---");
    print!("{}", render_table(&summary.store));
    Ok(())
}

async fn ingest(config: Arc<Config>, dir: PathBuf, extensions: Vec<String>) -> anyhow::Result<()> {
    let documents = ingest::load_documents(&dir, &extensions)
        .await
        .with_context(|| format!("failed to load documents from {}", dir.display()))?;
    let backend = RetrievalEngineFactory::new(config)?;
    let summary = ingest::run_pipeline(&documents, &backend).await?;
    info!(
        variants = summary.variants,
        nodes = summary.nodes,
        "Ingestion complete"
    );
    Ok(())
}

async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    let engines: Option<Arc<dyn EngineFactory>> = if config.mock_mode {
        None
    } else {
        Some(Arc::new(RetrievalEngineFactory::new(config.clone())?))
    };

    let state = Arc::new(handlers::AppState {
        config: config.clone(),
        engines,
        metrics: metrics::Metrics::new(),
        started_at: chrono::Utc::now(),
    });

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());
    let addr = format!("0.0.0.0:{}", config.port);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, draining...");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Shutdown complete");
    Ok(())
}

fn report(config: &Config, matrix: bool) -> anyhow::Result<()> {
    let file = ResultsFile::new(&config.results_file);
    let store = file.load()?;
    if store.is_empty() {
        anyhow::bail!(
            "no results at {}; run `rag-matrix evaluate` first",
            file.path().display()
        );
    }

    print!("{}", render_table(&store));
    if matrix {
        for metric in Metric::ALL {
            println!();
            print!("{}", render_matrix(&store, metric));
        }
    }
    Ok(())
}
