mod server;

use chrono::Utc;
use clap::builder::RangedU64ValueParser;
use clap::Parser;
use pdf_chat_core::{ChunkingOptions, CohereEngineBuilder, EngineSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-chat-server", version)]
struct Cli {
    /// Address the web UI and API listen on
    #[arg(long, env = "PDF_CHAT_BIND", default_value = "127.0.0.1:8501")]
    bind: SocketAddr,

    /// Cohere API base URL
    #[arg(long, env = "COHERE_API_BASE", default_value = "https://api.cohere.ai")]
    api_base: String,

    /// Generation model
    #[arg(long, env = "PDF_CHAT_LLM_MODEL", default_value = "command")]
    llm_model: String,

    /// Embedding model
    #[arg(long, env = "PDF_CHAT_EMBED_MODEL", default_value = "embed-english-v3.0")]
    embed_model: String,

    /// Embedding input type sent with every embed request
    #[arg(long, env = "PDF_CHAT_EMBED_INPUT_TYPE", default_value = "search_query")]
    embed_input_type: String,

    /// Rerank model
    #[arg(long, env = "PDF_CHAT_RERANK_MODEL", default_value = "rerank-english-v2.0")]
    rerank_model: String,

    /// Nodes fetched from the vector index per question.
    #[arg(long, default_value = "2", value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    similarity_top_k: usize,

    /// Nodes kept after reranking.
    #[arg(long, default_value = "2", value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    rerank_top_n: usize,

    /// Maximum characters per indexed chunk.
    #[arg(long, default_value = "4000")]
    chunk_max_chars: usize,

    /// Characters carried over between neighbouring chunks.
    #[arg(long, default_value = "800")]
    chunk_overlap_chars: usize,

    /// Largest accepted upload, in megabytes.
    #[arg(long, env = "PDF_CHAT_MAX_UPLOAD_MB", default_value = "200")]
    max_upload_mb: usize,

    /// Minutes a session may sit unused before it is dropped.
    #[arg(
        long,
        env = "PDF_CHAT_SESSION_TTL_MINS",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    session_ttl_mins: u64,
}

impl Cli {
    fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            api_base: self.api_base.clone(),
            llm_model: self.llm_model.clone(),
            embed_model: self.embed_model.clone(),
            embed_input_type: self.embed_input_type.clone(),
            rerank_model: self.rerank_model.clone(),
            similarity_top_k: self.similarity_top_k,
            rerank_top_n: self.rerank_top_n,
            chunking: ChunkingOptions {
                chunk_max_chars: self.chunk_max_chars,
                chunk_overlap_chars: self.chunk_overlap_chars,
            },
            ..EngineSettings::default()
        }
    }

    fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_mins.saturating_mul(60))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = cli.engine_settings();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        llm = %settings.llm_model,
        embed = %settings.embed_model,
        rerank = %settings.rerank_model,
        "pdf-chat-server boot"
    );

    let state = server::AppState::new(Arc::new(CohereEngineBuilder::new(settings)));
    let sweeper = state.sessions.clone().spawn_expiry(cli.session_ttl());
    let router = server::create_router(state, cli.max_upload_mb.saturating_mul(1024 * 1024));

    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    info!(addr = %cli.bind, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    sweeper.abort();
    Ok(())
}
