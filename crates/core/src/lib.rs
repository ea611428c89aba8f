pub mod chat;
pub mod chunking;
pub mod cohere;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod models;
pub mod preview;
pub mod prompt;
pub mod rerank;
pub mod session;
pub mod traits;

pub use chat::{
    abort_turn, begin_turn, finish_turn, record_context, reset_chat, stream_answer, ChatPhase,
    Render, StreamFailure, CURSOR,
};
pub use chunking::{build_nodes, normalize_whitespace, split_text, ChunkingConfig};
pub use cohere::CohereClient;
pub use embeddings::{CohereEmbedder, Embedder, HashingEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use engine::{
    CohereEngineBuilder, EngineBuilder, QueryEngine, QueryEngineOptions, StreamingResponse,
};
pub use error::{ChatError, IngestError, QueryError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::{SimpleVectorStore, VectorStoreIndex};
pub use ingest::{ingest_upload, IngestOutcome, SkipReason};
pub use llm::{decode_chat_stream, fragments_stream, CohereLlm, LanguageModel, TokenStream};
pub use loader::DirectoryLoader;
pub use models::{
    ChunkingOptions, Document, DocumentMetadata, EngineSettings, FileKey, Message, NodeWithScore,
    Role, SessionId, TextNode, UploadedFile,
};
pub use preview::{render_pdf_preview, Preview};
pub use prompt::{PromptTemplate, QA_PROMPT_TEMPLATE};
pub use rerank::{CohereRerank, NodePostprocessor};
pub use session::{SessionHandle, SessionRegistry, SessionState};
pub use traits::VectorStore;
