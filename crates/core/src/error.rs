use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("could not find the uploaded file at {}", .0.display())]
    MissingUpload(PathBuf),

    #[error("no documents could be loaded from {}", .0.display())]
    NoDocuments(PathBuf),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("loader task failed: {0}")]
    Loader(String),

    #[error("query engine build failed: {0}")]
    Build(#[from] QueryError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid response from {provider}: {details}")]
    ProviderResponse { provider: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("query failed: {0}")]
    Request(String),

    #[error("response stream failed: {0}")]
    Stream(String),

    #[error("index is empty: {0}")]
    EmptyIndex(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no document is ready to chat with; upload a pdf first")]
    NoActiveDocument,

    #[error("an answer is still streaming for this session")]
    TurnInProgress,

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error(transparent)]
    Query(#[from] QueryError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
