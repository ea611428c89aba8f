use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub file_path: String,
    pub page_label: String,
}

impl DocumentMetadata {
    /// Metadata lines prepended to node text when it is shown to the language model.
    pub fn render(&self) -> String {
        format!(
            "page_label: {}\nfile_name: {}",
            self.page_label, self.file_name
        )
    }
}

/// One loaded page of a source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextNode {
    pub node_id: String,
    pub doc_id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeWithScore {
    pub node: TextNode,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cache key for a built query engine: one per file name per session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileKey {
    pub session_id: SessionId,
    pub file_name: String,
}

impl FileKey {
    pub fn new(session_id: SessionId, file_name: impl Into<String>) -> Self {
        Self {
            session_id,
            file_name: file_name.into(),
        }
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.session_id, self.file_name)
    }
}

#[derive(Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn is_pdf(&self) -> bool {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 4_000,
            chunk_overlap_chars: 800,
        }
    }
}

/// Everything a query engine needs besides the credential.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub api_base: String,
    pub llm_model: String,
    pub embed_model: String,
    pub embed_input_type: String,
    pub embed_batch_size: usize,
    pub rerank_model: String,
    pub similarity_top_k: usize,
    pub rerank_top_n: usize,
    pub chunking: ChunkingOptions,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.cohere.ai".to_string(),
            llm_model: "command".to_string(),
            embed_model: "embed-english-v3.0".to_string(),
            embed_input_type: "search_query".to_string(),
            embed_batch_size: 96,
            rerank_model: "rerank-english-v2.0".to_string(),
            similarity_top_k: 2,
            rerank_top_n: 2,
            chunking: ChunkingOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_key_joins_session_and_name() {
        let id = SessionId::from(Uuid::nil());
        let key = FileKey::new(id, "doc.pdf");
        assert_eq!(
            key.to_string(),
            "00000000-0000-0000-0000-000000000000-doc.pdf"
        );
    }

    #[test]
    fn pdf_detection_ignores_case() {
        assert!(UploadedFile::new("Report.PDF", Vec::new()).is_pdf());
        assert!(!UploadedFile::new("notes.txt", Vec::new()).is_pdf());
        assert!(!UploadedFile::new("pdf", Vec::new()).is_pdf());
    }

    #[test]
    fn role_serializes_lowercase() -> Result<(), serde_json::Error> {
        let message = Message::user("hi");
        let value = serde_json::to_value(&message)?;
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "hi");
        Ok(())
    }
}
