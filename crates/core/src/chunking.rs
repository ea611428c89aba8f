use crate::error::IngestError;
use crate::models::{ChunkingOptions, Document, TextNode};
use regex::Regex;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl From<ChunkingOptions> for ChunkingConfig {
    fn from(value: ChunkingOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

impl ChunkingConfig {
    fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_sentences(text: &str) -> Result<Vec<String>, IngestError> {
    let sentence_re = Regex::new(r"[^.!?]+[.!?]*\s*|[.!?]+\s*")?;
    Ok(sentence_re
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|sentence| !sentence.is_empty())
        .collect())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Trailing `overlap` characters of `chunk`, starting on a word boundary.
fn overlap_tail(chunk: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }

    let chars: Vec<char> = chunk.chars().collect();
    if chars.len() <= overlap {
        return chunk.to_string();
    }

    let tail: String = chars[chars.len() - overlap..].iter().collect();
    match tail.find(' ') {
        Some(position) => tail[position + 1..].to_string(),
        None => tail,
    }
}

fn hard_split(sentence: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = sentence.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        pieces.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        start = start.saturating_add(config.max_chars.saturating_sub(config.overlap_chars));
    }
    pieces
}

pub fn split_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(&normalized)? {
        if char_len(&sentence) > config.max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(hard_split(&sentence, config));
            continue;
        }

        if current.is_empty() {
            current = sentence;
            continue;
        }

        if char_len(&current) + 1 + char_len(&sentence) <= config.max_chars {
            current.push(' ');
            current.push_str(&sentence);
            continue;
        }

        let tail = overlap_tail(&current, config.overlap_chars);
        chunks.push(std::mem::take(&mut current));
        if !tail.is_empty() && char_len(&tail) + 1 + char_len(&sentence) <= config.max_chars {
            current.push_str(&tail);
            current.push(' ');
        }
        current.push_str(&sentence);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    Ok(chunks)
}

pub fn build_nodes(
    documents: &[Document],
    options: ChunkingOptions,
) -> Result<Vec<TextNode>, IngestError> {
    let config = ChunkingConfig::from(options);
    let mut nodes = Vec::new();

    for document in documents {
        for (index, text) in split_text(&document.text, config)?.into_iter().enumerate() {
            nodes.push(TextNode {
                node_id: make_node_id(&document.doc_id, index, &text),
                doc_id: document.doc_id.clone(),
                text,
                metadata: document.metadata.clone(),
            });
        }
    }

    Ok(nodes)
}

fn make_node_id(doc_id: &str, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(doc_id.as_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
