use crate::cohere::CohereClient;
use crate::error::QueryError;
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Lazy, finite, single-pass sequence of answer fragments.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, QueryError>> + Send>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn stream_complete(&self, prompt: &str) -> Result<TokenStream, QueryError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatStreamEvent {
    event_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CohereLlm {
    client: CohereClient,
    model: String,
}

impl CohereLlm {
    pub fn new(client: CohereClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for CohereLlm {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_complete(&self, prompt: &str) -> Result<TokenStream, QueryError> {
        let request = ChatRequest {
            message: prompt,
            model: &self.model,
            stream: true,
        };
        let response = self.client.post("v1/chat", &request).await?;
        tracing::debug!(model = %self.model, "chat stream opened");
        Ok(decode_chat_stream(response.bytes_stream()))
    }
}

struct ChatStreamDecoder<S> {
    inner: Pin<Box<S>>,
    buffer: Vec<u8>,
    inner_done: bool,
    finished: bool,
}

impl<S, B, E> ChatStreamDecoder<S>
where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    async fn next_fragment(&mut self) -> Option<Result<String, QueryError>> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(position) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=position).collect();
                match self.handle_line(&line) {
                    Some(item) => return Some(item),
                    None => continue,
                }
            }

            if self.inner_done {
                self.finished = true;
                return Some(Err(QueryError::Stream(
                    "response ended before stream-end".to_string(),
                )));
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(error)) => {
                    self.finished = true;
                    return Some(Err(QueryError::Stream(error.to_string())));
                }
                None => {
                    self.inner_done = true;
                    if self.buffer.iter().any(|byte| !byte.is_ascii_whitespace()) {
                        self.buffer.push(b'\n');
                    }
                }
            }
        }
    }

    fn handle_line(&mut self, line: &[u8]) -> Option<Result<String, QueryError>> {
        let trimmed = String::from_utf8_lossy(line);
        let trimmed = trimmed.trim();
        if trimmed.is_empty() {
            return None;
        }

        let event: ChatStreamEvent = match serde_json::from_str(trimmed) {
            Ok(event) => event,
            Err(error) => {
                self.finished = true;
                return Some(Err(QueryError::Serialization(error)));
            }
        };

        match event.event_type.as_str() {
            "text-generation" => event.text.filter(|text| !text.is_empty()).map(Ok),
            "stream-end" => {
                self.finished = true;
                match event.finish_reason.as_deref() {
                    None | Some("COMPLETE") | Some("MAX_TOKENS") => None,
                    Some(reason) => Some(Err(QueryError::Stream(format!(
                        "generation stopped: {reason}"
                    )))),
                }
            }
            _ => None,
        }
    }
}

/// Turns a newline-delimited JSON chat event stream into text fragments.
pub fn decode_chat_stream<S, B, E>(bytes: S) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let decoder = ChatStreamDecoder {
        inner: Box::pin(bytes),
        buffer: Vec::new(),
        inner_done: false,
        finished: false,
    };

    Box::pin(stream::unfold(decoder, |mut decoder| async move {
        let item = decoder.next_fragment().await?;
        Some((item, decoder))
    }))
}

/// Wraps already-known fragments as a token stream.
pub fn fragments_stream<I>(fragments: I) -> TokenStream
where
    I: IntoIterator<Item = String>,
    I::IntoIter: Send + 'static,
{
    Box::pin(stream::iter(fragments.into_iter().map(Ok)))
}
