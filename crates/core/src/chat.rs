use crate::engine::{QueryEngine, StreamingResponse};
use crate::error::{ChatError, QueryError};
use crate::llm::TokenStream;
use crate::models::Message;
use crate::session::SessionState;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;

pub const CURSOR: &str = "▌";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    Idle,
    AwaitingInput,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Render {
    /// Text so far with the cursor marker appended.
    Partial(String),
    Final(String),
}

/// A failed stream together with whatever text arrived before the failure.
#[derive(Debug)]
pub struct StreamFailure {
    pub partial: String,
    pub error: QueryError,
}

/// Clears history and context. Refused while an answer is still streaming into the history.
pub fn reset_chat(state: &mut SessionState) -> Result<(), ChatError> {
    if state.phase == ChatPhase::Streaming {
        return Err(ChatError::TurnInProgress);
    }
    state.messages.clear();
    state.context = None;
    state.phase = ChatPhase::Idle;
    Ok(())
}

/// Records the user's message and hands back the engine that should answer it.
pub fn begin_turn(state: &mut SessionState, prompt: &str) -> Result<Arc<QueryEngine>, ChatError> {
    if state.phase == ChatPhase::Streaming {
        return Err(ChatError::TurnInProgress);
    }
    if prompt.trim().is_empty() {
        return Err(ChatError::EmptyPrompt);
    }
    let engine = state.active_engine().ok_or(ChatError::NoActiveDocument)?;

    state.messages.push(Message::user(prompt));
    state.phase = ChatPhase::Streaming;
    Ok(engine)
}

pub fn record_context(state: &mut SessionState, response: &StreamingResponse) {
    state.context = Some(response.source_nodes.clone());
}

pub fn finish_turn(state: &mut SessionState, answer: impl Into<String>) {
    state.messages.push(Message::assistant(answer));
    state.phase = ChatPhase::AwaitingInput;
}

pub fn abort_turn(state: &mut SessionState) {
    state.phase = ChatPhase::AwaitingInput;
}

/// Drains `stream` to completion, rendering the running buffer after every fragment.
pub async fn stream_answer<F>(mut stream: TokenStream, mut render: F) -> Result<String, StreamFailure>
where
    F: FnMut(Render),
{
    let mut buffer = String::new();

    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(text) => {
                buffer.push_str(&text);
                render(Render::Partial(format!("{buffer}{CURSOR}")));
            }
            Err(error) => {
                return Err(StreamFailure {
                    partial: buffer,
                    error,
                })
            }
        }
    }

    render(Render::Final(buffer.clone()));
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{scripted_engine, ScriptedLlm};
    use crate::engine::QueryEngineOptions;
    use crate::llm::fragments_stream;
    use crate::models::{FileKey, Role, SessionId};
    use futures::stream;

    async fn ready_session(fragments: &[&str]) -> SessionState {
        let mut state = SessionState::new(SessionId::new());
        let engine = scripted_engine(
            Arc::new(ScriptedLlm::new(fragments)),
            QueryEngineOptions {
                streaming: true,
                ..Default::default()
            },
        )
        .await;
        let key = FileKey::new(state.id(), "doc.pdf");
        state.file_cache.insert(key.clone(), Arc::new(engine));
        state.active_file = Some(key);
        state
    }

    #[tokio::test]
    async fn fragments_concatenate_in_order() {
        let mut renders = Vec::new();
        let stream = fragments_stream(["Hel", "lo", " world"].map(String::from));

        let answer = stream_answer(stream, |render| renders.push(render))
            .await
            .unwrap();

        assert_eq!(answer, "Hello world");
        assert_eq!(
            renders,
            vec![
                Render::Partial("Hel▌".to_string()),
                Render::Partial("Hello▌".to_string()),
                Render::Partial("Hello world▌".to_string()),
                Render::Final("Hello world".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn empty_stream_renders_empty_final() {
        let mut renders = Vec::new();
        let answer = stream_answer(fragments_stream(Vec::new()), |render| renders.push(render))
            .await
            .unwrap();
        assert_eq!(answer, "");
        assert_eq!(renders, vec![Render::Final(String::new())]);
    }

    #[tokio::test]
    async fn failure_keeps_partial_text() {
        let stream: TokenStream = Box::pin(stream::iter(vec![
            Ok("par".to_string()),
            Err(QueryError::Stream("reset".to_string())),
            Ok("never".to_string()),
        ]));

        let mut renders = Vec::new();
        let failure = stream_answer(stream, |render| renders.push(render))
            .await
            .unwrap_err();

        assert_eq!(failure.partial, "par");
        assert_eq!(renders.len(), 1);
    }

    #[tokio::test]
    async fn full_turn_appends_user_then_assistant() {
        let mut state = ready_session(&["Hel", "lo", " world"]).await;
        let before = state.messages().len();

        let engine = begin_turn(&mut state, "What is X?").unwrap();
        assert_eq!(state.phase(), ChatPhase::Streaming);

        let response = engine.query("What is X?").await.unwrap();
        record_context(&mut state, &response);
        let answer = stream_answer(response.response_gen, |_| {}).await.unwrap();
        finish_turn(&mut state, answer);

        let messages = state.messages();
        assert_eq!(messages.len(), before + 2);
        assert_eq!(messages[before].role, Role::User);
        assert_eq!(messages[before].content, "What is X?");
        assert_eq!(messages[before + 1].role, Role::Assistant);
        assert_eq!(messages[before + 1].content, "Hello world");
        assert_eq!(state.phase(), ChatPhase::AwaitingInput);
        assert!(state.context().is_some());
    }

    #[tokio::test]
    async fn reset_clears_history_and_context() {
        let mut state = ready_session(&["ok"]).await;
        begin_turn(&mut state, "hi").unwrap();
        finish_turn(&mut state, "ok");
        state.context = Some(Vec::new());

        reset_chat(&mut state).unwrap();

        assert!(state.messages().is_empty());
        assert!(state.context().is_none());
        assert_eq!(state.phase(), ChatPhase::Idle);
        assert_eq!(state.cache_len(), 1);
    }

    #[tokio::test]
    async fn reset_on_fresh_session_is_harmless() {
        let mut state = SessionState::new(SessionId::new());
        reset_chat(&mut state).unwrap();
        assert!(state.messages().is_empty());
        assert!(state.context().is_none());
    }

    #[test]
    fn turn_requires_an_active_document() {
        let mut state = SessionState::new(SessionId::new());
        let result = begin_turn(&mut state, "hello");
        assert!(matches!(result, Err(ChatError::NoActiveDocument)));
        assert!(state.messages().is_empty());
    }

    #[tokio::test]
    async fn second_turn_is_rejected_while_streaming() {
        let mut state = ready_session(&["ok"]).await;
        begin_turn(&mut state, "first").unwrap();

        let result = begin_turn(&mut state, "second");
        assert!(matches!(result, Err(ChatError::TurnInProgress)));
        assert_eq!(state.messages().len(), 1);

        abort_turn(&mut state);
        assert_eq!(state.phase(), ChatPhase::AwaitingInput);
        assert_eq!(state.messages().len(), 1);
    }

    #[tokio::test]
    async fn reset_is_refused_mid_stream() {
        let mut state = ready_session(&["Hel", "lo"]).await;
        let engine = begin_turn(&mut state, "What is X?").unwrap();

        let result = reset_chat(&mut state);
        assert!(matches!(result, Err(ChatError::TurnInProgress)));
        assert!(matches!(
            begin_turn(&mut state, "second question"),
            Err(ChatError::TurnInProgress)
        ));

        let response = engine.query("What is X?").await.unwrap();
        record_context(&mut state, &response);
        let answer = stream_answer(response.response_gen, |_| {}).await.unwrap();
        finish_turn(&mut state, answer);

        let history: Vec<(Role, &str)> = state
            .messages()
            .iter()
            .map(|message| (message.role, message.content.as_str()))
            .collect();
        assert_eq!(
            history,
            vec![(Role::User, "What is X?"), (Role::Assistant, "Hello")]
        );

        reset_chat(&mut state).unwrap();
        assert!(state.messages().is_empty());
        assert!(state.context().is_none());
        assert_eq!(state.phase(), ChatPhase::Idle);
    }
}
