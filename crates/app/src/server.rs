use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use pdf_chat_core::{
    abort_turn, begin_turn, finish_turn, ingest_upload, record_context, render_pdf_preview,
    reset_chat, stream_answer, ChatError, ChatPhase, DirectoryLoader, EngineBuilder, FileKey,
    IngestOutcome, Message, Preview, Render, SessionHandle, SessionId, SessionRegistry,
    SkipReason, UploadedFile,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("../assets/index.html");

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub loader: DirectoryLoader,
    pub builder: Arc<dyn EngineBuilder>,
}

impl AppState {
    pub fn new(builder: Arc<dyn EngineBuilder>) -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::new()),
            loader: DirectoryLoader::pdf(),
            builder,
        }
    }

    async fn session(&self, id: Uuid) -> Result<SessionHandle, ApiError> {
        self.sessions
            .get(SessionId::from(id))
            .await
            .ok_or_else(|| ApiError::NotFound(format!("unknown session {id}")))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    UnprocessableEntity(String),
    BadGateway(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::UnprocessableEntity(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity", msg)
            }
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "bad_gateway", msg),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        match error {
            ChatError::EmptyPrompt => ApiError::BadRequest(error.to_string()),
            ChatError::NoActiveDocument | ChatError::TurnInProgress => {
                ApiError::Conflict(error.to_string())
            }
            ChatError::Query(_) => ApiError::BadGateway(error.to_string()),
        }
    }
}

pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    let api = Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id", delete(close_session))
        .route(
            "/sessions/:id/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/sessions/:id/preview", get(preview))
        .route("/sessions/:id/messages", get(messages))
        .route("/sessions/:id/reset", post(reset))
        .route("/sessions/:id/chat", post(chat));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.sessions.len().await,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: SessionId,
}

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Json<SessionResponse> {
    let requested = body.and_then(|Json(request)| request.session_id);
    let (session_id, _) = state.sessions.open(requested.map(SessionId::from)).await;
    Json(SessionResponse { session_id })
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.close(SessionId::from(id)).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("unknown session {id}")))
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadResponse {
    Skipped { reason: SkipReason },
    Ready { file_key: String, cached: bool, message: String },
}

async fn upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let handle = state.session(id).await?;

    let mut credential = String::new();
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::BadRequest(error.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("api_key") => {
                credential = field
                    .text()
                    .await
                    .map_err(|error| ApiError::BadRequest(error.to_string()))?;
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|error| ApiError::BadRequest(error.to_string()))?;
                if !file_name.is_empty() {
                    file = Some(UploadedFile::new(file_name, bytes.to_vec()));
                }
            }
            _ => {}
        }
    }

    let mut session = handle.lock().await;
    let outcome = ingest_upload(
        &mut session,
        file,
        &credential,
        &state.loader,
        state.builder.as_ref(),
    )
    .await
    .map_err(|error| {
        warn!(session_id = %id, %error, "ingestion failed");
        ApiError::UnprocessableEntity(format!("An error occurred: {error}"))
    })?;

    Ok(Json(match outcome {
        IngestOutcome::Skipped(reason) => UploadResponse::Skipped { reason },
        IngestOutcome::Ready { key, cached } => {
            info!(file_key = %key, cached, "document ready");
            UploadResponse::Ready {
                file_key: key.to_string(),
                cached,
                message: "Ready to Chat!".to_string(),
            }
        }
    }))
}

async fn preview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Preview>, ApiError> {
    let handle = state.session(id).await?;
    let session = handle.lock().await;
    Ok(Json(render_pdf_preview(session.uploaded_file())))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub phase: ChatPhase,
    pub active_file: Option<FileKey>,
    pub messages: Vec<Message>,
}

async fn history(handle: &SessionHandle) -> HistoryResponse {
    let session = handle.lock().await;
    HistoryResponse {
        phase: session.phase(),
        active_file: session.active_file().cloned(),
        messages: session.messages().to_vec(),
    }
}

async fn messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let handle = state.session(id).await?;
    Ok(Json(history(&handle).await))
}

async fn reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let handle = state.session(id).await?;
    reset_chat(&mut *handle.lock().await)?;
    Ok(Json(history(&handle).await))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
struct TextPayload<'a> {
    text: &'a str,
}

fn text_event(name: &str, text: &str) -> Event {
    let data = serde_json::to_string(&TextPayload { text }).unwrap_or_default();
    Event::default().event(name).data(data)
}

async fn chat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let handle = state.session(id).await?;
    let engine = begin_turn(&mut *handle.lock().await, &request.prompt)?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let response = match engine.query(&request.prompt).await {
            Ok(response) => response,
            Err(error) => {
                warn!(session_id = %id, %error, "query failed");
                abort_turn(&mut *handle.lock().await);
                let _ = tx.send(text_event("error", &error.to_string()));
                return;
            }
        };
        record_context(&mut *handle.lock().await, &response);

        let render_tx = tx.clone();
        let result = stream_answer(response.response_gen, move |render| {
            let event = match &render {
                Render::Partial(text) => text_event("render", text),
                Render::Final(text) => text_event("done", text),
            };
            let _ = render_tx.send(event);
        })
        .await;

        let mut session = handle.lock().await;
        match result {
            Ok(answer) => finish_turn(&mut session, answer),
            Err(failure) => {
                warn!(
                    session_id = %id,
                    error = %failure.error,
                    partial_len = failure.partial.len(),
                    "answer stream failed"
                );
                abort_turn(&mut session);
                let _ = tx.send(text_event("error", &failure.error.to_string()));
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
