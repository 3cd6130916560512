use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use copilot_flow::{
    FlowError, InMemorySessionStorage, Interaction, Session, SessionStorage, TurnResult,
    TurnRunner, TurnState,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};

use crate::{
    agent::CopilotAgent,
    config::ServiceConfig,
    models::{EmailUpdateRequest, MessageRequest, RecordSearchQuery, ReportUpdateRequest},
    prompts::GREETING,
    records::RecordTable,
    tools::{Toolkit, Transcriber, TranscriptionError},
    workflow::{self, Stage},
    workstation::Workstation,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

/// Recorded dictations can be far larger than axum's default body limit.
const MAX_DICTATION_BYTES: usize = 25 * 1024 * 1024;

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn flow_error(e: FlowError) -> ApiError {
    match e {
        FlowError::SessionNotFound(id) => not_found_error("Session not found", &id),
        FlowError::TurnInProgress(id) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "A message is already being processed",
                "session_id": id
            })),
        ),
        FlowError::EmptyMessage => bad_request_error("Message content is required"),
        other => {
            error!("Turn failed: {}", other);
            internal_error("Failed to process message", &other.to_string())
        }
    }
}

fn transcription_error(e: TranscriptionError) -> ApiError {
    let status = match e {
        TranscriptionError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
        TranscriptionError::InvalidAudio(_) => StatusCode::BAD_REQUEST,
        TranscriptionError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        TranscriptionError::Transport(_) | TranscriptionError::HttpStatus { .. } => {
            StatusCode::BAD_GATEWAY
        }
    };
    warn!("Dictation failed: {}", e);
    (
        status,
        Json(json!({
            "error": "Transcription failed",
            "details": e.to_string()
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub session_storage: Arc<dyn SessionStorage>,
    pub turn_runner: TurnRunner,
    pub toolkit: Arc<Toolkit>,
    pub transcriber: Arc<Transcriber>,
}

pub fn create_app(config: &ServiceConfig) -> Router {
    build_router(create_app_state(config))
}

fn create_app_state(config: &ServiceConfig) -> AppState {
    let http = reqwest::Client::new();
    let toolkit = Arc::new(Toolkit::from_config(config, http.clone()));
    let session_storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());

    let agent = CopilotAgent::new(
        config.openrouter_api_key.clone(),
        config.agent_model.clone(),
        toolkit.clone(),
    );
    let turn_runner = TurnRunner::new(Arc::new(agent), session_storage.clone());

    let transcriber = Transcriber::new(
        http,
        config.transcription_url.clone(),
        config.openai_api_key.clone(),
        config.max_audio_duration,
    );

    AppState {
        session_storage,
        turn_runner,
        toolkit,
        transcriber: Arc::new(transcriber),
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route("/sessions/{session_id}", get(get_session))
        .route("/sessions/{session_id}/messages", post(send_message))
        .route(
            "/sessions/{session_id}/dictation",
            post(send_dictation).layer(DefaultBodyLimit::max(MAX_DICTATION_BYTES)),
        )
        .route(
            "/sessions/{session_id}/report",
            get(get_report).put(update_report),
        )
        .route(
            "/sessions/{session_id}/notification-email",
            get(get_notification_email).put(update_notification_email),
        )
        .route("/sessions/{session_id}/cases/{case_id}", post(load_case))
        .route("/cases", get(list_cases))
        .route("/records/search", get(search_records))
        .route("/records/{study_id}/chart", get(get_chart))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tag every request, and everything logged while serving it, with a correlation id.
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Radiology Copilot Service",
        "version": "1.0.0",
        "description": "Conversational copilot for chest radiograph reading, reporting and critical findings notification",
        "endpoints": {
            "POST /sessions": "Start a new copilot session",
            "GET /sessions/{session_id}": "Conversation and workstation state",
            "POST /sessions/{session_id}/messages": "Send a message to the copilot",
            "POST /sessions/{session_id}/dictation": "Send a WAV dictation to the copilot",
            "GET|PUT /sessions/{session_id}/report": "Read or edit the current report",
            "GET|PUT /sessions/{session_id}/notification-email": "Read or change the notification address",
            "POST /sessions/{session_id}/cases/{case_id}": "Open a case on the workstation",
            "GET /cases": "Available cases",
            "GET /records/search?kind=&query=": "Search clinical records by Study ID or Patient MRN",
            "GET /records/{study_id}/chart": "Clinical history of a study",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn load_session(state: &AppState, session_id: &str) -> Result<Session, ApiError> {
    match state.session_storage.get(session_id).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(not_found_error("Session not found", session_id)),
        Err(e) => {
            error!("Failed to load session {}: {}", session_id, e);
            Err(internal_error("Failed to load session", &e.to_string()))
        }
    }
}

/// A session that may take new input: edits and dictations are refused while a
/// turn is in flight, the same way a second message is.
async fn load_idle_session(state: &AppState, session_id: &str) -> Result<Session, ApiError> {
    let session = load_session(state, session_id).await?;
    if session.state() == TurnState::Processing {
        warn!("Session {} is busy, input refused", session_id);
        return Err(flow_error(FlowError::TurnInProgress(session_id.to_string())));
    }
    Ok(session)
}

async fn create_session(State(state): State<AppState>) -> ApiResult<Value> {
    let session = Session::new(uuid::Uuid::new_v4().to_string());
    session
        .context
        .push_interaction(Interaction::assistant(GREETING))
        .await;
    let session_id = session.id.clone();

    state.session_storage.save(session).await.map_err(|e| {
        error!("Failed to create session: {}", e);
        internal_error("Failed to create session", &e.to_string())
    })?;

    info!("Session {} created", session_id);
    Ok(Json(json!({
        "session_id": session_id,
        "greeting": GREETING
    })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    let session = load_session(&state, &session_id).await?;
    let station = Workstation::new(session.context.clone());

    Ok(Json(json!({
        "session_id": session.id,
        "created_at": session.created_at.to_rfc3339(),
        "state": session.state(),
        "interactions": session.context.interactions().await,
        "workstation": station.snapshot().await,
    })))
}

async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<TurnResult> {
    info!("Message received for session {}", session_id);
    state
        .turn_runner
        .submit(&session_id, &request.content)
        .await
        .map(Json)
        .map_err(flow_error)
}

async fn send_dictation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> ApiResult<Value> {
    if body.is_empty() {
        return Err(bad_request_error("Audio body is required"));
    }
    load_idle_session(&state, &session_id).await?;

    let transcript = state
        .transcriber
        .transcribe(&body)
        .await
        .map_err(transcription_error)?;

    let turn = state
        .turn_runner
        .submit(&session_id, &transcript)
        .await
        .map_err(flow_error)?;

    Ok(Json(json!({
        "transcript": transcript,
        "turn": turn
    })))
}

async fn get_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    let session = load_session(&state, &session_id).await?;
    let station = Workstation::new(session.context);
    Ok(Json(json!({
        "report": station.report().await,
        "stage": station.stage().await
    })))
}

/// Manual edit from the report pane. Last writer wins.
async fn update_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ReportUpdateRequest>,
) -> ApiResult<Value> {
    let session = load_idle_session(&state, &session_id).await?;
    let station = Workstation::new(session.context);

    station.set_report(request.text.clone()).await;
    if !request.text.trim().is_empty() {
        workflow::advance(&station, Stage::Reported).await;
    }
    info!("Report edited manually for session {}", session_id);

    Ok(Json(json!({
        "report": request.text,
        "stage": station.stage().await
    })))
}

async fn get_notification_email(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    let session = load_session(&state, &session_id).await?;
    let station = Workstation::new(session.context);
    Ok(Json(json!({
        "email": state.toolkit.notifier.get_email(&station).await
    })))
}

async fn update_notification_email(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<EmailUpdateRequest>,
) -> ApiResult<Value> {
    let session = load_idle_session(&state, &session_id).await?;
    let station = Workstation::new(session.context);

    if !state.toolkit.notifier.set_email(&station, &request.email).await {
        return Err(bad_request_error("invalid_email"));
    }
    Ok(Json(json!({
        "email": state.toolkit.notifier.get_email(&station).await
    })))
}

async fn load_case(
    State(state): State<AppState>,
    Path((session_id, case_id)): Path<(String, u32)>,
) -> ApiResult<Value> {
    let session = load_idle_session(&state, &session_id).await?;
    let Some(case) = state.toolkit.cases.get(case_id) else {
        return Err(not_found_error("Case not found", &case_id.to_string()));
    };

    let station = Workstation::new(session.context);
    station.open_case(case).await;
    info!("Case {} opened in session {}", case_id, session_id);

    Ok(Json(json!({
        "case": case,
        "workstation": station.snapshot().await
    })))
}

async fn list_cases(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "cases": state.toolkit.cases.all() }))
}

async fn search_records(
    State(state): State<AppState>,
    Query(query): Query<RecordSearchQuery>,
) -> ApiResult<RecordTable> {
    Ok(Json(
        state
            .toolkit
            .records
            .search_by_label(&query.kind, &query.query),
    ))
}

async fn get_chart(
    State(state): State<AppState>,
    Path(study_id): Path<u32>,
) -> ApiResult<Value> {
    match state.toolkit.records.chart_markdown(study_id) {
        Some(markdown) => Ok(Json(json!({
            "study_id": study_id,
            "clinical_history": markdown
        }))),
        None => Err(not_found_error("No clinical data for study", &study_id.to_string())),
    }
}
