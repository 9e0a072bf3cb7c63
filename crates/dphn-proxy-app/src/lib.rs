use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use dphn_proxy_contracts::{
    ChatChoice, ChatCompletionResponse, ChatCompletionsRequest, ChatMessage, Usage,
};
use dphn_proxy_core::{
    ByteStream, ChatUpstream, CoreError, accumulate, normalize_request, observe_passthrough,
};
use dphn_proxy_upstream::{HttpClientError, UpstreamClient};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, debug, error, field, info, instrument};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod config;

const LIVENESS_TEXT: &str = "DPHN OpenAI Proxy is running.";
const MODEL_CREATED: i64 = 1_677_610_602;
const MODEL_OWNER: &str = "dphn";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
struct ModelEntry {
    id: String,
    object: String,
    created: i64,
    owned_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
struct ModelsResponse {
    object: String,
    data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub(crate) struct ErrorBody {
    pub(crate) message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub(crate) struct ErrorResponse {
    pub(crate) error: ErrorBody,
}

/// Upstream failure as seen by the client: the upstream status is reused and
/// its raw body travels in `details`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
struct UpstreamErrorResponse {
    error: String,
    details: String,
    code: u16,
}

#[derive(OpenApi)]
#[openapi(
    paths(get_root, get_models, post_chat_completions),
    components(
        schemas(
            ModelEntry,
            ModelsResponse,
            ErrorBody,
            ErrorResponse,
            UpstreamErrorResponse,
            ChatMessage,
            ChatCompletionsRequest,
            ChatCompletionResponse,
            ChatChoice,
            Usage
        )
    ),
    tags(
        (name = "dphn-proxy", description = "OpenAI-compatible proxy API")
    )
)]
struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    upstream: Arc<dyn ChatUpstream>,
    api_key: Arc<str>,
    models: Arc<[String]>,
}

impl AppState {
    pub fn from_config(config: &config::AppConfig) -> Result<Self, HttpClientError> {
        let client = UpstreamClient::new(config.upstream_url.clone(), config.upstream_timeout)?;
        debug!(event = "upstream.client.ready", url = client.url());
        Ok(Self::with_upstream(config, Arc::new(client)))
    }

    pub fn with_upstream(config: &config::AppConfig, upstream: Arc<dyn ChatUpstream>) -> Self {
        Self {
            upstream,
            api_key: Arc::from(config.api_key.as_str()),
            models: Arc::from(config.supported_models.clone()),
        }
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }

    fn primary_model(&self) -> &str {
        self.models.first().map(String::as_str).unwrap_or(config::DEFAULT_SUPPORTED_MODELS[0])
    }
}

pub fn build_router(state: AppState) -> Router {
    // `layer` rather than `route_layer`: the gate covers every `/v1` path,
    // unknown ones included.
    let v1 = Router::new()
        .route("/models", get(get_models))
        .route("/chat/completions", post(post_chat_completions))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer));

    Router::new()
        .route("/", get(get_root))
        .nest("/v1", v1)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Liveness text", body = String, content_type = "text/plain")),
    tag = "dphn-proxy"
)]
async fn get_root() -> &'static str {
    LIVENESS_TEXT
}

#[utoipa::path(
    get,
    path = "/v1/models",
    responses(
        (status = 200, description = "OpenAI-compatible model list", body = ModelsResponse),
        (status = 401, description = "Missing or wrong bearer token", body = ErrorResponse)
    ),
    tag = "dphn-proxy"
)]
async fn get_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let data = state
        .models
        .iter()
        .map(|id| ModelEntry {
            id: id.clone(),
            object: "model".to_string(),
            created: MODEL_CREATED,
            owned_by: MODEL_OWNER.to_string(),
        })
        .collect::<Vec<_>>();
    Json(ModelsResponse { object: "list".to_string(), data })
}

#[utoipa::path(
    post,
    path = "/v1/chat/completions",
    request_body = ChatCompletionsRequest,
    responses(
        (status = 200, description = "Completion document, or an SSE stream when `stream` is true", body = ChatCompletionResponse),
        (status = 401, description = "Missing or wrong bearer token", body = ErrorResponse),
        (status = 500, description = "Malformed request or upstream unreachable", body = ErrorResponse),
        (status = "default", description = "Upstream error, relayed with the upstream status", body = UpstreamErrorResponse)
    ),
    tag = "dphn-proxy"
)]
#[instrument(skip_all, fields(model = field::Empty, stream = field::Empty))]
async fn post_chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match serde_json::from_slice::<ChatCompletionsRequest>(&body) {
        Ok(request) => request,
        Err(err) => return error_response(CoreError::InvalidRequest(err.to_string())),
    };
    let stream = request.is_stream();
    let upstream_request = normalize_request(&request, state.primary_model());

    let span = Span::current();
    span.record("model", upstream_request.model.as_str());
    span.record("stream", stream);
    info!(
        event = "chat.request.received",
        model = %upstream_request.model,
        stream,
        messages = upstream_request.messages.len()
    );

    let upstream_body = match state.upstream.dispatch(&upstream_request).await {
        Ok(body) => body,
        Err(err) => return error_response(err),
    };

    if stream {
        return event_stream_response(observe_passthrough(upstream_body, upstream_request.model));
    }

    let result = accumulate(upstream_body).await;
    let response = ChatCompletionResponse::assistant(
        completion_id(),
        unix_now_secs(),
        upstream_request.model,
        result.content,
        result.finish_reason,
    );
    Json(response).into_response()
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse { error: ErrorBody { message: "Not Found".to_string() } }),
    )
        .into_response()
}

fn event_stream_response(body: ByteStream) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

fn error_response(err: CoreError) -> Response {
    match err {
        CoreError::Upstream { status, body } => {
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (
                code,
                Json(UpstreamErrorResponse {
                    error: "Upstream error".to_string(),
                    details: body,
                    code: status,
                }),
            )
                .into_response()
        }
        other => {
            error!(event = "chat.request.failed", error = %other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { error: ErrorBody { message: other.to_string() } }),
            )
                .into_response()
        }
    }
}

fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

fn unix_now_secs() -> i64 {
    let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    duration.as_secs() as i64
}
