use axum::{
    Json,
    extract::{OriginalUri, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{AppState, ErrorBody, ErrorResponse};

/// Gate for `/v1/*`: only `Authorization: Bearer <API_KEY>` gets through.
pub async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let matches = bearer_token(request.headers()).map(|token| token == state.api_key());
    match matches {
        Some(true) => next.run(request).await,
        presented => {
            let path = request
                .extensions()
                .get::<OriginalUri>()
                .map_or_else(|| request.uri().path(), |uri| uri.path());
            warn!(
                event = "auth.rejected",
                path = %path,
                reason = if presented.is_some() { "mismatch" } else { "missing" }
            );
            unauthorized()
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|token| !token.is_empty())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))],
        Json(ErrorResponse { error: ErrorBody { message: "Unauthorized".to_string() } }),
    )
        .into_response()
}
