//! HTTP request handlers
//!
//! Implementation of the resolve, introspection and cache endpoints.

use crate::{
    Error,
    error::{ResolveError, format_error_for_logging, public_message},
    server::app::AppState,
    service::Resolution,
    types::{
        ErrorResponse, HealthResponse, PingResponse, ResolveOptions, ResolveQuery, VideoId,
        clamp_max_height,
    },
    utils::{memory, version},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::future::Future;

/// Cache status of the answer: `HIT`, `MISS` or `COALESCED`
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
/// Profile whose answer was served
pub const X_RESOLVER_CLIENT: HeaderName = HeaderName::from_static("x-resolver-client");

/// Ceiling used by `/api/redirect`
const REDIRECT_MAX_HEIGHT: u32 = 480;

/// Error wrapper rendering the JSON error body with the right status
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    code: Option<&'static str>,
}

impl ApiError {
    /// Malformed video identifier
    pub fn invalid_id(error: Error) -> Self {
        Self {
            error,
            code: Some("INVALID_ID"),
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.error {
            Error::Resolve(e) => match e {
                ResolveError::AuthRequired { .. } => StatusCode::FORBIDDEN,
                ResolveError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                ResolveError::InvalidOutput { .. } | ResolveError::NoUsableResult { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                ResolveError::SpawnFailure { .. } | ResolveError::Terminated => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Overloaded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl<E: Into<Error>> From<E> for ApiError {
    fn from(error: E) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(details = %format_error_for_logging(&self.error), "Request failed");
        } else {
            tracing::warn!(details = %format_error_for_logging(&self.error), "Request rejected");
        }

        let message = public_message(&self.error);
        let body = match self.code.or_else(|| self.error.code()) {
            Some(code) => ErrorResponse::with_code(message, code),
            None => ErrorResponse::new(message),
        };

        let mut response = (status, Json(body)).into_response();
        if let Error::Overloaded { retry_after, .. } = &self.error {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
        }
        response
    }
}

/// Validate the identifier and query
fn prepare(
    state: &AppState,
    raw_id: &str,
    query: &ResolveQuery,
) -> Result<(VideoId, ResolveOptions), ApiError> {
    let video_id = VideoId::parse(raw_id).map_err(ApiError::invalid_id)?;
    let options = ResolveOptions::from_query(query, state.service.default_profiles())?;
    Ok((video_id, options))
}

/// Turn callers away when overloaded, unless the answer needs no new work
fn admit(state: &AppState, warm: bool) -> Result<(), ApiError> {
    if !warm && state.service.is_overloaded() {
        return Err(Error::overloaded(
            state.service.queued(),
            state.settings.gate.retry_after_secs,
        )
        .into());
    }
    Ok(())
}

/// Bound a resolution by the configured request timeout
///
/// The underlying work keeps running for coalesced callers.
async fn within_deadline<T>(
    state: &AppState,
    work: impl Future<Output = Result<T, ResolveError>>,
) -> Result<T, ApiError> {
    let limit = state.settings.server.timeout;
    match tokio::time::timeout(limit, work).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ResolveError::timeout(limit.as_secs()).into()),
    }
}

fn resolution_headers<T>(resolution: &Resolution<T>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(X_CACHE, HeaderValue::from_static(resolution.cache.as_str()));
    if let Ok(value) = HeaderValue::from_str(resolution.profile.as_str()) {
        headers.insert(X_RESOLVER_CLIENT, value);
    }
    headers
}

/// Formats listing endpoint
///
/// GET /api/formats/{video_id}
///
/// Returns the normalized video and audio formats.
pub async fn formats(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(query): Query<ResolveQuery>,
) -> Result<Response, ApiError> {
    let (video_id, options) = prepare(&state, &raw_id, &query)?;
    admit(&state, state.service.formats_warm(&video_id, &options))?;
    let resolution = within_deadline(&state, state.service.formats(&video_id, &options)).await?;

    tracing::info!(
        "Formats for {} served ({}, client {})",
        video_id,
        resolution.cache.as_str(),
        resolution.profile
    );
    let headers = resolution_headers(&resolution);
    Ok((headers, Json(resolution.value.normalized.as_ref())).into_response())
}

/// Redirect endpoint
///
/// GET /api/redirect/{video_id}
///
/// Redirects to the best muxed stream at or under 480p.
pub async fn redirect(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(query): Query<ResolveQuery>,
) -> Result<Response, ApiError> {
    redirect_under(state, &raw_id, &query, REDIRECT_MAX_HEIGHT).await
}

/// Ranked redirect endpoint
///
/// GET /api/best/{video_id}?max_height=N
///
/// `max_height` is clamped to the accepted range and defaults to 720.
pub async fn best(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(query): Query<ResolveQuery>,
) -> Result<Response, ApiError> {
    let max_height = clamp_max_height(query.max_height.as_deref());
    redirect_under(state, &raw_id, &query, max_height).await
}

async fn redirect_under(
    state: AppState,
    raw_id: &str,
    query: &ResolveQuery,
    max_height: u32,
) -> Result<Response, ApiError> {
    let (video_id, options) = prepare(&state, raw_id, query)?;
    admit(
        &state,
        state.service.url_warm(&video_id, max_height, &options),
    )?;
    let resolution = within_deadline(
        &state,
        state.service.redirect_url(&video_id, max_height, &options),
    )
    .await?;

    let location = HeaderValue::from_str(&resolution.value)
        .map_err(|_| ResolveError::invalid_output("resolved URL is not a valid header value"))?;
    tracing::info!(
        "Redirecting {} under {}p ({}, client {})",
        video_id,
        max_height,
        resolution.cache.as_str(),
        resolution.profile
    );

    let mut headers = resolution_headers(&resolution);
    headers.insert(header::LOCATION, location);
    Ok((StatusCode::FOUND, headers).into_response())
}

/// Ping endpoint for liveness checks
///
/// GET /ping
pub async fn ping(State(state): State<AppState>) -> Json<PingResponse> {
    let uptime = state.start_time.elapsed().as_secs();
    tracing::debug!("Ping response: uptime={}s", uptime);
    Json(PingResponse::new(uptime, version::get_version()))
}

/// Introspection endpoint
///
/// GET /health
///
/// Reports gate occupancy, cache sizes, uptime, memory and credential
/// health. Never exposes cookie content.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.service.stats();
    let status = if state.service.is_overloaded() {
        "overloaded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        version: version::get_version().to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        memory_rss_bytes: memory::resident_bytes(),
        gate: stats.gate,
        cache: stats.cache,
        credentials: stats.credentials,
    })
}

/// Invalidate caches endpoint
///
/// POST /invalidate_caches
///
/// Clears both result caches.
pub async fn invalidate_caches(State(state): State<AppState>) -> StatusCode {
    let removed = state.service.invalidate();
    tracing::info!("Cache invalidation removed {} entries", removed);
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ResolveError::auth_required("bot"), StatusCode::FORBIDDEN),
            (ResolveError::timeout(45), StatusCode::GATEWAY_TIMEOUT),
            (ResolveError::invalid_output("x"), StatusCode::BAD_GATEWAY),
            (ResolveError::no_usable_result("x"), StatusCode::BAD_GATEWAY),
            (
                ResolveError::spawn_failure("x"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ResolveError::Terminated, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status(), expected);
        }

        let overloaded = ApiError::from(Error::overloaded(40, 5));
        assert_eq!(overloaded.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_overload_sets_retry_after() {
        let response = ApiError::from(Error::overloaded(40, 7)).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "OVERLOADED");
    }

    #[tokio::test]
    async fn test_auth_body_hides_stderr() {
        let error = ResolveError::auth_required("ERROR: Sign in to confirm you're not a bot");
        let response = ApiError::from(error).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["code"], "AUTH_REQUIRED");
        assert!(!json["error"].as_str().unwrap().contains("Sign in"));
    }

    #[test]
    fn test_invalid_id_code() {
        let error = VideoId::parse("short").unwrap_err();
        let api = ApiError::invalid_id(error);
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        assert_eq!(api.code, Some("INVALID_ID"));
    }
}
