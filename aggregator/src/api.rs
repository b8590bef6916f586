use crate::chunk_server::{ChunkLookup, lookup_chunk, parse_chunk_name};
use crate::config::{AuthConfig, RateLimitConfig};
use crate::metrics_defs::REFRESH_RATE_LIMITED;
use crate::pipeline::RunResult;
use crate::rate_limit::RateLimiter;
use crate::refresh::{Aggregator, RefreshError};
use crate::settings::SettingsError;
use crate::stats::RunStats;
use crate::store::{StoreError, keys};
use crate::writer::read_total;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use shared::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;

const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone)]
pub struct AppState {
    aggregator: Aggregator,
    auth: Arc<AuthConfig>,
    limiter: Arc<RateLimiter>,
    cache_max_age_secs: u64,
}

impl AppState {
    pub fn new(
        aggregator: Aggregator,
        auth: AuthConfig,
        rate_limit: &RateLimitConfig,
        cache_max_age_secs: u64,
    ) -> Self {
        AppState {
            aggregator,
            auth: Arc::new(auth),
            limiter: Arc::new(RateLimiter::new(
                rate_limit.refresh_max,
                Duration::from_secs(rate_limit.refresh_window_secs),
            )),
            cache_max_age_secs,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/refresh", post(refresh))
        .route(
            "/sources",
            get(list_sources).post(add_source).delete(remove_source),
        )
        .route("/config", get(get_config).post(update_config))
        .route("/stats", get(stats))
        .route("/{chunk}", get(chunk))
        .with_state(state)
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("too many refresh requests, try again later")]
    RateLimited,

    #[error("{0}")]
    BadRequest(String),

    #[error("refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<SettingsError> for ApiError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Store(e) => ApiError::Store(e),
            e @ (SettingsError::ChunkSizeOutOfRange(_) | SettingsError::EmptySource) => {
                ApiError::BadRequest(e.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Refresh(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error_message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ApiErrorResponse { error_message })).into_response()
    }
}

fn tokens_match(supplied: &str, expected: &str) -> bool {
    supplied.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn require_admin(auth: &AuthConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = auth.admin_token.as_deref() else {
        return Err(ApiError::Unauthorized);
    };

    let supplied = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    if tokens_match(supplied.trim(), expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Identity used for rate limiting: `cf-connecting-ip`, then the first
/// `x-forwarded-for` entry.
fn client_identity(headers: &HeaderMap) -> String {
    header_str(headers, "cf-connecting-ip")
        .or_else(|| {
            header_str(headers, "x-forwarded-for")
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        })
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

#[derive(Deserialize, Debug)]
struct ChunkParams {
    token: Option<String>,
}

async fn chunk(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<ChunkParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.auth.subscription_token.as_deref() {
        let supplied = params.token.as_deref().unwrap_or_default();
        if !tokens_match(supplied, expected) {
            return Err(ApiError::Unauthorized);
        }
    }

    let index = parse_chunk_name(&name).ok_or(ApiError::NotFound)?;
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok());

    let store = state.aggregator.pipeline().store();
    let cache_control = format!(
        "public, max-age={}, must-revalidate",
        state.cache_max_age_secs
    );

    match lookup_chunk(store.as_ref(), index, if_none_match).await? {
        ChunkLookup::NotFound => Err(ApiError::NotFound),
        ChunkLookup::NotModified { etag } => Ok((
            StatusCode::NOT_MODIFIED,
            [
                (header::ETAG, format!("\"{etag}\"")),
                (header::CACHE_CONTROL, cache_control),
            ],
        )
            .into_response()),
        ChunkLookup::Found { body, etag } => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (header::ETAG, format!("\"{etag}\"")),
                (header::CACHE_CONTROL, cache_control),
            ],
            body,
        )
            .into_response()),
    }
}

async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RunResult>, ApiError> {
    require_admin(&state.auth, &headers)?;

    let client = client_identity(&headers);
    if !state.limiter.check(&client, Instant::now()) {
        counter!(REFRESH_RATE_LIMITED).increment(1);
        tracing::warn!(client = %client, "refresh rate limited");
        return Err(ApiError::RateLimited);
    }

    Ok(Json(state.aggregator.refresh().await?))
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct SourcesResponse {
    sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    changed: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct SourceBody {
    url: String,
}

async fn list_sources(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SourcesResponse>, ApiError> {
    require_admin(&state.auth, &headers)?;

    let sources = state.aggregator.pipeline().settings().sources().await?;
    Ok(Json(SourcesResponse {
        sources,
        changed: None,
    }))
}

async fn add_source(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SourceBody>,
) -> Result<Json<SourcesResponse>, ApiError> {
    require_admin(&state.auth, &headers)?;

    let settings = state.aggregator.pipeline().settings();
    let changed = settings.add_source(&body.url).await?;
    Ok(Json(SourcesResponse {
        sources: settings.sources().await?,
        changed: Some(changed),
    }))
}

async fn remove_source(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SourceBody>,
) -> Result<Json<SourcesResponse>, ApiError> {
    require_admin(&state.auth, &headers)?;

    let settings = state.aggregator.pipeline().settings();
    let changed = settings.remove_source(&body.url).await?;
    Ok(Json(SourcesResponse {
        sources: settings.sources().await?,
        changed: Some(changed),
    }))
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ConfigResponse {
    chunk_size: usize,
    base64_encode: bool,
}

#[derive(Deserialize, Debug)]
struct ConfigUpdate {
    chunk_size: Option<usize>,
    base64_encode: Option<bool>,
}

async fn current_config(state: &AppState) -> Result<ConfigResponse, ApiError> {
    let settings = state.aggregator.pipeline().settings();
    Ok(ConfigResponse {
        chunk_size: settings.chunk_size().await?.get(),
        base64_encode: settings.base64_encode().await?,
    })
}

async fn get_config(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ConfigResponse>, ApiError> {
    require_admin(&state.auth, &headers)?;
    Ok(Json(current_config(&state).await?))
}

async fn update_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigResponse>, ApiError> {
    require_admin(&state.auth, &headers)?;

    let settings = state.aggregator.pipeline().settings();
    if let Some(chunk_size) = update.chunk_size {
        settings.set_chunk_size(chunk_size).await?;
    }
    if let Some(enabled) = update.base64_encode {
        settings.set_base64_encode(enabled).await?;
    }

    Ok(Json(current_config(&state).await?))
}

#[derive(Serialize, Deserialize, Debug)]
struct StatsResponse {
    chunks_total: usize,
    last_updated: Option<String>,
    last_stats: Option<RunStats>,
}

async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, ApiError> {
    require_admin(&state.auth, &headers)?;

    let store = state.aggregator.pipeline().store();
    Ok(Json(StatsResponse {
        chunks_total: read_total(store.as_ref()).await?,
        last_updated: store.get(keys::LAST_UPDATED).await?,
        last_stats: store.get_json(keys::LAST_STATS).await?,
    }))
}
