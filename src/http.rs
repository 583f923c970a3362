//! HTTP surface (preserved for drop-in compatibility with the upstream
//! TSDB's own API shape): the cached query path, metadata passthroughs,
//! maintenance, and health/version endpoints.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tscached_backend::{BackendError, KairosClient};
use tscached_cache::{CacheBackend, CacheBackendExt};
use tscached_engine::{DatapointsQueryRequest, EngineConfig};
use tscached_readahead::ReadaheadConfig;

use crate::config::ExpiryConfig;

pub struct AppState<C: CacheBackend + ?Sized> {
    pub cache: Arc<C>,
    pub backend: KairosClient,
    pub engine_config: EngineConfig,
    pub readahead_config: ReadaheadConfig,
    pub expiry: ExpiryConfig,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}

pub fn router<C: CacheBackend + 'static>(state: Arc<AppState<C>>, static_dir: Option<&str>) -> Router {
    let mut router = Router::new()
        .route("/api/v1/health/check", get(health_check))
        .route("/api/v1/datapoints/query", post(query_post::<C>).get(query_get::<C>))
        .route("/api/v1/metricnames", get(metricnames::<C>))
        .route("/api/v1/tagnames", get(tagnames::<C>))
        .route("/api/v1/tagvalues", get(tagvalues::<C>))
        .route("/api/v1/datapoints/query/tags", post(query_tags::<C>))
        .route("/api/maintenance/flushall", get(flush_all::<C>))
        .route("/version", get(version))
        .with_state(state);

    router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.route("/", get(usage_banner)),
    };

    router
}

async fn usage_banner() -> &'static str {
    "tscached: a caching proxy in front of a TSDB backend. See /api/v1/datapoints/query."
}

async fn health_check() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

async fn query_post<C: CacheBackend + ?Sized>(
    State(state): State<Arc<AppState<C>>>,
    Json(request): Json<DatapointsQueryRequest>,
) -> Response {
    run_query(&state, request).await
}

#[derive(Debug, Deserialize)]
struct QueryParam {
    query: String,
}

async fn query_get<C: CacheBackend + ?Sized>(State(state): State<Arc<AppState<C>>>, Query(params): Query<QueryParam>) -> Response {
    let request: DatapointsQueryRequest = match serde_json::from_str(&params.query) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    run_query(&state, request).await
}

async fn run_query<C: CacheBackend + ?Sized>(state: &AppState<C>, request: DatapointsQueryRequest) -> Response {
    let now = tscached_backend::now_unix_seconds();
    match tscached_engine::handle_request(state.cache.as_ref(), &state.backend, &state.engine_config, &request, now).await {
        Ok((body, mode)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(mode.as_header_value()) {
                headers.insert("X-tscached-mode", value);
            }
            (headers, Json(body)).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Read-through passthrough: serve from the cache on a hit, else proxy and
/// cache the verbatim response body for `ttl`.
async fn passthrough<C: CacheBackend + ?Sized>(
    cache: &C,
    key: &str,
    ttl: std::time::Duration,
    fetch: impl std::future::Future<Output = Result<serde_json::Value, BackendError>>,
) -> Response {
    if let Ok(Some(cached)) = cache.get_json::<serde_json::Value>(key).await {
        return Json(cached).into_response();
    }

    match fetch.await {
        Ok(value) => {
            let _ = cache.set_json(key, &value, ttl).await;
            Json(value).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn metricnames<C: CacheBackend + ?Sized>(State(state): State<Arc<AppState<C>>>) -> Response {
    let key = tscached_backend::cache_key(tscached_backend::CacheKind::Metricnames, "all");
    passthrough(state.cache.as_ref(), &key, state.expiry.metricnames, state.backend.get_metric_names()).await
}

async fn tagnames<C: CacheBackend + ?Sized>(State(state): State<Arc<AppState<C>>>) -> Response {
    let key = tscached_backend::cache_key(tscached_backend::CacheKind::Tagnames, "all");
    passthrough(state.cache.as_ref(), &key, state.expiry.tagnames, state.backend.get_tag_names()).await
}

async fn tagvalues<C: CacheBackend + ?Sized>(State(state): State<Arc<AppState<C>>>) -> Response {
    let key = tscached_backend::cache_key(tscached_backend::CacheKind::Tagvalues, "all");
    passthrough(state.cache.as_ref(), &key, state.expiry.tagvalues, state.backend.get_tag_values()).await
}

async fn query_tags<C: CacheBackend + ?Sized>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let digest = match tscached_backend::fingerprint(&body) {
        Ok(digest) => digest,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let key = tscached_backend::cache_key(tscached_backend::CacheKind::Metaquery, &digest);
    passthrough(state.cache.as_ref(), &key, state.expiry.metaquery, state.backend.query_tags(&body)).await
}

/// Guarded by acquiring the read-ahead lock first, so a flush never races
/// the worker's own pass.
async fn flush_all<C: CacheBackend + 'static>(State(state): State<Arc<AppState<C>>>, Query(params): Query<HashMap<String, String>>) -> Response {
    if params.get("orly").map(String::as_str) != Some("yarly") {
        return error_response(StatusCode::BAD_REQUEST, "missing or incorrect ?orly=yarly");
    }

    let owner = tscached_readahead::local_owner();
    match tscached_readahead::become_leader(state.cache.as_ref(), &state.readahead_config, &owner).await {
        Ok(Some(lease)) => {
            let result = state.cache.flush_all().await;
            let _ = tscached_readahead::release_leader(state.cache.as_ref(), &lease).await;
            match result {
                Ok(()) => StatusCode::NO_CONTENT.into_response(),
                Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            }
        }
        Ok(None) => error_response(StatusCode::CONFLICT, "read-ahead worker currently holds the lock"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
