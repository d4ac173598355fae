use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use search_core::global::{installed, shared_index};
use search_core::{Gateway, Index, SearchError, Searcher, StorePaths, Tokenizer};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub const MISSING_WORD: &str = "missing search keyword: pass ?word=...";

#[derive(Deserialize)]
pub struct SearchParams {
    pub word: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub searcher: Arc<Searcher>,
}

/// Where the served index comes from at startup.
#[derive(Debug, Clone)]
pub enum IndexSource {
    /// Tokenize and build from a normalized corpus file.
    Corpus(PathBuf),
    /// Restore a previously saved index from a store directory.
    Store(PathBuf),
}

fn build_index(source: &IndexSource, tokenizer: &dyn Tokenizer) -> search_core::error::Result<Index> {
    match source {
        IndexSource::Corpus(path) => Ok(Index::build_from_path(path, tokenizer)?.0),
        IndexSource::Store(dir) => {
            let gateway = Gateway::open_sled(&StorePaths::new(dir))?;
            Index::load_from_store(&gateway)
        }
    }
}

/// Install the process-wide index from `source` on a blocking thread, giving up
/// after `limit`. An index that is already installed is reused without loading.
///
/// The index is only installed when it is ready within `limit`; a load that
/// finishes late is discarded.
pub async fn init_searcher(source: IndexSource, tokenizer: Arc<dyn Tokenizer>, limit: Duration) -> Result<Arc<Searcher>> {
    if let Some(index) = installed() {
        tracing::info!(num_docs = index.num_docs(), "reusing installed index");
        return Ok(Arc::new(Searcher::with_index(tokenizer, index)));
    }
    let tok = Arc::clone(&tokenizer);
    let label = format!("{source:?}");
    let task = tokio::task::spawn_blocking(move || build_index(&source, tok.as_ref()));
    let built = tokio::time::timeout(limit, task)
        .await
        .map_err(|_| anyhow!("index initialization exceeded {limit:?}"))?
        .context("index initialization task panicked")?
        .with_context(|| format!("initializing index from {label}"))?;
    let index = shared_index(move || Ok(built))?;
    tracing::info!(num_docs = index.num_docs(), num_terms = index.num_terms(), "index ready");
    Ok(Arc::new(Searcher::with_index(tokenizer, index)))
}

/// Drive [`init_searcher`] to completion on `rt`. On failure the runtime is shut
/// down without waiting for a load still running on a blocking thread, so the
/// caller regains control within `limit`.
pub fn start_searcher(
    rt: Runtime,
    source: IndexSource,
    tokenizer: Arc<dyn Tokenizer>,
    limit: Duration,
) -> Result<(Runtime, Arc<Searcher>)> {
    match rt.block_on(init_searcher(source, tokenizer, limit)) {
        Ok(searcher) => Ok((rt, searcher)),
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            rt.shutdown_background();
            Err(e)
        }
    }
}

pub fn build_app(searcher: Arc<Searcher>, www: Option<PathBuf>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let mut app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/s", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(AppState { searcher });
    if let Some(dir) = www {
        app = app.fallback_service(ServeDir::new(dir));
    }
    app.layer(cors).layer(TraceLayer::new_for_http())
}

fn plain_text(status: StatusCode, body: impl Into<String>) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body.into()).into_response()
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    let Some(word) = params.word else {
        return plain_text(StatusCode::OK, MISSING_WORD);
    };
    tracing::info!(query = %word, "searching");
    match state.searcher.query(&word) {
        Ok(results) => Json(results).into_response(),
        Err(SearchError::NotReady) => plain_text(StatusCode::SERVICE_UNAVAILABLE, "index is not ready"),
        Err(e) => {
            tracing::error!(error = %e, "query failed");
            plain_text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<u64>) -> Response {
    let Some(index) = state.searcher.index() else {
        return plain_text(StatusCode::SERVICE_UNAVAILABLE, "index is not ready");
    };
    match index.get_document(doc_id) {
        Ok(doc) => Json(doc.clone()).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" }))).into_response(),
    }
}
