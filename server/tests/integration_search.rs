use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use search_core::{Gateway, Index, Searcher, StandardTokenizer, StorePaths, CORPUS_DELIMITER};
use serde_json::Value;
use server::{build_app, init_searcher, IndexSource, MISSING_WORD};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tower::ServiceExt;

fn corpus() -> Vec<String> {
    [
        ("Rust Book", "Rust is great. rust systems programming.", "https://doc.rust-lang.org/book"),
        ("Learning", "Learning rust one chapter at a time.", "https://example.com/learn"),
        ("Boost Asio", "Asio is a boost library asio example", "https://boost.org/asio"),
    ]
    .iter()
    .map(|(t, c, u)| format!("{t}{CORPUS_DELIMITER}{c}{CORPUS_DELIMITER}{u}"))
    .collect()
}

fn tiny_app() -> Router {
    let tokenizer = Arc::new(StandardTokenizer::default());
    let (index, _) = Index::build_from_corpus(corpus(), tokenizer.as_ref());
    build_app(Arc::new(Searcher::with_index(tokenizer, Arc::new(index))), None)
}

async fn call(app: Router, uri: &str) -> (StatusCode, Option<String>, Bytes) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let content_type = resp.headers().get(header::CONTENT_TYPE).map(|v| v.to_str().unwrap().to_string());
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, body)
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let (status, _, body) = call(tiny_app(), "/s?word=rust").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let arr = json.as_array().unwrap();
    assert_eq!(arr.len(), 2);
    // doc 0: title 1 + content 2 = 11; doc 1: content 1
    assert_eq!(arr[0]["doc_id"].as_u64().unwrap(), 0);
    assert_eq!(arr[0]["weight"].as_u64().unwrap(), 11);
    assert_eq!(arr[1]["doc_id"].as_u64().unwrap(), 1);
    assert_eq!(arr[0]["title"], "Rust Book");
    assert_eq!(arr[0]["url"], "https://doc.rust-lang.org/book");
    assert!(arr[0]["desc"].as_str().unwrap().starts_with("Rust is great"));
}

#[tokio::test]
async fn unmatched_query_is_an_empty_array() {
    let (status, _, body) = call(tiny_app(), "/s?word=haskell").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), Value::Array(vec![]));

    let (_, _, body) = call(tiny_app(), "/s?word=").await;
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), Value::Array(vec![]));
}

#[tokio::test]
async fn missing_word_is_plain_text() {
    let (status, content_type, body) = call(tiny_app(), "/s").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));
    assert_eq!(body, MISSING_WORD.as_bytes());
}

#[tokio::test]
async fn doc_lookup() {
    let (status, _, body) = call(tiny_app(), "/doc/2").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["title"], "Boost Asio");

    let (status, _, _) = call(tiny_app(), "/doc/3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn uninitialized_searcher_is_unavailable() {
    let app = build_app(Arc::new(Searcher::new(Arc::new(StandardTokenizer::default()))), None);
    let (status, _, _) = call(app, "/s?word=rust").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// The only test in this binary that touches the process-wide index.
#[tokio::test]
async fn serves_index_loaded_from_store() {
    let dir = tempdir().unwrap();
    {
        let (index, _) = Index::build_from_corpus(corpus(), &StandardTokenizer::default());
        let gateway = Gateway::open_sled(&StorePaths::new(dir.path())).unwrap();
        index.save_to_store(&gateway).unwrap();
    }
    let searcher = init_searcher(
        IndexSource::Store(dir.path().to_path_buf()),
        Arc::new(StandardTokenizer::default()),
        Duration::from_secs(30),
    )
    .await
    .unwrap();
    let (status, _, body) = call(build_app(searcher, None), "/s?word=asio").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json[0]["doc_id"].as_u64().unwrap(), 2);
    assert_eq!(json[0]["weight"].as_u64().unwrap(), 11);
}
