//! HttpTransport against a local HTTP server.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, RawQuery};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use querybench_query::{
    BodyRead, FanoutEngine, FanoutError, FanoutMode, HttpTransport, QueryTransport, QueryWindow,
};

const MATRIX: &str =
    r#"{"status":"success","data":{"resultType":"matrix","result":[{"values":[[1,"1"]]}]}}"#;

async fn query_range(headers: HeaderMap, RawQuery(raw): RawQuery) -> (StatusCode, String) {
    if headers.get("x-scope-orgid").map(|v| v.as_bytes()) != Some(b"tenant-1".as_slice()) {
        return (StatusCode::UNAUTHORIZED, "missing tenant".to_string());
    }
    match raw.as_deref().map(QueryWindow::decode) {
        Some(Ok(_)) => (StatusCode::OK, MATRIX.to_string()),
        _ => (StatusCode::BAD_REQUEST, "bad query".to_string()),
    }
}

/// Client port in the first 8 bytes, then enough padding to span many chunks.
async fn large(ConnectInfo(peer): ConnectInfo<SocketAddr>) -> String {
    format!("{:>8}{}", peer.port(), "x".repeat(256 * 1024))
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/api/v1/query_range", get(query_range))
        .route(
            "/unavailable",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
        )
        .route(
            "/stalled",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                MATRIX
            }),
        )
        .route("/large", get(large));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .ok();
    });

    format!("http://{addr}")
}

fn transport() -> HttpTransport {
    transport_with_timeout(Duration::from_secs(5))
}

fn transport_with_timeout(timeout: Duration) -> HttpTransport {
    let headers = BTreeMap::from([("X-Scope-OrgID".to_string(), "tenant-1".to_string())]);
    HttpTransport::new(&headers, timeout).unwrap()
}

fn query_url(base: &str) -> String {
    let window = QueryWindow::now(Duration::from_secs(60), Duration::from_secs(10));
    format!("{base}/api/v1/query_range?{}", window.encode("up"))
}

#[tokio::test]
async fn test_headers_are_sent() {
    let base = spawn_server().await;

    let response = transport()
        .execute(&query_url(&base), BodyRead::Full)
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body.unwrap(), MATRIX.as_bytes());
}

#[tokio::test]
async fn test_body_limit_and_discard() {
    let base = spawn_server().await;
    let url = query_url(&base);

    let limited = transport()
        .execute(&url, BodyRead::Limit(10))
        .await
        .unwrap();
    assert_eq!(limited.body.unwrap(), &MATRIX.as_bytes()[..10]);

    let discarded = transport().execute(&url, BodyRead::Discard).await.unwrap();
    assert_eq!(discarded.status, 200);
    assert!(discarded.body.is_none());
}

#[tokio::test]
async fn test_non_2xx_is_returned_not_raised() {
    let base = spawn_server().await;

    let response = transport()
        .execute(&format!("{base}/unavailable"), BodyRead::Full)
        .await
        .unwrap();

    assert_eq!(response.status, 503);
    assert!(!response.is_success());
}

#[tokio::test]
async fn test_connection_refused_is_an_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = transport()
        .execute(&format!("http://{addr}/api/v1/query_range"), BodyRead::Full)
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("failed to send request"));
}

#[tokio::test]
async fn test_fanout_over_http_replicas() {
    let first = spawn_server().await;
    let second = spawn_server().await;

    let engine = FanoutEngine::new(
        vec![
            format!("{first}/api/v1/query_range"),
            format!("{second}/api/v1/query_range"),
        ],
        Arc::new(transport()),
    );

    let result = engine
        .fanout(
            r#"{hostname="host-0"}"#,
            Duration::from_secs(60),
            Duration::from_secs(10),
            FanoutMode::CompareResults,
        )
        .await;

    assert!(result.is_ok(), "unexpected error: {:?}", result.error);
    assert_eq!(result.payloads.len(), 2);
}

#[tokio::test]
async fn test_limited_read_keeps_connection_alive() {
    let base = spawn_server().await;
    let transport = transport();
    let url = format!("{base}/large");

    let first = transport.execute(&url, BodyRead::Limit(8)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = transport.execute(&url, BodyRead::Limit(8)).await.unwrap();

    let first = first.body.unwrap();
    let second = second.body.unwrap();
    assert_eq!(first.len(), 8);
    // Same client port means the pooled connection was reused.
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_stalled_replica_times_out() {
    let base = spawn_server().await;
    let stalled = format!("{base}/stalled");

    let engine = FanoutEngine::new(
        vec![format!("{base}/api/v1/query_range"), stalled.clone()],
        Arc::new(transport_with_timeout(Duration::from_millis(300))),
    );

    let started = Instant::now();
    let result = engine
        .fanout(
            r#"{hostname="host-0"}"#,
            Duration::from_secs(60),
            Duration::from_secs(10),
            FanoutMode::CompareResults,
        )
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");
    assert_eq!(result.payloads.len(), 1);
    assert_eq!(result.payloads[0], MATRIX.as_bytes());

    let err = result.error.unwrap();
    assert!(err.is_transport());
    match err {
        FanoutError::Transport(errors) => {
            assert_eq!(errors.len(), 1);
            assert!(errors.iter().all(|e| e.url.starts_with(&stalled)));
        }
        other => panic!("expected transport failure, got {other:?}"),
    }
}
