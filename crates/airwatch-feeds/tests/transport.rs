//! Transports against local HTTP and `WebSocket` servers, driven through a
//! merger session.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use airwatch_core::{
    BackfillSource, BackoffPolicy, LiveConnection, LivePayload, LiveSource, MergerNotice, SourceError,
    StreamMerger,
};
use airwatch_feeds::{HttpBackfill, WsLive};
use airwatch_store::EventStore;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use futures::SinkExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

fn record(parameter: &str, minute: u32) -> Value {
    json!({
        "parameter": parameter,
        "value": 91.5,
        "time": format!("2025-04-01T10:{minute:02}:00Z"),
        "latitude": 41.01,
        "longitude": 28.97,
        "description": "Value exceeds rolling average"
    })
}

async fn timerange(Query(params): Query<HashMap<String, String>>) -> Result<Json<Value>, StatusCode> {
    if !params.contains_key("start") || !params.contains_key("end") {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(json!([record("a", 1), record("b", 2)])))
}

async fn spawn_http(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// First connection gets `frames` then a close frame; later ones stay idle.
async fn spawn_ws(frames: Vec<Message>) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        let mut frames = Some(frames);
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let script = frames.take();
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                match script {
                    Some(frames) => {
                        for frame in frames {
                            ws.send(frame).await.unwrap();
                        }
                        let _ = ws.close(None).await;
                    }
                    None => std::future::pending::<()>().await,
                }
            });
        }
    });
    (addr, accepted)
}

#[tokio::test]
async fn http_backfill_fetches_records() {
    let addr = spawn_http(Router::new().route("/api/anomalies/timerange", get(timerange))).await;
    let source = HttpBackfill::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap();

    let start = Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap();
    let records = source.fetch(start, end).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["parameter"], "a");
}

#[tokio::test]
async fn http_backfill_maps_error_status() {
    let addr = spawn_http(Router::new().route(
        "/api/anomalies/timerange",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    ))
    .await;
    let source = HttpBackfill::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap();

    let now = Utc::now();
    let err = source.fetch(now, now).await.unwrap_err();
    assert!(matches!(err, SourceError::Status { status: 500, .. }));
}

#[tokio::test]
async fn http_backfill_unreachable_is_a_connect_error() {
    // Bind then drop to find a port nothing listens on.
    let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let source = HttpBackfill::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let now = Utc::now();
    assert!(matches!(source.fetch(now, now).await, Err(SourceError::Connect { .. })));
}

#[tokio::test]
async fn websocket_yields_text_frames_and_skips_others() {
    let (addr, _) = spawn_ws(vec![
        Message::Binary(vec![1_u8, 2, 3].into()),
        Message::Text(record("c", 3).to_string().into()),
        Message::Ping(Vec::new().into()),
        Message::Text(json!([record("d", 4)]).to_string().into()),
    ])
    .await;

    let live = WsLive::new(&format!("ws://{addr}/ws/live")).unwrap();
    let mut conn = live.connect().await.unwrap();

    let first = conn.next_payload().await.unwrap().unwrap();
    assert!(matches!(first, LivePayload::Text(ref t) if t.contains("\"c\"")));
    let second = conn.next_payload().await.unwrap().unwrap();
    assert!(matches!(second, LivePayload::Text(ref t) if t.starts_with('[')));
    assert!(conn.next_payload().await.is_none());
}

#[tokio::test]
async fn websocket_connect_failure_is_reported() {
    let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let live = WsLive::new(&format!("ws://{addr}/ws/live")).unwrap();
    assert!(matches!(live.connect().await, Err(SourceError::Connect { .. })));
}

#[tokio::test]
async fn merger_session_over_real_transports() {
    let http = spawn_http(Router::new().route("/api/anomalies/timerange", get(timerange))).await;
    let (ws, accepted) = spawn_ws(vec![Message::Text(
        json!([record("b", 2), record("c", 3)]).to_string().into(),
    )])
    .await;

    let store = Arc::new(EventStore::new());
    let backfill = HttpBackfill::new(&format!("http://{http}"), Duration::from_secs(5)).unwrap();
    let live = WsLive::new(&format!("ws://{ws}/ws/live")).unwrap();
    let policy = BackoffPolicy::new(Duration::from_millis(20), Duration::from_millis(100), 0.2, None).unwrap();
    let merger = StreamMerger::new(Arc::clone(&store), backfill, live, policy);

    let mut handle = merger.start(Duration::from_secs(3600), None, None).await.unwrap();

    let mut params = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(10), handle.next_event())
            .await
            .expect("event never arrived")
            .expect("store closed");
        params.push(event.parameter().to_owned());
    }
    params.sort();
    assert_eq!(params, ["a", "b", "c"]);

    // The server closed the first connection; the merger dials again.
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match handle.next_notice().await.expect("notices closed") {
                MergerNotice::LiveConnected if accepted.load(Ordering::SeqCst) >= 2 => break,
                _ => {}
            }
        }
    })
    .await
    .expect("no reconnect");

    assert_eq!(store.len().await, 3);
    assert_eq!(handle.counters().snapshot().duplicates, 1);
    handle.stop().await;
}
