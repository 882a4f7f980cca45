//! The streamer SDK against the real relay, with the one-shot CLI client
//! on the other end.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rr_domain::config::Config;
use rr_relay::cli::remote;
use rr_relay::state::AppState;
use rr_streamer_sdk::{
    HandlerError, HandlerResult, ReconnectBackoff, RequestContext, RequestHandler,
    StreamerClientBuilder, StreamerSdkError,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct FakeStudio;

#[async_trait::async_trait]
impl RequestHandler for FakeStudio {
    async fn handle(&self, _ctx: RequestContext, data: Value) -> HandlerResult {
        if data.get("getSettings").is_some() {
            return Ok(json!({ "getSettings": { "data": { "zoom": 2.0 } } }));
        }
        if let Some(zoom) = data.get("setZoom") {
            return Ok(json!({ "setZoom": zoom }));
        }
        if data.get("crash").is_some() {
            panic!("studio crashed");
        }
        Err(HandlerError::UnknownRequest(data.to_string()))
    }
}

async fn start_relay(password: &str) -> (SocketAddr, AppState) {
    let state = AppState::new(Arc::new(Config::default()), password);
    let app = rr_relay::api::router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn wait_until_identified(state: &AppState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if state
                .broker
                .status()
                .streamer
                .is_some_and(|s| s.authenticated)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("streamer never identified");
}

#[tokio::test]
async fn sdk_answers_client_requests() {
    let (addr, state) = start_relay("secret").await;
    let shutdown = CancellationToken::new();

    let client = StreamerClientBuilder::new()
        .relay_ws_url(format!("ws://{addr}/"))
        .password("secret")
        .build()
        .unwrap();
    let logs = client.log_sender();
    let task = client.spawn(FakeStudio, shutdown.clone());

    wait_until_identified(&state).await;
    assert!(logs.log("studio ready").await);

    let url = format!("ws://{addr}/client");
    let settings = remote::round_trip(&url, json!({ "getSettings": {} }))
        .await
        .unwrap();
    assert_eq!(settings, json!({ "getSettings": { "data": { "zoom": 2.0 } } }));

    let zoom = remote::round_trip(&url, json!({ "setZoom": { "x": 1.5 } }))
        .await
        .unwrap();
    assert_eq!(zoom, json!({ "setZoom": { "x": 1.5 } }));

    let err = remote::round_trip(&url, json!({ "dance": {} }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknownRequest"));

    // A panicking handler still produces a response.
    let err = remote::round_trip(&url, json!({ "crash": {} }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknownRequest"));

    shutdown.cancel();
    assert!(matches!(
        task.await.unwrap(),
        Err(StreamerSdkError::Shutdown)
    ));
}

#[tokio::test]
async fn sdk_with_wrong_password_gives_up() {
    let (addr, _state) = start_relay("secret").await;

    let client = StreamerClientBuilder::new()
        .relay_ws_url(format!("ws://{addr}/"))
        .password("guess")
        .identify_timeout(Duration::from_millis(300))
        .reconnect_backoff(ReconnectBackoff::default().with_max_attempts(1))
        .build()
        .unwrap();

    let result = client.run(FakeStudio, CancellationToken::new()).await;
    assert!(matches!(result, Err(StreamerSdkError::NotIdentified)));
}
