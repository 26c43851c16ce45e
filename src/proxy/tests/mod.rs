//! In-process end-to-end tests: a mock upstream and the gateway router both
//! run on ephemeral ports inside each test.


use axum::Router;
use chrono::{Duration, Utc};
use serde_json::json;

use crate::proxy::config::GatewayConfig;
use crate::proxy::server::{build_router, AppState};

pub(crate) async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}

/// Boots a gateway against the given upstream. Credential expiries are
/// pinned far out so acquire never refreshes unless a test re-pins them.
pub(crate) async fn spawn_gateway(upstream_url: &str, cred_count: usize) -> (String, AppState) {
    let config = GatewayConfig {
        port: 0,
        upstream_url: upstream_url.to_string(),
        credential_count: cred_count,
    };
    let state = AppState::new(&config);
    pin_all_expiries(&state, 3600).await;
    let url = spawn_server(build_router(state.clone())).await;
    (url, state)
}

pub(crate) async fn pin_all_expiries(state: &AppState, secs: i64) {
    let count = state.pool.len().await;
    for i in 1..=count {
        let cred = state
            .pool
            .get(&format!("cred_{:03}", i))
            .await
            .expect("credential");
        cred.state.lock().await.expiry = Utc::now() + Duration::seconds(secs);
    }
}

pub(crate) fn hi_upstream_body() -> String {
    json!({
        "candidates": [{
            "content": {"parts": [{"text": "Hi"}], "role": "model"},
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": {
            "promptTokenCount": 5,
            "candidatesTokenCount": 1,
            "totalTokenCount": 6
        }
    })
    .to_string()
}

/// One upstream stream line carrying a single text part.
pub(crate) fn sse_chunk_line(text: &str) -> String {
    format!(
        "data: {}\n",
        json!({
            "candidates": [{
                "content": {"parts": [{"text": text}], "role": "model"},
                "index": 0
            }]
        })
    )
}
