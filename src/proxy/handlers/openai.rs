use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::constants::MAX_RETRIES;
use crate::proxy::handlers::common::{collect_request_text, inject_done_instruction};
use crate::proxy::handlers::errors::gateway_error;
use crate::proxy::handlers::{retry, streaming};
use crate::proxy::mappers::gemini::GeminiResponse;
use crate::proxy::mappers::openai::{
    strip_done_marker, transform_gemini_response, transform_openai_request, OpenAIRequest,
};
use crate::proxy::server::AppState;
use crate::proxy::usage::estimate_input_tokens;

pub async fn handle_chat_completions(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let req: OpenAIRequest = match serde_json::from_value(body) {
        Ok(r) => r,
        Err(e) => {
            return gateway_error(
                StatusCode::BAD_REQUEST,
                &format!("invalid request body: {}", e),
            )
        }
    };

    let req_id = next_request_id();
    info!(
        "[{}] Chat request: {} | {} messages | stream: {}",
        req_id,
        req.model,
        req.messages.len(),
        req.stream
    );

    let mut gemini_req = transform_openai_request(&req);
    inject_done_instruction(&mut gemini_req);
    let input_tokens = estimate_input_tokens(&collect_request_text(&req), 0);

    if req.stream {
        return streaming::stream_chat_completions(state, req.model, gemini_req, req_id, input_tokens);
    }

    let model = req.model;
    let mut last_error = String::new();

    for attempt in 0..=MAX_RETRIES {
        let lease = match state.pool.acquire(&model).await {
            Ok(lease) => lease,
            Err(e) => {
                debug!("[{}] Credential acquisition failed: {}", req_id, e);
                last_error = e.to_string();
                continue;
            }
        };

        let reply = match state
            .upstream
            .generate(&model, &lease.access_token, &gemini_req)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                debug!("[{}] Upstream call failed: {}", req_id, e);
                last_error = e.to_string();
                continue;
            }
        };

        let status = reply.status.as_u16();
        if status != 200 {
            last_error = format!("upstream error (status {}): {}", status, reply.body);

            if retry::is_retryable(status) {
                let cooldown = retry::parse_cooldown_seconds(&reply.body);
                state
                    .pool
                    .record_error(&lease.credential, status, &model, cooldown)
                    .await;
                retry::backoff(attempt, &req_id).await;
                continue;
            }
            if retry::is_terminal(status) {
                state
                    .pool
                    .record_error(&lease.credential, status, &model, 0)
                    .await;
            }
            warn!("[{}] {}", req_id, last_error);
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            return gateway_error(status, &last_error);
        }

        let mut gemini_resp: GeminiResponse = match serde_json::from_str(&reply.body) {
            Ok(resp) => resp,
            Err(e) => {
                warn!("[{}] Unparseable upstream response: {}", req_id, e);
                return gateway_error(
                    StatusCode::BAD_GATEWAY,
                    &format!("failed to parse upstream response: {}", e),
                );
            }
        };

        strip_done_marker(&mut gemini_resp);

        let output_tokens = gemini_resp
            .usage_metadata
            .as_ref()
            .map(|u| u.candidates_token_count)
            .unwrap_or(0);
        let response = transform_gemini_response(&gemini_resp, &model, &req_id);

        state
            .usage
            .record(&lease.credential.id, &model, input_tokens, output_tokens as u64);

        return Json(response).into_response();
    }

    warn!("[{}] All retries exhausted: {}", req_id, last_error);
    gateway_error(
        StatusCode::BAD_GATEWAY,
        &format!("all retries exhausted: {}", last_error),
    )
}

pub async fn handle_list_models() -> Response {
    Json(json!({
        "object": "list",
        "data": [
            {"id": "gemini-2.0-flash", "object": "model", "owned_by": "google"},
            {"id": "gemini-1.5-pro", "object": "model", "owned_by": "google"},
            {"id": "gemini-2.0-flash-thinking", "object": "model", "owned_by": "google"},
        ]
    }))
    .into_response()
}

fn next_request_id() -> String {
    let now = chrono::Utc::now();
    let stamp = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_millis());
    format!("chatcmpl-{}", stamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_carry_a_monotonic_stamp() {
        let a = next_request_id();
        let b = next_request_id();
        let parse = |id: &str| -> i64 {
            id.strip_prefix("chatcmpl-")
                .expect("prefix")
                .parse()
                .expect("numeric stamp")
        };
        assert!(parse(&b) >= parse(&a));
    }
}
