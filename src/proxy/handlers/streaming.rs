//! SSE continuation pipeline. One upstream stream at a time is drained line
//! by line and re-emitted as OpenAI chunks; when a segment ends without the
//! done marker, a continuation request replays the collected text and asks
//! for the remainder, up to `MAX_CONTINUATIONS` follow-ups.

use axum::body::Body;
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::constants::{DONE_MARKER, MAX_CONTINUATIONS, MAX_RETRIES};
use crate::proxy::credential::Lease;
use crate::proxy::handlers::retry;
use crate::proxy::mappers::gemini::{GeminiContent, GeminiPart, GeminiRequest, GeminiResponse};
use crate::proxy::mappers::openai::{
    concat_candidate_text, strip_done_marker, transform_gemini_chunk,
};
use crate::proxy::server::AppState;

/// Suffix of the collected text echoed back in the continuation prompt.
const CONTINUATION_TAIL_CHARS: usize = 100;

pub fn stream_chat_completions(
    state: AppState,
    model: String,
    gemini_req: GeminiRequest,
    req_id: String,
    input_tokens: u64,
) -> Response {
    let stream = create_sse_stream(state, model, gemini_req, req_id, input_tokens);
    Response::builder()
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Per-request accumulator threaded through every upstream segment.
#[derive(Debug, Default)]
struct DrainState {
    collected_text: String,
    found_done: bool,
    last_output_tokens: u32,
}

fn create_sse_stream(
    state: AppState,
    model: String,
    gemini_req: GeminiRequest,
    req_id: String,
    input_tokens: u64,
) -> impl futures::Stream<Item = Result<Bytes, String>> + Send {
    async_stream::stream! {
        let mut drain = DrainState::default();
        let mut lease: Option<Lease> = None;
        let mut request = gemini_req;

        'continuations: for continuation in 0..=MAX_CONTINUATIONS {
            // The first segment picks a credential with backoff-retried
            // acquires; every follow-up rides on the one that carried the
            // previous segment.
            if lease.is_none() {
                for attempt in 0..=MAX_RETRIES {
                    match state.pool.acquire(&model).await {
                        Ok(acquired) => {
                            lease = Some(acquired);
                            break;
                        }
                        Err(e) => {
                            if attempt == MAX_RETRIES {
                                warn!("[{}] No credential after {} attempts: {}", req_id, attempt + 1, e);
                                yield Ok(error_event(&format!("no credentials available: {}", e)));
                                return;
                            }
                            retry::backoff(attempt, &req_id).await;
                        }
                    }
                }
            }
            let Some(mut current) = lease.clone() else {
                return;
            };

            // Open the upstream stream, rotating to a different credential
            // on retryable failures.
            let mut response = None;
            let mut last_open_error = String::new();
            for attempt in 0..=MAX_RETRIES {
                match state
                    .upstream
                    .stream_generate(&model, &current.access_token, &request)
                    .await
                {
                    Ok(resp) if resp.status().is_success() => {
                        response = Some(resp);
                        break;
                    }
                    Ok(resp) => {
                        let status = resp.status().as_u16();
                        let body = resp.text().await.unwrap_or_default();
                        last_open_error = format!("upstream error (status {}): {}", status, body);

                        if retry::is_terminal(status) {
                            state.pool.record_error(&current.credential, status, &model, 0).await;
                            warn!("[{}] {}", req_id, last_open_error);
                            yield Ok(error_event(&last_open_error));
                            return;
                        }
                        if !retry::is_retryable(status) {
                            warn!("[{}] {}", req_id, last_open_error);
                            yield Ok(error_event(&last_open_error));
                            return;
                        }

                        let cooldown = retry::parse_cooldown_seconds(&body);
                        state.pool.record_error(&current.credential, status, &model, cooldown).await;
                    }
                    Err(e) => {
                        last_open_error = e.to_string();
                    }
                }

                if attempt == MAX_RETRIES {
                    warn!("[{}] Stream open failed: {}", req_id, last_open_error);
                    yield Ok(error_event(&format!("upstream request failed: {}", last_open_error)));
                    return;
                }

                if let Ok(next) = state.pool.acquire_excluding(&model, &current.credential.id).await {
                    debug!("[{}] Rotating credential {} -> {}", req_id, current.credential.id, next.credential.id);
                    current = next;
                    lease = Some(current.clone());
                }
                retry::backoff(attempt, &req_id).await;
            }
            let Some(response) = response else {
                return;
            };

            info!(
                "[{}] Draining upstream segment {} (credential {})",
                req_id, continuation, current.credential.id
            );

            let mut body_stream = response.bytes_stream();
            let mut buffer = BytesMut::new();
            loop {
                let next = body_stream.next().await;
                let ended = match next {
                    Some(Ok(bytes)) => {
                        buffer.extend_from_slice(&bytes);
                        false
                    }
                    Some(Err(e)) => {
                        // Connection drop mid-stream is best-effort: keep
                        // whatever was already relayed.
                        debug!("[{}] Upstream stream error: {}", req_id, e);
                        true
                    }
                    None => true,
                };

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = buffer.split_to(pos + 1);
                    if let Some(event) = process_upstream_line(&line, &model, &req_id, &mut drain) {
                        yield Ok(event);
                    }
                }

                if ended {
                    if !buffer.is_empty() {
                        let line = buffer.split_to(buffer.len());
                        if let Some(event) = process_upstream_line(&line, &model, &req_id, &mut drain) {
                            yield Ok(event);
                        }
                    }
                    break;
                }
            }

            if drain.found_done {
                break 'continuations;
            }
            if continuation < MAX_CONTINUATIONS {
                debug!(
                    "[{}] Segment ended without done marker ({} chars so far), continuing",
                    req_id,
                    drain.collected_text.chars().count()
                );
                request = build_continuation(&request, &drain.collected_text);
            }
        }

        yield Ok(Bytes::from_static(b"data: [DONE]\n\n"));

        if let Some(lease) = lease {
            state.usage.record(
                &lease.credential.id,
                &model,
                input_tokens,
                drain.last_output_tokens as u64,
            );
        }
    }
}

/// Handles one line of the upstream body: non-`data: ` lines and undecodable
/// payloads are skipped, everything else becomes one caller-facing SSE event.
fn process_upstream_line(
    line: &[u8],
    model: &str,
    req_id: &str,
    drain: &mut DrainState,
) -> Option<Bytes> {
    let line = std::str::from_utf8(line).ok()?.trim();
    let payload = line.strip_prefix("data: ")?;

    let mut chunk: GeminiResponse = serde_json::from_str(payload).ok()?;

    let text = concat_candidate_text(&chunk);
    if text.contains(DONE_MARKER) {
        drain.found_done = true;
    }
    strip_done_marker(&mut chunk);
    drain.collected_text.push_str(&text.replace(DONE_MARKER, ""));

    if let Some(usage) = chunk.usage_metadata {
        drain.last_output_tokens = usage.candidates_token_count;
    }

    let converted = transform_gemini_chunk(&chunk, model, req_id);
    let json = serde_json::to_string(&converted).ok()?;
    Some(Bytes::from(format!("data: {}\n\n", json)))
}

/// Replays everything collected so far as a model turn, then asks the model
/// to pick up where it stopped. Tools, generation config, and the system
/// instruction ride along unchanged.
pub fn build_continuation(original: &GeminiRequest, collected_text: &str) -> GeminiRequest {
    let total_chars = collected_text.chars().count();
    let tail: String = if total_chars > CONTINUATION_TAIL_CHARS {
        collected_text
            .chars()
            .skip(total_chars - CONTINUATION_TAIL_CHARS)
            .collect()
    } else {
        collected_text.to_string()
    };

    let prompt = format!(
        "Continue from where you left off. You have already output approximately {} characters ending with:\n\"...{}\"\n\nContinue:",
        total_chars, tail
    );

    let mut next = original.clone();
    next.contents.push(GeminiContent {
        parts: vec![GeminiPart::from_text(collected_text)],
        role: "model".to_string(),
    });
    next.contents.push(GeminiContent {
        parts: vec![GeminiPart::from_text(prompt)],
        role: "user".to_string(),
    });
    next
}

fn error_event(message: &str) -> Bytes {
    let payload = json!({ "error": message });
    Bytes::from(format!("data: {}\n\n", payload))
}
