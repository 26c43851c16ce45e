//! Upstream response → canonical chat completion translation, shared by the
//! unary and streaming paths.

use serde_json::json;

use super::models::{
    AssistantMessage, Choice, OpenAIResponse, OpenAIUsage, ToolCall, ToolFunction,
};
use crate::constants::DONE_MARKER;
use crate::proxy::mappers::gemini::{GeminiCandidate, GeminiResponse};

pub fn transform_gemini_response(resp: &GeminiResponse, model: &str, req_id: &str) -> OpenAIResponse {
    transform(resp, model, req_id, false)
}

pub fn transform_gemini_chunk(resp: &GeminiResponse, model: &str, req_id: &str) -> OpenAIResponse {
    transform(resp, model, req_id, true)
}

fn transform(resp: &GeminiResponse, model: &str, req_id: &str, chunk: bool) -> OpenAIResponse {
    let choices = resp
        .candidates
        .iter()
        .map(|candidate| {
            let message = candidate_message(candidate);
            Choice {
                index: candidate.index,
                message: (!chunk).then(|| message.clone()),
                delta: chunk.then_some(message),
                finish_reason: candidate
                    .finish_reason
                    .as_deref()
                    .filter(|r| !r.is_empty())
                    .map(map_finish_reason),
            }
        })
        .collect();

    OpenAIResponse {
        id: req_id.to_string(),
        object: if chunk {
            "chat.completion.chunk"
        } else {
            "chat.completion"
        }
        .to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices,
        usage: resp.usage_metadata.as_ref().map(|u| OpenAIUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        }),
    }
}

fn candidate_message(candidate: &GeminiCandidate) -> AssistantMessage {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for part in &candidate.content.parts {
        if let Some(t) = part.text.as_deref() {
            text.push_str(t);
        }
        if let Some(call) = &part.function_call {
            let arguments = serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_string());
            tool_calls.push(ToolCall {
                id: format!("call_{}", call.name),
                r#type: "function".to_string(),
                function: ToolFunction {
                    name: call.name.clone(),
                    arguments,
                },
            });
        }
    }

    AssistantMessage {
        role: "assistant".to_string(),
        content: (!text.is_empty()).then_some(text),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
    }
}

fn map_finish_reason(reason: &str) -> String {
    match reason {
        "STOP" => "stop",
        "MAX_TOKENS" => "length",
        "SAFETY" | "RECITATION" => "content_filter",
        _ => "stop",
    }
    .to_string()
}

/// Concatenated text across every candidate's parts, in order.
pub fn concat_candidate_text(resp: &GeminiResponse) -> String {
    let mut out = String::new();
    for candidate in &resp.candidates {
        for part in &candidate.content.parts {
            if let Some(text) = part.text.as_deref() {
                out.push_str(text);
            }
        }
    }
    out
}

/// Removes every occurrence of the done marker from every text part. Always
/// applied before conversion, even when the marker was already seen.
pub fn strip_done_marker(resp: &mut GeminiResponse) {
    for candidate in &mut resp.candidates {
        for part in &mut candidate.content.parts {
            if let Some(text) = part.text.as_mut() {
                if text.contains(DONE_MARKER) {
                    *text = text.replace(DONE_MARKER, "");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mappers::openai::request::transform_openai_request;
    use crate::proxy::mappers::openai::OpenAIRequest;
    use serde_json::{json, Value};

    fn gemini_from(value: Value) -> GeminiResponse {
        serde_json::from_value(value).expect("response should deserialize")
    }

    #[test]
    fn unary_response_maps_text_and_usage() {
        let resp = gemini_from(json!({
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
        }));
        let out = transform_gemini_response(&resp, "gemini-2.0-flash", "chatcmpl-1");

        assert_eq!(out.object, "chat.completion");
        assert_eq!(out.model, "gemini-2.0-flash");
        let choice = &out.choices[0];
        let message = choice.message.as_ref().expect("message");
        assert_eq!(message.content.as_deref(), Some("Hi"));
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));
        assert!(choice.delta.is_none());

        let usage = out.usage.expect("usage");
        assert_eq!(usage.prompt_tokens, 5);
        assert_eq!(usage.completion_tokens, 1);
        assert_eq!(usage.total_tokens, 6);
    }

    #[test]
    fn chunk_uses_delta_and_chunk_object() {
        let resp = gemini_from(json!({
            "candidates": [{
                "content": {"parts": [{"text": "The "}], "role": "model"},
                "index": 0
            }]
        }));
        let out = transform_gemini_chunk(&resp, "gemini-2.0-flash", "chatcmpl-2");

        assert_eq!(out.object, "chat.completion.chunk");
        let choice = &out.choices[0];
        assert!(choice.message.is_none());
        assert_eq!(
            choice.delta.as_ref().and_then(|d| d.content.as_deref()),
            Some("The ")
        );
        assert!(choice.finish_reason.is_none());
        assert!(out.usage.is_none());
    }

    #[test]
    fn finish_reason_mapping_covers_all_arms() {
        for (upstream, expected) in [
            ("STOP", "stop"),
            ("MAX_TOKENS", "length"),
            ("SAFETY", "content_filter"),
            ("RECITATION", "content_filter"),
            ("UNEXPECTED", "stop"),
        ] {
            let resp = gemini_from(json!({
                "candidates": [{
                    "content": {"parts": [], "role": "model"},
                    "finishReason": upstream,
                    "index": 0
                }]
            }));
            let out = transform_gemini_response(&resp, "m", "id");
            assert_eq!(out.choices[0].finish_reason.as_deref(), Some(expected));
        }

        let missing = gemini_from(json!({
            "candidates": [{"content": {"parts": [], "role": "model"}, "index": 0}]
        }));
        let out = transform_gemini_response(&missing, "m", "id");
        assert!(out.choices[0].finish_reason.is_none());
    }

    #[test]
    fn function_call_parts_become_tool_calls() {
        let resp = gemini_from(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Looking it up."},
                        {"functionCall": {"name": "get_weather", "args": {"city": "Oslo"}}}
                    ],
                    "role": "model"
                },
                "finishReason": "STOP",
                "index": 0
            }]
        }));
        let out = transform_gemini_response(&resp, "m", "id");
        let message = out.choices[0].message.as_ref().expect("message");
        let calls = message.tool_calls.as_ref().expect("tool calls");
        assert_eq!(calls[0].id, "call_get_weather");
        assert_eq!(calls[0].r#type, "function");
        assert_eq!(calls[0].function.name, "get_weather");
        let args: Value = serde_json::from_str(&calls[0].function.arguments).expect("args json");
        assert_eq!(args, json!({"city": "Oslo"}));
    }

    #[test]
    fn empty_parts_produce_message_without_content() {
        let resp = gemini_from(json!({
            "candidates": [{
                "content": {"parts": [], "role": "model"},
                "index": 2
            }]
        }));
        let out = transform_gemini_response(&resp, "m", "id");
        assert_eq!(out.choices[0].index, 2);
        let message = out.choices[0].message.as_ref().expect("message");
        assert!(message.content.is_none());
        assert!(message.tool_calls.is_none());
    }

    #[test]
    fn strip_done_marker_removes_every_occurrence() {
        let mut resp = gemini_from(json!({
            "candidates": [{
                "content": {
                    "parts": [{"text": "is 42.[done]"}, {"text": "[done] trailing"}],
                    "role": "model"
                },
                "index": 0
            }]
        }));
        strip_done_marker(&mut resp);
        assert_eq!(concat_candidate_text(&resp), "is 42. trailing");
    }

    // Round trip: canonical request → upstream contents → canonical message
    // fields survive (text, tool call names/args, tool-choice mode).
    #[test]
    fn conversion_round_trip_preserves_conversation() {
        let req: OpenAIRequest = serde_json::from_value(json!({
            "model": "gemini-1.5-pro",
            "messages": [
                {"role": "user", "content": "what is the weather?"},
                {"role": "assistant", "content": "Checking.", "tool_calls": [{
                    "id": "call_get_weather",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"city\":\"Oslo\"}"}
                }]}
            ],
            "tool_choice": "required"
        }))
        .expect("request");
        let upstream = transform_openai_request(&req);

        assert_eq!(
            upstream.contents[0].parts[0].text.as_deref(),
            Some("what is the weather?")
        );
        assert_eq!(
            upstream
                .tool_config
                .as_ref()
                .map(|c| c.function_calling_config.mode.as_str()),
            Some("ANY")
        );

        // Feed the assistant turn back through the response mapper.
        let echoed = GeminiResponse {
            candidates: vec![GeminiCandidate {
                content: upstream.contents[1].clone(),
                finish_reason: Some("STOP".to_string()),
                index: 0,
            }],
            usage_metadata: None,
        };
        let back = transform_gemini_response(&echoed, &req.model, "chatcmpl-9");
        assert_eq!(back.model, "gemini-1.5-pro");
        let message = back.choices[0].message.as_ref().expect("message");
        assert_eq!(message.content.as_deref(), Some("Checking."));
        let calls = message.tool_calls.as_ref().expect("tool calls");
        assert_eq!(calls[0].function.name, "get_weather");
        let args: Value = serde_json::from_str(&calls[0].function.arguments).expect("args");
        assert_eq!(args, json!({"city": "Oslo"}));
    }
}
