//! Canonical chat request → upstream request translation.

use serde_json::{json, Map, Value};

use super::models::{OpenAIMessage, OpenAIRequest};
use crate::proxy::common::json_schema::sanitize_schema;
use crate::proxy::mappers::gemini::{
    FunctionCallingConfig, GeminiContent, GeminiFunctionCall, GeminiFunctionDeclaration,
    GeminiFunctionResponse, GeminiPart, GeminiRequest, GeminiToolConfig, GeminiToolDef,
};

pub fn transform_openai_request(req: &OpenAIRequest) -> GeminiRequest {
    let mut out = GeminiRequest::default();
    let mut contents = Vec::new();

    for msg in &req.messages {
        match msg.role.as_str() {
            "system" => {
                // Later system messages replace earlier ones wholesale.
                out.system_instruction = Some(GeminiContent {
                    parts: vec![GeminiPart::from_text(flatten_content(&msg.content))],
                    role: "user".to_string(),
                });
            }
            "user" => {
                contents.push(GeminiContent {
                    parts: vec![GeminiPart::from_text(flatten_content(&msg.content))],
                    role: "user".to_string(),
                });
            }
            "assistant" => {
                if let Some(content) = assistant_content(msg) {
                    contents.push(content);
                }
            }
            "tool" => {
                contents.push(tool_content(msg));
            }
            other => {
                tracing::debug!("Skipping message with unsupported role: {}", other);
            }
        }
    }
    out.contents = contents;

    out.generation_config = build_generation_config(req);
    out.tools = build_tools(req);
    out.tool_config = build_tool_config(req);

    out
}

fn assistant_content(msg: &OpenAIMessage) -> Option<GeminiContent> {
    let mut parts = Vec::new();

    let text = flatten_content(&msg.content);
    if !text.is_empty() {
        parts.push(GeminiPart::from_text(text));
    }

    for call in msg.tool_calls.iter().flatten() {
        // Malformed argument strings degrade to an empty object instead of
        // dropping the call.
        let args =
            serde_json::from_str::<Value>(&call.function.arguments).unwrap_or_else(|_| json!({}));
        parts.push(GeminiPart {
            function_call: Some(GeminiFunctionCall {
                name: call.function.name.clone(),
                args,
            }),
            ..Default::default()
        });
    }

    if parts.is_empty() {
        return None;
    }
    Some(GeminiContent {
        parts,
        role: "model".to_string(),
    })
}

fn tool_content(msg: &OpenAIMessage) -> GeminiContent {
    let text = flatten_content(&msg.content);
    let response =
        serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({ "result": text }));

    GeminiContent {
        parts: vec![GeminiPart {
            function_response: Some(GeminiFunctionResponse {
                name: msg.name.clone().unwrap_or_default(),
                response,
            }),
            ..Default::default()
        }],
        role: "user".to_string(),
    }
}

/// String content passes through; block lists contribute their `text` fields
/// in order; anything else renders as a string.
pub fn flatten_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect(),
        other => other.to_string(),
    }
}

fn build_generation_config(req: &OpenAIRequest) -> Option<Map<String, Value>> {
    let mut config = Map::new();
    if let Some(temperature) = req.temperature {
        config.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = req.top_p {
        config.insert("topP".to_string(), json!(top_p));
    }
    if let Some(max_tokens) = req.max_tokens {
        config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    if let Some(stops) = stop_sequences(req.stop.as_ref()) {
        config.insert("stopSequences".to_string(), json!(stops));
    }
    if config.is_empty() {
        None
    } else {
        Some(config)
    }
}

fn stop_sequences(stop: Option<&Value>) -> Option<Vec<String>> {
    let sequences = match stop? {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };
    if sequences.is_empty() {
        None
    } else {
        Some(sequences)
    }
}

fn build_tools(req: &OpenAIRequest) -> Option<Vec<GeminiToolDef>> {
    let tools = req.tools.as_ref()?;
    if tools.is_empty() {
        return None;
    }

    let declarations = tools
        .iter()
        .map(|tool| GeminiFunctionDeclaration {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            parameters: tool.function.parameters.as_ref().map(sanitize_schema),
        })
        .collect();

    Some(vec![GeminiToolDef {
        function_declarations: declarations,
    }])
}

fn build_tool_config(req: &OpenAIRequest) -> Option<GeminiToolConfig> {
    let choice = req.tool_choice.as_ref()?;
    let mode = match choice.as_str() {
        Some("auto") => "AUTO",
        Some("none") => "NONE",
        Some("required") => "ANY",
        // Unknown strings and structured directives both fall back to AUTO.
        _ => "AUTO",
    };
    Some(GeminiToolConfig {
        function_calling_config: FunctionCallingConfig {
            mode: mode.to_string(),
        },
    })
}
