use crate::constants::DONE_INSTRUCTION;
use crate::proxy::mappers::gemini::{GeminiContent, GeminiPart, GeminiRequest};
use crate::proxy::mappers::openai::{flatten_content, OpenAIRequest};

/// Teaches the model to end every complete answer with the done marker.
/// Appended to an existing system instruction, or synthesized when absent.
pub fn inject_done_instruction(req: &mut GeminiRequest) {
    match req.system_instruction.as_mut() {
        Some(instruction) if !instruction.parts.is_empty() => {
            if let Some(text) = instruction.parts[0].text.as_mut() {
                text.push_str("\n\n");
                text.push_str(DONE_INSTRUCTION);
            } else {
                instruction.parts[0].text = Some(DONE_INSTRUCTION.to_string());
            }
        }
        _ => {
            req.system_instruction = Some(GeminiContent {
                parts: vec![GeminiPart::from_text(DONE_INSTRUCTION)],
                role: "user".to_string(),
            });
        }
    }
}

/// Flattened text of every caller message, fed to the input-token estimator.
pub fn collect_request_text(req: &OpenAIRequest) -> String {
    let mut out = String::new();
    for msg in &req.messages {
        out.push_str(&flatten_content(&msg.content));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mappers::openai::transform_openai_request;
    use serde_json::json;

    #[test]
    fn instruction_is_appended_after_two_newlines() {
        let req: OpenAIRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hi"}
            ]
        }))
        .expect("request");
        let mut gemini = transform_openai_request(&req);
        inject_done_instruction(&mut gemini);

        let text = gemini.system_instruction.expect("instruction").parts[0]
            .text
            .clone()
            .expect("text");
        assert_eq!(text, format!("be terse\n\n{}", DONE_INSTRUCTION));
    }

    #[test]
    fn instruction_is_synthesized_when_absent() {
        let req: OpenAIRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .expect("request");
        let mut gemini = transform_openai_request(&req);
        inject_done_instruction(&mut gemini);

        let instruction = gemini.system_instruction.expect("instruction");
        assert_eq!(instruction.role, "user");
        assert_eq!(instruction.parts[0].text.as_deref(), Some(DONE_INSTRUCTION));
    }

    #[test]
    fn request_text_concatenates_all_messages() {
        let req: OpenAIRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": "sys"},
                {"role": "user", "content": [{"type": "text", "text": "block"}]},
                {"role": "assistant", "content": "reply"}
            ]
        }))
        .expect("request");
        assert_eq!(collect_request_text(&req), "sysblockreply");
    }
}
