//! Turns free-form LLM output into a [`Decision`].
//!
//! Tried in order, stopping at first success: a native or pre-parsed tool
//! call carried in backend metadata, a `THINKING: … ACTION: {json}` prefix,
//! the whole text as JSON, a fenced code block, the shortest JSON-looking
//! substring naming a tool, any balanced `{…}` region, and finally a
//! regex-based best-effort scan over a possibly truncated fragment. Field
//! names are read through a fixed set of aliases at every step.

use arena_types::Decision;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::llm::GenerationResult;

/// Parse a backend's [`GenerationResult`] into a [`Decision`].
///
/// Checks backend-provided metadata first (a native `tool_call`, or a
/// `parsed_tool_call` the backend already extracted from its own output
/// format) before falling back to free-text parsing of `result.text`.
pub fn parse_decision(result: &GenerationResult) -> Decision {
    if let Some(tool_call) = result.metadata.get("tool_call").and_then(Value::as_object) {
        let tool = tool_call
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(Decision::IDLE_TOOL)
            .to_string();
        let params = tool_call
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let reasoning = if result.text.trim().is_empty() {
            Some("LLM tool call".to_string())
        } else {
            Some(result.text.clone())
        };
        return Decision {
            tool,
            params,
            reasoning,
        };
    }

    if let Some(parsed) = result
        .metadata
        .get("parsed_tool_call")
        .and_then(Value::as_object)
    {
        return decision_from_object(parsed, "LLM decision");
    }

    parse_decision_text(&result.text)
}

/// Parse free-form LLM text into a [`Decision`] using the text-only strategies.
pub fn parse_decision_text(text: &str) -> Decision {
    let trimmed = text.trim();

    if let Some(decision) = parse_thinking_action(trimmed) {
        return decision;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(object) = value.as_object() {
            return decision_from_object(object, "LLM decision");
        }
    }
    if let Some(decision) = parse_fenced_code_block(trimmed) {
        return decision;
    }
    if let Some(decision) = parse_shortest_tool_span(trimmed) {
        return decision;
    }
    if let Some(decision) = parse_any_balanced_span(trimmed) {
        return decision;
    }
    if let Some(decision) = parse_truncated(trimmed) {
        return decision;
    }

    Decision::idle(Some("Failed to parse LLM response".to_string()))
}

fn decision_from_object(obj: &Map<String, Value>, default_reasoning: &str) -> Decision {
    let tool = obj
        .get("tool")
        .or_else(|| obj.get("action"))
        .or_else(|| obj.get("tool_name"))
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)
        .unwrap_or(Decision::IDLE_TOOL)
        .to_string();
    let params = obj
        .get("params")
        .or_else(|| obj.get("parameters"))
        .or_else(|| obj.get("arguments"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let reasoning = obj
        .get("reasoning")
        .or_else(|| obj.get("thought"))
        .or_else(|| obj.get("explanation"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .or_else(|| Some(default_reasoning.to_string()));
    Decision {
        tool,
        params,
        reasoning,
    }
}

/// Find the end (exclusive) of the `{` at `start`, respecting quoted strings.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every balanced `{…}` span in `text`, one per opening brace encountered.
fn candidate_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    for (i, c) in text.char_indices() {
        if c == '{' {
            if let Some(end) = balanced_end(text, i) {
                spans.push((i, end));
            }
        }
    }
    spans
}

fn parse_thinking_action(text: &str) -> Option<Decision> {
    let thinking_idx = text.find("THINKING:")?;
    let action_idx = text[thinking_idx..].find("ACTION:").map(|i| thinking_idx + i)?;
    let reasoning = text[thinking_idx + "THINKING:".len()..action_idx]
        .trim()
        .to_string();

    let after_action = &text[action_idx + "ACTION:".len()..];
    let brace_offset = after_action.find('{')?;
    let start = action_idx + "ACTION:".len() + brace_offset;
    let end = balanced_end(text, start)?;
    let value: Value = serde_json::from_str(&text[start..end]).ok()?;
    let obj = value.as_object()?;
    Some(decision_from_object(obj, &reasoning))
}

fn fenced_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap())
}

fn parse_fenced_code_block(text: &str) -> Option<Decision> {
    let captures = fenced_code_regex().captures(text)?;
    let body = captures.get(1)?.as_str().trim();
    let value: Value = serde_json::from_str(body).ok()?;
    let obj = value.as_object()?;
    Some(decision_from_object(obj, "LLM decision"))
}

fn parse_shortest_tool_span(text: &str) -> Option<Decision> {
    let mut spans: Vec<&str> = candidate_spans(text)
        .into_iter()
        .map(|(s, e)| &text[s..e])
        .filter(|span| span.contains("\"tool\""))
        .collect();
    spans.sort_by_key(|span| span.len());
    spans.into_iter().find_map(|span| {
        let value: Value = serde_json::from_str(span).ok()?;
        let obj = value.as_object()?;
        Some(decision_from_object(obj, "LLM decision"))
    })
}

fn parse_any_balanced_span(text: &str) -> Option<Decision> {
    candidate_spans(text).into_iter().find_map(|(s, e)| {
        let value: Value = serde_json::from_str(&text[s..e]).ok()?;
        let obj = value.as_object()?;
        Some(decision_from_object(obj, "LLM decision"))
    })
}

fn tool_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""tool"\s*:\s*"([^"]+)""#).unwrap())
}

fn target_position_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""target_position"\s*:\s*(\[[^\]]*\])"#).unwrap())
}

/// Best-effort recovery from a truncated fragment: a bare `"tool": "<name>"`
/// plus, if present, a `"params": {…}` object or a `"target_position": [...]`
/// array pulled out independently (the fragment may be cut off before a
/// matching closing brace for `params` ever appears).
fn parse_truncated(text: &str) -> Option<Decision> {
    let tool = tool_regex().captures(text)?.get(1)?.as_str().to_string();

    let mut params = Map::new();
    if let Some(idx) = text.find("\"params\"") {
        if let Some(brace) = text[idx..].find('{') {
            let start = idx + brace;
            if let Some(end) = balanced_end(text, start) {
                if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text[start..end]) {
                    params = map;
                }
            }
        }
    }
    if params.is_empty() {
        if let Some(captures) = target_position_regex().captures(text) {
            if let Ok(array) = serde_json::from_str::<Value>(&captures[1]) {
                params.insert("target_position".to_string(), array);
            }
        }
    }

    Some(Decision {
        tool,
        params,
        reasoning: Some("Recovered from truncated LLM response".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FinishReason;

    fn result(text: &str) -> GenerationResult {
        GenerationResult {
            text: text.to_string(),
            tokens_used: 0,
            finish_reason: FinishReason::Stop,
            metadata: Map::new(),
        }
    }

    #[test]
    fn native_tool_call_metadata_wins() {
        let mut r = result("ignored");
        r.metadata.insert(
            "tool_call".to_string(),
            serde_json::json!({"name": "pickup", "arguments": {"item_id": "apple_1"}}),
        );
        let decision = parse_decision(&r);
        assert_eq!(decision.tool, "pickup");
        assert_eq!(decision.params.get("item_id").unwrap(), "apple_1");
    }

    #[test]
    fn parsed_tool_call_metadata_is_used_next() {
        let mut r = result("ignored");
        r.metadata.insert(
            "parsed_tool_call".to_string(),
            serde_json::json!({"tool": "idle", "reasoning": "nothing to do"}),
        );
        let decision = parse_decision(&r);
        assert_eq!(decision.tool, "idle");
        assert_eq!(decision.reasoning.as_deref(), Some("nothing to do"));
    }

    #[test]
    fn thinking_action_prefix_is_extracted() {
        let text = r#"THINKING: the apple is close ACTION: {"tool": "pickup", "params": {"item_id": "apple_1"}}"#;
        let decision = parse_decision_text(text);
        assert_eq!(decision.tool, "pickup");
        assert_eq!(decision.reasoning.as_deref(), Some("the apple is close"));
    }

    #[test]
    fn whole_text_as_json_parses() {
        let decision = parse_decision_text(r#"{"action": "move_to", "parameters": {"target_position": [1,2,3]}}"#);
        assert_eq!(decision.tool, "move_to");
        assert_eq!(
            decision.params.get("target_position").unwrap(),
            &serde_json::json!([1, 2, 3])
        );
    }

    #[test]
    fn fenced_json_code_block_parses() {
        let text = "Here's my decision:\n```json\n{\"tool\": \"idle\"}\n```";
        let decision = parse_decision_text(text);
        assert_eq!(decision.tool, "idle");
    }

    #[test]
    fn shortest_tool_bearing_span_is_preferred() {
        let text = r#"context: {"unrelated": {"nested": true}} decision: {"tool": "idle"}"#;
        let decision = parse_decision_text(text);
        assert_eq!(decision.tool, "idle");
    }

    #[test]
    fn any_balanced_region_without_tool_key_still_parses() {
        let text = r#"sure, here: {"action": "use", "item_name": "torch"}"#;
        let decision = parse_decision_text(text);
        assert_eq!(decision.tool, "use");
    }

    #[test]
    fn truncated_fragment_recovers_tool_and_target_position() {
        let text = r#"{"tool": "move_to", "target_position": [4.0, 0.0, 0.0], "reaso"#;
        let decision = parse_decision_text(text);
        assert_eq!(decision.tool, "move_to");
        assert_eq!(
            decision.params.get("target_position").unwrap(),
            &serde_json::json!([4.0, 0.0, 0.0])
        );
    }

    #[test]
    fn unparsable_text_defaults_to_idle() {
        let decision = parse_decision_text("I am not sure what to do here.");
        assert_eq!(decision.tool, "idle");
    }
}
