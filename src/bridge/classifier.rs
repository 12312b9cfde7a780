//! # Event Classifier
//!
//! Pulls a best-effort transcript fragment out of an upstream event and decides
//! whether it is a partial (delta) or a final (completed utterance).
//!
//! ## Text search order (first non-empty trimmed string wins):
//! For each key of `text`, `transcript`, `transcription`, `output_text`:
//! 1. the top-level field
//! 2. the same field inside `item`
//! 3. each `item.content[*]` block
//!
//! then top-level `delta`, then `transcription.text`.
//!
//! A block offers its first present, non-empty field among `text`,
//! `transcript` and `delta`. If that field is blank after trimming the
//! block is skipped; later fields of the same block are not consulted.
//!
//! Missing or oddly typed fields never fail; they just contribute nothing.

use super::events::UpstreamEvent;
use serde_json::Value;

const TEXT_KEYS: [&str; 4] = ["text", "transcript", "transcription", "output_text"];
const BLOCK_KEYS: [&str; 3] = ["text", "transcript", "delta"];

/// Result of classifying one upstream event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub text: Option<String>,
    pub is_partial: bool,
    pub is_final: bool,
}

impl Classification {
    /// Text of a partial event, if it has any.
    pub fn partial_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|_| self.is_partial)
    }

    /// Text of a final event, if it has any.
    pub fn final_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|_| self.is_final)
    }
}

/// Classify an upstream event. Unknown tags are neither partial nor final.
pub fn classify(event: &UpstreamEvent) -> Classification {
    let Some(kind) = event.kind() else {
        return Classification::default();
    };
    let (is_partial, is_final) = (kind.is_partial(), kind.is_final());
    if !is_partial && !is_final {
        return Classification::default();
    }

    Classification {
        text: extract_text(event.payload()),
        is_partial,
        is_final,
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Whether a field counts as set: not null, false, zero or empty.
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn block_text(block: &Value) -> Option<String> {
    let candidate = BLOCK_KEYS
        .iter()
        .filter_map(|key| block.get(key))
        .find(|value| is_set(value));
    non_empty(candidate)
}

/// Best-effort text extraction from any JSON payload.
pub fn extract_text(event: &Value) -> Option<String> {
    let item = event.get("item").filter(|item| item.is_object());
    let blocks = item
        .and_then(|item| item.get("content"))
        .and_then(Value::as_array);

    for key in TEXT_KEYS {
        if let Some(text) = non_empty(event.get(key)) {
            return Some(text);
        }
        if let Some(text) = item.and_then(|item| non_empty(item.get(key))) {
            return Some(text);
        }
        if let Some(text) = blocks
            .into_iter()
            .flatten()
            .filter(|block| block.is_object())
            .find_map(block_text)
        {
            return Some(text);
        }
    }

    non_empty(event.get("delta"))
        .or_else(|| non_empty(event.get("transcription").and_then(|t| t.get("text"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify_json(value: Value) -> Classification {
        classify(&UpstreamEvent::from_value(value))
    }

    #[test]
    fn test_final_transcription_completed() {
        let result = classify_json(json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "item_id": "item_1",
            "transcript": "  Hej, hur mår du?  "
        }));
        assert!(result.is_final);
        assert!(!result.is_partial);
        assert_eq!(result.final_text(), Some("Hej, hur mår du?"));
        assert_eq!(result.partial_text(), None);
    }

    #[test]
    fn test_partial_delta() {
        let result = classify_json(json!({"type": "response.output_text.delta", "delta": "hel"}));
        assert!(result.is_partial);
        assert_eq!(result.partial_text(), Some("hel"));
    }

    #[test]
    fn test_unknown_type_has_no_text() {
        let result = classify_json(json!({"type": "session.created", "text": "ignored"}));
        assert_eq!(result, Classification::default());
    }

    #[test]
    fn test_error_event_is_neither() {
        let result = classify_json(json!({"type": "error", "error": {"message": "boom"}}));
        assert!(!result.is_partial && !result.is_final);
        assert_eq!(result.text, None);
    }

    #[test]
    fn test_unrecognized_fields_yield_nothing() {
        assert_eq!(extract_text(&json!({"foo": "bar", "baz": {"qux": 1}})), None);
        assert_eq!(extract_text(&json!("just a string")), None);
        assert_eq!(extract_text(&json!(null)), None);
    }

    #[test]
    fn test_top_level_key_order() {
        let event = json!({"output_text": "d", "transcription": "c", "transcript": "b", "text": "a"});
        assert_eq!(extract_text(&event).as_deref(), Some("a"));
        let event = json!({"output_text": "d", "transcript": "  ", "text": 5});
        assert_eq!(extract_text(&event).as_deref(), Some("d"));
    }

    #[test]
    fn test_item_field_beats_later_top_level_key() {
        let event = json!({"transcript": "top", "item": {"text": "nested"}});
        assert_eq!(extract_text(&event).as_deref(), Some("nested"));
        let event = json!({"text": "top", "item": {"text": "nested"}});
        assert_eq!(extract_text(&event).as_deref(), Some("top"));
    }

    #[test]
    fn test_content_block_beats_later_top_level_key() {
        let event = json!({"transcript": "top", "item": {"content": [{"text": "block"}]}});
        assert_eq!(extract_text(&event).as_deref(), Some("block"));
    }

    #[test]
    fn test_blank_leading_block_field_skips_block() {
        let event = json!({"item": {"content": [{"text": "  ", "transcript": "t"}]}});
        assert_eq!(extract_text(&event), None);
        let event = json!({"item": {"content": [{"text": "", "transcript": "t"}]}});
        assert_eq!(extract_text(&event).as_deref(), Some("t"));
        let event = json!({"item": {"content": [{"text": null, "delta": " d "}]}});
        assert_eq!(extract_text(&event).as_deref(), Some("d"));
    }

    #[test]
    fn test_item_fields() {
        let event = json!({"item": {"transcript": "from item"}, "delta": "later"});
        assert_eq!(extract_text(&event).as_deref(), Some("from item"));
    }

    #[test]
    fn test_item_content_blocks() {
        let event = json!({
            "item": {
                "content": [
                    "not a block",
                    {"type": "input_audio", "transcript": null},
                    {"type": "input_text", "text": "  "},
                    {"type": "input_audio", "transcript": "block text"}
                ]
            },
            "delta": "later"
        });
        assert_eq!(extract_text(&event).as_deref(), Some("block text"));
    }

    #[test]
    fn test_block_delta_field() {
        let event = json!({"item": {"content": [{"delta": "tail"}]}});
        assert_eq!(extract_text(&event).as_deref(), Some("tail"));
    }

    #[test]
    fn test_nested_transcription_text() {
        let event = json!({"transcription": {"text": " nested "}});
        assert_eq!(extract_text(&event).as_deref(), Some("nested"));
    }

    #[test]
    fn test_malformed_item_is_tolerated() {
        let event = json!({"item": "oops", "delta": "ok"});
        assert_eq!(extract_text(&event).as_deref(), Some("ok"));
        let event = json!({"item": {"content": "oops"}, "transcription": {"text": 3}});
        assert_eq!(extract_text(&event), None);
    }
}
