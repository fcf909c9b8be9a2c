//! Tool-output sanitation.
//!
//! Every tool result passes through here before becoming Tool-message
//! content. Budget is in tokens (~4 chars each). JSON arrays keep their first
//! 20 elements plus a truncation marker; long plain text keeps the first 70%
//! and last 30% of the char budget around an ellipsis marker. The output is
//! always a plain string.

use serde_json::Value;

const MAX_ARRAY_ELEMENTS: usize = 20;
const CHARS_PER_TOKEN: usize = 4;
const ELLIPSIS: &str = "\n…\n";

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    index = index.min(s.len());
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn truncate_array(value: &mut Value) {
    match value {
        Value::Array(items) => {
            if items.len() > MAX_ARRAY_ELEMENTS {
                let original = items.len();
                items.truncate(MAX_ARRAY_ELEMENTS);
                items.push(serde_json::json!({
                    "_truncated": true,
                    "original_count": original,
                }));
            }
            for item in items.iter_mut() {
                truncate_array(item);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                truncate_array(v);
            }
        }
        _ => {}
    }
}

fn truncate_text(text: &str, budget_chars: usize) -> String {
    if text.len() <= budget_chars {
        return text.to_string();
    }
    let head_len = floor_char_boundary(text, budget_chars * 7 / 10);
    let tail_target = budget_chars * 3 / 10;
    let tail_start = floor_char_boundary(text, text.len().saturating_sub(tail_target));
    format!("{}{}{}", &text[..head_len], ELLIPSIS, &text[tail_start..])
}

/// Sanitizes one tool result against `budget_tokens`.
///
/// JSON input keeps its outer structure (arrays clipped to 20 elements with a
/// `{"_truncated": true, "original_count": N}` marker); if the clipped JSON
/// still overflows, the serialized form is head/tail-truncated like plain
/// text.
pub fn truncate_tool_output(raw: &str, budget_tokens: u32) -> String {
    let budget_chars = budget_tokens as usize * CHARS_PER_TOKEN;
    if let Ok(mut value) = serde_json::from_str::<Value>(raw) {
        if value.is_array() || value.is_object() {
            truncate_array(&mut value);
            let rendered = value.to_string();
            return truncate_text(&rendered, budget_chars);
        }
    }
    truncate_text(raw, budget_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_is_untouched() {
        assert_eq!(truncate_tool_output("ok", 5000), "ok");
    }

    #[test]
    fn long_json_array_is_clipped_with_marker() {
        let items: Vec<Value> = (0..50).map(|i| serde_json::json!({"id": i})).collect();
        let raw = serde_json::to_string(&items).unwrap();
        let out = truncate_tool_output(&raw, 5000);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        let arr = parsed.as_array().unwrap();
        assert_eq!(arr.len(), MAX_ARRAY_ELEMENTS + 1);
        let marker = arr.last().unwrap();
        assert_eq!(marker["_truncated"], true);
        assert_eq!(marker["original_count"], 50);
    }

    #[test]
    fn nested_arrays_are_clipped_too() {
        let raw = serde_json::json!({"sprints": (0..40).collect::<Vec<u32>>()}).to_string();
        let out = truncate_tool_output(&raw, 5000);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            parsed["sprints"].as_array().unwrap().len(),
            MAX_ARRAY_ELEMENTS + 1
        );
    }

    #[test]
    fn long_text_keeps_head_and_tail() {
        let text = format!("HEAD{}TAIL", "x".repeat(100_000));
        let out = truncate_tool_output(&text, 1000);
        assert!(out.starts_with("HEAD"));
        assert!(out.ends_with("TAIL"));
        assert!(out.contains(ELLIPSIS.trim()));
        // within 5% of the budget (4000 chars) plus the marker
        assert!(out.len() <= 4000 + ELLIPSIS.len() + 200);
    }

    #[test]
    fn budget_is_respected_within_tolerance() {
        let text = "z".repeat(200_000);
        let budget_tokens = 5000u32;
        let out = truncate_tool_output(&text, budget_tokens);
        let max_chars = (budget_tokens as usize * CHARS_PER_TOKEN) as f64 * 1.05;
        assert!((out.len() as f64) <= max_chars + ELLIPSIS.len() as f64);
    }
}
