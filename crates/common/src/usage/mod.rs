//! Token usage and text extraction for provider payloads
//!
//! Responses and embeddings report usage under different field names;
//! both are normalized into [`Usage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Add;

/// Normalized token counts for one provider call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// Usage block of a Responses API payload
    pub fn from_responses(payload: &Value) -> Self {
        let usage = &payload["usage"];
        let input_tokens = count(&usage["input_tokens"]);
        let output_tokens = count(&usage["output_tokens"]);
        let cached_input_tokens = count(&usage["input_tokens_details"]["cached_tokens"]);

        Self::new(input_tokens, cached_input_tokens, output_tokens, count(&usage["total_tokens"]))
    }

    /// Usage block of an embeddings payload (`prompt_tokens`, falling back to `input_tokens`)
    pub fn from_embeddings(payload: &Value) -> Self {
        let usage = &payload["usage"];
        let input_tokens = if usage["prompt_tokens"].is_null() {
            count(&usage["input_tokens"])
        } else {
            count(&usage["prompt_tokens"])
        };

        Self::new(input_tokens, 0, 0, count(&usage["total_tokens"]))
    }

    /// Build usage; a zero total is replaced by `input + output`
    pub fn new(input_tokens: u64, cached_input_tokens: u64, output_tokens: u64, total_tokens: u64) -> Self {
        let total_tokens = if total_tokens == 0 {
            input_tokens + output_tokens
        } else {
            total_tokens
        };

        Self {
            input_tokens,
            cached_input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Input tokens that are billed at the full rate
    pub fn billable_input_tokens(&self) -> u64 {
        self.input_tokens.saturating_sub(self.cached_input_tokens)
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, other: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens + other.input_tokens,
            cached_input_tokens: self.cached_input_tokens + other.cached_input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }
}

/// Read a token count; missing, negative or non-numeric values count as zero
fn count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| *f > 0.0).map(|f| f as u64).unwrap_or(0),
        _ => 0,
    }
}

/// Concatenate every `output_text`/`text` block of a Responses payload, trimmed
pub fn extract_response_text(payload: &Value) -> String {
    let mut text = String::new();

    let Some(output) = payload["output"].as_array() else {
        return text;
    };

    for item in output {
        let Some(blocks) = item["content"].as_array() else {
            continue;
        };
        for block in blocks {
            if matches!(block["type"].as_str(), Some("output_text") | Some("text")) {
                if let Some(part) = block["text"].as_str() {
                    text.push_str(part);
                }
            }
        }
    }

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_responses_usage_with_cached_tokens() {
        let payload = json!({
            "usage": {
                "input_tokens": 120,
                "output_tokens": 30,
                "input_tokens_details": { "cached_tokens": 20 },
                "total_tokens": 150
            }
        });
        let usage = Usage::from_responses(&payload);
        assert_eq!(usage, Usage::new(120, 20, 30, 150));
        assert_eq!(usage.billable_input_tokens(), 100);
    }

    #[test]
    fn test_total_defaults_to_sum() {
        let payload = json!({ "usage": { "input_tokens": 7, "output_tokens": 5 } });
        assert_eq!(Usage::from_responses(&payload).total_tokens, 12);
    }

    #[test]
    fn test_missing_usage_is_zero() {
        assert_eq!(Usage::from_responses(&json!({})), Usage::default());
        assert_eq!(Usage::from_embeddings(&json!({ "usage": null })), Usage::default());
    }

    #[test]
    fn test_embeddings_usage_prefers_prompt_tokens() {
        let payload = json!({ "usage": { "prompt_tokens": 9, "input_tokens": 99 } });
        let usage = Usage::from_embeddings(&payload);
        assert_eq!(usage.input_tokens, 9);
        assert_eq!(usage.total_tokens, 9);
        assert_eq!(usage.output_tokens, 0);

        let payload = json!({ "usage": { "input_tokens": 4, "total_tokens": 4 } });
        assert_eq!(Usage::from_embeddings(&payload).input_tokens, 4);
    }

    #[test]
    fn test_negative_counts_clamp_to_zero() {
        let payload = json!({ "usage": { "input_tokens": -5, "output_tokens": "3" } });
        let usage = Usage::from_responses(&payload);
        assert_eq!(usage.input_tokens, 0);
        assert_eq!(usage.output_tokens, 3);
    }

    #[test]
    fn test_extract_response_text_joins_blocks() {
        let payload = json!({
            "output": [
                { "type": "reasoning", "content": [] },
                {
                    "type": "message",
                    "content": [
                        { "type": "output_text", "text": "  Beloved, " },
                        { "type": "refusal", "refusal": "ignored" },
                        { "type": "text", "text": "pray on.  " }
                    ]
                }
            ]
        });
        assert_eq!(extract_response_text(&payload), "Beloved, pray on.");
    }

    #[test]
    fn test_extract_response_text_without_output() {
        assert_eq!(extract_response_text(&json!({ "id": "resp_1" })), "");
    }
}
