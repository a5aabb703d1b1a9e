use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Core trait for text generation backends
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for a system instruction plus user prompt
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse>;
}

/// Request structure for LLM generation
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_limits(mut self, max_tokens: usize, temperature: f32) -> Self {
        self.max_tokens = Some(max_tokens);
        self.temperature = Some(temperature);
        self
    }

    /// Overrides the provider's default timeout for this request only.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }
}

/// Response from LLM generation
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: UsageMetadata,
    pub model: String,
}

/// Token usage metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

pub mod enrich;
pub mod remote;

/// First balanced `{...}` block in free-form model output.
///
/// Braces inside JSON strings (and escaped quotes) do not count towards the
/// balance, so prose before or after the object is ignored.
pub fn extract_json_object(text: &str) -> Option<&str> {
    extract_balanced(text, '{', '}')
}

/// First balanced `[...]` block, for list-shaped answers.
pub fn extract_json_array(text: &str) -> Option<&str> {
    extract_balanced(text, '[', ']')
}

fn extract_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(open) {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&text[start..], open, close) {
            return Some(&text[start..start + end]);
        }
        search_from = start + open.len_utf8();
    }
    None
}

/// Byte length of the balanced block at the start of `text`.
fn balanced_end(text: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_is_found_inside_prose() {
        let text = "Tu je článok:\n```json\n{\"a\": {\"b\": 1}, \"c\": \"}\"}\n```\nHotovo {x}";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}, \"c\": \"}\"}"));
    }

    #[test]
    fn escaped_quotes_do_not_end_strings() {
        let text = r#"{"q": "say \"{hi}\"", "n": 2} trailing"#;
        assert_eq!(extract_json_object(text), Some(r#"{"q": "say \"{hi}\"", "n": 2}"#));
    }

    #[test]
    fn unbalanced_input_yields_none() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{\"open\": 1"), None);
    }

    #[test]
    fn array_extraction() {
        assert_eq!(
            extract_json_array("Keywords: [\"a\", \"b]\"] done"),
            Some("[\"a\", \"b]\"]")
        );
    }
}
