use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::{Dataset, display_value};
use crate::error::{DatasetError, Result};

pub const CHAT_COMPLETIONS_URL: &str = "/chat/completions";
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub model: String,
    pub temperature: f64,
    pub messages: Vec<ChatMessage>,
}

/// One line of a batch request file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLine {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: RequestBody,
}

/// Serializes every row of `chunk` as one chat-completion request line.
pub fn encode_requests(
    chunk: &Dataset,
    id_column: &str,
    prompt_column: &str,
    model: &str,
    temperature: f64,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for row in chunk.rows() {
        let id = row.get(id_column).unwrap_or(&Value::Null);
        if matches!(id, Value::Null) {
            return Err(DatasetError::configuration(format!(
                "row without a value in id column '{id_column}'"
            )));
        }
        let prompt = row.get(prompt_column).map(display_value).unwrap_or_default();

        let line = RequestLine {
            custom_id: display_value(id),
            method: "POST".to_string(),
            url: CHAT_COMPLETIONS_URL.to_string(),
            body: RequestBody {
                model: model.to_string(),
                temperature,
                messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
            },
        };
        serde_json::to_writer(&mut out, &line)?;
        out.push(b'\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Row;
    use serde_json::json;

    #[test]
    fn each_row_becomes_one_line() {
        let mut ds = Dataset::new(vec!["sku".to_string(), "prompt".to_string()]);
        for (id, prompt) in [(json!(7), "first"), (json!("A-2"), "second")] {
            let mut row = Row::new();
            row.insert("sku".to_string(), id);
            row.insert("prompt".to_string(), json!(prompt));
            ds.push_row(row);
        }

        let bytes = encode_requests(&ds, "sku", "prompt", "gpt-4o-mini", 0.2).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<RequestLine> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].custom_id, "7");
        assert_eq!(lines[1].custom_id, "A-2");
        assert_eq!(lines[0].method, "POST");
        assert_eq!(lines[0].url, "/chat/completions");
        assert_eq!(lines[0].body.model, "gpt-4o-mini");
        assert_eq!(lines[0].body.messages[0], ChatMessage::system(SYSTEM_PROMPT));
        assert_eq!(lines[1].body.messages[1], ChatMessage::user("second"));
    }

    #[test]
    fn missing_id_is_rejected() {
        let mut ds = Dataset::new(vec!["id".to_string()]);
        ds.push_row(Row::new());
        assert!(encode_requests(&ds, "id", "prompt", "m", 0.0).is_err());
    }
}
