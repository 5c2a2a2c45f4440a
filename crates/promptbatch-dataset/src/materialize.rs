use serde::Deserialize;
use serde_json::{Map, Value};

use crate::dataset::{Dataset, Row};

pub const UNIQUE_ID_COLUMN: &str = "unique_id";
pub const MODEL_NAME_COLUMN: &str = "model_name";
pub const RAW_OUTPUT_COLUMN: &str = "raw_output";
pub const TOKEN_COLUMNS: [&str; 3] = ["prompt_tokens", "completion_tokens", "total_tokens"];

#[derive(Debug, Deserialize)]
struct ResponseLine {
    #[serde(default)]
    custom_id: Value,
    #[serde(default)]
    response: Option<ResponseEnvelope>,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    body: Option<ResponseBody>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseBody {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ResponseBody {
    /// Content of the first choice, or `""`.
    pub fn first_content(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

impl Usage {
    pub fn insert_into(&self, row: &mut Row) {
        let values = [self.prompt_tokens, self.completion_tokens, self.total_tokens];
        for (column, value) in TOKEN_COLUMNS.iter().zip(values) {
            row.insert(column.to_string(), value.map(Value::from).unwrap_or(Value::Null));
        }
    }
}

#[derive(Debug, Deserialize)]
struct RequestLineView {
    #[serde(default)]
    custom_id: Value,
    #[serde(default)]
    body: Option<RequestBodyView>,
}

#[derive(Debug, Deserialize)]
struct RequestBodyView {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<Value>,
    #[serde(default)]
    messages: Option<Value>,
}

/// What a model reply contributes to its result row.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOutput {
    Fields(Map<String, Value>),
    Raw(String),
    Empty,
}

impl StructuredOutput {
    /// Adds the parsed keys (or `raw_output`) to `row`. Keys already on the row
    /// are kept and the clashing parsed values are dropped.
    pub fn apply_to(self, row: &mut Row) {
        match self {
            Self::Fields(fields) => {
                for (key, value) in fields {
                    if row.contains_key(&key) {
                        tracing::warn!(column = %key, "model output key clashes with an existing column, dropped");
                        continue;
                    }
                    row.insert(key, value);
                }
            }
            Self::Raw(text) => {
                row.insert(RAW_OUTPUT_COLUMN.to_string(), Value::String(text));
            }
            Self::Empty => {}
        }
    }
}

/// Pulls a JSON object out of free-form model text.
///
/// The text between the first `{` and the last `}` is parsed strictly. Objects
/// are returned as fields; anything else falls back to raw text.
pub fn extract_structured_output(content: &str) -> StructuredOutput {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return StructuredOutput::Empty;
    }

    let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        return StructuredOutput::Raw(trimmed.to_string());
    };
    if end < start {
        return StructuredOutput::Raw(trimmed.to_string());
    }

    let candidate = &trimmed[start..=end];
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(fields)) => StructuredOutput::Fields(fields),
        _ => StructuredOutput::Raw(candidate.to_string()),
    }
}

/// Integer-looking string ids become numbers so they sort numerically.
pub fn normalize_id(id: Value) -> Value {
    match id {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(s)),
        other => other,
    }
}

/// Reshapes a batch output file into one row per response, sorted by `unique_id`.
pub fn parse_output_jsonl(bytes: &[u8]) -> Dataset {
    let mut dataset = Dataset::new(
        [UNIQUE_ID_COLUMN, MODEL_NAME_COLUMN]
            .into_iter()
            .chain(TOKEN_COLUMNS)
            .map(str::to_string)
            .collect(),
    );

    for line in non_empty_lines(bytes) {
        let parsed: ResponseLine = match serde_json::from_slice(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed response line");
                continue;
            }
        };
        let body = parsed
            .response
            .and_then(|r| r.body)
            .unwrap_or_default();

        let mut row = Row::new();
        row.insert(UNIQUE_ID_COLUMN.to_string(), normalize_id(parsed.custom_id));
        row.insert(
            MODEL_NAME_COLUMN.to_string(),
            body.model.clone().map(Value::String).unwrap_or(Value::Null),
        );
        body.usage.unwrap_or_default().insert_into(&mut row);
        extract_structured_output(body.first_content()).apply_to(&mut row);
        dataset.push_row(row);
    }

    dataset.sort_by_column(UNIQUE_ID_COLUMN);
    dataset
}

/// Reshapes a batch request file into `unique_id, model_name, temperature, message_prompt`.
pub fn parse_input_jsonl(bytes: &[u8]) -> Dataset {
    let mut dataset = Dataset::new(
        [UNIQUE_ID_COLUMN, MODEL_NAME_COLUMN, "temperature", "message_prompt"]
            .into_iter()
            .map(str::to_string)
            .collect(),
    );

    for line in non_empty_lines(bytes) {
        let parsed: RequestLineView = match serde_json::from_slice(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed request line");
                continue;
            }
        };
        let (model, temperature, messages) = match parsed.body {
            Some(body) => (
                body.model.map(Value::String).unwrap_or(Value::Null),
                body.temperature.unwrap_or(Value::Null),
                body.messages.unwrap_or_else(|| Value::Array(Vec::new())),
            ),
            None => (Value::Null, Value::Null, Value::Array(Vec::new())),
        };

        let mut row = Row::new();
        row.insert(UNIQUE_ID_COLUMN.to_string(), normalize_id(parsed.custom_id));
        row.insert(MODEL_NAME_COLUMN.to_string(), model);
        row.insert("temperature".to_string(), temperature);
        row.insert("message_prompt".to_string(), messages);
        dataset.push_row(row);
    }

    dataset.sort_by_column(UNIQUE_ID_COLUMN);
    dataset
}

fn non_empty_lines(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    bytes
        .split(|b| *b == b'\n')
        .map(|line| line.trim_ascii())
        .filter(|line| !line.is_empty())
}
