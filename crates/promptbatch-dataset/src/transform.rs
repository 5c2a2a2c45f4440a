use std::collections::HashSet;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::dataset::{Dataset, Row, display_value, is_null};
use crate::error::{DatasetError, Result};

pub const SYNTHESIZED_ID_COLUMN: &str = "unique_id";
pub const PROMPT_COLUMN: &str = "prompt";

/// A prompt template plus the token → column mapping used to fill it.
#[derive(Debug, Clone, Default)]
pub struct PromptTemplate {
    pub template: String,
    pub placeholders: IndexMap<String, String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>, placeholders: IndexMap<String, String>) -> Self {
        Self {
            template: template.into(),
            placeholders,
        }
    }

    /// Fills every `{{token}}` from `row`. Tokens without a mapped, non-null
    /// value render as `<MISSING_token>`.
    pub fn render(&self, row: &Row) -> String {
        placeholder_pattern()
            .replace_all(&self.template, |caps: &Captures<'_>| {
                let token = caps[1].trim();
                self.placeholders
                    .get(token)
                    .and_then(|column| row.get(column))
                    .filter(|value| !is_null(value))
                    .map(display_value)
                    .unwrap_or_else(|| format!("<MISSING_{token}>"))
            })
            .into_owned()
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder regex"))
}

/// Output of [`transform`]: the cleaned dataset and the id column it is keyed by.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub dataset: Dataset,
    pub id_column: String,
}

/// Cleans `dataset`, keys it by a unique id column and appends the rendered `prompt` column.
pub fn transform(
    dataset: Dataset,
    id_column: Option<&str>,
    template: &PromptTemplate,
) -> Result<Transformed> {
    let mut dataset = dataset;
    let id_column = ensure_id_column(&mut dataset, id_column)?;
    let mut dataset = clean_rows(dataset, &id_column);

    let prompts = dataset
        .rows()
        .iter()
        .map(|row| Value::String(template.render(row)))
        .collect::<Vec<_>>();
    dataset.set_column(PROMPT_COLUMN, prompts);

    Ok(Transformed {
        dataset,
        id_column,
    })
}

/// Returns the id column name, synthesizing `unique_id = 1..N` when none was given.
pub fn ensure_id_column(dataset: &mut Dataset, id_column: Option<&str>) -> Result<String> {
    match id_column.map(str::trim).filter(|c| !c.is_empty()) {
        Some(column) => {
            if !dataset.has_column(column) {
                return Err(DatasetError::configuration(format!(
                    "unique id column '{column}' is not present in the dataset"
                )));
            }
            Ok(column.to_string())
        }
        None => {
            if dataset.has_column(SYNTHESIZED_ID_COLUMN) {
                return Err(DatasetError::configuration(format!(
                    "default id column '{SYNTHESIZED_ID_COLUMN}' already exists in the dataset; provide a unique id column name"
                )));
            }
            tracing::info!(
                column = SYNTHESIZED_ID_COLUMN,
                "no unique id column provided, synthesizing one"
            );
            let ids = (1..=dataset.len() as u64).map(Value::from).collect::<Vec<_>>();
            dataset.set_column(SYNTHESIZED_ID_COLUMN, ids);
            Ok(SYNTHESIZED_ID_COLUMN.to_string())
        }
    }
}

/// Drops rows with a null or zero id, repeated ids (first one wins) and rows
/// that repeat an earlier row on every non-id column.
pub fn clean_rows(dataset: Dataset, id_column: &str) -> Dataset {
    let before = dataset.len();
    let other_columns = dataset
        .columns()
        .iter()
        .filter(|c| c.as_str() != id_column)
        .cloned()
        .collect::<Vec<_>>();

    let mut seen_ids = HashSet::new();
    let mut seen_rows = HashSet::new();
    let mut out = dataset;
    out.retain(|row| {
        let id = row.get(id_column).unwrap_or(&Value::Null);
        if is_null(id) || is_zero(id) {
            return false;
        }
        if !seen_ids.insert(canonical(id).to_string()) {
            return false;
        }
        let others = other_columns
            .iter()
            .map(|c| canonical(row.get(c).unwrap_or(&Value::Null)))
            .collect::<Vec<_>>();
        seen_rows.insert(Value::Array(others).to_string())
    });

    if out.len() != before {
        tracing::info!(before, after = out.len(), "dropped invalid or duplicate rows");
    }
    out
}

/// Whole-number floats compare equal to the matching integer (`5.0` == `5`).
fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::from(f as i64),
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

fn is_zero(value: &Value) -> bool {
    value.as_f64().is_some_and(|v| v == 0.0)
}
