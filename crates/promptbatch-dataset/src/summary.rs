use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::{Dataset, Row, display_value};
use crate::error::{DatasetError, Result};

const PREVIEW_NULL: &str = "N/A";

/// Price per token, in the provider's billing currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenCosts {
    pub input: f64,
    pub completion: f64,
}

impl Default for TokenCosts {
    fn default() -> Self {
        Self {
            input: 0.000_000_15,
            completion: 0.000_000_6,
        }
    }
}

/// A result table ready for the browser: a short preview plus the full CSV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableExport {
    pub total_rows_processed: usize,
    pub row_preview_data: Vec<Row>,
    /// Base64 of the CSV rendering.
    pub file_data: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub average_input_token: f64,
    pub average_completion_token: f64,
    pub average_total_token: f64,
    pub average_cost_per_row: f64,
}

pub fn to_csv_bytes(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if !dataset.columns().is_empty() {
        writer.write_record(dataset.columns())?;
    }
    for row in dataset.rows() {
        let record = dataset
            .columns()
            .iter()
            .map(|c| row.get(c).map(display_value).unwrap_or_default());
        writer.write_record(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| DatasetError::Read(format!("flush csv: {e}")))
}

pub fn export_table(dataset: &Dataset, preview_rows: usize) -> Result<TableExport> {
    let csv = to_csv_bytes(dataset)?;
    let row_preview_data = dataset
        .head(preview_rows)
        .into_rows()
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(k, v)| match v {
                    Value::Null => (k, Value::String(PREVIEW_NULL.to_string())),
                    other => (k, other),
                })
                .collect()
        })
        .collect();

    Ok(TableExport {
        total_rows_processed: dataset.len(),
        row_preview_data,
        file_data: STANDARD.encode(csv),
    })
}

/// Mean of a column; missing or non-numeric cells count as 0. Empty datasets average to 0.
pub fn column_mean(dataset: &Dataset, column: &str) -> f64 {
    if dataset.is_empty() {
        return 0.0;
    }
    let sum: f64 = dataset
        .rows()
        .iter()
        .map(|row| row.get(column).map(numeric).unwrap_or(0.0))
        .sum();
    sum / dataset.len() as f64
}

fn numeric(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn summarize_usage(dataset: &Dataset, costs: TokenCosts) -> UsageSummary {
    let input = column_mean(dataset, "prompt_tokens");
    let completion = column_mean(dataset, "completion_tokens");
    let total = column_mean(dataset, "total_tokens");

    UsageSummary {
        average_input_token: round2(input),
        average_completion_token: round2(completion),
        average_total_token: round2(total),
        average_cost_per_row: input * costs.input + completion * costs.completion,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn usage_dataset() -> Dataset {
        let mut ds = Dataset::default();
        for (id, p, c, t) in [
            (1, json!(10), json!(5), json!(15)),
            (2, json!(11), Value::Null, json!(11)),
            (3, json!("bad"), json!(4), json!(4)),
        ] {
            let mut row = Row::new();
            row.insert("unique_id".to_string(), json!(id));
            row.insert("prompt_tokens".to_string(), p);
            row.insert("completion_tokens".to_string(), c);
            row.insert("total_tokens".to_string(), t);
            ds.push_row(row);
        }
        ds
    }

    #[test]
    fn means_treat_missing_as_zero() {
        let summary = summarize_usage(&usage_dataset(), TokenCosts::default());
        assert_eq!(summary.average_input_token, 7.0);
        assert_eq!(summary.average_completion_token, 3.0);
        assert_eq!(summary.average_total_token, 10.0);

        let expected = 7.0 * 0.000_000_15 + 3.0 * 0.000_000_6;
        assert!((summary.average_cost_per_row - expected).abs() < 1e-15);
    }

    #[test]
    fn empty_dataset_summarizes_to_zero() {
        assert_eq!(
            summarize_usage(&Dataset::default(), TokenCosts::default()),
            UsageSummary::default()
        );
    }

    #[test]
    fn export_previews_nulls_and_encodes_csv() {
        let export = export_table(&usage_dataset(), 2).unwrap();
        assert_eq!(export.total_rows_processed, 3);
        assert_eq!(export.row_preview_data.len(), 2);
        assert_eq!(export.row_preview_data[1]["completion_tokens"], json!("N/A"));

        let csv = String::from_utf8(STANDARD.decode(export.file_data).unwrap()).unwrap();
        assert_eq!(
            csv,
            "unique_id,prompt_tokens,completion_tokens,total_tokens\n1,10,5,15\n2,11,,11\n3,bad,4,4\n"
        );
    }

    #[test]
    fn nested_values_are_written_as_json() {
        let mut ds = Dataset::default();
        let mut row = Row::new();
        row.insert("tags".to_string(), json!(["a", "b"]));
        ds.push_row(row);
        let csv = String::from_utf8(to_csv_bytes(&ds).unwrap()).unwrap();
        assert_eq!(csv, "tags\n\"[\"\"a\"\",\"\"b\"\"]\"\n");
    }
}
