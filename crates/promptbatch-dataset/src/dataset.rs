use std::cmp::Ordering;
use std::ops::Range;

use indexmap::IndexMap;
use serde_json::Value;

/// One dataset row: column name to scalar value, in column order.
pub type Row = IndexMap<String, Value>;

/// An ordered table of rows sharing one column list.
///
/// Every row carries every column; cells that were never set hold `Value::Null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let mut out = Self::new(columns);
        for row in rows {
            out.push_row(row);
        }
        out
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Appends a row. Keys unknown to the dataset become new trailing columns.
    pub fn push_row(&mut self, row: Row) {
        for key in row.keys() {
            if !self.has_column(key) {
                self.columns.push(key.clone());
                for existing in &mut self.rows {
                    existing.insert(key.clone(), Value::Null);
                }
            }
        }

        let mut normalized = Row::with_capacity(self.columns.len());
        for col in &self.columns {
            let value = row.get(col).cloned().unwrap_or(Value::Null);
            normalized.insert(col.clone(), value);
        }
        self.rows.push(normalized);
    }

    pub fn append(&mut self, other: Dataset) {
        for row in other.rows {
            self.push_row(row);
        }
    }

    /// Sets `name` on every row from `values`, adding the column at the end when new.
    pub fn set_column<I>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
        let mut values = values.into_iter();
        for row in &mut self.rows {
            let value = values.next().unwrap_or(Value::Null);
            row.insert(name.to_string(), value);
        }
    }

    pub fn slice(&self, range: Range<usize>) -> Dataset {
        let end = range.end.min(self.rows.len());
        let start = range.start.min(end);
        Dataset {
            columns: self.columns.clone(),
            rows: self.rows[start..end].to_vec(),
        }
    }

    pub fn head(&self, n: usize) -> Dataset {
        self.slice(0..n)
    }

    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(f);
    }

    /// Stable sort on `column`; rows keep their relative order on ties.
    pub fn sort_by_column(&mut self, column: &str) {
        if !self.has_column(column) {
            return;
        }
        self.rows.sort_by(|a, b| {
            compare_values(
                a.get(column).unwrap_or(&Value::Null),
                b.get(column).unwrap_or(&Value::Null),
            )
        });
    }
}

pub fn is_null(value: &Value) -> bool {
    matches!(value, Value::Null)
}

/// Text form of a cell as it appears inside prompts and CSV exports.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Orders ids and other sort keys: numbers numerically, then strings, nulls last.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Number(_) => 0,
            Value::Bool(_) => 1,
            Value::String(_) => 2,
            Value::Array(_) | Value::Object(_) => 3,
            Value::Null => 4,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
