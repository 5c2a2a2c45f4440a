use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use serde_json::{Number, Value};

use crate::dataset::{Dataset, Row};
use crate::error::{DatasetError, Result};

const NULL_MARKERS: &[&str] = &["", "nan", "NaN", "NA", "N/A", "null", "NULL", "None"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Csv,
    Spreadsheet,
}

impl DatasetFormat {
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let lower = file_name.trim().to_ascii_lowercase();
        if lower.ends_with(".csv") {
            return Ok(Self::Csv);
        }
        if [".xlsx", ".xlsm", ".xls", ".ods"]
            .iter()
            .any(|ext| lower.ends_with(ext))
        {
            return Ok(Self::Spreadsheet);
        }
        Err(DatasetError::UnsupportedFileType(file_name.to_string()))
    }
}

/// Reads an uploaded CSV or spreadsheet. The first row is the header.
pub fn load_dataset(file_name: &str, bytes: &[u8]) -> Result<Dataset> {
    let dataset = match DatasetFormat::from_file_name(file_name)? {
        DatasetFormat::Csv => read_csv(bytes)?,
        DatasetFormat::Spreadsheet => read_spreadsheet(bytes)?,
    };
    tracing::debug!(
        file_name,
        rows = dataset.len(),
        columns = dataset.columns().len(),
        "dataset loaded"
    );
    Ok(dataset)
}

fn read_csv(bytes: &[u8]) -> Result<Dataset> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| DatasetError::Read(format!("csv header: {e}")))?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let columns = normalize_headers(headers);

    let mut dataset = Dataset::new(columns.clone());
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| DatasetError::Read(format!("csv row {}: {e}", line + 2)))?;
        let row: Row = columns
            .iter()
            .enumerate()
            .map(|(i, col)| (col.clone(), record.get(i).map(infer_scalar).unwrap_or(Value::Null)))
            .collect();
        dataset.push_row(row);
    }
    Ok(dataset)
}

fn read_spreadsheet(bytes: &[u8]) -> Result<Dataset> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| DatasetError::Read(format!("open workbook: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DatasetError::Read("workbook has no sheets".to_string()))?
        .map_err(|e| DatasetError::Read(format!("read first sheet: {e}")))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Dataset::default());
    };
    let columns = normalize_headers(header_row.iter().map(|c| c.to_string()).collect());

    let mut dataset = Dataset::new(columns.clone());
    for cells in rows {
        if cells.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        let row: Row = columns
            .iter()
            .enumerate()
            .map(|(i, col)| (col.clone(), cells.get(i).map(cell_value).unwrap_or(Value::Null)))
            .collect();
        dataset.push_row(row);
    }
    Ok(dataset)
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => float_value(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => infer_scalar(s),
        other => Value::String(other.to_string()),
    }
}

fn float_value(f: f64) -> Value {
    if !f.is_finite() {
        return Value::Null;
    }
    // Spreadsheets store integers as floats.
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return Value::from(f as i64);
    }
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Best-effort typing of a raw text cell: null markers, integers, floats, booleans.
pub fn infer_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    if NULL_MARKERS.contains(&trimmed) {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            if let Some(n) = Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    match trimmed {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for (i, header) in raw.into_iter().enumerate() {
        let header = header.trim();
        let base = if header.is_empty() {
            format!("Unnamed: {i}")
        } else {
            header.to_string()
        };

        let mut name = base.clone();
        let mut n = 1;
        while out.contains(&name) {
            name = format!("{base}.{n}");
            n += 1;
        }
        out.push(name);
    }
    out
}
