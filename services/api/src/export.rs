//! services/api/src/export.rs
//!
//! CSV and JSON encoding of prepared export rows.

use serde::Serialize;
use serde_json::json;
use sleep_assistant_core::domain::ExportRow;
use tracing::{info, warn};

/// Sentinel rendered for an absent quality rating or note.
const MISSING_VALUE: &str = "N/A";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// The file formats the assistant can export history as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
        }
    }
}

pub fn encode(format: ExportFormat, rows: &[ExportRow]) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Csv => to_csv(rows),
        ExportFormat::Json => to_json(rows),
    }
}

#[derive(Serialize)]
struct CsvRecord {
    date: String,
    sleep_start: String,
    sleep_end: String,
    duration_hours: f64,
    quality_rating: String,
    note: String,
}

pub fn to_csv(rows: &[ExportRow]) -> Result<Vec<u8>, ExportError> {
    if rows.is_empty() {
        warn!("csv_export_empty_data");
        return Ok(Vec::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(CsvRecord {
            date: row.date.clone(),
            sleep_start: row.sleep_start.clone(),
            sleep_end: row.sleep_end.clone(),
            duration_hours: row.duration_hours,
            quality_rating: row
                .quality_rating
                .map(|q| q.to_string())
                .unwrap_or_else(|| MISSING_VALUE.to_string()),
            note: row.note.clone().unwrap_or_else(|| MISSING_VALUE.to_string()),
        })?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))?;
    info!(rows = rows.len(), "csv_export_completed");
    Ok(bytes)
}

pub fn to_json(rows: &[ExportRow]) -> Result<Vec<u8>, ExportError> {
    let records: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            json!({
                "date": row.date,
                "sleep_start": row.sleep_start,
                "sleep_end": row.sleep_end,
                "duration_hours": row.duration_hours,
                "quality_rating": match row.quality_rating {
                    Some(rating) => json!(rating),
                    None => json!(MISSING_VALUE),
                },
                "note": match &row.note {
                    Some(note) => json!(note),
                    None => json!(MISSING_VALUE),
                },
            })
        })
        .collect();

    let bytes = serde_json::to_vec_pretty(&records)?;
    info!(rows = rows.len(), "json_export_completed");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<ExportRow> {
        vec![
            ExportRow {
                date: "2026-03-01".to_string(),
                sleep_start: "2026-03-01 22:00:00".to_string(),
                sleep_end: "2026-03-02 06:00:00".to_string(),
                duration_hours: 8.0,
                quality_rating: Some(7.5),
                note: Some("slept well".to_string()),
            },
            ExportRow {
                date: "2026-03-02".to_string(),
                sleep_start: "2026-03-02 23:00:00".to_string(),
                sleep_end: "2026-03-03 05:30:00".to_string(),
                duration_hours: 6.5,
                quality_rating: None,
                note: None,
            },
        ]
    }

    #[test]
    fn csv_has_header_and_sentinels() {
        let bytes = to_csv(&rows()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "date,sleep_start,sleep_end,duration_hours,quality_rating,note"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2026-03-01,2026-03-01 22:00:00,2026-03-02 06:00:00,8.0,7.5,slept well"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2026-03-02,2026-03-02 23:00:00,2026-03-03 05:30:00,6.5,N/A,N/A"
        );
    }

    #[test]
    fn empty_csv_is_empty_bytes() {
        assert!(to_csv(&[]).unwrap().is_empty());
    }

    #[test]
    fn json_keeps_numbers_and_sentinels() {
        let bytes = to_json(&rows()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[0]["quality_rating"], 7.5);
        assert_eq!(value[1]["quality_rating"], "N/A");
        assert_eq!(value[1]["note"], "N/A");
        assert_eq!(value[0]["duration_hours"], 8.0);
    }

    #[test]
    fn empty_json_is_an_empty_array() {
        let bytes = to_json(&[]).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "[]");
    }

    #[test]
    fn format_names_round_trip() {
        assert_eq!(ExportFormat::from_name("csv"), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::from_name("json"), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_name("xml"), None);
    }
}
