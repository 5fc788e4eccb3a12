//! Delimited-file reader for crawl export batches.
//!
//! Each export file is one logical category: the first line is the
//! field-name header, every following line one record. Cells are coerced to
//! typed values so the inferencer can see numbers and timestamps rather
//! than raw strings.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use spiderbase_shared::{FieldValue, Result, SpiderbaseError, TabularBatch};

/// Datetime layouts seen in crawl exports besides RFC 3339.
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Read a delimited export file into a [`TabularBatch`].
pub fn read_delimited_file(path: &Path, delimiter: char) -> Result<TabularBatch> {
    let text = std::fs::read_to_string(path).map_err(|e| SpiderbaseError::io(path, e))?;
    read_delimited(&text, delimiter)
        .map_err(|e| SpiderbaseError::ingestion(format!("{}: {e}", path.display())))
}

/// Parse delimited text into a [`TabularBatch`]. The first line is the
/// header; a file with a header and no records yields an empty batch.
pub fn read_delimited(text: &str, delimiter: char) -> Result<TabularBatch> {
    if !delimiter.is_ascii() {
        return Err(SpiderbaseError::validation(format!(
            "delimiter '{delimiter}' is not an ASCII character"
        )));
    }

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter as u8)
        .from_reader(text.as_bytes());

    let columns = rdr
        .headers()
        .map_err(|e| SpiderbaseError::ingestion(format!("failed to read header: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record =
            result.map_err(|e| SpiderbaseError::ingestion(format!("failed to read record: {e}")))?;

        // Short records pad with nulls; long records drop the excess.
        let row = (0..columns.len())
            .map(|idx| coerce_cell(record.get(idx).unwrap_or("")))
            .collect();
        rows.push(row);
    }

    Ok(TabularBatch { columns, rows })
}

/// Coerce one cell into a typed value: empty -> null, parseable number ->
/// number, recognizable datetime -> timestamp, anything else -> text.
fn coerce_cell(s: &str) -> FieldValue {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return FieldValue::Null;
    }

    if let Ok(i) = trimmed.parse::<i64>() {
        return FieldValue::Number(i as f64);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return FieldValue::Number(f);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return FieldValue::Timestamp(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return FieldValue::Timestamp(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return FieldValue::Timestamp(midnight.and_utc());
        }
    }

    FieldValue::Text(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_typed_cells() {
        let batch = read_delimited(
            "URL,Status Code,Response Time ms\nhttp://x,200,123\nhttp://y,404,8.5\n",
            ',',
        )
        .expect("parse");

        assert_eq!(batch.columns, vec!["URL", "Status Code", "Response Time ms"]);
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0][0], FieldValue::Text("http://x".into()));
        assert_eq!(batch.rows[0][1], FieldValue::Number(200.0));
        assert_eq!(batch.rows[1][2], FieldValue::Number(8.5));
    }

    #[test]
    fn header_only_input_yields_empty_batch() {
        let batch = read_delimited("URL,Title\n", ',').expect("parse");
        assert_eq!(batch.columns.len(), 2);
        assert!(batch.is_empty());
    }

    #[test]
    fn short_records_pad_with_nulls() {
        let batch = read_delimited("a,b,c\n1,2\n", ',').expect("parse");
        assert_eq!(batch.rows[0][2], FieldValue::Null);
    }

    #[test]
    fn empty_cells_are_null() {
        let batch = read_delimited("a,b\n,x\n", ',').expect("parse");
        assert_eq!(batch.rows[0][0], FieldValue::Null);
        assert_eq!(batch.rows[0][1], FieldValue::Text("x".into()));
    }

    #[test]
    fn datetime_cells_become_timestamps() {
        let batch = read_delimited(
            "seen\n2024-05-01T12:00:00+00:00\n2024-05-01 12:00:00\n2024-05-01\n",
            ',',
        )
        .expect("parse");
        for row in &batch.rows {
            assert!(
                matches!(row[0], FieldValue::Timestamp(_)),
                "expected timestamp, got {:?}",
                row[0]
            );
        }
    }

    #[test]
    fn tab_delimited_input() {
        let batch = read_delimited("a\tb\n1\t2\n", '\t').expect("parse");
        assert_eq!(batch.columns, vec!["a", "b"]);
        assert_eq!(batch.rows[0][0], FieldValue::Number(1.0));
    }

    #[test]
    fn non_ascii_delimiter_rejected() {
        assert!(read_delimited("a;b\n", '§').is_err());
    }
}
