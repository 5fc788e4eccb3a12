//! Storage type inference for result-table columns.
//!
//! Column-name semantics are trusted over a single observed sample: the
//! first row of a batch is not guaranteed representative, so a name ending
//! in `_count` stays numeric even when its sample cell is empty.

use spiderbase_shared::{FieldValue, StorageType};

/// Name suffixes denoting numeric semantics (durations, sizes, counts,
/// indexes, status codes).
const NUMERIC_SUFFIXES: [&str; 7] = [
    "_ms", "_bytes", "_length", "_size", "_count", "_number", "_code",
];

/// Name fragments denoting temporal semantics.
const TIMESTAMP_MARKERS: [&str; 4] = ["_date", "_time", "timestamp", "last_modified"];

/// Decide the storage type for a named column from its name and sample value.
///
/// Deterministic: the same name and sample always yield the same result.
/// Rules, in priority order: numeric suffix, temporal fragment, then the
/// sample's own type, with a missing sample defaulting to Text — the safest
/// choice on absent evidence.
pub fn infer(column_name: &str, sample: Option<&FieldValue>) -> StorageType {
    let name = column_name.to_ascii_lowercase();

    if NUMERIC_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        return StorageType::Real;
    }

    if TIMESTAMP_MARKERS.iter().any(|marker| name.contains(marker)) {
        return StorageType::Timestamp;
    }

    match sample {
        None | Some(FieldValue::Null) => StorageType::Text,
        Some(FieldValue::Number(_)) => StorageType::Real,
        Some(FieldValue::Timestamp(_)) => StorageType::Timestamp,
        Some(FieldValue::Text(_)) => StorageType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn numeric_suffix_wins_regardless_of_sample() {
        let samples = [
            None,
            Some(FieldValue::Null),
            Some(FieldValue::Text("not a number".into())),
            Some(FieldValue::Timestamp(Utc::now())),
        ];
        for name in [
            "response_time_ms",
            "content_bytes",
            "title_length",
            "file_size",
            "word_count",
            "page_number",
            "status_code",
        ] {
            for sample in &samples {
                assert_eq!(
                    infer(name, sample.as_ref()),
                    StorageType::Real,
                    "{name} should be Real"
                );
            }
        }
    }

    #[test]
    fn suffix_check_is_case_insensitive() {
        assert_eq!(infer("Status_Code", None), StorageType::Real);
        assert_eq!(infer("LAST_MODIFIED", None), StorageType::Timestamp);
    }

    #[test]
    fn temporal_fragments_yield_timestamp() {
        for name in ["crawl_date", "fetch_time", "timestamp_utc", "last_modified"] {
            assert_eq!(infer(name, None), StorageType::Timestamp, "{name}");
        }
    }

    #[test]
    fn numeric_suffix_beats_temporal_fragment() {
        // "_ms" suffix outranks the "_time" fragment in the same name
        assert_eq!(infer("response_time_ms", None), StorageType::Real);
    }

    #[test]
    fn sample_decides_for_neutral_names() {
        assert_eq!(infer("url", Some(&FieldValue::Text("https://x".into()))), StorageType::Text);
        assert_eq!(infer("depth", Some(&FieldValue::Number(3.0))), StorageType::Real);
        assert_eq!(
            infer("seen", Some(&FieldValue::Timestamp(Utc::now()))),
            StorageType::Timestamp
        );
        // Absent evidence defaults to Text, never over-committing to numeric
        assert_eq!(infer("h1", Some(&FieldValue::Null)), StorageType::Text);
        assert_eq!(infer("h1", None), StorageType::Text);
    }
}
