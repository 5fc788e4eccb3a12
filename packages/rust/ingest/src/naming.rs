//! Table and field naming: stable storage identifiers from source names.

use std::path::Path;

use spiderbase_shared::{MAX_IDENTIFIER_LEN, Result, SpiderbaseError, normalize_identifier};

/// Namespace prefix for every dynamically created result table.
pub const TABLE_PREFIX: &str = "sb_";

/// Derive a stable, normalized table identifier from a source identifier
/// (typically an export file name).
///
/// Pure: the same input always yields the same output. The base name has its
/// extension stripped, is normalized like any identifier, and gains the
/// [`TABLE_PREFIX`] exactly once — repeated derivation never doubles it.
pub fn derive_table_name(source: &str) -> Result<String> {
    let stem = Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(source);

    let normalized = normalize_identifier(stem).ok_or_else(|| {
        SpiderbaseError::validation(format!(
            "source '{source}' yields no usable table identifier"
        ))
    })?;

    let mut name = if normalized.starts_with(TABLE_PREFIX) {
        normalized
    } else {
        format!("{TABLE_PREFIX}{normalized}")
    };
    name.truncate(MAX_IDENTIFIER_LEN);
    Ok(name)
}

/// Normalize raw header text into a column identifier. `None` when nothing
/// usable survives normalization.
pub fn normalize_field_name(raw: &str) -> Option<String> {
    normalize_identifier(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_pure() {
        let a = derive_table_name("Internal - All.csv").expect("derive");
        let b = derive_table_name("Internal - All.csv").expect("derive");
        assert_eq!(a, b);
        assert_eq!(a, "sb_internal_all");
    }

    #[test]
    fn prefix_applied_exactly_once() {
        let once = derive_table_name("response codes.csv").expect("derive");
        assert_eq!(once, "sb_response_codes");

        // Re-deriving from an already-prefixed name does not double the prefix
        let again = derive_table_name(&once).expect("derive");
        assert_eq!(again, "sb_response_codes");
    }

    #[test]
    fn extension_and_path_are_stripped() {
        assert_eq!(
            derive_table_name("output/2024/All Inlinks.csv").expect("derive"),
            "sb_all_inlinks"
        );
        assert_eq!(
            derive_table_name("external.tsv").expect("derive"),
            "sb_external"
        );
    }

    #[test]
    fn unusable_sources_are_rejected() {
        assert!(derive_table_name("---.csv").is_err());
        assert!(derive_table_name("漢字.csv").is_err());
    }

    #[test]
    fn digit_leading_stem_starts_with_a_letter() {
        let name = derive_table_name("404 report.csv").expect("derive");
        assert_eq!(name, "sb_c_404_report");
        assert!(name.starts_with(|c: char| c.is_ascii_lowercase()));
    }
}
