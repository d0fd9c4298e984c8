//! Raw sheet rows -> canonical records.

use crate::error::EngineError;
use crate::model::{CanonicalField, CanonicalRecord, FieldMapping, RawRecord};
use crate::pool;

/// Map every row through `mapping`. A mapped column missing from a row
/// yields an empty value; only an empty mapping is an error.
pub fn normalize(rows: &[RawRecord], mapping: &FieldMapping) -> Result<Vec<CanonicalRecord>, EngineError> {
    check_mapping(mapping)?;
    Ok(rows
        .iter()
        .enumerate()
        .map(|(i, row)| normalize_row(i, row, mapping))
        .collect())
}

/// Same output as [`normalize`], computed on up to `workers` threads.
pub fn normalize_parallel(
    rows: &[RawRecord],
    mapping: &FieldMapping,
    workers: usize,
) -> Result<Vec<CanonicalRecord>, EngineError> {
    check_mapping(mapping)?;
    let indexed: Vec<(usize, &RawRecord)> = rows.iter().enumerate().collect();
    pool::map_ordered(&indexed, workers, None, |(i, row)| normalize_row(*i, row, mapping))
}

fn check_mapping(mapping: &FieldMapping) -> Result<(), EngineError> {
    if mapping.is_empty() {
        return Err(EngineError::config(format!(
            "field mapping '{}' maps no columns",
            mapping.id
        )));
    }
    Ok(())
}

fn normalize_row(row_index: usize, row: &RawRecord, mapping: &FieldMapping) -> CanonicalRecord {
    let mut record = CanonicalRecord::empty(mapping.id.clone(), row_index);
    for field in CanonicalField::ALL {
        if let Some(column) = source_column(mapping, field) {
            if let Some(value) = row.lookup(column) {
                record.set(field, value);
            }
        }
    }
    record
}

/// The column a field is read from. A yes/no Insurance Provided entry is a
/// flag, and with the flag off the Insurance entry is a literal, not a column.
fn source_column(mapping: &FieldMapping, field: CanonicalField) -> Option<&str> {
    let column = mapping.column(field)?;
    match field {
        CanonicalField::InsuranceProvided
            if column.eq_ignore_ascii_case("yes") || column.eq_ignore_ascii_case("no") =>
        {
            None
        }
        CanonicalField::Insurance if !mapping.insurance_provided() => None,
        _ => Some(column),
    }
}

// ---------------------------------------------------------------------------
// Identity derivation
// ---------------------------------------------------------------------------

/// Fill in what a sheet implies but does not spell out: first/last name
/// from a Full Name column, and the insurer for sheets without an
/// insurance column.
pub fn derive_identity(record: &mut CanonicalRecord, mapping: &FieldMapping) {
    let has_parts = !record.get(CanonicalField::FirstName).trim().is_empty()
        || !record.get(CanonicalField::LastName).trim().is_empty();
    if !has_parts {
        let full = record.get(CanonicalField::FullName).to_string();
        if let Some((first, last)) = split_full_name(&full) {
            record.set(CanonicalField::FirstName, first);
            record.set(CanonicalField::LastName, last);
        }
    }

    if let Some(insurer) = mapping.literal_insurance() {
        record.set(CanonicalField::Insurance, insurer);
    }
}

/// Split a full name into (first, last).
///
/// `"Last, First Middle"` takes the text before the comma as the last name
/// and the first word after it as the first name. Without a comma the first
/// and last words are used.
pub fn split_full_name(full: &str) -> Option<(String, String)> {
    let full = full.trim();
    if full.is_empty() {
        return None;
    }

    if let Some((last, rest)) = full.split_once(',') {
        let last = collapse_whitespace(last);
        let first = rest.split_whitespace().next().unwrap_or("").to_string();
        if last.is_empty() && first.is_empty() {
            return None;
        }
        return Some((first, last));
    }

    let words: Vec<&str> = full.split_whitespace().collect();
    match words.as_slice() {
        [] => None,
        [only] => Some((String::new(), only.to_string())),
        [first, .., last] => Some((first.to_string(), last.to_string())),
    }
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> FieldMapping {
        FieldMapping::new("ambetter", "Ambetter")
            .with(CanonicalField::FirstName, "FNAME")
            .with(CanonicalField::LastName, "LNAME")
            .with(CanonicalField::MemberId, "Member #")
            .with(CanonicalField::CareGap, "Measure")
    }

    #[test]
    fn maps_columns_and_blanks_the_rest() {
        let row = RawRecord::from_pairs([
            ("FNAME", "Jane"),
            ("LNAME", "Doe"),
            ("Member #", "U123"),
            ("Measure", "Breast Cancer Screening"),
            ("Unrelated", "x"),
        ]);
        let out = normalize(&[row], &mapping()).unwrap();
        assert_eq!(out.len(), 1);
        let rec = &out[0];
        assert_eq!(rec.get(CanonicalField::FirstName), "Jane");
        assert_eq!(rec.get(CanonicalField::MemberId), "U123");
        assert_eq!(rec.get(CanonicalField::Dob), "");
        assert_eq!(rec.get(CanonicalField::Notes), "");
        assert_eq!(rec.provenance.source_id, "ambetter");
        assert_eq!(rec.provenance.row_index, 0);
    }

    #[test]
    fn missing_column_never_fails_the_row() {
        let row = RawRecord::from_pairs([("FNAME", "Jane")]);
        let out = normalize(&[row], &mapping()).unwrap();
        assert_eq!(out[0].get(CanonicalField::LastName), "");
    }

    #[test]
    fn header_case_is_forgiven() {
        let row = RawRecord::from_pairs([(" fname ", "Jane")]);
        let out = normalize(&[row], &mapping()).unwrap();
        assert_eq!(out[0].get(CanonicalField::FirstName), "Jane");
    }

    #[test]
    fn empty_mapping_is_a_config_error() {
        let blank = FieldMapping::new("blank", "Blank").with(CanonicalField::Notes, "  ");
        let err = normalize(&[RawRecord::new()], &blank).unwrap_err();
        assert_eq!(err.code(), "config_error");
        assert!(err.to_string().contains("blank"));
    }

    #[test]
    fn parallel_matches_sequential() {
        let rows: Vec<RawRecord> = (0..257)
            .map(|i| RawRecord::from_pairs([("FNAME", format!("n{i}")), ("Member #", format!("{i}"))]))
            .collect();
        let seq = normalize(&rows, &mapping()).unwrap();
        let par = normalize_parallel(&rows, &mapping(), 4).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn split_last_comma_first() {
        assert_eq!(
            split_full_name("Doe, Jane  Q"),
            Some(("Jane".to_string(), "Doe".to_string()))
        );
    }

    #[test]
    fn split_first_last() {
        assert_eq!(
            split_full_name("Jane Q. Doe"),
            Some(("Jane".to_string(), "Doe".to_string()))
        );
        assert_eq!(split_full_name("   "), None);
    }

    #[test]
    fn derive_fills_names_and_literal_insurer() {
        let mapping = FieldMapping::new("cigna", "Cigna")
            .with(CanonicalField::FullName, "Patient")
            .with(CanonicalField::InsuranceProvided, "No")
            .with(CanonicalField::Insurance, "Cigna");
        let row = RawRecord::from_pairs([("Patient", "Smith, John A"), ("Cigna", "x"), ("No", "y")]);
        let mut rec = normalize(&[row], &mapping).unwrap().remove(0);
        assert_eq!(rec.get(CanonicalField::Insurance), "");

        derive_identity(&mut rec, &mapping);
        assert_eq!(rec.get(CanonicalField::FirstName), "John");
        assert_eq!(rec.get(CanonicalField::LastName), "Smith");
        assert_eq!(rec.get(CanonicalField::Insurance), "Cigna");
    }

    #[test]
    fn derive_keeps_explicit_names() {
        let mut rec = CanonicalRecord::empty("s", 0)
            .with(CanonicalField::FirstName, "Jo")
            .with(CanonicalField::FullName, "Smith, John");
        derive_identity(&mut rec, &FieldMapping::new("s", "s"));
        assert_eq!(rec.get(CanonicalField::FirstName), "Jo");
        assert_eq!(rec.get(CanonicalField::LastName), "");
    }
}
