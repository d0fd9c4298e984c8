//! Identity -> master-row matching.
//!
//! Three passes, each run only when the previous one found nothing:
//!
//! 1. member ID (case-insensitive, whitespace stripped)
//! 2. (first name, last name, DOB) with DOBs compared as dates
//! 3. fuzzy full name (normalized Levenshtein), accepted only above the
//!    threshold and ahead of the runner-up by the configured margin
//!
//! When pass 1 hits several rows, passes 2 and 3 are retried over just those
//! rows; failing that the document is `ambiguous_id`.

use chrono::{Datelike, NaiveDate};
use log::debug;

use crate::config::MatchConfig;
use crate::identity::IdentityCandidate;
use crate::model::{
    CanonicalField, CanonicalRecord, MasterTable, MatchPass, MatchResult, UnmatchedReason,
};
use crate::normalize::split_full_name;

/// Match one extracted identity against the master table. Never fails.
pub fn match_identity(
    identity: &IdentityCandidate,
    master: &MasterTable,
    config: &MatchConfig,
    document: &str,
) -> MatchResult {
    let result = run_passes(identity, master, config, document);
    debug!("{document}: {:?}", result.outcome);
    result
}

fn run_passes(
    identity: &IdentityCandidate,
    master: &MasterTable,
    config: &MatchConfig,
    document: &str,
) -> MatchResult {
    if identity.extraction_failed || master.is_empty() {
        return MatchResult::unmatched(document, UnmatchedReason::NoCandidate);
    }

    let rows: Vec<RowKey> = master.records().iter().map(RowKey::of).collect();
    let probe = RowKey::of_identity(identity);

    // Pass 1
    if !probe.member_id.is_empty() {
        let hits: Vec<usize> = (0..rows.len())
            .filter(|&i| rows[i].member_id == probe.member_id)
            .collect();
        match hits.len() {
            0 => {}
            1 => return MatchResult::matched(document, hits[0], 1.0, MatchPass::MemberId),
            _ => {
                if let Exact::One(row) = exact_name_dob(&probe, &rows, &hits) {
                    return MatchResult::matched(document, row, 1.0, MatchPass::NameDob);
                }
                if let Fuzzy::Accepted(row, score) = fuzzy_name(&probe, &rows, &hits, config) {
                    return MatchResult::matched(document, row, score, MatchPass::FuzzyName);
                }
                return MatchResult::unmatched(document, UnmatchedReason::AmbiguousId);
            }
        }
    }

    let all: Vec<usize> = (0..rows.len()).collect();

    // Pass 2
    match exact_name_dob(&probe, &rows, &all) {
        Exact::One(row) => return MatchResult::matched(document, row, 1.0, MatchPass::NameDob),
        Exact::Tied => return MatchResult::unmatched(document, UnmatchedReason::AmbiguousName),
        Exact::None => {}
    }

    // Pass 3
    match fuzzy_name(&probe, &rows, &all, config) {
        Fuzzy::Accepted(row, score) => {
            MatchResult::matched(document, row, score, MatchPass::FuzzyName)
        }
        Fuzzy::Rejected(reason) => MatchResult::unmatched(document, reason),
    }
}

// ---------------------------------------------------------------------------
// Comparison keys
// ---------------------------------------------------------------------------

/// Normalized identity fields of one master row (or of the probe).
#[derive(Debug, Clone, Default, PartialEq)]
struct RowKey {
    member_id: String,
    first: String,
    last: String,
    dob: String,
    full: String,
}

impl RowKey {
    fn of(record: &CanonicalRecord) -> Self {
        let mut first = record.get(CanonicalField::FirstName).to_string();
        let mut last = record.get(CanonicalField::LastName).to_string();
        if first.trim().is_empty() && last.trim().is_empty() {
            if let Some((f, l)) = split_full_name(record.get(CanonicalField::FullName)) {
                first = f;
                last = l;
            }
        }
        Self::build(
            record.get(CanonicalField::MemberId),
            &first,
            &last,
            record.get(CanonicalField::Dob),
        )
    }

    fn of_identity(identity: &IdentityCandidate) -> Self {
        let (first, last) = if identity.first_name.is_empty() && identity.last_name.is_empty() {
            split_full_name(&identity.name).unwrap_or_default()
        } else {
            (identity.first_name.clone(), identity.last_name.clone())
        };
        Self::build(&identity.member_id, &first, &last, &identity.dob)
    }

    fn build(member_id: &str, first: &str, last: &str, dob: &str) -> Self {
        let first = normalize_name(first);
        let last = normalize_name(last);
        let full = format!("{first} {last}").trim().to_string();
        Self {
            member_id: normalize_member_id(member_id),
            first,
            last,
            dob: normalize_dob(dob),
            full,
        }
    }
}

pub fn normalize_member_id(id: &str) -> String {
    id.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Lowercase, periods and commas removed, whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '.' && *c != ',')
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// ISO date when the value parses as one, otherwise its digits.
pub fn normalize_dob(dob: &str) -> String {
    let dob = dob.trim();
    if dob.is_empty() {
        return String::new();
    }
    match parse_date(dob) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => dob.chars().filter(char::is_ascii_digit).collect(),
    }
}

const FOUR_DIGIT_YEAR: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y", "%m.%d.%Y", "%d-%b-%Y", "%d %b %Y",
];
const TWO_DIGIT_YEAR: &[&str] = &["%m/%d/%y", "%m-%d-%y", "%m.%d.%y", "%d-%b-%y"];

fn parse_date(s: &str) -> Option<NaiveDate> {
    parse_date_only(s).or_else(|| {
        // spreadsheet timestamps: "1960-01-02 00:00:00", "1960-01-02T00:00:00"
        let date_part = s.split(|c: char| c == 'T' || c.is_whitespace()).next()?;
        (date_part.len() < s.len())
            .then(|| parse_date_only(date_part))
            .flatten()
    })
}

fn parse_date_only(s: &str) -> Option<NaiveDate> {
    let runs: Vec<&str> = s
        .split(|c: char| !c.is_ascii_digit())
        .filter(|r| !r.is_empty())
        .collect();
    let short_year = match (runs.first(), runs.last()) {
        (Some(first), Some(last)) => first.len() <= 2 && last.len() == 2,
        _ => false,
    };
    if short_year {
        let date = TWO_DIGIT_YEAR
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(s, f).ok())?;
        // birth dates are never in the future
        if date.year() > chrono::Utc::now().year() {
            return date.with_year(date.year() - 100);
        }
        return Some(date);
    }
    FOUR_DIGIT_YEAR
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
}

// ---------------------------------------------------------------------------
// Passes 2 and 3
// ---------------------------------------------------------------------------

enum Exact {
    One(usize),
    Tied,
    None,
}

fn exact_name_dob(probe: &RowKey, rows: &[RowKey], candidates: &[usize]) -> Exact {
    if probe.first.is_empty() || probe.last.is_empty() || probe.dob.is_empty() {
        return Exact::None;
    }
    let mut hits = candidates.iter().copied().filter(|&i| {
        let row = &rows[i];
        row.first == probe.first && row.last == probe.last && row.dob == probe.dob
    });
    match (hits.next(), hits.next()) {
        (Some(row), None) => Exact::One(row),
        (Some(_), Some(_)) => Exact::Tied,
        _ => Exact::None,
    }
}

enum Fuzzy {
    Accepted(usize, f64),
    Rejected(UnmatchedReason),
}

/// Slack for float rounding when comparing score gaps to `min_margin`.
const SCORE_EPSILON: f64 = 1e-9;

/// Name similarity in [0, 1].
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

fn fuzzy_name(probe: &RowKey, rows: &[RowKey], candidates: &[usize], config: &MatchConfig) -> Fuzzy {
    if probe.full.is_empty() {
        return Fuzzy::Rejected(UnmatchedReason::NoCandidate);
    }

    let mut best: Option<(usize, f64)> = None;
    let mut second = 0.0_f64;
    for &i in candidates {
        if rows[i].full.is_empty() {
            continue;
        }
        let score = name_similarity(&probe.full, &rows[i].full);
        match best {
            Some((_, top)) if score <= top => second = second.max(score),
            Some((_, top)) => {
                second = top;
                best = Some((i, score));
            }
            None => best = Some((i, score)),
        }
    }

    let Some((row, score)) = best else {
        return Fuzzy::Rejected(UnmatchedReason::NoCandidate);
    };
    if score <= config.accept_threshold {
        return Fuzzy::Rejected(UnmatchedReason::BelowThreshold);
    }
    if second >= score || score - second + SCORE_EPSILON < config.min_margin {
        return Fuzzy::Rejected(UnmatchedReason::AmbiguousName);
    }
    Fuzzy::Accepted(row, score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MatchOutcome;

    fn row(first: &str, last: &str, id: &str, dob: &str) -> CanonicalRecord {
        CanonicalRecord::empty("master", 0)
            .with(CanonicalField::FirstName, first)
            .with(CanonicalField::LastName, last)
            .with(CanonicalField::MemberId, id)
            .with(CanonicalField::Dob, dob)
    }

    fn identity(name: &str, id: &str, dob: &str) -> IdentityCandidate {
        let (first_name, last_name) = split_full_name(name).unwrap_or_default();
        IdentityCandidate {
            name: name.into(),
            first_name,
            last_name,
            member_id: id.into(),
            dob: dob.into(),
            ..IdentityCandidate::default()
        }
    }

    fn run(identity: &IdentityCandidate, rows: Vec<CanonicalRecord>) -> MatchResult {
        match_identity(
            identity,
            &MasterTable::from_records(rows),
            &MatchConfig::default(),
            "doc.pdf",
        )
    }

    fn master() -> Vec<CanonicalRecord> {
        vec![
            row("Jane", "Doe", "A1", "01/02/1960"),
            row("John", "Smith", "B2", "1955-03-04"),
            row("Maria", "Gonzalez", "C3", "07/08/1970"),
        ]
    }

    #[test]
    fn member_id_ignores_case_and_spaces() {
        let r = run(&identity("", " b 2 ", ""), master());
        assert_eq!(
            r.outcome,
            MatchOutcome::Matched { row: 1, confidence: 1.0, pass: MatchPass::MemberId }
        );
    }

    #[test]
    fn name_and_dob_across_date_spellings() {
        let r = run(&identity("SMITH, JOHN", "ZZ9", "03/04/1955"), master());
        assert_eq!(
            r.outcome,
            MatchOutcome::Matched { row: 1, confidence: 1.0, pass: MatchPass::NameDob }
        );
    }

    #[test]
    fn fuzzy_name_accepts_small_typo() {
        let r = run(&identity("Maria Gonzales", "", ""), master());
        match r.outcome {
            MatchOutcome::Matched { row, confidence, pass } => {
                assert_eq!(row, 2);
                assert_eq!(pass, MatchPass::FuzzyName);
                assert!(confidence > 0.85 && confidence < 1.0);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn fuzzy_rejects_distant_name() {
        let r = run(&identity("Robert Brown", "", ""), master());
        assert_eq!(r.reason(), Some(UnmatchedReason::BelowThreshold));
    }

    #[test]
    fn fuzzy_near_tie_is_ambiguous() {
        let rows = vec![
            row("Jon", "Smith", "X1", ""),
            row("Joan", "Smith", "X2", ""),
        ];
        let r = run(&identity("John Smith", "", ""), rows);
        assert_eq!(r.reason(), Some(UnmatchedReason::AmbiguousName));
    }

    #[test]
    fn fuzzy_margin_exactly_at_minimum_is_accepted() {
        // 20-char names one and two edits away: scores 0.95 and 0.90
        let rows = vec![
            row("Abcdefghi", "Klmnopqrsx", "X1", ""),
            row("Abcdefghx", "Klmnopqrsx", "X2", ""),
        ];
        let r = run(&identity("Abcdefghi Klmnopqrst", "", ""), rows);
        match r.outcome {
            MatchOutcome::Matched { row, confidence, pass } => {
                assert_eq!(row, 0);
                assert_eq!(pass, MatchPass::FuzzyName);
                assert!((confidence - 0.95).abs() < 1e-12);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn shared_member_id_tie_broken_by_name_dob() {
        let rows = vec![
            row("Jane", "Doe", "A1", "01/02/1960"),
            row("Janet", "Doe", "A1", "05/05/1990"),
        ];
        let r = run(&identity("Janet Doe", "a1", "1990-05-05"), rows);
        assert_eq!(r.row(), Some(1));
    }

    #[test]
    fn shared_member_id_without_tie_break_is_ambiguous() {
        let rows = vec![row("Jane", "Doe", "A1", ""), row("Jane", "Doe", "A1", "")];
        let r = run(&identity("Jane Doe", "A1", ""), rows);
        assert_eq!(r.reason(), Some(UnmatchedReason::AmbiguousId));
    }

    #[test]
    fn duplicate_name_dob_is_ambiguous_name() {
        let rows = vec![
            row("Jane", "Doe", "A1", "01/02/1960"),
            row("Jane", "Doe", "A2", "1960-01-02"),
        ];
        let r = run(&identity("Jane Doe", "", "1/2/60"), rows);
        assert_eq!(r.reason(), Some(UnmatchedReason::AmbiguousName));
    }

    #[test]
    fn failed_extraction_and_empty_master_are_no_candidate() {
        let r = run(&IdentityCandidate::failed(), master());
        assert_eq!(r.reason(), Some(UnmatchedReason::NoCandidate));

        let r = run(&identity("Jane Doe", "A1", ""), vec![]);
        assert_eq!(r.reason(), Some(UnmatchedReason::NoCandidate));
    }

    #[test]
    fn nothing_to_compare_is_no_candidate() {
        let r = run(&identity("", "", "01/02/1960"), master());
        assert_eq!(r.reason(), Some(UnmatchedReason::NoCandidate));
    }

    #[test]
    fn master_full_name_column_is_split() {
        let rows = vec![CanonicalRecord::empty("m", 0)
            .with(CanonicalField::FullName, "Doe, Jane")
            .with(CanonicalField::Dob, "1960-01-02")];
        let r = run(&identity("Jane Doe", "", "01/02/1960"), rows);
        assert_eq!(r.row(), Some(0));
    }

    #[test]
    fn dob_spellings_normalize_alike() {
        for s in ["01/02/1960", "1/2/60", "1960-01-02", "01-02-1960", "1960/01/02", "02-Jan-1960", "1960-01-02 00:00:00"] {
            assert_eq!(normalize_dob(s), "1960-01-02", "{s}");
        }
        assert_eq!(normalize_dob("Jan 1960 (approx)"), "1960");
        assert_eq!(normalize_dob(" "), "");
    }

    #[test]
    fn name_normalization() {
        assert_eq!(normalize_name("  Mary-Ann  O'Neil Jr. "), "mary-ann o'neil jr");
        assert_eq!(normalize_member_id(" ab 12 C "), "ab12c");
    }
}
