//! Archive layout planning for sorted PDFs.
//!
//! The plan is pure data: which document lands at which archive path, the
//! per-document report, and the summary text. Turning a plan into archive
//! bytes is the job of an [`ArchiveWriter`].

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::EngineError;
use crate::model::{
    CanonicalField, CanonicalRecord, MasterTable, MatchOutcome, MatchResult, PdfDocument,
    UnmatchedReason,
};

pub const UNMATCHED_DIR: &str = "_unmatched";
pub const UNGROUPED_DIR: &str = "_ungrouped";
pub const REPORT_FILE: &str = "report.json";
pub const SUMMARY_FILE: &str = "Sorting_Summary.txt";

/// Serializes a finished plan into archive bytes.
pub trait ArchiveWriter: Send + Sync {
    fn write(&self, plan: &PackagePlan, documents: &[PdfDocument]) -> Result<Vec<u8>, EngineError>;
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Matched,
    Unmatched,
}

/// One report line per input document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub filename: String,
    pub outcome: Outcome,
    pub target_path: String,
    pub reason: Option<UnmatchedReason>,
    pub confidence: Option<f64>,
    pub master_row: Option<usize>,
}

/// Archive path for the document at `document` (index into the input list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub document: usize,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackagePlan {
    pub placements: Vec<Placement>,
    pub report: Vec<ReportEntry>,
    pub summary: String,
}

impl PackagePlan {
    pub fn report_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(&self.report)
            .map_err(|e| EngineError::io(format!("serializing report: {e}")))
    }

    /// (archive path, bytes) for every placed document, in input order.
    pub fn files<'a>(&'a self, documents: &'a [PdfDocument]) -> impl Iterator<Item = (&'a str, &'a [u8])> {
        self.placements
            .iter()
            .filter_map(move |p| documents.get(p.document).map(|d| (p.path.as_str(), d.bytes())))
    }

    pub fn unmatched(&self) -> Vec<String> {
        self.report
            .iter()
            .filter(|e| e.outcome == Outcome::Unmatched)
            .map(|e| e.filename.clone())
            .collect()
    }

    /// Distinct top-level folders, sorted.
    pub fn folders(&self) -> Vec<String> {
        let mut folders: Vec<String> = self
            .placements
            .iter()
            .filter_map(|p| p.path.split_once('/').map(|(dir, _)| dir.to_string()))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        folders.sort();
        folders
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Assign every document a folder and file name.
///
/// Matched documents go under the sanitized `grouping` value of their master
/// row and are named `Last_First_MemberId.pdf`; unmatched ones keep their
/// filename under `_unmatched`. Names that collide (ignoring case) within a
/// folder all get `_1`, `_2`, ... suffixes in input order.
pub fn plan_layout(
    documents: &[PdfDocument],
    results: &[MatchResult],
    master: &MasterTable,
    grouping: CanonicalField,
) -> Result<PackagePlan, EngineError> {
    if documents.len() != results.len() {
        return Err(EngineError::Worker(format!(
            "{} match results for {} documents",
            results.len(),
            documents.len()
        )));
    }

    let mut wanted: Vec<(String, String)> = Vec::with_capacity(documents.len());
    for (doc, result) in documents.iter().zip(results) {
        let target = match result.row() {
            Some(row) => {
                let record = master.get(row).ok_or_else(|| {
                    EngineError::Worker(format!("'{}' matched missing master row {row}", doc.filename))
                })?;
                (folder_for(record.get(grouping)), matched_file_name(record, &doc.filename))
            }
            None => (UNMATCHED_DIR.to_string(), unmatched_file_name(&doc.filename)),
        };
        wanted.push(target);
    }

    let paths = resolve_collisions(&wanted);

    let placements: Vec<Placement> = paths
        .iter()
        .enumerate()
        .map(|(document, path)| Placement {
            document,
            path: path.clone(),
        })
        .collect();

    let report = documents
        .iter()
        .zip(results)
        .zip(&paths)
        .map(|((doc, result), path)| report_entry(doc, result, path))
        .collect();

    let mut plan = PackagePlan {
        placements,
        report,
        summary: String::new(),
    };
    plan.summary = summary_text(&plan);
    Ok(plan)
}

fn report_entry(doc: &PdfDocument, result: &MatchResult, path: &str) -> ReportEntry {
    let (outcome, reason, confidence, master_row) = match &result.outcome {
        MatchOutcome::Matched { row, confidence, .. } => {
            (Outcome::Matched, None, Some(*confidence), Some(*row))
        }
        MatchOutcome::Unmatched { reason } => (Outcome::Unmatched, Some(*reason), None, None),
    };
    ReportEntry {
        filename: doc.filename.clone(),
        outcome,
        target_path: path.to_string(),
        reason,
        confidence,
        master_row,
    }
}

fn summary_text(plan: &PackagePlan) -> String {
    let folders = plan.folders();
    let mut text = format!(
        "Number of folders created: {}\nTotal PDFs sorted: {}\nUnmatched PDFs: {}\n\nFolders:\n",
        folders.len(),
        plan.placements.len(),
        plan.unmatched().len()
    );
    for folder in &folders {
        text.push_str("  - ");
        text.push_str(folder);
        text.push('\n');
    }
    text
}

fn resolve_collisions(wanted: &[(String, String)]) -> Vec<String> {
    let key = |dir: &str, name: &str| format!("{}/{}", dir.to_lowercase(), name.to_lowercase());

    let mut counts: HashMap<String, usize> = HashMap::new();
    for (dir, name) in wanted {
        *counts.entry(key(dir, name)).or_default() += 1;
    }

    // names that need no suffix are reserved first
    let mut taken: HashSet<String> = wanted
        .iter()
        .filter(|(dir, name)| counts[&key(dir, name)] == 1)
        .map(|(dir, name)| key(dir, name))
        .collect();

    let mut next: HashMap<String, usize> = HashMap::new();
    wanted
        .iter()
        .map(|(dir, name)| {
            let k = key(dir, name);
            if counts[&k] == 1 {
                return format!("{dir}/{name}");
            }
            let (stem, ext) = split_extension(name);
            let n = next.entry(k).or_insert(0);
            loop {
                *n += 1;
                let candidate = format!("{stem}_{n}{ext}");
                if taken.insert(key(dir, &candidate)) {
                    return format!("{dir}/{candidate}");
                }
            }
        })
        .collect()
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    }
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Path-safe single segment: separators, reserved and control characters
/// become `_`, surrounding dots and spaces are dropped.
pub fn sanitize_segment(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '.' || c == ' ')
        .to_string()
}

fn folder_for(value: &str) -> String {
    let folder = sanitize_segment(value);
    if folder.is_empty() {
        return UNGROUPED_DIR.to_string();
    }
    let reserved = [UNMATCHED_DIR, UNGROUPED_DIR, REPORT_FILE, SUMMARY_FILE];
    if reserved.iter().any(|name| folder.eq_ignore_ascii_case(name)) {
        return format!("{folder}_");
    }
    folder
}

fn pdf_stem(filename: &str) -> &str {
    let (stem, ext) = split_extension(filename);
    if ext.eq_ignore_ascii_case(".pdf") {
        stem
    } else {
        filename
    }
}

fn matched_file_name(record: &CanonicalRecord, original: &str) -> String {
    let parts: Vec<String> = [
        CanonicalField::LastName,
        CanonicalField::FirstName,
        CanonicalField::MemberId,
    ]
    .into_iter()
    .map(|f| sanitize_segment(record.get(f)).replace(' ', "_"))
    .filter(|p| !p.is_empty())
    .collect();

    if parts.is_empty() {
        return unmatched_file_name(original);
    }
    format!("{}.pdf", parts.join("_"))
}

fn unmatched_file_name(original: &str) -> String {
    let stem = sanitize_segment(pdf_stem(original));
    if stem.is_empty() {
        return "document.pdf".to_string();
    }
    format!("{stem}.pdf")
}
