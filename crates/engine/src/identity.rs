//! Identity extraction from PDF text.
//!
//! Text comes from a [`TextExtractor`] (one string per page). Identity
//! fields are found by label anchors such as `Member ID:` or `DOB:`; the
//! value runs to the end of the line, a layout column gap (two or more
//! spaces), or the next label on the same line, whichever comes first.
//!
//! Page 1 is tried first. Later pages are only consulted while a field is
//! still missing, and scanning stops at the first page that completes the
//! identity.

use log::{debug, warn};
use regex::Regex;
use serde::Serialize;

use crate::config::ExtractionConfig;
use crate::error::EngineError;
use crate::model::PdfDocument;
use crate::normalize::{collapse_whitespace, split_full_name};

/// Source of page text for a PDF.
pub trait TextExtractor: Send + Sync {
    /// One string per page, in page order. `document` is only used for
    /// error messages.
    fn extract_pages(&self, document: &str, pdf: &[u8]) -> Result<Vec<String>, EngineError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IdentityCandidate {
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub member_id: String,
    pub dob: String,
    pub raw_text: String,
    /// No text could be read (image-only or unreadable PDF).
    pub extraction_failed: bool,
    /// `name` came from the filename rather than the text.
    pub name_from_filename: bool,
}

impl IdentityCandidate {
    pub fn failed() -> Self {
        Self {
            extraction_failed: true,
            ..Self::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.member_id.is_empty() && !self.dob.is_empty()
    }

    fn set_name(&mut self, name: String) {
        if let Some((first, last)) = split_full_name(&name) {
            self.first_name = first;
            self.last_name = last;
        }
        self.name = name;
    }
}

// ---------------------------------------------------------------------------
// Anchors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Name,
    MemberId,
    Dob,
}

/// Compiled label anchors.
#[derive(Debug, Clone)]
pub struct IdentityExtractor {
    name: Vec<Regex>,
    member_id: Vec<Regex>,
    dob: Vec<Regex>,
    /// Every label, used to cut a value short at the next label.
    any_label: Vec<Regex>,
    date_like: Regex,
    filename_fallback: bool,
}

fn anchor_regex(label: &str) -> Result<Regex, EngineError> {
    let words: Vec<String> = label.split_whitespace().map(regex::escape).collect();
    let pattern = format!(r"(?i)(?:^|[^\p{{L}}\p{{N}}])(?:{})[ \t]*[:#][ \t]*", words.join(r"\s+"));
    Regex::new(&pattern).map_err(|e| EngineError::config(format!("bad anchor '{label}': {e}")))
}

fn compile(labels: &[String]) -> Result<Vec<Regex>, EngineError> {
    labels.iter().map(|l| anchor_regex(l)).collect()
}

impl IdentityExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self, EngineError> {
        let name = compile(&config.name_anchors)?;
        let member_id = compile(&config.member_id_anchors)?;
        let dob = compile(&config.dob_anchors)?;
        let any_label = name.iter().chain(&member_id).chain(&dob).cloned().collect();
        let date_like = Regex::new(
            r"\d{4}[/\-.]\d{1,2}[/\-.]\d{1,2}|\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}|\d{1,2}[\- ][A-Za-z]{3}[\- ]\d{2,4}",
        )
        .map_err(|e| EngineError::config(e.to_string()))?;
        Ok(Self {
            name,
            member_id,
            dob,
            any_label,
            date_like,
            filename_fallback: config.filename_fallback,
        })
    }

    /// Identity for a document, extracting (and caching) its text on first use.
    /// Never fails: unreadable documents come back with `extraction_failed`.
    pub fn extract(&self, doc: &PdfDocument, text: &dyn TextExtractor) -> IdentityCandidate {
        let pages = match doc.pages(text) {
            Ok(pages) => pages,
            Err(e) => {
                warn!("{e}");
                return IdentityCandidate::failed();
            }
        };
        self.identify(&doc.filename, pages)
    }

    /// Identity for raw PDF bytes without caching.
    pub fn extract_bytes(&self, filename: &str, pdf: &[u8], text: &dyn TextExtractor) -> IdentityCandidate {
        match text.extract_pages(filename, pdf) {
            Ok(pages) => self.identify(filename, &pages),
            Err(e) => {
                warn!("{e}");
                IdentityCandidate::failed()
            }
        }
    }

    fn identify(&self, filename: &str, pages: &[String]) -> IdentityCandidate {
        if pages.iter().all(|p| p.trim().is_empty()) {
            debug!("{filename}: no text layer");
            return IdentityCandidate::failed();
        }

        let mut candidate = self.from_pages(pages);
        if candidate.name.is_empty() && self.filename_fallback {
            if let Some(name) = name_from_filename(filename) {
                debug!("{filename}: name taken from filename");
                candidate.set_name(name);
                candidate.name_from_filename = true;
            }
        }
        candidate
    }

    /// Scan pages in order, filling fields still empty, until complete.
    pub fn from_pages(&self, pages: &[String]) -> IdentityCandidate {
        let mut candidate = IdentityCandidate {
            raw_text: pages.join("\u{c}"),
            ..IdentityCandidate::default()
        };

        for page in pages {
            if candidate.name.is_empty() {
                if let Some(name) = self.find(page, Slot::Name) {
                    candidate.set_name(name);
                }
            }
            if candidate.member_id.is_empty() {
                if let Some(id) = self.find(page, Slot::MemberId) {
                    candidate.member_id = id;
                }
            }
            if candidate.dob.is_empty() {
                if let Some(dob) = self.find(page, Slot::Dob) {
                    candidate.dob = dob;
                }
            }
            if candidate.is_complete() {
                break;
            }
        }
        candidate
    }

    /// First anchor (in configured order) with a non-empty value wins.
    fn find(&self, text: &str, slot: Slot) -> Option<String> {
        let anchors = match slot {
            Slot::Name => &self.name,
            Slot::MemberId => &self.member_id,
            Slot::Dob => &self.dob,
        };
        anchors.iter().find_map(|re| {
            re.find_iter(text)
                .find_map(|m| self.value_after(text, m.end()).and_then(|v| self.shape(&v, slot)))
        })
    }

    /// Value text following an anchor. Falls through to the next line when
    /// the label stands alone at the end of its line.
    fn value_after(&self, text: &str, start: usize) -> Option<String> {
        let rest = &text[start..];
        let mut lines = rest.split('\n');
        let same_line = lines.next().unwrap_or("");
        let value = self.cut(same_line);
        if !value.is_empty() {
            return Some(value);
        }
        if !same_line.trim().is_empty() {
            return None;
        }
        lines
            .find(|l| !l.trim().is_empty())
            .map(|l| self.cut(l.trim_start()))
            .filter(|v| !v.is_empty())
    }

    fn cut(&self, line: &str) -> String {
        let line = line.trim_end_matches('\r').trim_start();
        let mut end = line.len();
        for gap in [line.find("  "), line.find('\t')].into_iter().flatten() {
            end = end.min(gap);
        }
        for re in &self.any_label {
            if let Some(m) = re.find(&line[..end]) {
                // the match may include one separator char before the label
                end = end.min(m.start());
            }
        }
        collapse_whitespace(&line[..end])
    }

    fn shape(&self, value: &str, slot: Slot) -> Option<String> {
        let trim = |s: &str| s.trim_matches(|c: char| matches!(c, ',' | ';' | '.' | '|')).to_string();
        let shaped = match slot {
            Slot::Name => trim(value),
            Slot::MemberId => trim(value),
            Slot::Dob => match self.date_like.find(value) {
                Some(m) => m.as_str().to_string(),
                None => trim(value.split_whitespace().next().unwrap_or("")),
            },
        };
        (!shaped.is_empty()).then_some(shaped)
    }
}

/// Name hint from a filename like `Jane Q. Doe.pdf` -> `Jane Doe`.
///
/// Middle initials (one letter, or a letter and a period) are skipped when
/// picking the last name. Single-word stems are not treated as names.
pub fn name_from_filename(filename: &str) -> Option<String> {
    let stem = match filename.len().checked_sub(4) {
        Some(cut) if filename.is_char_boundary(cut) && filename[cut..].eq_ignore_ascii_case(".pdf") => {
            &filename[..cut]
        }
        _ => filename,
    };
    let parts: Vec<&str> = stem.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }
    let is_initial = |p: &str| {
        let n = p.chars().count();
        n == 1 || (n == 2 && p.ends_with('.'))
    };
    let last = parts[1..]
        .iter()
        .find(|p| !is_initial(p))
        .copied()
        .unwrap_or(parts[1]);
    Some(format!("{} {}", parts[0], last))
}
