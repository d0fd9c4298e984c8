// PDF text via poppler's `pdftotext`

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use gapsort_engine::{EngineError, PdfDocument, TextExtractor};

/// Load PDFs from files and directories. Directories contribute their
/// `.pdf` files (not recursive), sorted by name; explicit files are kept in
/// the order given.
pub fn load_documents(paths: &[PathBuf]) -> Result<Vec<PdfDocument>, String> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(path)
                .map_err(|e| format!("{}: {e}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_pdf(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    files
        .iter()
        .map(|path| {
            let bytes = fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(PdfDocument::new(name, bytes))
        })
        .collect()
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Runs `pdftotext -layout <file> -` and splits pages on form feeds.
#[derive(Debug, Clone)]
pub struct PdftotextExtractor {
    program: PathBuf,
}

impl PdftotextExtractor {
    /// Locate `pdftotext` on PATH.
    pub fn new() -> Result<Self, String> {
        let program = which::which("pdftotext")
            .map_err(|_| "pdftotext not installed (poppler-utils)".to_string())?;
        Ok(Self { program })
    }

    pub fn available() -> bool {
        which::which("pdftotext").is_ok()
    }
}

impl TextExtractor for PdftotextExtractor {
    fn extract_pages(&self, document: &str, pdf: &[u8]) -> Result<Vec<String>, EngineError> {
        let fail = |message: String| EngineError::Extraction {
            document: document.to_string(),
            message,
        };

        let mut file = tempfile::Builder::new()
            .prefix("gapsort-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| fail(format!("temp file: {e}")))?;
        file.write_all(pdf)
            .and_then(|_| file.flush())
            .map_err(|e| fail(format!("temp file: {e}")))?;

        let output = Command::new(&self.program)
            .arg("-layout")
            .arg(file.path())
            .arg("-")
            .output()
            .map_err(|e| fail(format!("failed to run pdftotext: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!(
                "pdftotext failed (exit {}): {}",
                output.status.code().unwrap_or(-1),
                stderr.trim(),
            )));
        }

        let pages = split_pages(&String::from_utf8_lossy(&output.stdout));
        debug!("{document}: {} pages of text", pages.len());
        Ok(pages)
    }
}

/// pdftotext ends every page, including the last, with a form feed.
fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split('\u{c}').map(str::to_string).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pages() {
        assert_eq!(split_pages("one\n\u{c}two\n\u{c}"), vec!["one\n", "two\n"]);
        assert_eq!(split_pages(""), vec![""]);
    }

    #[test]
    fn test_load_documents_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.PDF"), b"%PDF-b").unwrap();
        fs::write(dir.path().join("a.pdf"), b"%PDF-a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"skip").unwrap();

        let docs = load_documents(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
        assert_eq!(docs[0].bytes(), b"%PDF-a");

        assert!(load_documents(&[dir.path().join("missing.pdf")]).is_err());
    }

    #[test]
    fn test_garbage_bytes_fail_extraction() {
        let Ok(extractor) = PdftotextExtractor::new() else {
            eprintln!("skipping: pdftotext not installed");
            return;
        };
        let err = extractor.extract_pages("junk.pdf", b"not a pdf").unwrap_err();
        assert_eq!(err.code(), "extraction_error");
        assert!(err.to_string().contains("junk.pdf"));
    }
}
