// Zip packaging for sorted PDFs

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use gapsort_engine::package::{REPORT_FILE, SUMMARY_FILE};
use gapsort_engine::{ArchiveWriter, EngineError, PackagePlan, PdfDocument};

/// Writes a plan as a deflated zip. Every entry carries the same fixed
/// timestamp so identical inputs produce identical bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiveWriter;

impl ZipArchiveWriter {
    fn options() -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn write(&self, plan: &PackagePlan, documents: &[PdfDocument]) -> Result<Vec<u8>, EngineError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = Self::options();

        for (path, bytes) in plan.files(documents) {
            add_entry(&mut zip, path, bytes, options)?;
        }
        add_entry(&mut zip, REPORT_FILE, plan.report_json()?.as_bytes(), options)?;
        add_entry(&mut zip, SUMMARY_FILE, plan.summary.as_bytes(), options)?;

        let cursor = zip
            .finish()
            .map_err(|e| EngineError::io(format!("finishing archive: {e}")))?;
        let bytes = cursor.into_inner();
        debug!("archive: {} entries, {} bytes", plan.placements.len() + 2, bytes.len());
        Ok(bytes)
    }
}

fn add_entry(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    path: &str,
    bytes: &[u8],
    options: SimpleFileOptions,
) -> Result<(), EngineError> {
    zip.start_file(path, options)
        .map_err(|e| EngineError::io(format!("archive entry '{path}': {e}")))?;
    zip.write_all(bytes)
        .map_err(|e| EngineError::io(format!("archive entry '{path}': {e}")))
}

/// Write finished archive bytes to `path` via a temp file and rename.
pub fn write_archive(bytes: &[u8], path: &Path) -> Result<(), String> {
    let tmp = path.with_extension("zip.tmp");
    fs::write(&tmp, bytes).map_err(|e| format!("{}: {e}", tmp.display()))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        format!("{}: {e}", path.display())
    })
}

/// List entry names in archive order.
pub fn entry_names(bytes: &[u8]) -> Result<Vec<String>, String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("Invalid zip: {e}"))?;
    (0..archive.len())
        .map(|i| {
            archive
                .by_index(i)
                .map(|entry| entry.name().to_string())
                .map_err(|e| format!("zip entry {i}: {e}"))
        })
        .collect()
}

/// Unpack an archive into `dest`.
///
/// Entries are written to a sibling staging directory which is renamed into
/// place once complete, so `dest` never holds a partial tree. `dest` must
/// not exist yet.
pub fn extract_to_dir(bytes: &[u8], dest: &Path) -> Result<(), String> {
    if dest.exists() {
        return Err(format!("{} already exists", dest.display()));
    }
    let staging = staging_dir(dest);
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| format!("{}: {e}", staging.display()))?;
    }

    let result = unpack(bytes, &staging).and_then(|count| {
        fs::rename(&staging, dest).map_err(|e| format!("{}: {e}", dest.display()))?;
        Ok(count)
    });
    match result {
        Ok(count) => {
            info!("extracted {count} files to {}", dest.display());
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            Err(e)
        }
    }
}

fn staging_dir(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    dest.with_file_name(format!(".{name}.partial"))
}

fn unpack(bytes: &[u8], root: &Path) -> Result<usize, String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("Invalid zip: {e}"))?;
    fs::create_dir_all(root).map_err(|e| format!("{}: {e}", root.display()))?;

    let mut count = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| format!("zip entry {i}: {e}"))?;
        // Rejects absolute paths and `..`
        let Some(relative) = entry.enclosed_name() else {
            return Err(format!("unsafe path in archive: {}", entry.name()));
        };
        let target = root.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| format!("{}: {e}", target.display()))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("{}: {e}", parent.display()))?;
        }
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|e| format!("{}: {e}", entry.name()))?;
        fs::write(&target, contents).map_err(|e| format!("{}: {e}", target.display()))?;
        count += 1;
    }
    Ok(count)
}
