// File I/O operations

pub mod archive;
pub mod csv;
pub mod pdf;
pub mod xlsx;

use std::fs;
use std::path::Path;

use gapsort_engine::RawTable;

pub use archive::ZipArchiveWriter;
pub use pdf::PdftotextExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Tsv,
    Excel,
}

impl SheetFormat {
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => Ok(Self::Csv),
            "tsv" | "tab" => Ok(Self::Tsv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(Self::Excel),
            "" => Err(format!("{}: no file extension", path.display())),
            other => Err(format!("{}: unsupported sheet format '.{other}'", path.display())),
        }
    }
}

/// Read the first sheet of a CSV, TSV, or Excel file.
pub fn read_table(path: &Path) -> Result<RawTable, String> {
    let table = match SheetFormat::from_path(path)? {
        SheetFormat::Csv => csv::import(path)?,
        SheetFormat::Tsv => csv::import_tsv(path)?,
        SheetFormat::Excel => xlsx::import(path)?,
    };
    log::debug!(
        "{}: {} columns, {} rows",
        path.display(),
        table.headers.len(),
        table.len()
    );
    Ok(table)
}

/// Write a table in the format implied by `path`'s extension. The file is
/// written beside the target and renamed over it, so an existing file is
/// never left half-written. Only `.xlsx` is supported for Excel output.
pub fn write_table(path: &Path, table: &RawTable) -> Result<(), String> {
    let format = SheetFormat::from_path(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if format == SheetFormat::Excel && ext != "xlsx" {
        return Err(format!("{}: can only write .xlsx workbooks", path.display()));
    }

    let tmp = path.with_extension(format!("tmp.{ext}"));
    let written = match format {
        SheetFormat::Csv => csv::export(table, &tmp),
        SheetFormat::Tsv => csv::export_tsv(table, &tmp),
        SheetFormat::Excel => xlsx::export(table, &tmp),
    };
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        format!("{}: {e}", path.display())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn table() -> RawTable {
        RawTable::new(
            vec!["Member ID".into(), "Care Gap".into()],
            vec![vec!["A1".into(), "Diabetes".into()]],
        )
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(SheetFormat::from_path(Path::new("a.CSV")), Ok(SheetFormat::Csv));
        assert_eq!(SheetFormat::from_path(Path::new("a.xls")), Ok(SheetFormat::Excel));
        assert!(SheetFormat::from_path(Path::new("a.pdf")).is_err());
        assert!(SheetFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_write_then_read_each_format() {
        let dir = tempdir().unwrap();
        for name in ["out.csv", "out.tsv", "out.xlsx"] {
            let path = dir.path().join(name);
            write_table(&path, &table()).unwrap();
            let back = read_table(&path).unwrap();
            assert_eq!(back, table(), "{name}");
        }
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_replaces_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("merged.csv");
        fs::write(&path, "old").unwrap();
        write_table(&path, &table()).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("Member ID,Care Gap"));
    }

    #[test]
    fn test_legacy_excel_output_refused() {
        let dir = tempdir().unwrap();
        let err = write_table(&dir.path().join("out.xls"), &table()).unwrap_err();
        assert!(err.contains(".xlsx"));
    }
}
