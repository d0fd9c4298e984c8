// Excel import (xlsx, xls, xlsb, ods) and xlsx export

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{Duration, NaiveDate};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};

use gapsort_engine::RawTable;

/// Sheet name used for consolidated output.
pub const OUTPUT_SHEET: &str = "Merged Care Gaps";

/// Import the first sheet of a workbook. The first non-blank row is the
/// header row.
pub fn import(path: &Path) -> Result<RawTable, String> {
    let mut workbook: Sheets<_> =
        open_workbook_auto(path).map_err(|e| format!("Failed to open Excel file: {}", e))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let Some(first) = sheet_names.first() else {
        return Err("Excel file contains no sheets".to_string());
    };

    let range = workbook
        .worksheet_range(first)
        .map_err(|e| format!("Failed to read sheet '{}': {}", first, e))?;

    // Range may not begin at A1
    let (_, start_col) = range.start().unwrap_or((0, 0));
    let pad = start_col as usize;

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    for row in range.rows() {
        let mut cells: Vec<String> = vec![String::new(); pad];
        cells.extend(row.iter().map(cell_to_string));
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        match headers {
            None => headers = Some(cells.iter().map(|h| h.trim().to_string()).collect()),
            Some(_) => rows.push(cells),
        }
    }

    Ok(RawTable::new(headers.unwrap_or_default(), rows))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => {
            // Integers without decimals (member IDs are often numeric)
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => format!("{}", n),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => serial_to_iso(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

/// Excel serial (1900 system) to `YYYY-MM-DD`, with a time part when the
/// serial has one.
pub fn serial_to_iso(serial: f64) -> String {
    // 9999-12-31 is the last date Excel can represent
    if !(0.0..=2_958_465.0).contains(&serial) {
        return format!("{}", serial);
    }
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30) else {
        return format!("{}", serial);
    };
    let days = serial.floor();
    let Some(date) = epoch.checked_add_signed(Duration::days(days as i64)) else {
        return format!("{}", serial);
    };
    let secs = ((serial - days) * 86_400.0).round() as i64;
    if secs == 0 || secs >= 86_400 {
        return date.format("%Y-%m-%d").to_string();
    }
    let time = date.and_hms_opt(0, 0, 0).map(|t| t + Duration::seconds(secs));
    match time {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => date.format("%Y-%m-%d").to_string(),
    }
}

/// Write a single sheet named [`OUTPUT_SHEET`] with a bold header row.
pub fn export(table: &RawTable, path: &Path) -> Result<(), String> {
    let mut workbook = XlsxWorkbook::new();
    let bold = Format::new().set_bold();

    let worksheet = workbook
        .add_worksheet()
        .set_name(OUTPUT_SHEET)
        .map_err(|e| format!("Failed to create sheet '{}': {}", OUTPUT_SHEET, e))?;

    for (col, header) in table.headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, header, &bold)
            .map_err(|e| format!("Failed to write header: {}", e))?;
    }
    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            worksheet
                .write_string(row_idx as u32 + 1, col as u16, value)
                .map_err(|e| format!("Failed to write cell: {}", e))?;
        }
    }

    workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {}", e))?;
    Ok(())
}
