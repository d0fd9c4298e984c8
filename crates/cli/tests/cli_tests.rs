// Integration tests for the gapsort binary: exit codes, stdout JSON shape,
// and files written.
//
// Run with: cargo test -p gapsort-cli --test cli_tests

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn gapsort(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gapsort"));
    cmd.current_dir(dir)
        // never pick up the developer's own settings or presets
        .env("GAPSORT_CONFIG", dir.join("settings.toml"))
        .env("GAPSORT_PRESETS", dir.join("presets.json"))
        .env_remove("RUST_LOG");
    cmd
}

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("settings.toml"), "[jobs]\nworkers = 2\n").unwrap();
    fs::write(
        dir.path().join("presets.json"),
        r#"[
            {"_id": "ambetter", "name": "Ambetter",
             "fields": {"First Name": "FNAME", "Last Name": "LNAME",
                        "Member ID": "Member #", "Care Gap": "Measure"}},
            {"id": "cigna", "name": "Cigna",
             "fields": {"Full Name": "Patient", "Member ID": "ID", "Care Gap": "Gap",
                        "Insurance Provided": "No", "Insurance": "Cigna"}}
        ]"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("master.csv"),
        "First Name,Last Name,Member ID,Care Gap,Insurance,Owner\n\
         Jane,Doe,A1,Diabetes,Ambetter,kim\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("ambetter.csv"),
        "FNAME,LNAME,Member #,Measure\nJane,Doe,A1,Diabetes\nJohn,Roe,B2,Breast Cancer Screening\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("cigna.csv"),
        "Patient,ID,Gap\n\"Smith, Ann\",C3,Diabetes\n",
    )
    .unwrap();
    dir
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn pdftotext_available() -> bool {
    Command::new("pdftotext").arg("-v").output().is_ok()
}

/// One-page PDF with the given text lines in Helvetica.
fn text_pdf(lines: &[&str]) -> Vec<u8> {
    let mut content = String::from("BT /F1 12 Tf 72 720 Td 14 TL\n");
    for line in lines {
        content.push_str(&format!("({}) Tj T*\n", line));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{}endstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }
    let xref = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    ));
    pdf.into_bytes()
}

// ===========================================================================
// gapsort append
// ===========================================================================

#[test]
fn append_merges_sources_into_master_layout() {
    let dir = workspace();
    let out = dir.path().join("merged.csv");

    let output = gapsort(dir.path())
        .args([
            "append",
            "--master",
            "master.csv",
            "--source",
            "ambetter.csv=ambetter",
            "--source",
            "cigna.csv=cigna",
            "-o",
            "merged.csv",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["rows"], 3);
    assert_eq!(summary["replacedDuplicates"], 1);
    assert_eq!(summary["droppedColumns"], serde_json::json!(["Owner"]));
    assert_eq!(
        summary["columns"],
        serde_json::json!(["First Name", "Last Name", "Member ID", "Care Gap", "Insurance"])
    );

    let merged = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = merged.lines().collect();
    assert_eq!(lines[0], "First Name,Last Name,Member ID,Care Gap,Insurance");
    assert_eq!(lines.len(), 4);
    assert!(lines.contains(&"Ann,Smith,C3,Diabetes,Cigna"));
    assert!(lines.contains(&"John,Roe,B2,Breast Cancer Screening,"));
}

#[test]
fn append_writes_audit_and_applies_catalog() {
    let dir = workspace();
    fs::write(
        dir.path().join("catalog.csv"),
        "Diabetes Care\nDiabetes\nHbA1c Control\n",
    )
    .unwrap();

    let output = gapsort(dir.path())
        .args([
            "append",
            "--master",
            "master.csv",
            "--source",
            "ambetter.csv=ambetter",
            "--catalog",
            "catalog.csv",
            "-o",
            "merged.xlsx",
            "--audit",
            "audit.json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(dir.path().join("merged.xlsx").exists());

    let audit: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("audit.json")).unwrap()).unwrap();
    let reasons: Vec<&str> = audit
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["reason"].as_str().unwrap())
        .collect();
    assert!(reasons.contains(&"unmapped_care_gap"));
}

#[test]
fn append_unknown_preset_is_config_error() {
    let dir = workspace();
    let output = gapsort(dir.path())
        .args([
            "append",
            "--master",
            "master.csv",
            "--source",
            "ambetter.csv=nope",
            "-o",
            "merged.csv",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let err = stderr(&output);
    assert!(err.contains("nope"), "stderr: {err}");
    assert!(err.contains("gapsort presets list"));
    assert!(!dir.path().join("merged.csv").exists());
}

#[test]
fn append_missing_input_is_usage_error() {
    let dir = workspace();
    let output = gapsort(dir.path())
        .args(["append", "--master", "missing.csv", "-o", "merged.csv"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn append_bad_source_syntax_is_usage_error() {
    let dir = workspace();
    let output = gapsort(dir.path())
        .args(["append", "--master", "master.csv", "--source", "ambetter.csv", "-o", "m.csv"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ===========================================================================
// gapsort presets / config
// ===========================================================================

#[test]
fn presets_list_prints_ids() {
    let dir = workspace();
    let output = gapsort(dir.path()).args(["presets", "list"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let ids: Vec<&str> = stdout.lines().filter_map(|l| l.split('\t').next()).collect();
    assert_eq!(ids, vec!["ambetter", "cigna"]);
}

#[test]
fn presets_list_json_is_single_array() {
    let dir = workspace();
    let output = gapsort(dir.path())
        .args(["presets", "list", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let val: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(val.as_array().unwrap().len(), 2);
    assert_eq!(val[1]["fields"]["Insurance"], "Cigna");
}

#[test]
fn presets_show_unknown_id() {
    let dir = workspace();
    let output = gapsort(dir.path()).args(["presets", "show", "x"]).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn config_check_accepts_valid_settings() {
    let dir = workspace();
    let output = gapsort(dir.path()).args(["config", "check"]).output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("presets: 2 loaded"));
}

#[test]
fn config_check_rejects_bad_threshold() {
    let dir = workspace();
    fs::write(
        dir.path().join("settings.toml"),
        "[matching]\naccept_threshold = 2.0\n",
    )
    .unwrap();
    let output = gapsort(dir.path()).args(["config", "check"]).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("accept_threshold"));
}

#[test]
fn config_show_prints_effective_toml() {
    let dir = workspace();
    let output = gapsort(dir.path()).args(["config", "show"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("workers = 2"));
    assert!(stdout.contains("accept_threshold = 0.85"));
}

// ===========================================================================
// gapsort sort
// ===========================================================================

#[test]
fn sort_unknown_group_field_is_usage_error() {
    let dir = workspace();
    let output = gapsort(dir.path())
        .args(["sort", "--master", "master.csv", "--group-by", "Shoe Size", ".", "-o", "o.zip"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn sort_missing_pdf_is_usage_error() {
    let dir = workspace();
    let output = gapsort(dir.path())
        .args(["sort", "--master", "master.csv", "--group-by", "Care Gap", "nope.pdf", "-o", "o.zip"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(!dir.path().join("o.zip").exists());
}

#[test]
fn sort_places_matched_and_unmatched_pdfs() {
    if !pdftotext_available() {
        eprintln!("skipping: pdftotext not installed");
        return;
    }
    let dir = workspace();
    let pdfs: PathBuf = dir.path().join("pdfs");
    fs::create_dir(&pdfs).unwrap();
    fs::write(
        pdfs.join("scan1.pdf"),
        text_pdf(&["Patient Name: Jane Doe", "Member ID: A1"]),
    )
    .unwrap();
    fs::write(pdfs.join("scan2.pdf"), text_pdf(&["Quarterly newsletter"])).unwrap();

    let output = gapsort(dir.path())
        .args([
            "sort",
            "--master",
            "master.csv",
            "--group-by",
            "care gap",
            "pdfs",
            "-o",
            "sorted.zip",
            "--extract",
            "sorted",
            "--json",
            "--strict",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(6), "stderr: {}", stderr(&output));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = report.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["filename"], "scan1.pdf");
    assert_eq!(entries[0]["targetPath"], "Diabetes/Doe_Jane_A1.pdf");
    assert_eq!(entries[0]["reason"], serde_json::Value::Null);
    assert_eq!(entries[1]["outcome"], "unmatched");
    assert_eq!(entries[1]["targetPath"], "_unmatched/scan2.pdf");

    let sorted = dir.path().join("sorted");
    assert!(sorted.join("Diabetes/Doe_Jane_A1.pdf").exists());
    assert!(sorted.join("_unmatched/scan2.pdf").exists());
    let summary = fs::read_to_string(sorted.join("Sorting_Summary.txt")).unwrap();
    assert!(summary.contains("Total PDFs sorted: 2"));
    assert!(dir.path().join("sorted.zip").exists());
}
