//! `gapsort sort` - match PDFs to a key sheet and package them.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use gapsort_engine::{sort_documents, CanonicalField, EngineError};
use gapsort_io::{archive, pdf, PdftotextExtractor, ZipArchiveWriter};

use crate::exit_codes::{engine_exit_code, EXIT_UNMATCHED};
use crate::{require_exists, CliError, Context};

#[derive(Args)]
pub struct SortArgs {
    /// Master key sheet the PDFs are matched against
    #[arg(long)]
    master: PathBuf,

    /// Master column to group folders by (e.g. "Care Gap", "Insurance")
    #[arg(long, value_parser = parse_field)]
    group_by: CanonicalField,

    /// PDF files, or directories of PDFs
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output zip archive
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Also unpack the archive into this (new) directory
    #[arg(long)]
    extract: Option<PathBuf>,

    /// Write the per-document report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the per-document report as JSON to stdout
    #[arg(long)]
    json: bool,

    /// Exit 6 when any PDF ends up unmatched
    #[arg(long)]
    strict: bool,

    /// Job time limit in seconds (overrides settings)
    #[arg(long)]
    timeout: Option<u64>,

    /// Worker threads (overrides settings)
    #[arg(long)]
    workers: Option<usize>,
}

fn parse_field(value: &str) -> Result<CanonicalField, String> {
    value.parse().map_err(|e: EngineError| e.to_string())
}

pub fn cmd_sort(ctx: &Context, args: SortArgs) -> Result<(), CliError> {
    require_exists(&args.master)?;
    for input in &args.inputs {
        require_exists(input)?;
    }
    if let Some(dir) = &args.extract {
        if dir.exists() {
            return Err(CliError::args(format!("{} already exists", dir.display()))
                .with_hint("--extract needs a directory that does not exist yet"));
        }
    }

    let mut config = ctx.settings()?.config;
    if let Some(secs) = args.timeout {
        config.jobs.timeout_secs = Some(secs);
    }
    if let Some(workers) = args.workers {
        config.jobs.workers = Some(workers);
    }

    let master = gapsort_io::read_table(&args.master).map_err(CliError::io)?;
    let documents = pdf::load_documents(&args.inputs).map_err(CliError::io)?;
    if documents.is_empty() {
        return Err(CliError::args("no PDF files found in the given inputs"));
    }

    let extractor = PdftotextExtractor::new()
        .map_err(|e| CliError::io(e).with_hint("install poppler-utils to get pdftotext"))?;

    log::info!("sorting {} PDFs by {}", documents.len(), args.group_by);
    let output = sort_documents(
        master,
        documents,
        args.group_by,
        Arc::new(extractor),
        Arc::new(ZipArchiveWriter),
        &config,
    )
    .map_err(|failure| {
        for name in &failure.unmatched {
            eprintln!("unmatched: {name}");
        }
        let hint = match failure.error {
            EngineError::Timeout { .. } => Some("raise jobs.timeout_secs or pass --timeout"),
            _ => None,
        };
        CliError {
            code: engine_exit_code(&failure.error),
            message: failure.to_string(),
            hint: hint.map(str::to_string),
        }
    })?;

    archive::write_archive(&output.archive, &args.output).map_err(CliError::io)?;
    if let Some(dir) = &args.extract {
        archive::extract_to_dir(&output.archive, dir).map_err(CliError::io)?;
    }

    let report = serde_json::to_string_pretty(&output.report)
        .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
    if let Some(path) = &args.report {
        std::fs::write(path, &report)
            .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
    }
    if args.json {
        println!("{report}");
    }

    eprint!("{}", output.summary);
    eprintln!("wrote {}", args.output.display());

    let unmatched = output.unmatched_count();
    if args.strict && unmatched > 0 {
        return Err(CliError {
            code: EXIT_UNMATCHED,
            message: format!("{unmatched} PDF(s) could not be matched"),
            hint: Some("see the _unmatched folder and report.json in the archive".to_string()),
        });
    }
    Ok(())
}
