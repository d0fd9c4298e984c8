//! `gapsort append` - consolidate care-gap sheets.

use std::path::PathBuf;

use clap::Args;
use serde_json::json;

use gapsort_engine::{
    append_sheets, AppendOptions, AppendSource, AuditEntry, AuditReason, CareGapCatalog, EngineError,
};

use crate::{require_exists, CliError, Context};

#[derive(Args)]
pub struct AppendArgs {
    /// Master sheet; its columns define the output layout
    #[arg(long)]
    master: PathBuf,

    /// Sheet to append and its preset id, as PATH=PRESET (repeatable)
    #[arg(long = "source", value_name = "PATH=PRESET", value_parser = parse_source)]
    sources: Vec<SourceArg>,

    /// Care-gap catalog sheet: category headers over raw care-gap names
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Output sheet (.xlsx, .csv, or .tsv)
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Write replaced and filtered rows as JSON
    #[arg(long)]
    audit: Option<PathBuf>,

    /// Print a JSON summary to stdout
    #[arg(long)]
    json: bool,

    /// Worker threads (default: settings, then available cores)
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceArg {
    path: PathBuf,
    preset: String,
}

fn parse_source(value: &str) -> Result<SourceArg, String> {
    // Split on the last '=' so paths may contain one
    match value.rsplit_once('=') {
        Some((path, preset)) if !path.is_empty() && !preset.trim().is_empty() => Ok(SourceArg {
            path: PathBuf::from(path),
            preset: preset.trim().to_string(),
        }),
        _ => Err(format!("expected PATH=PRESET, got '{value}'")),
    }
}

pub fn cmd_append(ctx: &Context, args: AppendArgs) -> Result<(), CliError> {
    require_exists(&args.master)?;
    for source in &args.sources {
        require_exists(&source.path)?;
    }

    let settings = ctx.settings()?;
    let store = ctx.presets()?;

    let master = gapsort_io::read_table(&args.master).map_err(CliError::io)?;
    let mut sources = Vec::with_capacity(args.sources.len());
    for source in &args.sources {
        let table = gapsort_io::read_table(&source.path).map_err(CliError::io)?;
        sources.push(AppendSource::new(table, source.preset.clone()));
    }
    let catalog = match &args.catalog {
        Some(path) => {
            require_exists(path)?;
            let table = gapsort_io::read_table(path).map_err(CliError::io)?;
            Some(CareGapCatalog::from_table(&table))
        }
        None => None,
    };

    let options = AppendOptions {
        catalog: catalog.as_ref(),
        workers: args
            .workers
            .unwrap_or_else(|| settings.config.jobs.effective_workers()),
    };
    let output = append_sheets(&master, &sources, &store, &options).map_err(|e| {
        let missing_preset = matches!(&e, EngineError::Config(msg) if msg.contains("no field mapping"));
        let err = CliError::engine(e);
        if missing_preset {
            err.with_hint("list known presets with `gapsort presets list`")
        } else {
            err
        }
    })?;

    gapsort_io::write_table(&args.output, &output.to_raw_table()).map_err(CliError::io)?;

    if let Some(path) = &args.audit {
        let text = serde_json::to_string_pretty(&output.audit)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        std::fs::write(path, text)
            .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
    }

    let duplicates = count(&output.audit, AuditReason::DuplicateKey);
    let uncatalogued = count(&output.audit, AuditReason::UnmappedCareGap);

    if args.json {
        let summary = json!({
            "output": args.output.display().to_string(),
            "rows": output.table.len(),
            "columns": output.headers(),
            "droppedColumns": output.dropped_columns,
            "replacedDuplicates": duplicates,
            "uncatalogued": uncatalogued,
        });
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        println!("{text}");
    }

    eprintln!(
        "wrote {} rows from {} source(s) to {} ({} duplicates replaced, {} outside the catalog)",
        output.table.len(),
        sources.len() + 1,
        args.output.display(),
        duplicates,
        uncatalogued,
    );
    Ok(())
}

fn count(audit: &[AuditEntry], reason: AuditReason) -> usize {
    audit.iter().filter(|e| e.reason == reason).count()
}
