// gapsort CLI - merge care-gap sheets and sort PDFs against a key sheet

mod append;
mod exit_codes;
mod inspect;
mod sort;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use gapsort_config::{load_settings, LoadedSettings, PresetStore};
use gapsort_engine::EngineError;

use exit_codes::{engine_exit_code, EXIT_CONFIG, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "gapsort")]
#[command(about = "Merge care-gap sheets and sort patient PDFs into folders")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file (default: ~/.config/gapsort/settings.toml)
    #[arg(long, global = true, env = "GAPSORT_CONFIG")]
    config: Option<PathBuf>,

    /// Preset file or directory (default: ~/.config/gapsort/presets/)
    #[arg(long, global = true, env = "GAPSORT_PRESETS")]
    presets: Option<PathBuf>,

    /// More logging on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append care-gap sheets into the master sheet's layout
    #[command(after_help = "\
Examples:
  gapsort append --master master.xlsx --source ambetter.csv=ambetter -o merged.xlsx
  gapsort append --master master.csv --source a.xlsx=wellcare --source b.csv=cigna \\
      --catalog care_gaps.xlsx -o merged.csv --audit audit.json")]
    Append(append::AppendArgs),

    /// Sort PDFs into folders by matching them to a key sheet
    #[command(after_help = "\
Examples:
  gapsort sort --master key.xlsx --group-by \"Care Gap\" pdfs/ -o sorted.zip
  gapsort sort --master key.csv --group-by Insurance a.pdf b.pdf -o out.zip --extract out/
  gapsort sort --master key.csv --group-by \"Care Gap\" pdfs/ -o out.zip --strict --json")]
    Sort(sort::SortArgs),

    /// Inspect field-mapping presets
    #[command(subcommand)]
    Presets(inspect::PresetCommands),

    /// Inspect engine settings
    #[command(subcommand)]
    Config(inspect::ConfigCommands),
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  gapsort-engine ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = Context {
        config: cli.config,
        presets: cli.presets,
    };
    let result = match cli.command {
        Commands::Append(args) => append::cmd_append(&ctx, args),
        Commands::Sort(args) => sort::cmd_sort(&ctx, args),
        Commands::Presets(cmd) => inspect::cmd_presets(&ctx, cmd),
        Commands::Config(cmd) => inspect::cmd_config(&ctx, cmd),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

// ============================================================================
// Shared context
// ============================================================================

/// Global options every command resolves its settings and presets from.
pub struct Context {
    config: Option<PathBuf>,
    presets: Option<PathBuf>,
}

impl Context {
    pub fn settings(&self) -> Result<LoadedSettings, CliError> {
        load_settings(self.config.as_deref()).map_err(|e| {
            CliError::engine(e).with_hint("check the file named above, or run `gapsort config check`")
        })
    }

    pub fn presets(&self) -> Result<PresetStore, CliError> {
        let store = match &self.presets {
            Some(path) => PresetStore::load(path),
            None => PresetStore::load_default(),
        };
        store.map_err(CliError::engine)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    pub fn engine(err: EngineError) -> Self {
        Self { code: engine_exit_code(&err), message: err.to_string(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Fail fast on input paths that do not exist, before any work starts.
pub fn require_exists(path: &Path) -> Result<(), CliError> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::args(format!("{}: no such file or directory", path.display())))
    }
}
