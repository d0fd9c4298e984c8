//! `gapsort presets ...` and `gapsort config ...`

use clap::Subcommand;

use gapsort_config::settings::{render, settings_path};
use gapsort_engine::{CanonicalField, MappingStore};

use crate::{CliError, Context};

#[derive(Subcommand)]
pub enum PresetCommands {
    /// List preset ids and names
    List {
        /// Output the full presets as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one preset's field-to-column mapping
    Show {
        /// Preset id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate settings and presets without running anything
    Check,

    /// Print the effective settings as TOML
    Show,
}

pub fn cmd_presets(ctx: &Context, cmd: PresetCommands) -> Result<(), CliError> {
    let store = ctx.presets()?;
    match cmd {
        PresetCommands::List { json } => {
            if json {
                let presets: Vec<_> = store.iter().collect();
                let text = serde_json::to_string_pretty(&presets)
                    .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
                println!("{text}");
                return Ok(());
            }
            if store.is_empty() {
                eprintln!("no presets found");
                return Ok(());
            }
            for mapping in store.iter() {
                let mapped = CanonicalField::ALL
                    .iter()
                    .filter(|f| mapping.column(**f).is_some())
                    .count();
                println!("{}\t{}\t{} fields", mapping.id, mapping.name, mapped);
            }
            Ok(())
        }
        PresetCommands::Show { id } => {
            let mapping = store.get(&id).ok_or_else(|| {
                CliError::config(format!("no preset with id '{id}'"))
                    .with_hint("list known presets with `gapsort presets list`")
            })?;
            println!("{} ({})", mapping.id, mapping.name);
            for field in CanonicalField::ALL {
                if let Some(column) = mapping.column(field) {
                    println!("  {:<20} <- {}", field.label(), column);
                }
            }
            if let Some(insurer) = mapping.literal_insurance() {
                println!("  (every row gets Insurance = {insurer})");
            }
            Ok(())
        }
    }
}

pub fn cmd_config(ctx: &Context, cmd: ConfigCommands) -> Result<(), CliError> {
    let loaded = ctx.settings()?;
    match cmd {
        ConfigCommands::Check => {
            let store = ctx.presets()?;
            let empty: Vec<String> = store
                .iter()
                .filter(|m| m.is_empty())
                .map(|m| m.id.clone())
                .collect();
            match &loaded.source {
                Some(path) => eprintln!("valid: settings from {}", path.display()),
                None => eprintln!("valid: default settings ({} not found)", settings_path().display()),
            }
            eprintln!("presets: {} loaded", store.len());
            if !empty.is_empty() {
                return Err(CliError::config(format!(
                    "preset(s) map no columns: {}",
                    empty.join(", ")
                )));
            }
            Ok(())
        }
        ConfigCommands::Show => {
            let text = render(&loaded.config).map_err(CliError::engine)?;
            print!("{text}");
            Ok(())
        }
    }
}
