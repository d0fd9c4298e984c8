use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub jobs: JobConfig,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Fuzzy-name acceptance rules.
///
/// `accept_threshold`: the best fuzzy score must be strictly above this.
/// `min_margin`: the best score must beat the runner-up by at least this
/// much, otherwise near-ties are reported as ambiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchConfig {
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f64,
    #[serde(default = "default_min_margin")]
    pub min_margin: f64,
}

pub const DEFAULT_ACCEPT_THRESHOLD: f64 = 0.85;
pub const DEFAULT_MIN_MARGIN: f64 = 0.05;

fn default_accept_threshold() -> f64 {
    DEFAULT_ACCEPT_THRESHOLD
}

fn default_min_margin() -> f64 {
    DEFAULT_MIN_MARGIN
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            accept_threshold: DEFAULT_ACCEPT_THRESHOLD,
            min_margin: DEFAULT_MIN_MARGIN,
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Label anchors searched for in PDF text. Anchors are tried in list order
/// and the first one that yields a value wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    #[serde(default = "default_name_anchors")]
    pub name_anchors: Vec<String>,
    #[serde(default = "default_member_id_anchors")]
    pub member_id_anchors: Vec<String>,
    #[serde(default = "default_dob_anchors")]
    pub dob_anchors: Vec<String>,
    /// Derive the name from the PDF filename when the text has no name label.
    #[serde(default = "default_true")]
    pub filename_fallback: bool,
}

fn default_name_anchors() -> Vec<String> {
    vec!["Patient Name".into(), "Patient".into(), "Member Name".into()]
}

fn default_member_id_anchors() -> Vec<String> {
    vec!["Member ID".into(), "Member Number".into(), "Subscriber ID".into()]
}

fn default_dob_anchors() -> Vec<String> {
    vec!["DOB".into(), "Date of Birth".into(), "Birth Date".into()]
}

fn default_true() -> bool {
    true
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            name_anchors: default_name_anchors(),
            member_id_anchors: default_member_id_anchors(),
            dob_anchors: default_dob_anchors(),
            filename_fallback: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Worker threads for extraction/normalization. Defaults to available cores.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Wall-clock limit per job. No limit when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl JobConfig {
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl EngineConfig {
    pub fn from_toml(input: &str) -> Result<Self, EngineError> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let m = &self.matching;
        if !(m.accept_threshold > 0.0 && m.accept_threshold <= 1.0) {
            return Err(EngineError::config(format!(
                "matching.accept_threshold must be in (0, 1], got {}",
                m.accept_threshold
            )));
        }
        if !(m.min_margin >= 0.0 && m.min_margin < 1.0) {
            return Err(EngineError::config(format!(
                "matching.min_margin must be in [0, 1), got {}",
                m.min_margin
            )));
        }

        let x = &self.extraction;
        for (name, anchors) in [
            ("name_anchors", &x.name_anchors),
            ("member_id_anchors", &x.member_id_anchors),
            ("dob_anchors", &x.dob_anchors),
        ] {
            if anchors.is_empty() {
                return Err(EngineError::config(format!(
                    "extraction.{name} must list at least one label"
                )));
            }
            if anchors.iter().any(|a| a.trim().is_empty()) {
                return Err(EngineError::config(format!(
                    "extraction.{name} contains a blank label"
                )));
            }
        }

        if self.jobs.workers == Some(0) {
            return Err(EngineError::config("jobs.workers must be at least 1"));
        }
        if self.jobs.timeout_secs == Some(0) {
            return Err(EngineError::config("jobs.timeout_secs must be at least 1"));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
