//! CLI Exit Code Registry
//!
//! Single source of truth for `gapsort` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | Success                                             |
//! | 1    | General error (job failed for another reason)       |
//! | 2    | Usage error (bad arguments, unreadable input path)  |
//! | 3    | Configuration error (settings, presets, mapping)    |
//! | 4    | I/O error (sheet, PDF, or archive read/write)       |
//! | 5    | Sort job timed out                                  |
//! | 6    | Unmatched documents present and `--strict` was set  |

use gapsort_engine::EngineError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - worker failure or anything not covered below.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
/// clap also exits with 2 on parse failures.
pub const EXIT_USAGE: u8 = 2;

/// Settings file, preset file, or field mapping is invalid or missing.
pub const EXIT_CONFIG: u8 = 3;

/// Reading or writing a sheet, PDF, or archive failed.
pub const EXIT_IO: u8 = 4;

/// The sort job ran past `jobs.timeout_secs`.
pub const EXIT_TIMEOUT: u8 = 5;

/// `sort --strict`: the archive was written but some PDFs were unmatched.
pub const EXIT_UNMATCHED: u8 = 6;

/// Map an engine error to its exit code.
pub fn engine_exit_code(err: &EngineError) -> u8 {
    match err {
        EngineError::ConfigParse(_) | EngineError::Config(_) => EXIT_CONFIG,
        EngineError::Io(_) | EngineError::Extraction { .. } => EXIT_IO,
        EngineError::Timeout { .. } => EXIT_TIMEOUT,
        EngineError::Worker(_) => EXIT_ERROR,
    }
}
