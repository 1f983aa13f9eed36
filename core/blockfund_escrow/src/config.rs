//! Engine limits.

use serde::{Deserialize, Serialize};

use crate::error::{EscrowError, Result};

pub const DEFAULT_MAX_NAME_LEN: usize = 64;
pub const DEFAULT_MAX_SUMMARY_LEN: usize = 1024;
pub const DEFAULT_MAX_NOTE_LEN: usize = 256;
pub const DEFAULT_MAX_PHASES_PER_PROJECT: usize = 32;

/// Bounds applied to caller-supplied text and phase counts.
///
/// Lengths are measured in characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_name_len: usize,
    pub max_summary_len: usize,
    pub max_note_len: usize,
    pub max_phases_per_project: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_name_len: DEFAULT_MAX_NAME_LEN,
            max_summary_len: DEFAULT_MAX_SUMMARY_LEN,
            max_note_len: DEFAULT_MAX_NOTE_LEN,
            max_phases_per_project: DEFAULT_MAX_PHASES_PER_PROJECT,
        }
    }
}

impl EngineConfig {
    /// Reject limits that would make every launch or proposal fail.
    pub fn validate(&self) -> Result<()> {
        if self.max_name_len == 0 {
            return Err(EscrowError::InvalidInput(
                "max_name_len must be positive".to_string(),
            ));
        }
        if self.max_note_len == 0 {
            return Err(EscrowError::InvalidInput(
                "max_note_len must be positive".to_string(),
            ));
        }
        if self.max_phases_per_project == 0 {
            return Err(EscrowError::InvalidInput(
                "max_phases_per_project must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Check a text field against an upper bound, optionally requiring content.
pub(crate) fn check_text(field: &str, value: &str, max: usize, required: bool) -> Result<()> {
    if required && value.trim().is_empty() {
        return Err(EscrowError::InvalidInput(format!("{field} must not be empty")));
    }
    let len = value.chars().count();
    if len > max {
        return Err(EscrowError::InvalidInput(format!(
            "{field} is {len} characters, limit is {max}"
        )));
    }
    Ok(())
}
