//! Query windows: the universe of a single pipeline run.

use crate::error::{Error, Result};
use crate::time::jd_to_iso;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Number of hex digits kept by [`short_digest`].
const DIGEST_HEX_LEN: usize = 12;

/// First 12 hex digits of a SHA-256 over `parts`, each NUL-terminated.
///
/// Used to fold variable-length run parameters into storage keys.
pub fn short_digest<I, B>(parts: I) -> String
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
        hasher.update([0u8]);
    }
    let mut hex: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    hex.truncate(DIGEST_HEX_LEN);
    hex
}

/// `[t_start, t_end)` in Julian days plus the program-id filter.
///
/// Immutable once constructed. An optional object-id set narrows the run to
/// specific objects; see [`QueryWindow::with_object_ids`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryWindow {
    t_start: f64,
    t_end: f64,
    program_ids: BTreeSet<i64>,
    object_ids: Option<BTreeSet<String>>,
}

impl QueryWindow {
    /// Build a window, validating `t_start < t_end` and a non-empty program set.
    pub fn new(t_start: f64, t_end: f64, program_ids: impl IntoIterator<Item = i64>) -> Result<Self> {
        if !t_start.is_finite() || !t_end.is_finite() {
            return Err(Error::invalid_window(format!(
                "bounds must be finite (got {t_start}, {t_end})"
            )));
        }
        if t_start >= t_end {
            return Err(Error::invalid_window(format!(
                "t_start ({t_start}) must be before t_end ({t_end})"
            )));
        }
        let program_ids: BTreeSet<i64> = program_ids.into_iter().collect();
        if program_ids.is_empty() {
            return Err(Error::invalid_window("at least one program id is required"));
        }
        Ok(Self {
            t_start,
            t_end,
            program_ids,
            object_ids: None,
        })
    }

    /// Scope the window to a set of object ids.
    pub fn with_object_ids<I, S>(mut self, object_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_ids = Some(object_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn t_start(&self) -> f64 {
        self.t_start
    }

    pub fn t_end(&self) -> f64 {
        self.t_end
    }

    pub fn program_ids(&self) -> &BTreeSet<i64> {
        &self.program_ids
    }

    pub fn object_ids(&self) -> Option<&BTreeSet<String>> {
        self.object_ids.as_ref()
    }

    /// Whether the run is restricted to an explicit object-id list.
    pub fn is_object_scoped(&self) -> bool {
        self.object_ids.is_some()
    }

    /// Start bound formatted for the secondary service.
    pub fn start_iso(&self) -> Result<String> {
        jd_to_iso(self.t_start)
    }

    /// End bound formatted for the secondary service.
    pub fn end_iso(&self) -> Result<String> {
        jd_to_iso(self.t_end)
    }

    /// Canonical storage key for this run: `{t_start}_{t_end}_{programids}`.
    ///
    /// Object-scoped windows append a short SHA-256 digest of the sorted ids so
    /// two scoped runs over the same time range never share an output.
    pub fn storage_key(&self) -> String {
        let programs = self
            .program_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join("_");
        let mut key = format!("{:?}_{:?}_{}", self.t_start, self.t_end, programs);
        if let Some(ids) = &self.object_ids {
            key.push('_');
            key.push_str(&short_digest(ids));
        }
        key
    }
}
