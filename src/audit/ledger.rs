//! Audit Ledger
//!
//! Append-only JSONL ledger with a SHA-256 hash chain. Every append rewrites
//! the file through a temporary sibling and an atomic rename, so the ledger
//! on disk is always either the old or the new version in full.
//!
//! Single writer: concurrent appends from several processes can race on the
//! tail and lose records.

use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::audit::record::{to_payload, LedgerRecord, SENTINEL_HASH};
use crate::audit::storage::{ensure_parent_dir, ledger_lines, read_ledger, replace_atomically};
use crate::audit::verify::{verify_content, VerificationReport};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};

/// What was found at the end of the ledger before an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailState {
    /// No file, or nothing but blank lines.
    Empty,
    /// The last record was read and its `chain_hash` used as `prev_hash`.
    Linked,
    /// The last line could not be used; the record starts a new chain
    /// segment from the sentinel.
    Recovered { reason: String },
}

/// Result of a successful append.
#[derive(Debug, Clone)]
pub struct AppendReceipt {
    pub record: LedgerRecord,
    pub tail: TailState,
}

impl AppendReceipt {
    pub fn chain_hash(&self) -> &str {
        &self.record.chain_hash
    }

    pub fn recovered_from_corrupt_tail(&self) -> bool {
        matches!(self.tail, TailState::Recovered { .. })
    }
}

/// Handle on a ledger file.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.ledger_path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record for `action` and return its chain hash.
    pub fn append<P: Serialize + ?Sized>(&self, action: &str, payload: &P) -> Result<String> {
        let receipt = self.append_record(action, payload)?;
        Ok(receipt.record.chain_hash)
    }

    /// Append a record for `action` and return the stored record together
    /// with the tail state it was linked against.
    pub fn append_record<P: Serialize + ?Sized>(
        &self,
        action: &str,
        payload: &P,
    ) -> Result<AppendReceipt> {
        if action.trim().is_empty() {
            return Err(LedgerError::InvalidInput("action must not be empty".to_string()));
        }
        let payload = to_payload(payload)?;

        info!("Appending audit record for action: {}", action);

        ensure_parent_dir(&self.path)?;
        let existing = read_ledger(&self.path)?;
        let (prev_hash, tail) = tail_hash(&existing);
        if let TailState::Recovered { reason } = &tail {
            warn!(
                "Ledger tail of {} is unusable ({}); starting a new chain segment",
                self.path.display(),
                reason
            );
        }

        let record = LedgerRecord::new(action.to_string(), payload, prev_hash)?;
        let line = serde_json::to_string(&record)?;

        replace_atomically(&self.path, |file| {
            file.write_all(&existing)?;
            if !existing.is_empty() && !existing.ends_with(b"\n") {
                file.write_all(b"\n")?;
            }
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")
        })?;

        info!("Appended audit record with hash: {}", record.chain_hash);
        debug!("Appended audit record: {}", record.summary());

        Ok(AppendReceipt { record, tail })
    }

    /// Check the whole hash chain. Never fails: problems, including I/O
    /// errors, yield `false`.
    pub fn verify(&self) -> bool {
        self.verify_detailed().is_valid()
    }

    /// Check the whole hash chain and report where it breaks, if anywhere.
    pub fn verify_detailed(&self) -> VerificationReport {
        info!("Verifying ledger: {}", self.path.display());
        match read_ledger(&self.path) {
            Ok(content) => verify_content(&content),
            Err(e) => VerificationReport::unreadable(e.to_string()),
        }
    }

    /// Load every record in file order.
    pub fn records(&self) -> Result<Vec<LedgerRecord>> {
        let content = read_ledger(&self.path)?;
        let mut records = Vec::new();

        for (line_no, line) in ledger_lines(&content) {
            let record: LedgerRecord = serde_json::from_slice(line)
                .map_err(|e| LedgerError::corrupt_line(line_no, e))?;
            records.push(record);
        }

        debug!("Loaded {} records from {}", records.len(), self.path.display());
        Ok(records)
    }

    /// Records whose action equals `action`.
    pub fn records_by_action(&self, action: &str) -> Result<Vec<LedgerRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|record| record.action == action)
            .collect())
    }

    /// The hash the next append will link to.
    pub fn head(&self) -> Result<String> {
        let content = read_ledger(&self.path)?;
        Ok(tail_hash(&content).0)
    }
}

/// Chain hash of the last non-blank line, falling back to the sentinel.
///
/// Only that line is decoded, so damage anywhere in the file (including
/// bytes that are not UTF-8) never blocks an append.
fn tail_hash(content: &[u8]) -> (String, TailState) {
    let last = match ledger_lines(content).last() {
        Some((_, line)) => line,
        None => return (SENTINEL_HASH.to_string(), TailState::Empty),
    };

    match serde_json::from_slice::<Value>(last) {
        Ok(value) => match value.get("chain_hash").and_then(Value::as_str) {
            Some(hash) => (hash.to_string(), TailState::Linked),
            None => (
                SENTINEL_HASH.to_string(),
                TailState::Recovered {
                    reason: "last record has no chain_hash".to_string(),
                },
            ),
        },
        Err(e) => (
            SENTINEL_HASH.to_string(),
            TailState::Recovered {
                reason: format!("last line is not a valid JSON record: {}", e),
            },
        ),
    }
}
