//! Ledger Verification
//!
//! Walks the ledger once from the sentinel, recomputing every link of the
//! hash chain. Verification never raises: a broken ledger is a report with
//! the offending line, not an error.

use serde::Deserialize;
use std::fmt;
use tracing::{error, info};

use crate::audit::record::{chain_hash, data_hash, Payload, SENTINEL_HASH};
use crate::audit::storage::ledger_lines;

/// Fields read from each line while verifying. Only the two hashes are
/// required; the others are checked when present.
#[derive(Debug, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    data_hash: Option<String>,
    #[serde(default)]
    chain_hash: Option<String>,
    #[serde(default)]
    prev_hash: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    payload: Option<Payload>,
}

/// Why a line failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The ledger file exists but could not be read.
    Unreadable(String),
    /// The line is not a JSON object of the expected shape.
    Unparsable(String),
    /// A required hash field is absent.
    MissingField(&'static str),
    /// `data_hash` does not match the line's action and payload.
    DataHashMismatch { expected: String, found: String },
    /// `prev_hash` does not point at the previous record.
    PrevHashMismatch { expected: String, found: String },
    /// `chain_hash` does not match `prev + data_hash`.
    ChainHashMismatch { expected: String, found: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable(msg) => write!(f, "ledger unreadable: {}", msg),
            Self::Unparsable(msg) => write!(f, "invalid record: {}", msg),
            Self::MissingField(field) => write!(f, "record has no {}", field),
            Self::DataHashMismatch { expected, found } => {
                write!(f, "data hash mismatch: expected {}, found {}", expected, found)
            }
            Self::PrevHashMismatch { expected, found } => {
                write!(f, "previous hash mismatch: expected {}, found {}", expected, found)
            }
            Self::ChainHashMismatch { expected, found } => {
                write!(f, "chain hash mismatch: expected {}, found {}", expected, found)
            }
        }
    }
}

/// First failure found, with its 1-based line number (0 when the file
/// itself could not be read).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyFailure {
    pub line: usize,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub records_checked: usize,
    pub head_hash: String,
    pub failure: Option<VerifyFailure>,
}

impl VerificationReport {
    pub fn unreadable(msg: String) -> Self {
        error!("Error verifying ledger integrity: {}", msg);
        Self {
            records_checked: 0,
            head_hash: SENTINEL_HASH.to_string(),
            failure: Some(VerifyFailure {
                line: 0,
                reason: FailureReason::Unreadable(msg),
            }),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }

    /// Line number of the first failing record, if any.
    pub fn failed_line(&self) -> Option<usize> {
        self.failure.as_ref().map(|f| f.line)
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match &self.failure {
            None => format!(
                "Ledger is valid ({} records, head {})",
                self.records_checked, self.head_hash
            ),
            Some(failure) if failure.line == 0 => {
                format!("Ledger is invalid: {}", failure.reason)
            }
            Some(failure) => format!(
                "Ledger is invalid at line {} after {} valid records: {}",
                failure.line, self.records_checked, failure.reason
            ),
        }
    }
}

/// Verify ledger content already read into memory.
pub fn verify_content(content: &[u8]) -> VerificationReport {
    let mut expected_prev = SENTINEL_HASH.to_string();
    let mut records_checked = 0;

    for (line_no, line) in ledger_lines(content) {
        match check_line(line, &expected_prev) {
            Ok(chain) => {
                expected_prev = chain;
                records_checked += 1;
            }
            Err(reason) => {
                error!("Ledger verification failed at line {}: {}", line_no, reason);
                return VerificationReport {
                    records_checked,
                    head_hash: expected_prev,
                    failure: Some(VerifyFailure {
                        line: line_no,
                        reason,
                    }),
                };
            }
        }
    }

    if records_checked == 0 {
        info!("Empty ledger - integrity verified");
    } else {
        info!("Ledger integrity verified: {} records", records_checked);
    }

    VerificationReport {
        records_checked,
        head_hash: expected_prev,
        failure: None,
    }
}

/// Check one record against the running chain and return its chain hash.
fn check_line(line: &[u8], expected_prev: &str) -> Result<String, FailureReason> {
    let record: StoredRecord =
        serde_json::from_slice(line).map_err(|e| FailureReason::Unparsable(e.to_string()))?;
    let stored_data_hash = record.data_hash.ok_or(FailureReason::MissingField("data_hash"))?;
    let stored_chain_hash = record
        .chain_hash
        .ok_or(FailureReason::MissingField("chain_hash"))?;

    if let (Some(action), Some(payload)) = (&record.action, &record.payload) {
        let expected = data_hash(action, payload)
            .map_err(|e| FailureReason::Unparsable(e.to_string()))?;
        if expected != stored_data_hash {
            return Err(FailureReason::DataHashMismatch {
                expected,
                found: stored_data_hash,
            });
        }
    }

    if let Some(prev) = &record.prev_hash {
        if prev != expected_prev {
            return Err(FailureReason::PrevHashMismatch {
                expected: expected_prev.to_string(),
                found: prev.clone(),
            });
        }
    }

    let expected = chain_hash(expected_prev, &stored_data_hash);
    if expected != stored_chain_hash {
        return Err(FailureReason::ChainHashMismatch {
            expected,
            found: stored_chain_hash,
        });
    }

    Ok(stored_chain_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::record::{to_payload, LedgerRecord};
    use serde_json::json;

    fn build_chain(count: usize) -> Vec<LedgerRecord> {
        let mut records: Vec<LedgerRecord> = Vec::new();
        for i in 0..count {
            let prev = records
                .last()
                .map(|r| r.chain_hash.clone())
                .unwrap_or_else(|| SENTINEL_HASH.to_string());
            let payload = to_payload(&json!({"index": i})).unwrap();
            records.push(LedgerRecord::new(format!("action{}", i), payload, prev).unwrap());
        }
        records
    }

    fn to_content(records: &[LedgerRecord]) -> Vec<u8> {
        records
            .iter()
            .map(|r| serde_json::to_string(r).unwrap() + "\n")
            .collect::<String>()
            .into_bytes()
    }

    #[test]
    fn test_empty_content_is_valid() {
        assert!(verify_content(b"").is_valid());
        assert!(verify_content(b"\n   \n\n").is_valid());
        assert_eq!(verify_content(b"").head_hash, SENTINEL_HASH);
    }

    #[test]
    fn test_valid_chain() {
        let records = build_chain(5);
        let report = verify_content(&to_content(&records));

        assert!(report.is_valid());
        assert_eq!(report.records_checked, 5);
        assert_eq!(report.head_hash, records[4].chain_hash);
        assert!(report.summary().contains("valid (5 records"));
    }

    #[test]
    fn test_blank_lines_between_records() {
        let records = build_chain(2);
        let content = format!(
            "\n{}\n\n{}\n",
            serde_json::to_string(&records[0]).unwrap(),
            serde_json::to_string(&records[1]).unwrap()
        );
        assert!(verify_content(content.as_bytes()).is_valid());
    }

    #[test]
    fn test_unparsable_line() {
        let records = build_chain(2);
        let mut content = to_content(&records[..1]);
        content.extend_from_slice(b"not json\n");
        let report = verify_content(&content);

        assert_eq!(report.failed_line(), Some(2));
        assert_eq!(report.records_checked, 1);
        assert!(matches!(
            report.failure.unwrap().reason,
            FailureReason::Unparsable(_)
        ));
    }

    #[test]
    fn test_missing_hash_fields() {
        let report = verify_content(b"{\"data_hash\":\"abc\"}\n");
        assert_eq!(report.failed_line(), Some(1));
        assert_eq!(
            report.failure.unwrap().reason,
            FailureReason::MissingField("chain_hash")
        );

        let report = verify_content(b"\n{\"chain_hash\":\"abc\"}\n");
        assert_eq!(report.failed_line(), Some(2));
        assert_eq!(
            report.failure.unwrap().reason,
            FailureReason::MissingField("data_hash")
        );
    }

    #[test]
    fn test_wrong_shape_is_unparsable() {
        for line in [&b"[1, 2]\n"[..], &b"{\"data_hash\": 7, \"chain_hash\": \"x\"}\n"[..]] {
            let report = verify_content(line);
            assert!(matches!(
                report.failure.unwrap().reason,
                FailureReason::Unparsable(_)
            ));
        }
    }

    #[test]
    fn test_invalid_utf8_line() {
        let mut content = to_content(&build_chain(2));
        content.extend_from_slice(b"\xff\xfe garbage\n");
        let report = verify_content(&content);

        assert_eq!(report.failed_line(), Some(3));
        assert_eq!(report.records_checked, 2);
        assert!(matches!(
            report.failure.unwrap().reason,
            FailureReason::Unparsable(_)
        ));
    }

    #[test]
    fn test_minimal_records_verify() {
        // Only the two hashes are required.
        let data = "d".repeat(64);
        let chain = chain_hash(SENTINEL_HASH, &data);
        let content = format!("{{\"data_hash\":\"{}\",\"chain_hash\":\"{}\"}}\n", data, chain);
        assert!(verify_content(content.as_bytes()).is_valid());
    }

    #[test]
    fn test_tampered_payload() {
        let mut records = build_chain(3);
        records[1].payload.insert("index".to_string(), json!(99));
        let report = verify_content(&to_content(&records));

        assert_eq!(report.failed_line(), Some(2));
        assert!(matches!(
            report.failure.unwrap().reason,
            FailureReason::DataHashMismatch { .. }
        ));
    }

    #[test]
    fn test_tampered_chain_hash() {
        let mut records = build_chain(3);
        records[2].chain_hash = "f".repeat(64);
        let report = verify_content(&to_content(&records));

        assert_eq!(report.failed_line(), Some(3));
        assert!(matches!(
            report.failure.unwrap().reason,
            FailureReason::ChainHashMismatch { .. }
        ));
    }

    #[test]
    fn test_tampered_prev_hash() {
        let mut records = build_chain(2);
        records[1].prev_hash = SENTINEL_HASH.to_string();
        let report = verify_content(&to_content(&records));

        assert_eq!(report.failed_line(), Some(2));
        assert!(matches!(
            report.failure.unwrap().reason,
            FailureReason::PrevHashMismatch { .. }
        ));
    }

    #[test]
    fn test_removed_record_breaks_chain() {
        let records = build_chain(3);
        let content = to_content(&[records[0].clone(), records[2].clone()]);
        assert_eq!(verify_content(&content).failed_line(), Some(2));
    }

    #[test]
    fn test_unreadable_summary() {
        let report = VerificationReport::unreadable("permission denied".to_string());
        assert!(!report.is_valid());
        assert_eq!(report.failed_line(), Some(0));
        assert!(report.summary().contains("permission denied"));
    }
}
