//! Audit Ledger
//!
//! Tamper-evident, append-only record of the actions taken on a case, with
//! a SHA-256 hash chain and crash-safe writes.

pub mod ledger;
pub mod record;
pub mod storage;
pub mod verify;

pub use ledger::{AppendReceipt, Ledger, TailState};
pub use record::{LedgerRecord, Payload, SENTINEL_HASH};
pub use verify::{FailureReason, VerificationReport, VerifyFailure};
