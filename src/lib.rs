//! Counsel AI audit ledger.
//!
//! Collaborators (intake, reasoning, document generation) record what they
//! did with [`Ledger::append`]; operators check the chain with
//! [`Ledger::verify`].

pub mod audit;
pub mod config;
pub mod error;
pub mod telemetry;

pub use audit::{Ledger, LedgerRecord, VerificationReport, SENTINEL_HASH};
pub use config::LedgerConfig;
pub use error::LedgerError;
