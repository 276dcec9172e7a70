//! Counsel Ledger CLI
//!
//! Records actions in the audit ledger and audits its hash chain.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

use counsel_ledger::audit::Payload;
use counsel_ledger::telemetry::{self, Verbosity};
use counsel_ledger::{Ledger, LedgerConfig};

#[derive(Parser)]
#[command(name = "counsel-ledger")]
#[command(about = "Tamper-evident audit ledger for Counsel AI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Ledger file (overrides config file and COUNSEL_LEDGER_PATH)
    #[arg(short, long, global = true)]
    ledger: Option<PathBuf>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a record and print its chain hash
    Append {
        /// Action identifier, e.g. opinion_generated
        #[arg(short, long)]
        action: String,

        /// Payload as a JSON object
        #[arg(short, long)]
        payload: Option<String>,

        /// Additional payload fields (key=value pairs, values parsed as JSON when possible)
        #[arg(short, long)]
        field: Vec<String>,
    },

    /// Verify the hash chain; exits non-zero when it is broken
    Verify {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print records as JSON lines
    Log {
        /// Only records with this action
        #[arg(short, long)]
        action: Option<String>,
    },

    /// Print the hash the next record will link to
    Head,
}

fn main() {
    let cli = Cli::parse();
    telemetry::init(Verbosity::from_flags(cli.verbose, cli.quiet));

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = LedgerConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_ledger_path(cli.ledger);
    let ledger = Ledger::from_config(&config);
    info!("Using ledger {}", ledger.path().display());

    match cli.command {
        Commands::Append {
            action,
            payload,
            field,
        } => {
            let payload = build_payload(payload.as_deref(), &field)?;
            let receipt = ledger
                .append_record(&action, &payload)
                .with_context(|| format!("Failed to append '{}' to the ledger", action))?;

            if receipt.recovered_from_corrupt_tail() {
                eprintln!("warning: ledger tail was unreadable; a new chain segment was started");
            }
            println!("{}", receipt.chain_hash());
        }

        Commands::Verify { json } => {
            let report = ledger.verify_detailed();
            if json {
                let failure = report.failure.as_ref().map(|f| {
                    json!({
                        "line": f.line,
                        "reason": f.reason.to_string(),
                    })
                });
                let output = json!({
                    "valid": report.is_valid(),
                    "records_checked": report.records_checked,
                    "head_hash": report.head_hash,
                    "failure": failure,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", report.summary());
            }

            if !report.is_valid() {
                return Ok(1);
            }
        }

        Commands::Log { action } => {
            let records = match action {
                Some(action) => ledger.records_by_action(&action)?,
                None => ledger.records()?,
            };
            for record in records {
                println!("{}", serde_json::to_string(&record)?);
            }
        }

        Commands::Head => {
            println!("{}", ledger.head()?);
        }
    }

    Ok(0)
}

/// Merge the `--payload` object with `--field key=value` pairs.
fn build_payload(payload: Option<&str>, fields: &[String]) -> Result<Payload> {
    let mut map = match payload {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("Invalid --payload JSON")? {
            Value::Object(map) => map,
            _ => return Err(anyhow!("--payload must be a JSON object")),
        },
        None => Payload::new(),
    };

    for field in fields {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid field '{}': expected key=value", field))?;
        if key.is_empty() {
            return Err(anyhow!("Invalid field '{}': empty key", field));
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        map.insert(key.to_string(), value);
    }

    Ok(map)
}
