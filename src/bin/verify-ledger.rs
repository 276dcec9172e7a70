use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, Command};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::error;

use counsel_ledger::telemetry::{self, Verbosity};
use counsel_ledger::{Ledger, LedgerConfig, LedgerRecord};

fn main() {
    let matches = Command::new("verify-ledger")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Verify Counsel AI audit ledger integrity")
        .arg(
            Arg::new("ledger")
                .short('l')
                .long("ledger")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Path to the ledger file (defaults to configuration)"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress output except errors"),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");
    telemetry::init(Verbosity::from_flags(verbose, quiet));

    let ledger_path = matches.get_one::<PathBuf>("ledger").cloned();
    let config_path = matches.get_one::<PathBuf>("config").cloned();

    if let Err(e) = verify_ledger(ledger_path, config_path, verbose, quiet) {
        error!("Ledger verification failed: {:#}", e);
        if !quiet {
            eprintln!("✗ {:#}", e);
        }
        std::process::exit(1);
    }

    if !quiet {
        println!("✓ Ledger verification completed successfully");
    }
}

fn verify_ledger(
    ledger_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    verbose: bool,
    quiet: bool,
) -> Result<()> {
    let config = LedgerConfig::load(config_path.as_deref())
        .context("Failed to load configuration")?
        .with_ledger_path(ledger_path);
    let ledger = Ledger::from_config(&config);

    if !ledger.path().exists() && verbose {
        println!("No ledger at {} - nothing to verify", ledger.path().display());
    }

    let report = ledger.verify_detailed();
    if !report.is_valid() {
        return Err(anyhow!(report.summary()));
    }

    if !quiet {
        println!("{}", report.summary());
    }

    if verbose && report.records_checked > 0 {
        let records = ledger.records()?;
        print_summary(&records);
    }

    Ok(())
}

fn print_summary(records: &[LedgerRecord]) {
    println!("\nLedger Summary:");
    println!("  Total records: {}", records.len());
    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        println!("  First record: {}", first.timestamp);
        println!("  Last record: {}", last.timestamp);
        println!("  Head hash: {}", last.chain_hash);
    }

    let mut actions: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *actions.entry(record.action.as_str()).or_insert(0) += 1;
    }

    println!("\nAction distribution:");
    for (action, count) in actions {
        println!("  {}: {}", action, count);
    }
}
