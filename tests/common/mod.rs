#![allow(dead_code)]

use counsel_ledger::Ledger;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

/// A ledger inside a fresh temporary directory. Keep the `TempDir` alive for
/// the duration of the test.
pub fn temp_ledger() -> (TempDir, Ledger) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let ledger = Ledger::new(temp_dir.path().join("audit").join("ledger.jsonl"));
    (temp_dir, ledger)
}

/// Non-blank lines of the ledger file parsed as JSON.
pub fn read_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .expect("Failed to read ledger")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("Ledger line is not JSON"))
        .collect()
}

/// Rewrite line `line_no` (1-based) of the ledger with `f`.
pub fn rewrite_line(path: &Path, line_no: usize, f: impl FnOnce(&str) -> String) {
    let content = std::fs::read_to_string(path).expect("Failed to read ledger");
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    lines[line_no - 1] = f(&lines[line_no - 1]);
    std::fs::write(path, lines.join("\n") + "\n").expect("Failed to write ledger");
}

/// Rewrite one field of the JSON record on line `line_no`.
pub fn tamper_field(path: &Path, line_no: usize, field: &str, value: Value) {
    rewrite_line(path, line_no, |line| {
        let mut record: Value = serde_json::from_str(line).expect("Ledger line is not JSON");
        record[field] = value;
        serde_json::to_string(&record).expect("Failed to serialize record")
    });
}
