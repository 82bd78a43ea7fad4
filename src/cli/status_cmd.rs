//! `magpie status` — report ledger counts without performing any work.

use crate::config;
use crate::ledger::{Ledger, LEDGER_FILE};
use anyhow::Result;
use std::path::PathBuf;

pub async fn run(output: Option<PathBuf>) -> Result<()> {
    let output_dir = output.unwrap_or_else(config::default_output_dir);
    if !output_dir.exists() {
        println!("Output directory does not exist: {}", output_dir.display());
        return Ok(());
    }

    println!("Output: {}", output_dir.display());
    println!();

    let mut totals = (0u32, 0u32, 0u32);
    let mut found_any = false;
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(&output_dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join(LEDGER_FILE).exists())
        .collect();
    dirs.sort();

    for dir in dirs {
        let ledger = match Ledger::load(&dir, true) {
            Ok(l) => l,
            Err(e) => {
                println!("  {}: unreadable ledger ({e})", dir.display());
                continue;
            }
        };
        let counts = ledger.counts();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!(
            "  {name}: {} done, {} protected, {} failed ({} total)",
            counts.done, counts.skipped_protected, counts.failed, counts.total
        );
        totals.0 += counts.done;
        totals.1 += counts.skipped_protected;
        totals.2 += counts.failed;
        found_any = true;
    }

    if !found_any {
        println!("  no ledgers found");
    } else {
        println!();
        println!(
            "  total: {} done, {} protected, {} failed",
            totals.0, totals.1, totals.2
        );
    }
    Ok(())
}
