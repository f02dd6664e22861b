//! Staging verification command.

use anyhow::Result;
use console::style;
use privmap_core::StagingDir;
use std::path::Path;

/// Report record counts and damaged lines per store.
pub fn run(dir: &Path) -> Result<()> {
    let staging = StagingDir::open(dir)?;
    let report = staging.verify()?;

    println!("{}", style("Staging Report:").bold());
    match staging.manifest()? {
        Some(manifest) => println!(
            "  Run:             {} on {}",
            manifest.run_id,
            if manifest.host.is_empty() { "unknown host" } else { manifest.host.as_str() }
        ),
        None => println!(
            "  {} no manifest; collection did not finish",
            style("⚠").yellow()
        ),
    }

    for (store, summary) in &report.stores {
        if !summary.present {
            println!("  {:<16} {}", store.file_name(), style("absent").dim());
            continue;
        }
        println!(
            "  {:<16} {}",
            store.file_name(),
            style(summary.records).cyan()
        );
        for (line, reason) in &summary.malformed {
            println!("    {} line {}: {}", style("×").red(), line, reason);
        }
        if summary.truncated_bytes > 0 {
            println!(
                "    {} {} bytes of unterminated trailing record",
                style("⚠").yellow(),
                summary.truncated_bytes
            );
        }
    }

    println!();
    if report.has_issues() {
        println!(
            "{} {} records, with issues (damaged lines are skipped at load)",
            style("⚠").yellow(),
            report.total_records()
        );
    } else {
        println!("{} {} records", style("✓").green(), report.total_records());
    }
    Ok(())
}
