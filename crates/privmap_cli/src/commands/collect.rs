//! Collection command.

use super::{load_config, spinner};
use anyhow::{Context, Result};
use console::style;
use privmap_core::collect::{AccessResolver, JsonInventory, NoImageParser};
use std::path::{Path, PathBuf};

/// Walk the configured roots and inventory into a staging directory.
pub fn run(
    config_path: &Path,
    out: &Path,
    roots: Vec<PathBuf>,
    inventory: Option<PathBuf>,
    workers: Option<usize>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let ident = config.identifier()?;

    let mut options = config.collect_options();
    if !roots.is_empty() {
        options.roots = roots;
    }
    if let Some(workers) = workers {
        options.workers = workers.max(1);
    }

    let inventory = match inventory.or_else(|| config.collect.inventory.clone()) {
        Some(path) => JsonInventory::load(&path)
            .with_context(|| format!("reading inventory {}", path.display()))?,
        None => JsonInventory::default(),
    };
    let access = access_resolver();

    let pb = spinner("Collecting...");
    let (manifest, report) = privmap_core::collect(
        out,
        &ident,
        &options,
        &inventory,
        access.as_ref(),
        &NoImageParser,
    )
    .with_context(|| format!("collecting into {}", out.display()))?;
    pb.finish_and_clear();

    println!(
        "{} Staged into {} (run {})",
        style("✓").green(),
        style(out.display()).cyan(),
        manifest.run_id
    );
    for (store, count) in &manifest.counts {
        println!("  {:<16} {}", store, style(count).cyan());
    }
    println!("  Examined:        {}", report.examined);
    if report.skipped > 0 {
        println!("  Skipped:         {}", style(report.skipped).yellow());
    }
    for universe in &report.failed_universes {
        println!("  {} {} could not be enumerated", style("⚠").yellow(), universe);
    }
    Ok(())
}

#[cfg(unix)]
fn access_resolver() -> Box<dyn AccessResolver> {
    Box::new(privmap_core::collect::PosixAccessResolver::new())
}

#[cfg(not(unix))]
fn access_resolver() -> Box<dyn AccessResolver> {
    Box::new(privmap_core::collect::NoAccessResolver)
}
