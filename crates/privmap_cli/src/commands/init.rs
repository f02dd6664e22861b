//! Write a default configuration file.

use anyhow::{bail, Context, Result};
use console::style;
use privmap_core::Config;
use std::path::Path;

/// Write `privmap.toml` with every default spelled out.
pub fn run(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    Config::default()
        .save(path)
        .with_context(|| format!("writing configuration to {}", path.display()))?;

    println!("{} Wrote {}", style("✓").green(), path.display());
    println!();
    println!("Sections:");
    println!("  [collect]  - roots, workers, extensions, inventory file");
    println!("  [load]     - batch size, edge chunk size, in-flight transactions");
    println!("  [store]    - graph store connection");
    println!("  [hash]     - content id key, shared by every host of one graph");
    Ok(())
}
