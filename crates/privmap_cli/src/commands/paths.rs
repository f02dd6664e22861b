//! Privilege path query command.

use super::{load_config, spinner};
use anyhow::{Context, Result};
use console::style;
use privmap_core::store::MemoryGraph;
use privmap_core::{ContentId, StagingDir, TraversalConfig};
use std::path::Path;

/// Load a staging directory offline and print paths from a principal to a file.
pub fn run(
    config_path: &Path,
    dir: &Path,
    from: &str,
    to: &str,
    max_depth: u32,
    limit: usize,
) -> Result<()> {
    let config = load_config(config_path)?;
    let ident = config.identifier()?;
    let staging = StagingDir::open(dir)?;

    let graph = MemoryGraph::new();
    let pb = spinner("Building graph...");
    let report = privmap_core::process(&graph, &staging, &ident, &config.process_options(false))
        .with_context(|| format!("processing {}", dir.display()))?;
    pb.finish_and_clear();
    if report.has_failures() {
        eprintln!("{} graph is incomplete; some loads failed", style("⚠").yellow());
    }

    let source = ident.principal_id(from);
    let target = ident.path_id(to);
    let paths = graph.paths_between(
        source,
        target,
        &TraversalConfig {
            max_depth,
            follow: Vec::new(),
            max_results: limit,
        },
    );

    if paths.is_empty() {
        println!("No paths from {} to {}", style(from).cyan(), style(to).cyan());
        return Ok(());
    }

    let labels = graph.display_labels();
    let name = |id: ContentId| {
        labels
            .get(&id)
            .cloned()
            .unwrap_or_else(|| ident_short(&id.as_hex()))
    };
    println!("{} paths", style(paths.len()).bold());
    for (i, path) in paths.iter().enumerate() {
        println!();
        println!("{} (length {})", style(format!("#{}", i + 1)).bold(), path.len());
        if let Some((first, _, _)) = path.first() {
            println!("  {}", name(*first));
        }
        for (_, edge, next) in path {
            println!("    {} {}", style(format!("-[{}]->", edge)).yellow(), name(*next));
        }
    }
    Ok(())
}

fn ident_short(hex: &str) -> String {
    hex.chars().take(12).collect()
}
