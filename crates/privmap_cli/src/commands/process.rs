//! Process (load) command.

use super::{load_config, spinner};
use crate::StoreArgs;
use anyhow::{Context, Result};
use console::style;
use privmap_core::store::{BoltGraph, GraphClient, MemoryGraph};
use privmap_core::{Config, ProcessReport, StagingDir};
use std::fs;
use std::path::{Path, PathBuf};

/// Flags that change what `process` does.
pub struct Mode {
    pub drop: bool,
    pub offline: bool,
    pub dot: Option<PathBuf>,
    pub batch_size: Option<usize>,
}

/// Load a staging directory into the configured graph store.
pub fn run(config_path: &Path, dir: &Path, mode: Mode, store: StoreArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_store_args(&mut config, store);
    if let Some(batch_size) = mode.batch_size {
        config.load.batch_size = batch_size.max(1);
    }
    config.validate().context("invalid configuration")?;

    let ident = config.identifier()?;
    let staging = StagingDir::open(dir)?;
    let options = config.process_options(mode.drop);

    if mode.offline {
        let graph = MemoryGraph::new();
        let report = load(&graph, &staging, &ident, &options)?;
        print_report(&report);
        println!(
            "  Graph:           {} nodes, {} relationships",
            graph.node_count(),
            graph.edge_count()
        );
        if let Some(path) = &mode.dot {
            fs::write(path, graph.to_dot())
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{} Wrote {}", style("✓").green(), style(path.display()).cyan());
        }
        return finish(&report);
    }

    let client = BoltGraph::connect(&config.store)
        .map_err(privmap_core::PrivmapError::from)
        .with_context(|| format!("connecting to {}", config.store.uri()))?;
    let report = load(&client, &staging, &ident, &options)?;
    print_report(&report);
    finish(&report)
}

fn apply_store_args(config: &mut Config, args: StoreArgs) {
    if let Some(scheme) = args.scheme {
        config.store.scheme = scheme;
    }
    if let Some(host) = args.host {
        config.store.host = host;
    }
    if let Some(port) = args.port {
        config.store.port = port;
    }
    if let Some(user) = args.user {
        config.store.user = user;
    }
    if let Some(password) = args.password {
        config.store.password = password;
    }
    if let Some(database) = args.database {
        config.store.database = database;
    }
}

fn load(
    client: &dyn GraphClient,
    staging: &StagingDir,
    ident: &privmap_core::Identifier,
    options: &privmap_core::ProcessOptions,
) -> Result<ProcessReport> {
    let pb = spinner(&format!("Loading into {}...", client.describe()));
    let report = privmap_core::process(client, staging, ident, options)
        .with_context(|| format!("processing {}", staging.path().display()));
    pb.finish_and_clear();
    report
}

fn print_report(report: &ProcessReport) {
    println!("{}", style("Load Report:").bold());
    println!(
        "  Schema rules:    {} created, {} existing",
        report.schema.created, report.schema.existing
    );
    for (kind, load) in &report.load.kinds {
        println!(
            "  {:<16} {} created, {} existing, {} malformed",
            format!("{}:", kind),
            style(load.created).cyan(),
            load.conflicts,
            load.malformed
        );
    }
    for (kind, error) in &report.load.failed {
        println!("  {} {} failed: {}", style("×").red(), kind, error);
    }
    for step in &report.relate.steps {
        match &step.error {
            None => println!(
                "  {:<16} {} statements",
                format!("{}:", step.step.name()),
                step.statements
            ),
            Some(error) => println!(
                "  {} {} failed: {}",
                style("×").red(),
                step.step.name(),
                error
            ),
        }
    }
}

fn finish(report: &ProcessReport) -> Result<()> {
    if report.has_failures() {
        anyhow::bail!("processing finished with failures; see the report above");
    }
    println!("{} Done", style("✓").green());
    Ok(())
}
