//! privmap CLI - collect host inventories and load them into a privilege graph.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "privmap")]
#[command(about = "Map privilege-escalation paths on a host", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = privmap_core::CONFIG_FILE)]
    config: PathBuf,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    debug: bool,
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Walk the host and write staging stores
    Collect {
        /// Output staging directory
        #[arg(short, long, default_value = "staging")]
        out: PathBuf,
        /// Directory to walk (repeatable; overrides [collect] roots)
        #[arg(long = "root")]
        roots: Vec<PathBuf>,
        /// JSON inventory of tasks, services, groups, processes
        #[arg(long)]
        inventory: Option<PathBuf>,
        /// Collector pool size
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Load a staging directory: schema, nodes, relationships
    #[command(alias = "load")]
    Process {
        /// Staging directory
        #[arg(default_value = "staging")]
        dir: PathBuf,
        /// Delete everything in the graph first
        #[arg(long)]
        drop: bool,
        /// Load into an in-memory graph instead of a server
        #[arg(long)]
        offline: bool,
        /// With --offline, write the graph as Graphviz DOT
        #[arg(long, requires = "offline")]
        dot: Option<PathBuf>,
        /// Rows per node-creation transaction
        #[arg(long)]
        batch_size: Option<usize>,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Count staged records and report malformed or truncated lines
    Verify {
        /// Staging directory
        #[arg(default_value = "staging")]
        dir: PathBuf,
    },
    /// List privilege paths between a principal and a file
    Paths {
        /// Staging directory
        #[arg(default_value = "staging")]
        dir: PathBuf,
        /// Starting principal name
        #[arg(long)]
        from: String,
        /// Target file or directory path
        #[arg(long)]
        to: String,
        /// Maximum edges per path
        #[arg(long, default_value = "6")]
        max_depth: u32,
        /// Maximum paths to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

/// Connection overrides for `[store]`.
#[derive(Args, Default)]
pub struct StoreArgs {
    /// URI scheme (bolt, bolt+s, neo4j, neo4j+s)
    #[arg(long)]
    scheme: Option<String>,
    /// Graph store host
    #[arg(long, env = "PRIVMAP_HOST")]
    host: Option<String>,
    /// Graph store port
    #[arg(long, env = "PRIVMAP_PORT")]
    port: Option<u16>,
    /// Login user
    #[arg(long, env = "PRIVMAP_USER")]
    user: Option<String>,
    /// Login password
    #[arg(long, env = "PRIVMAP_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Target database
    #[arg(long, env = "PRIVMAP_DATABASE")]
    database: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respects RUST_LOG (e.g. RUST_LOG=privmap_core=debug)
    let default_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();
    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let result = match cli.command {
        Commands::Init => commands::init::run(&cli.config),
        Commands::Collect {
            out,
            roots,
            inventory,
            workers,
        } => commands::collect::run(&cli.config, &out, roots, inventory, workers),
        Commands::Process {
            dir,
            drop,
            offline,
            dot,
            batch_size,
            store,
        } => commands::process::run(
            &cli.config,
            &dir,
            commands::process::Mode {
                drop,
                offline,
                dot,
                batch_size,
            },
            store,
        ),
        Commands::Verify { dir } => commands::verify::run(&dir),
        Commands::Paths {
            dir,
            from,
            to,
            max_depth,
            limit,
        } => commands::paths::run(&cli.config, &dir, &from, &to, max_depth, limit),
    };

    if let Err(e) = &result {
        if let Some(hint) = e
            .downcast_ref::<privmap_core::PrivmapError>()
            .and_then(|e| e.recovery_suggestion())
        {
            eprintln!("{} {}", console::style("hint:").cyan(), hint);
        }
    }
    result
}
