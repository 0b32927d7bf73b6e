//! ClassMap CLI - Inspect where classes are stored
//!
//! A command-line interface over the lightweight partition cache of a
//! metadata database.
//!
//! # Usage
//!
//! ```bash
//! # Classes stored in a table
//! classmap --db model.db classes ts_Element
//!
//! # Horizontal and vertical partitions of a class
//! classmap --db model.db describe 11 --json
//!
//! # Class-id predicates per partition
//! classmap --db model.db filter 11 --column ECClassId
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use classmap_config::{ClassMapConfig, ConfigOverrides, LogFormat};
use tracing_subscriber::EnvFilter;

mod commands;

/// ClassMap - Class-to-table partition inspection
#[derive(Parser, Debug)]
#[command(name = "classmap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true, env = "CLASSMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Metadata database to open
    #[arg(long, global = true, env = "CLASSMAP_DB")]
    db: Option<PathBuf>,

    /// Schema name holding the metadata tables
    #[arg(long, global = true, env = "CLASSMAP_TABLE_SPACE")]
    table_space: Option<String>,

    /// Database file to attach under the table space name
    #[arg(long, global = true)]
    attach: Option<PathBuf>,

    /// Open the database for writing instead of read-only
    #[arg(long, global = true)]
    read_write: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> ConfigOverrides {
        let log_level = if self.quiet {
            Some("error".to_string())
        } else if self.verbose {
            Some("debug".to_string())
        } else {
            None
        };

        ConfigOverrides {
            database_path: self.db.clone(),
            read_only: self.read_write.then_some(false),
            table_space: self.table_space.clone(),
            log_level,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the classes stored in a table
    Classes(commands::classes::ClassesArgs),

    /// Show the storage description of a class
    Describe(commands::describe::DescribeArgs),

    /// Print the class-id predicate of each partition of a class
    Filter(commands::filter::FilterArgs),

    /// List the constraint classes of a relationship class
    Constraints(commands::relationships::ConstraintsArgs),

    /// List the relationship classes a class takes part in
    Relationships(commands::relationships::RelationshipsArgs),
}

fn init_logging(config: &ClassMapConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Text => builder.with_ansi(true).try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!(e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(&cli.global)?;
    init_logging(&config)?;

    let cache = commands::open_cache(&config, &cli.global)?;

    match cli.command {
        Commands::Classes(args) => commands::classes::execute(args, &cache),
        Commands::Describe(args) => commands::describe::execute(args, &cache),
        Commands::Filter(args) => commands::filter::execute(args, &cache),
        Commands::Constraints(args) => commands::relationships::execute_constraints(args, &cache),
        Commands::Relationships(args) => {
            commands::relationships::execute_relationships(args, &cache)
        }
    }
}
