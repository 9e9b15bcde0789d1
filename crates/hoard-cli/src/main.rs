//! # Hoard CLI
//!
//! Command-line interface for the Hoard entity catalog.
//!
//! ## Commands
//!
//! - `hoard add <type> <name>` - Add an entity
//! - `hoard query [words...]` - Search and rank entities (blank lists recent)
//! - `hoard show <id>` - Show one entity in full
//! - `hoard update <id>` - Change some fields of an entity
//! - `hoard delete <id>` - Delete an entity
//! - `hoard status` - Show database status and capabilities
//! - `hoard reindex` - Rebuild the full-text index
//! - `hoard config` - Show (or write out) the effective configuration
//!
//! ## Example Usage
//!
//! ```bash
//! hoard add person "Ada Lovelace" -d "mathematician" --meta born=1815
//! hoard query lovelace
//! hoard update 1 -d "pioneer"
//! hoard delete 1 --yes
//! ```

mod app;
mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Hoard - A catalog of everything worth remembering
#[derive(Parser)]
#[command(name = "hoard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "HOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Field values shared by `add` and `update`.
#[derive(clap::Args, Debug, Default)]
pub struct FieldArgs {
    /// Explicit slug (derived from the name when omitted)
    #[arg(long)]
    slug: Option<String>,

    /// Description text
    #[arg(short, long)]
    description: Option<String>,

    /// Comma-separated tags
    #[arg(short, long)]
    tags: Option<String>,

    /// Metadata entry as key=value; the value is read as JSON when it parses,
    /// otherwise as a string (repeatable)
    #[arg(short, long = "meta", value_name = "KEY=VALUE")]
    meta: Vec<String>,

    /// Whole metadata document as a JSON object
    #[arg(long, value_name = "JSON", conflicts_with = "meta")]
    meta_json: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new entity
    Add {
        /// Category, e.g. person, website, feature
        #[arg(value_name = "TYPE")]
        kind: String,

        /// Display name
        name: String,

        #[command(flatten)]
        fields: FieldArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Search for entities and rank them by similarity
    #[command(alias = "q")]
    Query {
        /// Search words; leave empty to list the most recently updated
        words: Vec<String>,

        /// Maximum number of ranked results (defaults to ranking.top_n)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Maximum number of candidates to rank (defaults to search.candidate_limit)
        #[arg(long)]
        candidates: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Show one entity in full
    Show {
        /// Entity id
        id: i64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Change some fields of an entity
    Update {
        /// Entity id
        id: i64,

        /// New category
        #[arg(long = "type", value_name = "TYPE")]
        kind: Option<String>,

        /// New display name (re-derives the slug unless --slug is given)
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Delete an entity
    #[command(alias = "rm")]
    Delete {
        /// Entity id
        id: i64,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show database status and capabilities
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Rebuild the full-text index from the stored entities
    Reindex,

    /// Show the effective configuration
    Config {
        /// Write it to the config file, filling in every default
        #[arg(short, long)]
        write: bool,
    },
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => hoard_core::Config::load_from(path)?,
        None => hoard_core::Config::load()?,
    };

    // Setup logging; stdout is reserved for command output
    let log_level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.general.log_level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    // Execute command
    match cli.command {
        Commands::Add {
            kind,
            name,
            fields,
            output,
        } => commands::add::run(config, kind, name, fields, output),
        Commands::Query {
            words,
            limit,
            candidates,
            output,
        } => commands::query::run(config, &words.join(" "), limit, candidates, output),
        Commands::Show { id, output } => commands::show::run(config, id, output),
        Commands::Update {
            id,
            kind,
            name,
            fields,
        } => commands::update::run(config, id, kind, name, fields),
        Commands::Delete { id, yes } => commands::delete::run(config, id, yes),
        Commands::Status { output } => commands::status::run(config, output),
        Commands::Reindex => commands::reindex::run(config),
        Commands::Config { write } => commands::config::run(config, cli.config.as_deref(), write),
    }
}
