mod batch;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use threadloom_common::ForeignKeyMode;
use threadloom_config::ConfigLoader;
use threadloom_db::ArchiveStore;
use tracing_subscriber::EnvFilter;

use crate::batch::BatchRunner;

#[derive(Parser)]
#[command(
    name = "threadloom",
    version,
    about = "threadloom - load exported conversation archives into SQLite"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory holding config.yml or config.toml
    #[arg(long, global = true, env = "THREADLOOM_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import every archive in the input directory
    Import {
        /// Directory containing the exported .json archives
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// SQLite database to write into
        #[arg(long)]
        db: Option<PathBuf>,

        /// Parent-link checking: deferred, two_pass or immediate
        #[arg(long)]
        foreign_keys: Option<ForeignKeyMode>,

        /// Also import archives in sub-directories
        #[arg(long)]
        recursive: bool,

        /// Apply each file inside a transaction and roll it back
        #[arg(long)]
        dry_run: bool,
    },

    /// Show row counts of the archive tables
    Stats {
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List imported conversations
    List {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_loader = match &cli.config_dir {
        Some(dir) => ConfigLoader::with_dir(dir),
        None => ConfigLoader::new()?,
    };
    let mut config = config_loader.load()?;

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();
    match config_loader.config_file() {
        Some(path) => tracing::debug!("config loaded from {}", path.display()),
        None => tracing::debug!(
            "no config file in {}, defaults in effect",
            config_loader.config_dir().display()
        ),
    }

    match cli.command {
        Commands::Import {
            input_dir,
            db,
            foreign_keys,
            recursive,
            dry_run,
        } => {
            if let Some(dir) = input_dir {
                config.import.input_dir = dir;
            }
            if let Some(path) = db {
                config.database.path = path;
            }
            if let Some(mode) = foreign_keys {
                config.import.foreign_keys = mode;
            }
            config.import.recursive |= recursive;
            config.import.dry_run |= dry_run;

            println!(
                "Importing archives from {} into {}{}",
                config.import.input_dir.display(),
                config.database.path.display(),
                if config.import.dry_run { " (dry run)" } else { "" }
            );

            let runner = BatchRunner::new(config.import, config.database);
            let report = runner.run()?;
            report.print_summary();
        }
        Commands::Stats { db } => {
            let path = db.unwrap_or(config.database.path);
            let store = open_store(&path)?;
            let counts = store.counts()?;
            println!("Archive database: {}", path.display());
            println!("  conversations:      {}", counts.conversations);
            println!("  conversation_nodes: {}", counts.nodes);
            println!("  messages:           {}", counts.messages);
            println!("  message_parts:      {}", counts.parts);
        }
        Commands::List { db } => {
            let store = open_store(&db.unwrap_or(config.database.path))?;
            let conversations = store.conversations()?;
            println!("Imported conversations:");
            if conversations.is_empty() {
                println!("  (none - run `threadloom import` first)");
            }
            for c in conversations {
                let created = c
                    .created_at()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {:>5}  {}  {}  [{} nodes, created {}]",
                    c.id.get(),
                    c.file_name,
                    c.title.as_deref().unwrap_or("(untitled)"),
                    c.node_count,
                    created
                );
            }
        }
    }

    Ok(())
}

fn open_store(path: &Path) -> Result<ArchiveStore> {
    if !path.exists() {
        anyhow::bail!("no archive database at {}", path.display());
    }
    ArchiveStore::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))
}
