pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "freshet")]
#[command(about = "Crypto news acquisition pipeline", long_about = None)]
pub struct Cli {
    /// Path to the config file (default: ~/.config/freshet/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline once
    Run {
        /// Number of articles to publish (1-50)
        #[arg(short, long)]
        count: Option<usize>,

        /// Use RSS/Atom feeds
        #[arg(long, conflicts_with = "page")]
        feed: bool,

        /// Crawl listing pages instead of feeds
        #[arg(long)]
        page: bool,
    },
    /// Show scheduler state and lifetime counters
    Status,
    /// Show recent runs
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Run the scheduler in the foreground until interrupted
    Schedule {
        /// Run once immediately before waiting for the first tick
        #[arg(long)]
        now: bool,
    },
    /// Manage publishing domains
    Domain {
        #[command(subcommand)]
        action: DomainAction,
    },
    /// Manage authors
    Author {
        #[command(subcommand)]
        action: AuthorAction,
    },
}

#[derive(Subcommand)]
pub enum DomainAction {
    /// Register a publishing domain
    Add {
        /// Display name
        name: String,
        /// Hostname, e.g. news.example.com
        hostname: String,
    },
    /// List publishing domains
    List,
}

#[derive(Subcommand)]
pub enum AuthorAction {
    /// Register an author
    Add { username: String },
}

impl Commands {
    /// Feed/page override from the `run` flags.
    pub fn mode_override(feed: bool, page: bool) -> Option<bool> {
        match (feed, page) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}
