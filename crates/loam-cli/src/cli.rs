use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "loam")]
#[command(about = "Offline-first capture and sync for your knowledge base")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Quick capture: loam "my note here #tag"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture a note into the knowledge base (queued, synced when online)
    #[command(alias = "add")]
    Capture {
        /// Note content; #words become tags
        content: Vec<String>,
        /// Optional title (first content line when omitted)
        #[arg(long)]
        title: Option<String>,
    },
    /// List queued operations waiting to sync
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drain the sync queue against the remote store
    Sync,
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show queue depth and sync configuration
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear the sync queue (drops unsynced changes)
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
