//! CLI definitions for tweetkeep.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tweetkeep - keep a searchable archive of one X timeline
#[derive(Parser, Debug)]
#[command(name = "tweetkeep")]
#[command(version)]
#[command(about = "Incrementally synced, reconciled, searchable archive of a single X timeline")]
#[command(long_about = r#"
tweetkeep mirrors one account's timeline into a local SQLite archive.

  sync        pull items newer than the newest archived one
  reconcile   re-check archived items upstream (refresh counts, mark deletions)
  search      boolean phrase/term search: "exact phrase" words OR other

Quick start:
  1. tweetkeep config --set account.handle=jack
  2. export TWEETKEEP_BEARER_TOKEN=...
  3. tweetkeep sync
  4. tweetkeep list best
"#)]
pub struct Cli {
    /// Path to the config file (default: ~/.config/tweetkeep/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Archived account handle
    #[arg(long, global = true)]
    pub handle: Option<String>,

    /// Output format
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch new timeline items into the archive
    Sync(RunArgs),

    /// Re-verify archived items against upstream
    Reconcile(RunArgs),

    /// Search archived items
    Search(SearchArgs),

    /// List archived items (best or latest)
    List(ListArgs),

    /// Show one archived item
    Show(ShowArgs),

    /// Show the account profile
    Profile(ProfileArgs),

    /// Flip the deleted flag on one item
    ToggleDelete(ShowArgs),

    /// Seed the archive from a data export (tweets.js)
    Import(ImportArgs),

    /// Show archive statistics
    Stats,

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Abort the run after this many seconds (0 = no limit)
    #[arg(long)]
    pub deadline: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query: words, "quoted phrases", groups separated by OR
    pub query: String,

    /// Sort order: [-]field, field one of id, created, updated, favorites, retweets, ratio
    #[arg(long, short = 'o', default_value = "-favorites", allow_hyphen_values = true)]
    pub order: String,

    /// Page number (1-based, 30 per page)
    #[arg(long, short = 'p', default_value = "1")]
    pub page: usize,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Listing: best or latest
    #[arg(default_value = "best")]
    pub kind: String,

    /// Page number (1-based, 30 per page)
    #[arg(long, short = 'p', default_value = "1")]
    pub page: usize,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Item id
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Fetch the profile upstream instead of using the stored copy
    #[arg(long, short = 'r')]
    pub refresh: bool,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Export directory or tweets.js file
    pub path: PathBuf,

    /// Store the seeded records without checking them upstream
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show the effective configuration
    #[arg(long)]
    pub show: bool,

    /// Set a configuration value (key=value)
    #[arg(long)]
    pub set: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
    Compact,
}

impl OutputFormat {
    /// Parse a configured format name, falling back to text.
    #[must_use]
    pub fn from_config(value: &str) -> Self {
        <Self as ValueEnum>::from_str(value, true).unwrap_or_default()
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn search_order_accepts_leading_dash() {
        let cli = Cli::parse_from(["tweetkeep", "search", "rust", "--order", "-retweets"]);
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.order, "-retweets");
                assert_eq!(args.page, 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["tweetkeep", "list", "latest", "--format", "json", "-p", "2"]);
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::List(args) => {
                assert_eq!(args.kind, "latest");
                assert_eq!(args.page, 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn output_format_from_config() {
        assert_eq!(OutputFormat::from_config("json-pretty"), OutputFormat::JsonPretty);
        assert_eq!(OutputFormat::from_config("COMPACT"), OutputFormat::Compact);
        assert_eq!(OutputFormat::from_config("yaml"), OutputFormat::Text);
    }
}
