mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "warden",
    about = "Remind idle assignees and release stale assignments",
    version,
    propagate_version = true
)]
struct Cli {
    /// Tracking store location
    #[arg(long, global = true, env = "WARDEN_STORE", default_value = ".warden/tracking.db")]
    store: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every watched issue and remind or unassign as needed
    Run {
        /// Config file (default: warden.yaml if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Refresh tracked comments and drop stale tracking entries
    Cron {
        /// Config file (default: warden.yaml if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Refresh every entry instead of the first per repository
        #[arg(long)]
        all: bool,
    },

    /// Record a tracker event in the tracking store
    Event {
        /// Event name, e.g. issues.assigned
        name: String,

        /// Repository as owner/repo
        #[arg(long)]
        repo: String,

        /// Issue or pull request number
        #[arg(long)]
        issue: u64,

        /// Comment to refresh (issues.assigned)
        #[arg(long)]
        comment_id: Option<u64>,

        /// Issues closed by the pull request (pull_request.merged)
        #[arg(long, num_args = 1..)]
        closes: Vec<u64>,
    },

    /// Show the values encoded in labels
    Labels {
        #[arg(required = true)]
        labels: Vec<String>,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Cron { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run { config } => cmd::run::run(config.as_deref(), &cli.store, cli.json),
        Commands::Cron { config, all } => {
            cmd::cron::run(config.as_deref(), &cli.store, all, cli.json)
        }
        Commands::Event {
            name,
            repo,
            issue,
            comment_id,
            closes,
        } => cmd::event::run(&cli.store, &name, &repo, issue, comment_id, closes, cli.json),
        Commands::Labels { labels } => cmd::labels::run(&labels, cli.json),
        Commands::Config { subcommand } => cmd::config::run(subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
