//! Shepherd CLI - keeps superproject submodule pointers in sync.

mod commands;
mod config;

use clap::{CommandFactory, Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shepherd")]
#[command(version)]
#[command(about = "Keeps a superproject's submodule pointers in sync")]
#[command(
    long_about = "Shepherd watches an organization's activity feed, records push events in a \
durable local log, and replays them against one or more superproject \
checkouts as submodule-pointer commits. When the feed's bounded retention \
has been outrun it falls back to scanning every submodule remote."
)]
#[command(after_long_help = r#"EXAMPLES
    Apply pending migrations:
        $ shepherd migrate up

    Poll the activity feed into the local event log:
        $ shepherd events download

    Reconcile every configured superproject:
        $ shepherd update

    Reconcile one branch, checking every submodule remote:
        $ shepherd update develop --all

    Refresh mirror bookkeeping and fetch dirty mirrors:
        $ shepherd mirror refresh && shepherd mirror fetch

CONFIGURATION
    Shepherd reads configuration from:
      1. ~/.config/shepherd/config.toml (or $XDG_CONFIG_HOME/shepherd/config.toml)
      2. ./shepherd.toml
      3. Environment variables (SHEPHERD_* prefix, e.g., SHEPHERD_GITHUB_TOKEN)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    SHEPHERD_DATABASE_URL     Database connection string (default: ~/.local/state/shepherd/shepherd.db)
    SHEPHERD_GITHUB_TOKEN     GitHub personal access token
    SHEPHERD_GITHUB_ORG       Organization whose activity feed is polled
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Reconcile superproject submodule pointers
    Update {
        /// Superproject branches to update (all configured branches if
        /// omitted)
        branches: Vec<String>,

        /// Also check every submodule remote, catching pushes the event
        /// feed missed
        #[arg(short, long)]
        all: bool,
    },
    /// Event log operations
    Events {
        #[command(subcommand)]
        action: EventsAction,
    },
    /// Local mirror operations
    Mirror {
        #[command(subcommand)]
        action: MirrorAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

#[derive(Subcommand)]
enum EventsAction {
    /// Poll the upstream feed into the local event log
    Download,
    /// List stored events
    List,
}

#[derive(Subcommand)]
enum MirrorAction {
    /// Refresh mirror bookkeeping from the event queue
    Refresh,
    /// Fetch every mirror marked dirty
    Fetch,
    /// List mirror entries
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Structured logging for services, compact output for humans.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("shepherd=info,shepherd_cli=info"));
    if Term::stdout().is_term() {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .without_time()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    // Completions don't need database access.
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "shepherd", &mut std::io::stdout());
        return Ok(());
    }

    let database_url = config
        .database_url()
        .ok_or("Failed to determine database URL")?;

    // Ensure the database directory exists for SQLite
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        // Strip query parameters (e.g. ?mode=rwc) before path operations
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_path = std::path::Path::new(db_path);

        if db_path.is_relative() && !db_path.as_os_str().is_empty() {
            tracing::warn!(
                "Database path '{}' is relative - behavior depends on current directory. \
                 Consider using an absolute path.",
                db_path.display()
            );
        }

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    match cli.command {
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        Commands::Update { branches, all } => {
            commands::update::handle_update(branches, all, &config, &database_url).await?;
        }
        Commands::Events { action } => {
            commands::events::handle_events(action, &config, &database_url).await?;
        }
        Commands::Mirror { action } => {
            commands::mirror::handle_mirror(action, &config, &database_url).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
