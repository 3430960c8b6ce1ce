// ABOUTME: CLI entry point for mysql-panel
// ABOUTME: Parses commands, loads configuration and routes to the command handlers

use clap::{ArgGroup, Parser, Subcommand};
use mysql_panel::auth::DEFAULT_HASH_COST;
use mysql_panel::commands;
use mysql_panel::config::PanelConfig;

#[derive(Parser)]
#[command(name = "mysql-panel")]
#[command(about = "Administrative web panel for MySQL: databases, privileges, backups", long_about = None)]
struct Cli {
    /// TOML configuration file; environment variables override its values
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to listen on (overrides PANEL_BIND)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print a bcrypt hash of a secret for SECRET_STRING
    HashSecret {
        secret: String,
        #[arg(long, default_value_t = DEFAULT_HASH_COST)]
        cost: u32,
    },
    /// Dump a database (or all databases) into the backup directory
    #[command(group(ArgGroup::new("what").required(true).args(["database", "all"])))]
    Backup {
        #[arg(long)]
        database: Option<String>,
        /// Dump every database into one file
        #[arg(long)]
        all: bool,
    },
    /// List backup files, newest first
    ListBackups,
    /// Restore a backup file
    #[command(group(ArgGroup::new("into").required(true).args(["target", "new"])))]
    Restore {
        filename: String,
        /// Existing database to restore into
        #[arg(long)]
        target: Option<String>,
        /// New database to create and restore into
        #[arg(long)]
        new: Option<String>,
    },
    /// Copy a database into a new one
    Clone { source: String, target: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::HashSecret { secret, cost } = &cli.command {
        return commands::hash_secret(secret, *cost);
    }

    let mut config = PanelConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            commands::serve(config).await
        }
        Commands::HashSecret { .. } => Ok(()),
        Commands::Backup { database, all } => commands::backup(config, database, all).await,
        Commands::ListBackups => commands::list_backups(config).await,
        Commands::Restore {
            filename,
            target,
            new,
        } => commands::restore(config, filename, target, new).await,
        Commands::Clone { source, target } => commands::clone(config, source, target).await,
    }
}
