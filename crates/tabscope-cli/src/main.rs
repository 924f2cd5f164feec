mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tabscope_core::{config::get_data_dir, TabscopeConfig, TimeRange};
use tabscope_detector::SignatureKind;
use tabscope_storage::Database;

#[derive(Parser)]
#[command(name = "tabscope")]
#[command(about = "Project-aware browser workspaces", long_about = None)]
struct Cli {
    /// Config file (defaults to <data dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the browser extension over native messaging (stdin/stdout)
    Bridge,
    /// List workspaces
    Workspaces {
        /// Only workspaces of this signature kind (repo, localhost, app, manual)
        #[arg(short, long)]
        kind: Option<SignatureKind>,
    },
    /// Context-switch analytics
    Analytics {
        /// Time range: 1d, 7d, 30d or 90d
        #[arg(short, long, default_value = "7d")]
        range: TimeRange,
        /// Print the raw report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export all stored data
    Export {
        /// Output format: json (everything) or csv (context switches)
        #[arg(short, long, default_value = "json")]
        format: String,
        /// Output file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Delete every stored record
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Manage sites blocked during focus mode
    Blocklist {
        #[command(subcommand)]
        action: BlocklistAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Show current settings
    Show,
    /// Set a value (session_persistence, focus_duration_minutes,
    /// autosave_interval_minutes, detection_threshold)
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug)]
enum BlocklistAction {
    /// List blocked sites
    List,
    /// Block a site
    Add { site: String },
    /// Unblock a site
    Remove { site: String },
}

fn open_database(config: &TabscopeConfig) -> Result<Database> {
    Database::new(config.db_path.clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TabscopeConfig::load_from(path)?,
        None => TabscopeConfig::load()?,
    };

    // stdout carries the native messaging protocol in bridge mode
    if matches!(cli.command, Commands::Bridge) {
        setup_bridge_logging(&config)?;
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .init();
    }

    log::debug!("Data directory: {}", get_data_dir()?.display());

    match cli.command {
        Commands::Bridge => {
            let db = Arc::new(open_database(&config)?);
            commands::bridge::run(db, &config).await
        }
        Commands::Workspaces { kind } => {
            commands::workspaces::handle_list(&open_database(&config)?, kind)
        }
        Commands::Analytics { range, json } => {
            commands::analytics::handle_analytics(&open_database(&config)?, range, json)
        }
        Commands::Export { format, output } => {
            commands::data::handle_export(&open_database(&config)?, &format, output)
        }
        Commands::Clear { yes } => commands::data::handle_clear(&open_database(&config)?, yes),
        Commands::Settings { action } => {
            let db = open_database(&config)?;
            match action {
                SettingsAction::Show => commands::settings::handle_show(&db),
                SettingsAction::Set { key, value } => {
                    commands::settings::handle_set(&db, &key, &value)
                }
            }
        }
        Commands::Blocklist { action } => {
            let db = open_database(&config)?;
            match action {
                BlocklistAction::List => commands::settings::handle_blocklist_list(&db),
                BlocklistAction::Add { site } => commands::settings::handle_blocklist_add(&db, &site),
                BlocklistAction::Remove { site } => {
                    commands::settings::handle_blocklist_remove(&db, &site)
                }
            }
        }
    }
}

fn setup_bridge_logging(config: &TabscopeConfig) -> Result<()> {
    use std::fs::{create_dir_all, OpenOptions};

    let log_path = config.log_file_path()?;

    if let Some(parent) = log_path.parent() {
        create_dir_all(parent)?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .format_timestamp_secs()
        .init();

    Ok(())
}
