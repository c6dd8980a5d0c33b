mod commands;

use boxbattle_core::{EngineConfig, LootStore, MemoryStore, Storage};
use boxbattle_engine::EngineError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "boxbattle")]
#[command(about = "Mystery box openings, case battles and fairness proofs")]
#[command(version)]
struct Cli {
    /// Data directory for the SQLite database
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory for this run
    #[arg(short, long, global = true)]
    memory: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the demo box and print its id
    SeedDemo,

    /// Open a box
    Open(commands::OpenArgs),

    /// Show a box's normalized drop table
    Validate(commands::ValidateArgs),

    /// Run a local battle between generated players
    Battle(commands::BattleArgs),

    /// Commit-reveal fairness tools
    #[command(subcommand)]
    Fair(commands::FairCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "boxbattle={level},boxbattle_engine={level},boxbattle_core={level}",
            level = log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();
    config.validate()?;

    let store: Arc<dyn LootStore> = if cli.memory {
        Arc::new(MemoryStore::new())
    } else {
        let data_dir = cli.data_dir.unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("boxbattle")
        });
        tokio::fs::create_dir_all(&data_dir).await?;
        let db_path = data_dir.join("boxbattle.db");
        let storage = Storage::new(&db_path).await?;
        tracing::debug!(path = %db_path.display(), "Opened store");
        Arc::new(storage)
    };

    let result = match cli.command {
        Commands::SeedDemo => commands::handle_seed_demo(store.as_ref()).await,
        Commands::Open(args) => commands::handle_open(args, store, &config).await,
        Commands::Validate(args) => commands::handle_validate(args, store.as_ref(), &config).await,
        Commands::Battle(args) => commands::handle_battle(args, store, config).await,
        Commands::Fair(cmd) => commands::handle_fair_command(cmd),
    };

    if let Err(e) = result {
        match e {
            EngineError::BoxNotFound(id) => {
                eprintln!("Error: Box '{}' not found", id);
                eprintln!("Use 'boxbattle seed-demo' to store a demo box");
            }
            EngineError::EmptyBox(id) => {
                eprintln!("Error: Box '{}' has no items", id);
            }
            EngineError::InvalidInput(message) => {
                eprintln!("Error: {}", message);
            }
            _ => {
                eprintln!("Error: {}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
