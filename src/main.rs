//! # Cogni Scheduler Main Entry Point
//!
//! This is the main entry point for the Cogni Scheduler service.

use clap::{Parser, Subcommand};
use cogni_scheduler::{config::ConfigLoader, db, server::run_server};
use migration::{Migrator, MigratorTrait};

#[derive(Parser)]
#[command(name = "cogni-scheduler", version, about = "Cogni DAO schedule and execution-grant service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and reconciliation sweep
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    println!("Loaded configuration for profile: {}", config.profile);
    if let Ok(redacted_json) = config.redacted_json() {
        println!("Configuration: {}", redacted_json);
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
        Command::Migrate => {
            let db = db::init_pool(&config).await?;
            Migrator::up(&db, None).await?;
            println!("Migrations applied");
            Ok(())
        }
    }
}
