use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use laneboard::db::BoardDb;
use laneboard::server::{ServerConfig, start_server};

#[derive(Parser)]
#[command(name = "laneboard")]
#[command(version, about = "Collaborative Kanban board service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP + WebSocket server
    Serve {
        #[arg(short, long, default_value = "3151")]
        port: u16,

        /// Path to the SQLite database file
        #[arg(long, default_value = "laneboard.db")]
        db_path: PathBuf,

        /// Bind on all interfaces and allow cross-origin requests
        #[arg(long)]
        dev: bool,
    },
    /// Initialize the database and exit
    InitDb {
        #[arg(long, default_value = "laneboard.db")]
        db_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("laneboard=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { port, db_path, dev } => {
            start_server(ServerConfig {
                port,
                db_path,
                dev_mode: dev,
            })
            .await
        }
        Commands::InitDb { db_path } => {
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            BoardDb::new(&db_path)?;
            println!("Board database initialized at {}", db_path.display());
            Ok(())
        }
    }
}
