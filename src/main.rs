// Copyright 2023 Remi Bernotavicius

use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;

mod config;
mod database;
mod dishes;
mod error;
mod ingredients;
mod server;

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug)]
#[command(version, about = "Dish and ingredient catalog served over HTTP")]
struct Args {
    /// TOML configuration file. Every key is optional.
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the HTTP API.
    Serve {
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Apply pending database migrations and exit.
    Migrate,
}

/// This is where the database lives on-disk unless configured otherwise. On Linux it should be
/// like: `~/.local/share/dish_manager/`
fn data_path() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new().ok_or("failed to get user home directory")?;
    let path = dirs.data_dir().join("dish_manager");
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

fn database_path(config: &config::DatabaseConfig) -> Result<PathBuf> {
    match &config.path {
        Some(path) => Ok(path.clone()),
        None => Ok(data_path()?.join("data.sqlite")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => config::Config::default(),
    };

    simple_logger::SimpleLogger::new()
        .with_level(config.log.level_filter()?)
        .with_utc_timestamps()
        .init()?;

    let path = database_path(&config.database)?;
    match args.commands {
        Commands::Migrate => {
            database::establish_connection(&path)?;
            log::info!("{} is up to date", path.display());
        }
        Commands::Serve { bind } => {
            let store = database::Store::open(&path, &config.database)?;
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            server::run_server(store, &config.server, &bind).await?;
        }
    }
    Ok(())
}
