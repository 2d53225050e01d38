use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use permitflow::config::ServerConfig;
use permitflow::server;

#[derive(Parser)]
#[command(name = "permitflow")]
#[command(about = "Licensing application workflow service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (the default when no subcommand is given)
    Serve {
        /// Port to listen on (overrides PERMITFLOW_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database path (overrides PERMITFLOW_DB)
        #[arg(long)]
        db: Option<std::path::PathBuf>,

        /// Bind on all interfaces and allow any CORS origin
        #[arg(long)]
        dev: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("permitflow=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env();

    if let Some(Commands::Serve { port, db, dev }) = cli.command {
        if let Some(port) = port {
            config.port = port;
        }
        if let Some(db) = db {
            config.db_path = db;
        }
        if dev {
            config.dev_mode = true;
        }
    }

    server::start_server(config).await
}
