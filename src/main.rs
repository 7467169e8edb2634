// flydesk CLI: serve, status, version.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flydesk::{DeskConfig, VERSION};

#[derive(Parser)]
#[command(name = "flydesk", about = "Firefly Desk - Backoffice as Agent", version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the backend server
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
        /// Enable auto-reload (dev convenience; handled by an external watcher)
        #[arg(long)]
        reload: bool,
    },
    /// Show current configuration and service status
    Status,
    /// Print version
    Version,
}

fn load_config_or_exit() -> DeskConfig {
    match DeskConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[!!] Failed to load config: {e}");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Serve { port, reload }) => {
            if reload {
                tracing::info!("reload requested; run under a file watcher such as cargo-watch");
            }
            let config = load_config_or_exit();
            if let Err(e) = flydesk::server::serve(config, port).await {
                eprintln!("[!!] Server failed: {e}");
                std::process::exit(1);
            }
        }
        Some(Command::Status) => {
            let config = load_config_or_exit();
            let database = match config.database_url.rsplit_once('@') {
                Some((_, tail)) => tail.to_string(),
                None => config.database_url.clone(),
            };
            println!("Firefly Desk v{VERSION}");
            println!(
                "  Mode:         {}",
                if config.dev_mode { "development" } else { "production" }
            );
            println!("  Database:     {database}");
            println!("  Agent:        {}", config.agent_name);
            println!("  Vector store: {}", config.vector_store.as_str());
        }
        Some(Command::Version) => {
            println!("flydesk {VERSION}");
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
        }
    }
}
