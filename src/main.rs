use anyhow::Result;
use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use chatstream::connector::{bind_addr, serve};
use chatstream::{AskController, ChatController, Commands, Container, ContainerConfig};

#[derive(Parser)]
#[command(name = "chatstream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the echoing mock completer instead of Azure OpenAI
    #[arg(long, global = true)]
    mock: bool,

    /// How long each poll of the token channel waits before re-checking
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Abort a request that has not finished after this many seconds
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded environment from {}", path.display());
    }

    let config = ContainerConfig::resolve(cli.mock, cli.poll_interval_ms, cli.deadline_secs);
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Serve { port, public } => {
            let container = Container::new(config)?;
            debug!("Serving model {}", container.model_name());
            serve(container.bridge(), bind_addr(port, public)).await?;
        }
        Commands::Chat { message, system } => {
            let container = Container::new(config)?;
            ChatController::new(&container)
                .chat(system, message, &mut stdout)
                .await?;
        }
        // Talks to a server over HTTP, so no provider configuration is needed
        Commands::Ask {
            message,
            system,
            url,
        } => {
            AskController::new(url)
                .ask(system, message, &mut stdout)
                .await?;
        }
    }

    Ok(())
}
