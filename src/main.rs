use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use wakegate::config::file::config_file_path;
use wakegate::state::PublicationSink;
use wakegate::tools::tool_definitions;
use wakegate::{Config, Daemon};

/// Wakegate - wake word gating and session state for voice assistants
#[derive(Parser)]
#[command(name = "wakegate", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/wakegate/config.toml)
    #[arg(short, long, env = "WAKEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one session over a JSON lines event stream
    Replay {
        /// Input file (stdin if omitted)
        file: Option<PathBuf>,

        /// Also write retained state publications to this file
        #[arg(long)]
        publish_to: Option<PathBuf>,
    },
    /// Print the assistant function schemas
    Tools,
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,wakegate=info",
        1 => "info,wakegate=debug",
        2 => "debug",
        _ => "trace",
    };

    // Events go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Replay { file, publish_to } => replay(config, file.as_deref(), publish_to.as_deref()).await,
        Command::Tools => {
            println!("{}", serde_json::to_string_pretty(&tool_definitions())?);
            Ok(())
        }
        Command::Config => {
            if let Some(path) = cli.config.or_else(config_file_path) {
                println!("# config file: {}", path.display());
            }
            println!("{config:#?}");
            Ok(())
        }
    }
}

async fn replay(config: Config, file: Option<&Path>, publish_to: Option<&Path>) -> anyhow::Result<()> {
    let mut daemon = Daemon::new(config)?;

    if let Some(path) = publish_to {
        let writer = tokio::fs::File::create(path).await?;
        tracing::info!(path = %path.display(), "writing state publications");
        let identity = daemon.identity();
        daemon = daemon.with_sink(Box::new(PublicationSink::new(identity, writer)));
    }

    let shutdown = daemon.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let stdout = tokio::io::stdout();
    let summary = match file {
        Some(path) => {
            let input = tokio::fs::File::open(path).await?;
            daemon.replay(BufReader::new(input), stdout).await?
        }
        None => daemon.replay(BufReader::new(tokio::io::stdin()), stdout).await?,
    };

    if summary.skipped_lines > 0 {
        tracing::warn!(skipped = summary.skipped_lines, "some replay lines were ignored");
    }
    Ok(())
}
