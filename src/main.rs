#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nodekeeper::errors::KeeperError;
use nodekeeper::orchestrator::Orchestrator;
use nodekeeper::session::Session;
use nodekeeper::Config;

#[derive(Parser)]
#[command(name = "nodekeeper")]
#[command(about = "Keeps a browser-extension session connected and claims rewards", long_about = None)]
struct Cli {
    /// Env file to load configuration from (defaults to ./.env if present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Override the schedule state directory
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Override the WebDriver endpoint
    #[arg(long)]
    webdriver_url: Option<String>,

    /// Run the browser with a visible window
    #[arg(long)]
    no_headless: bool,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            error!("{:#}", err);
            let code = err
                .downcast_ref::<KeeperError>()
                .map(KeeperError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nodekeeper=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.env_file.as_deref())?;
    if let Some(dir) = cli.state_dir {
        config.state_dir = dir;
    }
    if let Some(url) = cli.webdriver_url {
        config.webdriver_url = url;
    }
    if cli.no_headless {
        config.headless = false;
    }
    config.validate()?;

    let session = Session::connect(&config).await?;
    let mut orchestrator = Orchestrator::new(config, session).await?;

    // An interrupt cancels the run mid-flight; draining still happens below
    let outcome = tokio::select! {
        res = orchestrator.run() => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received");
            Err(KeeperError::Interrupted.into())
        }
    };

    let session = orchestrator.drain();
    if let Err(e) = session.close().await {
        warn!("Session did not close cleanly: {:#}", e);
    }

    match &outcome {
        Err(e) if e.downcast_ref::<KeeperError>().map(KeeperError::exit_code) == Some(0) => {
            info!("Shut down cleanly");
            Ok(())
        }
        _ => outcome,
    }
}
