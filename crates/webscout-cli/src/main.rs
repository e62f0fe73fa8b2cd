use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::{info, warn};
use webscout_core::{init_telemetry, run_research, Config, ConfigLoader, ResearchError, RunOptions};

#[derive(Parser, Debug)]
#[command(
    name = "webscout",
    version,
    about = "Iterative web research agent with email delivery"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a research loop on a topic and deliver the summary.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Topic to research.
    #[arg(long)]
    topic: String,

    /// Path to a TOML config file (defaults to WEBSCOUT_CONFIG or ./config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured research loop ceiling.
    #[arg(long)]
    max_loops: Option<u32>,

    /// Print the summary instead of emailing it.
    #[arg(long, default_value_t = false)]
    no_email: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(args).await?,
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

async fn run_command(args: RunArgs) -> Result<()> {
    let (mut config, missing_default) = load_config(args.config)?;
    init_telemetry(&config.logging.level)?;
    if let Some(path) = missing_default {
        warn!(path = %path.display(), "no config file found; using defaults");
    }

    if let Some(max_loops) = args.max_loops {
        config.research.max_loops = max_loops;
    }

    info!(topic = %args.topic, max_loops = config.research.max_loops, "starting research run");

    let mut options = RunOptions::new(&args.topic, config);
    if args.no_email {
        options = options.without_delivery();
    }

    let outcome = run_research(options).await?;

    info!(
        run_id = %outcome.run_id,
        loops = outcome.loops_completed,
        delivered = outcome.delivered,
        "research run complete"
    );
    println!("{}", outcome.summary);
    Ok(())
}

/// Load the config file when one is present. An explicit `--config` path must
/// exist; the implicit default path may be absent, in which case built-in
/// defaults apply and the missing path is returned for logging.
fn load_config(path: Option<PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    match path {
        Some(path) => Ok((ConfigLoader::load(Some(path))?, None)),
        None => match ConfigLoader::load(None) {
            Ok(config) => Ok((config, None)),
            Err(ResearchError::ConfigIo { path, .. }) => Ok((Config::default(), Some(path))),
            Err(err) => Err(err.into()),
        },
    }
}
