use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::debug;

use spa_check_lib::check::session::{Orchestrator, SessionOptions, Target};
use spa_check_lib::sim::SimConnector;
use spa_check_lib::util::config::{HarnessConfig, OutputFormat};

mod report;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    handle_cli(cli).await
}

/// This struct defines the command line interface of the application
#[derive(Parser)]
#[clap(
    name = "spa-check",
    about = "Connect to a spa, check its configuration and exercise every control",
    version
)]
pub struct Cli {
    /// Spa IP address or hostname (optional, discovers spas when omitted)
    pub host: Option<String>,

    /// Enable debug logging
    #[clap(short, long)]
    pub debug: bool,

    /// Discover all available spas instead of just the first one
    #[clap(long)]
    pub all: bool,

    /// Harness configuration file (YAML, or JSON with a .json extension)
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Output format (plaintext, json, yaml)
    #[clap(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Check discovered spas concurrently
    #[clap(long)]
    pub parallel: bool,

    /// Time a single command may take to take effect, in milliseconds
    #[clap(long, value_parser = parse_duration)]
    pub verify_timeout: Option<Duration>,

    /// Time between two reads of a state, in milliseconds
    #[clap(long, value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,
}

fn parse_duration(s: &str) -> Result<Duration, &'static str> {
    let millis = s
        .parse::<u64>()
        .map_err(|_| "could not parse duration in milliseconds")?;
    Ok(Duration::from_millis(millis))
}

fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(output) = cli.output {
        config.output = output;
    }
    if cli.parallel {
        config.parallel = true;
    }
    if let Some(timeout) = cli.verify_timeout {
        config.verify_timeout_ms = timeout.as_millis() as u64;
    }
    if let Some(interval) = cli.poll_interval {
        config.poll_interval_ms = interval.as_millis() as u64;
    }
    config.validate()?;
    Ok(config)
}

async fn handle_cli(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    debug!("Harness configuration: {:?}", config);
    let plaintext = config.output == OutputFormat::Plaintext;

    if plaintext {
        println!("spa-check version: {}", env!("CARGO_PKG_VERSION"));
    }
    let target = match cli.host {
        Some(host) => Target::Host(host),
        None => {
            if plaintext {
                println!("No host provided. Running in discovery mode...");
            }
            Target::Discover {
                first_only: !cli.all,
            }
        }
    };

    let connector = SimConnector::new(config.simulator.clone());
    let orchestrator = Orchestrator::new(&connector, SessionOptions::from(&config));
    let reports = orchestrator.run(target).await;

    match config.output {
        OutputFormat::Plaintext => {
            for session_report in &reports {
                report::print_report(session_report);
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&reports)?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&reports)?;
            println!("{}", yaml);
        }
    }

    Ok(())
}
