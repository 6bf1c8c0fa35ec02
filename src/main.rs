use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use lpmon_service::config::MonitorConfig;
use lpmon_service::dev_mode::DevMode;
use lpmon_service::fetcher::ResilientValueFetcher;
use lpmon_service::ingest::build_client;
use lpmon_service::logging::{self, LogLevel};
use lpmon_service::monitor::{self, boxed_sources, DashboardSnapshot, LiveApi, Monitor};
use lpmon_service::verify;

#[derive(Parser)]
#[command(name = "lpmon")]
#[command(about = "Liquidity pool risk monitor", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file; defaults apply if it does not exist
    #[arg(long, default_value = "lpmon.toml")]
    config: PathBuf,

    /// Pin TVL to this value ("clear" to remove a configured override)
    #[arg(long = "override", value_name = "VALUE")]
    manual_override: Option<String>,

    /// Replay TVL values from a file (one per line) instead of live sources
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Print snapshots as JSON
    #[arg(long)]
    json: bool,

    #[arg(long, default_value = "info")]
    log_level: LogLevel,

    /// Also append logs to this file
    #[arg(long)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll on the configured interval until interrupted
    Run,
    /// Run a single monitoring cycle
    Once,
    /// Probe every configured endpoint once
    Verify,
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let long_running = matches!(cli.command, Commands::Run);
    logging::init_logger(cli.log_level, cli.log_file.as_deref(), long_running)?;

    let mut config = MonitorConfig::load(&cli.config)?;
    config.apply_env()?;
    if let Some(raw) = &cli.manual_override {
        config.monitor.manual_override = if raw.eq_ignore_ascii_case("clear") {
            None
        } else {
            Some(raw.parse().map_err(|_| format!("--override {} is not a number", raw))?)
        };
    }
    config.validate()?;

    let poll = match cli.command {
        Commands::Verify => {
            let report = verify::run_full_verification(&config)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", verify::format_summary(&report));
            }
            return Ok(());
        }
        Commands::Run => true,
        Commands::Once => false,
    };

    let mut monitor = match &cli.replay {
        Some(path) => {
            let dev = DevMode::from_file(path)?;
            tracing::info!(samples = dev.values.len(), "replaying TVL from {}", path.display());
            let client = build_client(config.fetcher.request_timeout())?;
            let fetcher = ResilientValueFetcher::new(
                boxed_sources(vec![dev.into_source("replay")]),
                &config.fetcher,
            );
            Monitor::with_parts(fetcher, LiveApi::new(client, &config), &config)?
        }
        None => Monitor::from_config(&config)?,
    };

    let source_count = monitor.fetcher().source_names().len() as u32;
    let worst_case = monitor
        .fetcher()
        .policy()
        .worst_case_duration(config.fetcher.request_timeout())
        .saturating_mul(source_count);
    tracing::info!(
        sources = ?monitor.fetcher().source_names(),
        worst_case_secs = worst_case.as_secs(),
        "monitoring {}",
        config.target.contract
    );

    loop {
        print_snapshot(&monitor.run_cycle(), cli.json)?;
        if !poll {
            return Ok(());
        }
        std::thread::sleep(Duration::from_secs(config.monitor.poll_interval_secs));
    }
}

fn print_snapshot(snapshot: &DashboardSnapshot, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        print!("{}", monitor::format_summary(snapshot));
    }
    Ok(())
}
