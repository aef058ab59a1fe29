use std::path::PathBuf;

use clap::Parser;
use power_position::{
    apis::PowerService,
    config::Config,
    report::{ForecastReport, ReportError},
    Scheduler,
};
use tokio::sync::watch;

/// Writes the day-ahead power position report on a fixed interval.
#[derive(Parser, Debug)]
#[command(name = "power_position", version)]
struct Cli {
    /// The folder path for storing the CSV file.
    #[arg(short = 'd', long = "directory")]
    directory: Option<PathBuf>,
    /// Time between two reports, as HH:MM:SS or 30s, 15m, 1h.
    #[arg(short = 'i', long = "interval")]
    interval: Option<String>,
    /// Fixed UTC extraction time used in the file name (RFC 3339).
    #[arg(short = 'e', long = "extract-date-utc")]
    extract_date_utc: Option<String>,
    /// IANA time zone of the report hours, for example Europe/Madrid.
    #[arg(short = 't', long = "extract-date-tz")]
    time_zone: Option<String>,
    /// Volume source mode: normal, test or error.
    #[arg(short = 'm', long = "mode")]
    mode: Option<String>,
    /// Retries per report after a failed attempt.
    #[arg(short = 'r', long = "retries")]
    retries: Option<u32>,
    /// JSON configuration file with a PowerTrades section.
    #[arg(short = 'c', long = "config", default_value = "appsettings.json")]
    config: PathBuf,
    /// Generate a single report and exit.
    #[arg(long)]
    once: bool,
}

impl Cli {
    fn layer(&self) -> Config {
        Config {
            working_directory: self.directory.clone(),
            interval: self.interval.clone(),
            time_zone: self.time_zone.clone(),
            extract_date_utc: self.extract_date_utc.clone(),
            service_mode: self.mode.clone(),
            retries: self.retries,
        }
    }
}

async fn run(cli: Cli) -> Result<i32, ReportError> {
    let config = Config::load(&cli.config, &cli.layer())?;
    let mode = config.service_mode()?;
    let settings = config.settings()?;

    log::info!(
        "Reports go to {} every {:?} in {} (source mode {}).",
        settings.working_directory.display(),
        settings.interval,
        settings.time_zone,
        mode
    );

    let report = ForecastReport::new(PowerService::new(mode));
    let mut scheduler = Scheduler::new(report, settings);

    if cli.once {
        return Ok(scheduler.tick().await?.exit_code);
    }

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Canceling...");
            let _ = tx.send(true);
        }
    });

    let stopped = scheduler.run(rx).await?;
    log::info!(
        "Stopped after {} reports, {} failed.",
        stopped.ticks,
        stopped.failed
    );
    Ok(stopped.exit_code)
}

#[tokio::main]
async fn main() {
    if let Err(err) = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .with_utc_timestamps()
        .init()
    {
        eprintln!("Could not set up logging: {}", err);
    }

    let code = match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            log::error!("{}", err);
            err.exit_code()
        }
    };

    std::process::exit(code);
}
