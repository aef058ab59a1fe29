use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior},
};

use crate::{
    anchor,
    apis::{PowerApi, TradeDate},
    config::ConfigError,
    report::{FileName, ForecastReport, ReportError, ReportRequest},
    EXIT_RETRIES_EXHAUSTED, EXIT_SUCCESS,
};

#[derive(Debug, Clone)]
pub struct Settings {
    /// Time between two scheduled reports.
    pub interval: Duration,
    /// How often a failed report is retried within one tick.
    pub retries: u32,
    /// Zone whose wall-clock hours the report is expressed in.
    pub time_zone: Tz,
    /// Directory receiving the report files.
    pub working_directory: PathBuf,
    /// Fixed extraction time for the file names, the clock otherwise.
    pub extraction: Option<DateTime<Utc>>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            interval: Duration::from_secs(15 * 60),
            retries: 3,
            time_zone: chrono_tz::UTC,
            working_directory: PathBuf::from("."),
            extraction: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    Succeeded,
    Failed,
    Stopping,
    Stopped,
}

/// Outcome of a single tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunResult {
    pub attempts: u32,
    pub succeeded: bool,
    pub exit_code: i32,
}

/// Summary returned once the scheduler has stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stopped {
    pub ticks: u64,
    pub failed: u64,
    /// Code of the first failed tick, or success.
    pub exit_code: i32,
}

/// Runs the report pipeline now and then on every interval, one tick at a time.
pub struct Scheduler<A: PowerApi> {
    report: ForecastReport<A>,
    settings: Settings,
    clock: fn() -> DateTime<Utc>,
    state: State,
    job: u32,
    ticks: u64,
    failed: u64,
    exit_code: i32,
}

impl<A: PowerApi> Scheduler<A> {
    pub fn new(report: ForecastReport<A>, settings: Settings) -> Self {
        Scheduler {
            report,
            settings,
            clock: Utc::now,
            state: State::Idle,
            job: 0,
            ticks: 0,
            failed: 0,
            exit_code: EXIT_SUCCESS,
        }
    }

    /// Replace the wall clock used to derive the run anchor.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn summary(&self) -> Stopped {
        Stopped {
            ticks: self.ticks,
            failed: self.failed,
            exit_code: self.exit_code,
        }
    }

    fn next_job(&mut self) -> u32 {
        self.job = match self.job.checked_add(1) {
            Some(job) => job,
            None => {
                log::info!("Job count has reached its maximum, starting again from 0.");
                0
            }
        };
        self.job
    }

    // Pre-flight: everything that would fail the same way on every retry.
    fn request(&self) -> Result<ReportRequest, ConfigError> {
        let time_zone = self.settings.time_zone;
        let anchor = anchor::next_day((self.clock)(), time_zone)?;

        let mut file_name = FileName::new(anchor.date_naive())?;
        if let Some(extraction) = self.settings.extraction {
            file_name = file_name.with_extraction(extraction);
        }

        Ok(ReportRequest {
            date: TradeDate::Local(anchor.naive_local()),
            time_zone,
            working_directory: self.settings.working_directory.clone(),
            file_name,
        })
    }

    /// Run the pipeline once, retrying failed attempts.
    ///
    /// Failures that retries cannot fix are returned as errors. Everything
    /// else ends up in the returned [`RunResult`].
    pub async fn tick(&mut self) -> Result<RunResult, ReportError> {
        let job = self.next_job();
        self.state = State::Running;
        log::info!("[job {}] Generating power position report.", job);

        let request = match self.request() {
            Ok(request) => request,
            Err(err) => {
                log::error!("[job {}] Invalid run configuration: {}", job, err);
                self.state = State::Failed;
                return Err(err.into());
            }
        };
        log::info!(
            "[job {}] Forecasting {} ({}).",
            job,
            request.file_name.volume_date(),
            request.time_zone
        );

        let max_attempts = self.settings.retries.saturating_add(1);
        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            match self.report.generate(&request).await {
                Ok(report) => {
                    log::info!(
                        "[job {}] Wrote {} hours to {}.",
                        job,
                        report.records.len(),
                        report.path.display()
                    );
                    break RunResult {
                        attempts,
                        succeeded: true,
                        exit_code: EXIT_SUCCESS,
                    };
                }
                Err(err) if !err.is_retryable() => {
                    log::error!("[job {}] {}", job, err);
                    self.state = State::Failed;
                    return Err(err);
                }
                Err(err) if attempts < max_attempts => {
                    log::error!("[job {}] Retry ({}) after error: {}", job, attempts, err);
                }
                Err(err) => {
                    log::error!(
                        "[job {}] Giving up after {} attempts: {}",
                        job,
                        attempts,
                        err
                    );
                    break RunResult {
                        attempts,
                        succeeded: false,
                        exit_code: EXIT_RETRIES_EXHAUSTED,
                    };
                }
            }
        };

        self.ticks += 1;
        if result.succeeded {
            self.state = State::Succeeded;
        } else {
            self.state = State::Failed;
            self.failed += 1;
            if self.exit_code == EXIT_SUCCESS {
                self.exit_code = result.exit_code;
            }
        }
        log::info!("[job {}] Finished with code {}.", job, result.exit_code);

        Ok(result)
    }

    /// Tick immediately, then on every interval until `shutdown` turns true.
    ///
    /// Cancellation is only observed between ticks, a running tick always
    /// completes. A failed tick does not stop the schedule, a configuration
    /// error does.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<Stopped, ReportError> {
        let interval = self.settings.interval;
        let invalid = || ConfigError::InvalidInterval(format!("{:?}", interval));
        if interval.is_zero() {
            return Err(invalid().into());
        }
        log::info!("Scheduler running every {:?}.", interval);

        if !*shutdown.borrow() {
            self.tick().await?;
        }

        let start = Instant::now().checked_add(interval).ok_or_else(invalid)?;
        let mut timer = tokio::time::interval_at(start, interval);
        // A slow tick pushes the next one back instead of bunching them up.
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.state = State::Idle;
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = timer.tick() => {
                    self.tick().await?;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        log::warn!("Shutdown signal was dropped.");
                        break;
                    }
                }
            }
        }

        self.state = State::Stopping;
        log::warn!("Cancellation received, scheduler is stopping.");
        self.state = State::Stopped;

        Ok(self.summary())
    }
}
