mod file_name;
mod serializer;

pub use file_name::*;
pub use serializer::{format_datetime, write_file, write_records, HEADER};

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    apis::{ApiError, PowerApi, TradeDate},
    config::ConfigError,
    Trade, EXIT_CONFIGURATION, EXIT_FAILURE, EXIT_RETRIES_EXHAUSTED,
};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Source(#[from] ApiError),
    #[error("Report has no trades.")]
    NoTrades,
    #[error("Trades cover different days: {0} and {1}.")]
    MixedTradeDates(DateTime<Utc>, DateTime<Utc>),
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("Failed to write {path}: {source}")]
    Serialization { path: PathBuf, source: csv::Error },
}

impl ReportError {
    /// Whether running the same request again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReportError::Source(ApiError::SourceFault) => true,
            ReportError::Source(ApiError::InvalidDate(_)) => false,
            ReportError::NoTrades => true,
            ReportError::MixedTradeDates(..) => true,
            ReportError::Configuration(_) => false,
            ReportError::Serialization { .. } => true,
        }
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReportError::Configuration(_) => EXIT_CONFIGURATION,
            err if err.is_retryable() => EXIT_RETRIES_EXHAUSTED,
            _ => EXIT_FAILURE,
        }
    }
}

/// Total volume for one wall-clock hour of the target time zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatedRecord {
    pub local_hour: DateTime<Tz>,
    pub volume: Decimal,
}

impl AggregatedRecord {
    pub fn utc_hour(&self) -> DateTime<Utc> {
        self.local_hour.with_timezone(&Utc)
    }
}

/// Everything needed to produce one report file.
#[derive(Clone, Debug)]
pub struct ReportRequest {
    pub date: TradeDate,
    pub time_zone: Tz,
    pub working_directory: PathBuf,
    pub file_name: FileName,
}

/// A report that has been written to disk.
#[derive(Debug)]
pub struct Report {
    pub id: Uuid,
    pub path: PathBuf,
    pub records: Vec<AggregatedRecord>,
}

/// Turns the trades of a power API into hourly position reports.
pub struct ForecastReport<A: PowerApi> {
    api: A,
}

impl<A: PowerApi> ForecastReport<A> {
    pub fn new(api: A) -> Self {
        ForecastReport { api }
    }

    /// Fetch trades for `date` and sum them per local hour of `time_zone`.
    pub async fn aggregate(
        &self,
        date: TradeDate,
        time_zone: Tz,
    ) -> Result<Vec<AggregatedRecord>, ReportError> {
        self.aggregate_with_id(Uuid::new_v4(), date, time_zone)
            .await
    }

    /// Aggregate and write the report file described by `request`.
    pub async fn generate(&self, request: &ReportRequest) -> Result<Report, ReportError> {
        let id = Uuid::new_v4();
        log::info!("[report {}] Report started.", id);

        let records = self
            .aggregate_with_id(id, request.date, request.time_zone)
            .await?;

        let path = request.working_directory.join(request.file_name.build());
        log::info!("[report {}] Writing {}.", id, path.display());
        write_report(&path, &records)?;
        log::info!(
            "[report {}] Report finished with {} records.",
            id,
            records.len()
        );

        Ok(Report { id, path, records })
    }

    async fn aggregate_with_id(
        &self,
        id: Uuid,
        date: TradeDate,
        time_zone: Tz,
    ) -> Result<Vec<AggregatedRecord>, ReportError> {
        let trades = self
            .api
            .get_trades_async(date, time_zone)
            .await
            .map_err(|err| {
                log::warn!("[report {}] {} failed: {}", id, A::NAME, err);
                err
            })?;
        log::info!("[report {}] Report has {} trades.", id, trades.len());

        aggregate_trades(id, &trades, time_zone)
    }
}

fn write_report(path: &Path, records: &[AggregatedRecord]) -> Result<(), ReportError> {
    write_file(path, records).map_err(|source| ReportError::Serialization {
        path: path.to_owned(),
        source,
    })
}

/// Sum the volumes of `trades` per local hour of `time_zone`, in
/// chronological order.
pub fn aggregate_trades(
    id: Uuid,
    trades: &[Trade],
    time_zone: Tz,
) -> Result<Vec<AggregatedRecord>, ReportError> {
    let first = trades.first().ok_or_else(|| {
        log::warn!("[report {}] Report has no trades.", id);
        ReportError::NoTrades
    })?;
    if let Some(other) = trades.iter().find(|trade| trade.date() != first.date()) {
        return Err(ReportError::MixedTradeDates(first.date(), other.date()));
    }

    let mut buckets: BTreeMap<DateTime<Tz>, Decimal> = BTreeMap::new();
    for trade in trades {
        log::debug!(
            "[report {}] [trade {}] Summing {} periods.",
            id,
            trade.id(),
            trade.periods().len()
        );
        for period in trade.periods() {
            let local = trade.period_start(period).with_timezone(&time_zone);
            *buckets.entry(truncate_to_hour(local)).or_default() += period.volume();
        }
    }

    Ok(buckets
        .into_iter()
        .map(|(local_hour, volume)| AggregatedRecord { local_hour, volume })
        .collect())
}

// Subtracting keeps the offset of the original instant, so the repeated
// hour of a DST fall-back stays a separate bucket.
fn truncate_to_hour(time: DateTime<Tz>) -> DateTime<Tz> {
    let excess = Duration::seconds(i64::from(time.minute() * 60 + time.second()))
        + Duration::nanoseconds(i64::from(time.nanosecond()));
    time - excess
}
