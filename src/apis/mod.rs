mod generator;
mod power_service;

pub use generator::*;
pub use power_service::*;

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Trade;

#[async_trait]
pub trait PowerApi: Send + Sync {
    const NAME: &'static str;

    /// Fetch the trades forecasting the day of `date`, blocking the
    /// current thread while the upstream is busy.
    fn get_trades(&self, date: TradeDate, time_zone: Tz) -> Result<Vec<Trade>, ApiError>;
    /// Same as `get_trades`, but yields to the runtime instead of blocking.
    async fn get_trades_async(
        &self,
        date: TradeDate,
        time_zone: Tz,
    ) -> Result<Vec<Trade>, ApiError>;
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Error retrieving power volumes.")]
    SourceFault,
    #[error("Cannot locate the start of {0} in the requested time zone.")]
    InvalidDate(NaiveDate),
}

/// The day a forecast is requested for.
///
/// A `Utc` date is already normalized and covers its UTC calendar day. A
/// `Local` date is a wall-clock reading that is interpreted in the time
/// zone passed alongside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TradeDate {
    Utc(DateTime<Utc>),
    Local(NaiveDateTime),
}

impl TradeDate {
    /// Zone whose midnights bound the forecast window.
    pub fn frame(&self, time_zone: Tz) -> Tz {
        match self {
            TradeDate::Utc(_) => chrono_tz::UTC,
            TradeDate::Local(_) => time_zone,
        }
    }

    /// Calendar day covered by the forecast.
    pub fn day(&self) -> NaiveDate {
        match self {
            TradeDate::Utc(instant) => instant.date_naive(),
            TradeDate::Local(naive) => naive.date(),
        }
    }
}

impl From<DateTime<Utc>> for TradeDate {
    fn from(instant: DateTime<Utc>) -> Self {
        TradeDate::Utc(instant)
    }
}

impl From<NaiveDateTime> for TradeDate {
    fn from(naive: NaiveDateTime) -> Self {
        TradeDate::Local(naive)
    }
}

/// Behaviour of the simulated volume source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceMode {
    /// Random trades, random latency, occasional faults.
    #[default]
    Normal,
    /// Two trades with volume `h` in hour `h`, random latency and faults.
    Test,
    /// Every request fails.
    Error,
}

impl FromStr for ServiceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(ServiceMode::Normal),
            "test" => Ok(ServiceMode::Test),
            "error" => Ok(ServiceMode::Error),
            other => Err(format!("unknown service mode '{}'", other)),
        }
    }
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceMode::Normal => "Normal",
            ServiceMode::Test => "Test",
            ServiceMode::Error => "Error",
        };
        write!(f, "{}", name)
    }
}
