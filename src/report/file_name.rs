use chrono::{DateTime, NaiveDate, Utc};

use crate::config::ConfigError;

/// Naming convention of the report files:
/// `PowerPosition_<volume date>_<extraction time>.csv`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileName {
    volume_date: NaiveDate,
    extraction: Option<DateTime<Utc>>,
}

impl FileName {
    pub fn new(volume_date: NaiveDate) -> Result<Self, ConfigError> {
        if volume_date == NaiveDate::MIN {
            return Err(ConfigError::UnsetVolumeDate);
        }
        Ok(FileName {
            volume_date,
            extraction: None,
        })
    }

    /// Pin the extraction time instead of reading the clock on `build`.
    pub fn with_extraction(mut self, extraction: DateTime<Utc>) -> Self {
        self.extraction = Some(extraction);
        self
    }

    pub fn volume_date(&self) -> NaiveDate {
        self.volume_date
    }

    pub fn build(&self) -> String {
        let extraction = self.extraction.unwrap_or_else(Utc::now);
        format!(
            "PowerPosition_{}_{}.csv",
            self.volume_date.format("%Y%m%d"),
            extraction.format("%Y%m%d%H%M")
        )
    }
}

/// Parse an RFC 3339 extraction time, refusing anything not tagged as UTC.
pub fn parse_extraction(text: &str) -> Result<DateTime<Utc>, ConfigError> {
    let parsed = DateTime::parse_from_rfc3339(text.trim())
        .map_err(|_| ConfigError::InvalidExtraction(text.to_owned()))?;
    if parsed.offset().local_minus_utc() != 0 {
        return Err(ConfigError::NonUtcExtraction(text.to_owned()));
    }
    Ok(parsed.with_timezone(&Utc))
}
