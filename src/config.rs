use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use ::config::{Environment, File, FileFormat};
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;

use crate::{apis::ServiceMode, report::parse_extraction, schedule::Settings};

/// Environment variable selecting the behaviour of the volume source.
pub const SERVICE_MODE_VAR: &str = "SERVICE_MODE";
/// Configuration file section, also the prefix of its environment
/// variables (`PowerTrades__Interval`).
pub const SECTION: &str = "PowerTrades";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Ambiguous run anchor {time} in {zone}.")]
    AmbiguousAnchor { time: NaiveDateTime, zone: Tz },
    #[error("Run anchor {time} does not exist in {zone}.")]
    NonexistentAnchor { time: NaiveDateTime, zone: Tz },
    #[error("Volume date is not set.")]
    UnsetVolumeDate,
    #[error("Extraction time '{0}' is not in UTC.")]
    NonUtcExtraction(String),
    #[error("Extraction time '{0}' is not a valid RFC 3339 timestamp.")]
    InvalidExtraction(String),
    #[error("Unknown time zone '{0}'.")]
    InvalidTimeZone(String),
    #[error("Invalid interval '{0}'.")]
    InvalidInterval(String),
    #[error("Invalid service mode: {0}.")]
    InvalidServiceMode(String),
    #[error("No working directory configured.")]
    MissingWorkingDirectory,
    #[error("Directory does not exist: '{}'", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("Could not load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Raw, unvalidated settings. Keys are matched case-insensitively, so
/// `WorkingDirectory` in the file and `PowerTrades__WORKINGDIRECTORY` in
/// the environment land on the same field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(rename = "workingdirectory", alias = "WorkingDirectory")]
    pub working_directory: Option<PathBuf>,
    #[serde(rename = "interval", alias = "Interval")]
    pub interval: Option<String>,
    #[serde(rename = "timezone", alias = "TimeZone")]
    pub time_zone: Option<String>,
    #[serde(rename = "extractdateutc", alias = "ExtractDateUtc")]
    pub extract_date_utc: Option<String>,
    #[serde(rename = "servicemode", alias = "ServiceMode")]
    pub service_mode: Option<String>,
    #[serde(rename = "retries", alias = "Retries")]
    pub retries: Option<u32>,
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(rename = "powertrades", alias = "PowerTrades", default)]
    power_trades: Config,
}

fn key(field: &str) -> String {
    format!("{}.{}", SECTION, field).to_lowercase()
}

impl Config {
    /// Load the layered configuration.
    ///
    /// Fields set in `overrides` win, then `SERVICE_MODE` and the
    /// `PowerTrades__*` environment, then the `PowerTrades` section of the
    /// JSON file at `path` (if it exists), then a valid `TZ`.
    pub fn load(path: &Path, overrides: &Config) -> Result<Self, ConfigError> {
        Config::load_with_env(path, overrides, None)
    }

    /// Like `load`, reading variables from `vars` instead of the process
    /// environment when given.
    pub fn load_with_env(
        path: &Path,
        overrides: &Config,
        vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| match &vars {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        };

        let mut builder = ::config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Json).required(false))
            .add_source(
                Environment::with_prefix(SECTION)
                    .separator("__")
                    .keep_prefix(true)
                    .source(vars.clone()),
            );

        // The system zone is only a fallback and only if it names a real zone.
        if let Some(tz) = var("TZ").filter(|tz| tz.parse::<Tz>().is_ok()) {
            builder = builder.set_default(key("TimeZone"), tz)?;
        }
        if let Some(mode) = var(SERVICE_MODE_VAR) {
            builder = builder.set_override(key("ServiceMode"), mode)?;
        }
        for (field, value) in overrides.entries() {
            builder = builder.set_override(key(field), value)?;
        }

        if path.exists() {
            log::debug!("Reading configuration from {}.", path.display());
        }
        Ok(builder.build()?.try_deserialize::<ConfigFile>()?.power_trades)
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = Vec::new();
        if let Some(dir) = &self.working_directory {
            entries.push(("WorkingDirectory", dir.to_string_lossy().into_owned()));
        }
        let text = [
            ("Interval", &self.interval),
            ("TimeZone", &self.time_zone),
            ("ExtractDateUtc", &self.extract_date_utc),
            ("ServiceMode", &self.service_mode),
        ];
        for (field, value) in text {
            if let Some(value) = value {
                entries.push((field, value.clone()));
            }
        }
        if let Some(retries) = self.retries {
            entries.push(("Retries", retries.to_string()));
        }
        entries
    }

    pub fn service_mode(&self) -> Result<ServiceMode, ConfigError> {
        match &self.service_mode {
            Some(mode) if !mode.trim().is_empty() => {
                mode.parse().map_err(ConfigError::InvalidServiceMode)
            }
            _ => Ok(ServiceMode::default()),
        }
    }

    /// Validate this configuration into scheduler settings.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let defaults = Settings::default();

        let working_directory = self
            .working_directory
            .clone()
            .ok_or(ConfigError::MissingWorkingDirectory)?;
        if !working_directory.is_dir() {
            return Err(ConfigError::DirectoryNotFound(working_directory));
        }

        let interval = match &self.interval {
            Some(interval) => parse_interval(interval)?,
            None => defaults.interval,
        };
        let time_zone = match &self.time_zone {
            Some(time_zone) => parse_time_zone(time_zone)?,
            None => defaults.time_zone,
        };
        let extraction = self
            .extract_date_utc
            .as_deref()
            .map(parse_extraction)
            .transpose()?;

        Ok(Settings {
            interval,
            retries: self.retries.unwrap_or(defaults.retries),
            time_zone,
            working_directory,
            extraction,
        })
    }
}

pub fn parse_time_zone(text: &str) -> Result<Tz, ConfigError> {
    text.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidTimeZone(text.to_owned()))
}

/// Longest accepted time between two reports.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Parse `HH:MM:SS`, `MM:SS`, `<n>s`, `<n>m`, `<n>h` or plain seconds, up
/// to [`MAX_INTERVAL`].
pub fn parse_interval(text: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidInterval(text.to_owned());
    let trimmed = text.trim();

    let seconds: u64 = if trimmed.contains(':') {
        let parts = trimmed
            .split(':')
            .map(|part| part.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        let total = match parts[..] {
            [h, m, s] if m < 60 && s < 60 => h
                .checked_mul(3600)
                .and_then(|h| h.checked_add(m * 60 + s)),
            [m, s] if s < 60 => m.checked_mul(60).and_then(|m| m.checked_add(s)),
            _ => None,
        };
        total.ok_or_else(invalid)?
    } else {
        let (number, unit) = match trimmed.char_indices().last() {
            Some((i, c)) if c.is_ascii_alphabetic() => (&trimmed[..i], c),
            _ => (trimmed, 's'),
        };
        let value: u64 = number.trim().parse().map_err(|_| invalid())?;
        let scale = match unit.to_ascii_lowercase() {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => return Err(invalid()),
        };
        value.checked_mul(scale).ok_or_else(invalid)?
    };

    let interval = Duration::from_secs(seconds);
    if interval.is_zero() || interval > MAX_INTERVAL {
        return Err(invalid());
    }
    Ok(interval)
}
