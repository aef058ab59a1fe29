use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;

use super::{ApiError, Generator, PowerApi, Random, ServiceMode, TradeDate};
use crate::Trade;

/// Simulated upstream that forecasts hourly power volumes.
///
/// Latency, faults and volumes all come from the injected [`Generator`],
/// so tests can make the service fully deterministic.
pub struct PowerService<G = Random>
where
    G: Generator,
{
    mode: ServiceMode,
    generator: Mutex<G>,
}

impl PowerService<Random> {
    pub fn new(mode: ServiceMode) -> Self {
        PowerService::with_generator(mode, Random::new())
    }
}

impl<G> PowerService<G>
where
    G: Generator,
{
    pub fn with_generator(mode: ServiceMode, generator: G) -> Self {
        PowerService {
            mode,
            generator: Mutex::new(generator),
        }
    }

    fn generator(&self) -> MutexGuard<'_, G> {
        self.generator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Fault injection followed by the latency draw. The lock is released
    // before the caller waits.
    fn prepare(&self) -> Result<Duration, ApiError> {
        if self.mode == ServiceMode::Error {
            return Err(ApiError::SourceFault);
        }
        let mut generator = self.generator();
        if generator.fault() {
            return Err(ApiError::SourceFault);
        }
        Ok(generator.delay())
    }

    fn trades(&self, date: TradeDate, time_zone: Tz) -> Result<Vec<Trade>, ApiError> {
        let frame = date.frame(time_zone);
        let day = date.day();
        let start = start_of_day(frame, day)?;
        let end = day
            .succ_opt()
            .ok_or(ApiError::InvalidDate(day))
            .and_then(|next| start_of_day(frame, next))?;
        let periods = (end - start).num_hours();

        let mut generator = self.generator();
        let count = match self.mode {
            ServiceMode::Test => 2,
            _ => generator.trade_count(),
        };

        let trades = (0..count)
            .map(|_| {
                let volumes: Vec<Decimal> = (1..=periods)
                    .map(|hour| match self.mode {
                        ServiceMode::Test => Decimal::from(hour),
                        _ => generator.volume(),
                    })
                    .collect();
                Trade::new(start, volumes)
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Generated {} trades of {} periods for {} ({}).",
            trades.len(),
            periods,
            day,
            frame
        );

        Ok(trades)
    }
}

#[async_trait]
impl<G> PowerApi for PowerService<G>
where
    G: Generator,
{
    const NAME: &'static str = "PowerService";

    fn get_trades(&self, date: TradeDate, time_zone: Tz) -> Result<Vec<Trade>, ApiError> {
        let delay = self.prepare()?;
        std::thread::sleep(delay);
        self.trades(date, time_zone)
    }

    async fn get_trades_async(
        &self,
        date: TradeDate,
        time_zone: Tz,
    ) -> Result<Vec<Trade>, ApiError> {
        let delay = self.prepare()?;
        tokio::time::sleep(delay).await;
        self.trades(date, time_zone)
    }
}

/// First instant of `day` in `time_zone`.
///
/// Midnight may fall into a DST gap in some zones, in which case the day
/// starts at the first local hour that exists.
pub fn start_of_day(time_zone: Tz, day: NaiveDate) -> Result<DateTime<Utc>, ApiError> {
    (0..4)
        .filter_map(|hour| day.and_hms_opt(hour, 0, 0))
        .find_map(|naive| time_zone.from_local_datetime(&naive).earliest())
        .map(|start| start.with_timezone(&Utc))
        .ok_or(ApiError::InvalidDate(day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::Sequence;
    use chrono::NaiveDateTime;
    use rust_decimal_macros::dec;

    fn utc_midnight(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn local(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_mode_returns_two_trades_of_24_periods_for_next_day() {
        let service = PowerService::with_generator(ServiceMode::Test, Sequence::new());
        let next_day = utc_midnight(2023, 7, 2);

        let trades = service
            .get_trades(next_day.into(), chrono_tz::UTC)
            .unwrap();

        assert_eq!(trades.len(), 2);
        for trade in &trades {
            assert_eq!(trade.date(), next_day);
            assert_eq!(trade.periods().len(), 24);
            for (i, period) in trade.periods().iter().enumerate() {
                assert_eq!(period.index() as usize, i + 1);
                assert_eq!(period.volume(), Decimal::from(i + 1));
            }
        }
    }

    #[test]
    fn test_mode_does_not_bypass_fault_check() {
        let service =
            PowerService::with_generator(ServiceMode::Test, Sequence::new().faults([true]));

        let result = service.get_trades(utc_midnight(2023, 7, 2).into(), chrono_tz::UTC);
        assert!(matches!(result, Err(ApiError::SourceFault)));

        // Next draw is clean.
        let result = service.get_trades(utc_midnight(2023, 7, 2).into(), chrono_tz::UTC);
        assert_eq!(result.unwrap().len(), 2);
    }

    #[test]
    fn error_mode_fails_before_any_delay() {
        let service = PowerService::with_generator(
            ServiceMode::Error,
            Sequence::new().delays([Duration::from_secs(3600)]),
        );

        let started = std::time::Instant::now();
        let result = service.get_trades(utc_midnight(2023, 7, 2).into(), chrono_tz::UTC);
        assert!(matches!(result, Err(ApiError::SourceFault)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn error_mode_fails_async_variant_too() {
        let service = PowerService::with_generator(
            ServiceMode::Error,
            Sequence::new().delays([Duration::from_secs(3600)]),
        );

        let result = service
            .get_trades_async(utc_midnight(2023, 7, 2).into(), chrono_tz::UTC)
            .await;
        assert!(matches!(result, Err(ApiError::SourceFault)));
    }

    #[tokio::test(start_paused = true)]
    async fn async_variant_waits_for_the_drawn_delay() {
        let service = PowerService::with_generator(
            ServiceMode::Test,
            Sequence::new().delays([Duration::from_secs(4)]),
        );

        let started = tokio::time::Instant::now();
        let trades = service
            .get_trades_async(utc_midnight(2023, 7, 2).into(), chrono_tz::UTC)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(4));
        assert_eq!(trades.len(), 2);
    }

    #[test]
    fn normal_mode_uses_generated_counts_and_volumes() {
        let service = PowerService::with_generator(
            ServiceMode::Normal,
            Sequence::new()
                .trade_counts([3])
                .volumes((0..72).map(|v| Decimal::new(v, 1))),
        );

        let trades = service
            .get_trades(utc_midnight(2023, 7, 2).into(), chrono_tz::UTC)
            .unwrap();

        assert_eq!(trades.len(), 3);
        assert_eq!(trades[0].periods()[0].volume(), dec!(0.0));
        assert_eq!(trades[2].periods()[23].volume(), dec!(7.1));
    }

    #[test]
    fn zone_aware_window_starts_at_local_midnight() {
        let service = PowerService::with_generator(ServiceMode::Test, Sequence::new());

        let trades = service
            .get_trades(local(2023, 7, 2).into(), chrono_tz::Europe::Bucharest)
            .unwrap();

        assert_eq!(
            trades[0].date(),
            Utc.with_ymd_and_hms(2023, 7, 1, 21, 0, 0).unwrap()
        );
        assert_eq!(trades[0].periods().len(), 24);
    }

    #[test]
    fn zone_aware_window_follows_dst_transitions() {
        let service = PowerService::with_generator(ServiceMode::Test, Sequence::new());
        let bucharest = chrono_tz::Europe::Bucharest;

        let spring = service.get_trades(local(2023, 3, 26).into(), bucharest).unwrap();
        assert_eq!(spring[0].periods().len(), 23);

        let autumn = service.get_trades(local(2023, 10, 29).into(), bucharest).unwrap();
        assert_eq!(autumn[0].periods().len(), 25);
    }

    #[test]
    fn utc_date_is_not_reshaped_by_the_zone() {
        let service = PowerService::with_generator(ServiceMode::Test, Sequence::new());
        let bucharest = chrono_tz::Europe::Bucharest;

        // Spring-forward day in Bucharest, still a plain 24-hour UTC day.
        let spring = service
            .get_trades(utc_midnight(2023, 3, 26).into(), bucharest)
            .unwrap();
        assert_eq!(spring[0].date(), utc_midnight(2023, 3, 26));
        assert_eq!(spring[0].periods().len(), 24);

        // Late evening UTC is the next day in Bucharest, not here.
        let evening = Utc.with_ymd_and_hms(2023, 7, 1, 22, 30, 0).unwrap();
        let trades = service.get_trades(evening.into(), bucharest).unwrap();
        assert_eq!(trades[0].date(), utc_midnight(2023, 7, 1));
        assert_eq!(trades[0].periods().len(), 24);
    }

    #[test]
    fn start_of_day_skips_a_missing_midnight() {
        // Santiago moved clocks from 00:00 to 01:00 on 2022-09-11.
        let santiago = chrono_tz::America::Santiago;
        let day = NaiveDate::from_ymd_opt(2022, 9, 11).unwrap();

        let start = start_of_day(santiago, day).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2022, 9, 11, 4, 0, 0).unwrap());
    }
}
