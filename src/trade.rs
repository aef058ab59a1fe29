use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// One hour slot of a trade. Periods are numbered from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TradePeriod {
    index: u32,
    volume: Decimal,
}

impl TradePeriod {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }
}

/// A forecast instrument holding one volume per hour of its day.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trade {
    id: Uuid,
    date: DateTime<Utc>,
    periods: Vec<TradePeriod>,
}

impl Trade {
    /// Create a trade starting at `date` with one period per volume,
    /// numbered in the order the volumes are given.
    pub fn new<I>(date: DateTime<Utc>, volumes: I) -> Self
    where
        I: IntoIterator<Item = Decimal>,
    {
        Trade::with_id(Uuid::new_v4(), date, volumes)
    }

    pub fn with_id<I>(id: Uuid, date: DateTime<Utc>, volumes: I) -> Self
    where
        I: IntoIterator<Item = Decimal>,
    {
        let periods = volumes
            .into_iter()
            .zip(1..)
            .map(|(volume, index)| TradePeriod { index, volume })
            .collect();

        Trade { id, date, periods }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// First instant of the day this trade covers.
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn periods(&self) -> &[TradePeriod] {
        &self.periods
    }

    /// Absolute start of a period.
    pub fn period_start(&self, period: &TradePeriod) -> DateTime<Utc> {
        self.date + Duration::hours(i64::from(period.index) - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn periods_are_numbered_from_one() {
        let date = Utc.with_ymd_and_hms(2023, 7, 1, 0, 0, 0).unwrap();
        let trade = Trade::new(date, vec![dec!(10), dec!(20), dec!(30)]);

        let indices: Vec<u32> = trade.periods().iter().map(|p| p.index()).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(trade.periods()[2].volume(), dec!(30));
    }

    #[test]
    fn period_start_is_offset_from_trade_date() {
        let date = Utc.with_ymd_and_hms(2023, 6, 30, 21, 0, 0).unwrap();
        let trade = Trade::new(date, vec![dec!(1); 24]);

        assert_eq!(trade.period_start(&trade.periods()[0]), date);
        assert_eq!(
            trade.period_start(&trade.periods()[23]),
            Utc.with_ymd_and_hms(2023, 7, 1, 20, 0, 0).unwrap()
        );
    }

    #[test]
    fn trades_get_distinct_ids() {
        let date = Utc.with_ymd_and_hms(2023, 7, 1, 0, 0, 0).unwrap();
        let a = Trade::new(date, vec![dec!(1)]);
        let b = Trade::new(date, vec![dec!(1)]);
        assert_ne!(a.id(), b.id());
    }
}
