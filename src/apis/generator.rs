use std::{collections::VecDeque, time::Duration};

use rand::{rngs::StdRng, Rng, SeedableRng};
use rust_decimal::Decimal;

/// Source of every random decision the simulated power service makes.
pub trait Generator: Send {
    /// Whether the current request should fail.
    fn fault(&mut self) -> bool;
    /// Artificial upstream latency.
    fn delay(&mut self) -> Duration;
    /// Number of trades to return.
    fn trade_count(&mut self) -> usize;
    /// Volume of a single period.
    fn volume(&mut self) -> Decimal;
}

/// Randomness backed by a seeded `StdRng`.
pub struct Random {
    rng: StdRng,
}

impl Random {
    pub fn new() -> Self {
        Random {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Random {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Generator for Random {
    fn fault(&mut self) -> bool {
        self.rng.gen_range(0..10) == 9
    }

    fn delay(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(0..5_000))
    }

    fn trade_count(&mut self) -> usize {
        self.rng.gen_range(1..20)
    }

    fn volume(&mut self) -> Decimal {
        // Thousandths in [0, 1000).
        Decimal::new(self.rng.gen_range(0..1_000_000), 3)
    }
}

/// Replays fixed answers in order. Once a queue runs dry it answers
/// with no fault, no delay, a single trade and zero volume.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    faults: VecDeque<bool>,
    delays: VecDeque<Duration>,
    trade_counts: VecDeque<usize>,
    volumes: VecDeque<Decimal>,
}

impl Sequence {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn faults<I: IntoIterator<Item = bool>>(mut self, faults: I) -> Self {
        self.faults.extend(faults);
        self
    }

    pub fn delays<I: IntoIterator<Item = Duration>>(mut self, delays: I) -> Self {
        self.delays.extend(delays);
        self
    }

    pub fn trade_counts<I: IntoIterator<Item = usize>>(mut self, counts: I) -> Self {
        self.trade_counts.extend(counts);
        self
    }

    pub fn volumes<I: IntoIterator<Item = Decimal>>(mut self, volumes: I) -> Self {
        self.volumes.extend(volumes);
        self
    }
}

impl Generator for Sequence {
    fn fault(&mut self) -> bool {
        self.faults.pop_front().unwrap_or(false)
    }

    fn delay(&mut self) -> Duration {
        self.delays.pop_front().unwrap_or_default()
    }

    fn trade_count(&mut self) -> usize {
        self.trade_counts.pop_front().unwrap_or(1)
    }

    fn volume(&mut self) -> Decimal {
        self.volumes.pop_front().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn random_stays_in_range() {
        let mut random = Random::seeded(7);
        for _ in 0..1_000 {
            assert!(random.delay() < Duration::from_secs(5));
            assert!((1..20).contains(&random.trade_count()));
            let volume = random.volume();
            assert!(volume >= dec!(0) && volume < dec!(1000));
        }
    }

    #[test]
    fn random_faults_roughly_one_in_ten() {
        let mut random = Random::seeded(42);
        let faults = (0..10_000).filter(|_| random.fault()).count();
        assert!((700..1_300).contains(&faults), "{} faults", faults);
    }

    #[test]
    fn sequence_replays_then_falls_back() {
        let mut sequence = Sequence::new()
            .faults([true, false, true])
            .trade_counts([3])
            .volumes([dec!(1.5)]);

        assert!(sequence.fault());
        assert!(!sequence.fault());
        assert!(sequence.fault());
        assert!(!sequence.fault());
        assert_eq!(sequence.trade_count(), 3);
        assert_eq!(sequence.trade_count(), 1);
        assert_eq!(sequence.volume(), dec!(1.5));
        assert_eq!(sequence.volume(), dec!(0));
        assert_eq!(sequence.delay(), Duration::ZERO);
    }
}
