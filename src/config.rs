use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::ConfigError;

pub const DEFAULT_PHILOSOPHERS: usize = 5;
pub const DEFAULT_APPETITE: usize = 5;

const DEFAULT_PICKUP_DELAY: Duration = Duration::from_millis(50);
const DEFAULT_STAGGER: Duration = Duration::from_millis(1800);

/// 一様乱数で待ち時間を決めるための区間 [min, max]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationRange {
    pub min: Duration,
    pub max: Duration,
}

impl DurationRange {
    pub const fn new(min: Duration, max: Duration) -> Self {
        DurationRange { min, max }
    }

    pub const fn fixed(d: Duration) -> Self {
        DurationRange { min: d, max: d }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.min >= self.max {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }

    fn validate(&self, phase: &'static str) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::InvalidDurationRange {
                phase,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// 哲学者ごとの待ち時間の設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub think: DurationRange,
    pub eat: DurationRange,
    // 1本目を取ってから2本目に手を伸ばすまでの間
    pub pickup_delay: Duration,
    // 開始時にずらす時間の上限
    pub stagger: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            think: DurationRange::new(Duration::from_secs(1), Duration::from_secs(2)),
            eat: DurationRange::new(Duration::from_secs(1), Duration::from_secs(2)),
            pickup_delay: DEFAULT_PICKUP_DELAY,
            stagger: DEFAULT_STAGGER,
        }
    }
}

impl Timing {
    /// 待ち時間をすべて 0 にする。テストでスケジューリングを詰めるときに使う
    pub fn immediate() -> Self {
        Timing {
            think: DurationRange::fixed(Duration::ZERO),
            eat: DurationRange::fixed(Duration::ZERO),
            pickup_delay: Duration::ZERO,
            stagger: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub philosophers: usize,
    pub appetite: usize,
    pub names: Option<Vec<String>>,
    pub timing: Timing,
    pub seed: Option<u64>,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig::new(DEFAULT_PHILOSOPHERS, DEFAULT_APPETITE)
    }
}

impl TableConfig {
    pub fn new(philosophers: usize, appetite: usize) -> Self {
        TableConfig {
            philosophers,
            appetite,
            names: None,
            timing: Timing::default(),
            seed: None,
        }
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_think_range(mut self, min: Duration, max: Duration) -> Self {
        self.timing.think = DurationRange::new(min, max);
        self
    }

    pub fn with_eat_range(mut self, min: Duration, max: Duration) -> Self {
        self.timing.eat = DurationRange::new(min, max);
        self
    }

    pub fn with_pickup_delay(mut self, delay: Duration) -> Self {
        self.timing.pickup_delay = delay;
        self
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.timing.stagger = stagger;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.philosophers == 0 {
            return Err(ConfigError::InvalidPhilosopherCount {
                count: self.philosophers,
            });
        }
        if self.appetite == 0 {
            return Err(ConfigError::InvalidAppetite {
                appetite: self.appetite,
            });
        }
        if let Some(names) = &self.names {
            if names.len() != self.philosophers {
                return Err(ConfigError::NameCountMismatch {
                    expected: self.philosophers,
                    actual: names.len(),
                });
            }
        }
        self.timing.think.validate("think")?;
        self.timing.eat.validate("eat")?;
        Ok(())
    }

    /// seat 番目の表示名。指定がなければ "Philosopher <seat>"
    pub fn name_of(&self, seat: usize) -> String {
        self.names
            .as_ref()
            .and_then(|names| names.get(seat).cloned())
            .unwrap_or_else(|| format!("Philosopher {seat}"))
    }

    // シードがあれば席番号をずらして哲学者ごとに再現可能な乱数列にする
    pub(crate) fn rng_for(&self, seat: usize) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(seat as u64)),
            None => StdRng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = TableConfig::default();
        assert_eq!(config.philosophers, 5);
        assert_eq!(config.appetite, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_philosophers() {
        let err = TableConfig::new(0, 5).validate().unwrap_err();
        assert_eq!(err, ConfigError::InvalidPhilosopherCount { count: 0 });
    }

    #[test]
    fn test_rejects_zero_appetite() {
        let err = TableConfig::new(3, 0).validate().unwrap_err();
        assert_eq!(err, ConfigError::InvalidAppetite { appetite: 0 });
    }

    #[test]
    fn test_rejects_name_count_mismatch() {
        let err = TableConfig::new(3, 1)
            .with_names(["Plato", "Kant"])
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::NameCountMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_rejects_inverted_range() {
        let err = TableConfig::new(2, 1)
            .with_eat_range(Duration::from_millis(20), Duration::from_millis(10))
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDurationRange { phase: "eat", .. }
        ));
    }

    #[test]
    fn test_default_names() {
        let config = TableConfig::new(2, 1);
        assert_eq!(config.name_of(0), "Philosopher 0");
        assert_eq!(config.name_of(1), "Philosopher 1");

        let config = config.with_names(["Plato", "Kant"]);
        assert_eq!(config.name_of(1), "Kant");
    }

    #[test]
    fn test_sample_stays_in_range() {
        let range = DurationRange::new(Duration::from_millis(10), Duration::from_millis(20));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let d = range.sample(&mut rng);
            assert!(d >= range.min && d <= range.max);
        }

        let fixed = DurationRange::fixed(Duration::from_millis(3));
        assert_eq!(fixed.sample(&mut rng), Duration::from_millis(3));
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let config = TableConfig::new(2, 1).with_seed(42);
        let range = DurationRange::new(Duration::ZERO, Duration::from_secs(10));
        let a: Vec<_> = {
            let mut rng = config.rng_for(1);
            (0..8).map(|_| range.sample(&mut rng)).collect()
        };
        let b: Vec<_> = {
            let mut rng = config.rng_for(1);
            (0..8).map(|_| range.sample(&mut rng)).collect()
        };
        assert_eq!(a, b);
    }
}
