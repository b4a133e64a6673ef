use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Inclusive `low..=high` range that a value is drawn uniformly from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span<T> {
    pub low: T,
    pub high: T,
}

impl<T> Span<T> {
    pub const fn new(low: T, high: T) -> Self {
        Self { low, high }
    }
}

impl<T: PartialOrd> Span<T> {
    pub fn is_ordered(&self) -> bool {
        self.low <= self.high
    }
}

impl Span<f64> {
    pub fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        rng.gen_range(self.low..=self.high)
    }
}

impl Span<u32> {
    pub fn sample(&self, rng: &mut dyn RngCore) -> u32 {
        rng.gen_range(self.low..=self.high)
    }
}

/// Tunables for one typing run. Delays are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingConfig {
    pub min_delay: f64,
    pub max_delay: f64,
    /// Added after `. ? ! , ; :` and newlines.
    pub punctuation_pause: Span<f64>,
    /// Per-character probability of injecting a typo at an eligible position.
    pub backtrack_chance: f64,
    /// How many characters get typed after a typo before it is noticed.
    pub steps_till_backtrack: Span<u32>,
    /// Delay multiplier compounded once every `fatigue_interval` characters.
    pub fatigue_scale: f64,
    pub fatigue_interval: u32,
    pub enable_typos: bool,
    pub enable_jitter: bool,
    pub enable_fatigue: bool,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            min_delay: 0.035,
            max_delay: 0.1,
            punctuation_pause: Span::new(0.25, 0.65),
            backtrack_chance: 0.015,
            steps_till_backtrack: Span::new(2, 10),
            fatigue_scale: 1.01,
            fatigue_interval: 50,
            enable_typos: true,
            enable_jitter: true,
            enable_fatigue: true,
        }
    }
}

fn check(ok: bool, field: &'static str, reason: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::new(field, reason))
    }
}

fn check_delay(value: f64, field: &'static str) -> Result<(), ConfigError> {
    check(
        value.is_finite() && value >= 0.0,
        field,
        "must be a finite, non-negative number of seconds",
    )
}

impl TypingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_delay(self.min_delay, "min_delay")?;
        check_delay(self.max_delay, "max_delay")?;
        check(
            self.min_delay <= self.max_delay,
            "min_delay",
            "must be <= max_delay",
        )?;

        check_delay(self.punctuation_pause.low, "punctuation_pause.low")?;
        check_delay(self.punctuation_pause.high, "punctuation_pause.high")?;
        check(
            self.punctuation_pause.is_ordered(),
            "punctuation_pause",
            "low must be <= high",
        )?;

        check(
            self.backtrack_chance.is_finite() && (0.0..=1.0).contains(&self.backtrack_chance),
            "backtrack_chance",
            "must be between 0.0 and 1.0",
        )?;
        check(
            self.steps_till_backtrack.is_ordered(),
            "steps_till_backtrack",
            "low must be <= high",
        )?;

        check(
            self.fatigue_scale.is_finite() && self.fatigue_scale >= 1.0,
            "fatigue_scale",
            "must be a finite multiplier >= 1.0",
        )?;
        check(self.fatigue_interval > 0, "fatigue_interval", "must be >= 1")?;

        Ok(())
    }
}
