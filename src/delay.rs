use std::time::Duration;

use rand::RngCore;

use crate::config::{Span, TypingConfig};

/// Characters that earn an extra `punctuation_pause` (newline too).
pub const PAUSE_PUNCTUATION: [char; 6] = ['.', '?', '!', ',', ';', ':'];

// Occasional hesitation between words.
const SPACE_PAUSE: Span<f64> = Span::new(0.0, 0.08);

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

/// Per-keystroke delays. Pure apart from the random draws.
#[derive(Debug, Clone)]
pub struct DelayModel {
    config: TypingConfig,
}

impl DelayModel {
    pub fn new(config: TypingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TypingConfig {
        &self.config
    }

    /// Compounding slowdown after `typed_count` characters.
    pub fn fatigue_multiplier(&self, typed_count: usize) -> f64 {
        if !self.config.enable_fatigue {
            return 1.0;
        }
        let level = typed_count / self.config.fatigue_interval.max(1) as usize;
        let level = i32::try_from(level).unwrap_or(i32::MAX);
        self.config.fatigue_scale.powi(level)
    }

    /// Delay to hold after typing `c`, given how many characters the stream
    /// has typed so far.
    pub fn delay_for(&self, c: char, typed_count: usize, rng: &mut dyn RngCore) -> Duration {
        let multiplier = self.fatigue_multiplier(typed_count);
        if !self.config.enable_jitter {
            return secs(self.config.min_delay * multiplier);
        }

        let mut delay = Span::new(self.config.min_delay, self.config.max_delay).sample(rng);
        if c == '\n' || PAUSE_PUNCTUATION.contains(&c) {
            delay += self.config.punctuation_pause.sample(rng);
        } else if c == ' ' {
            delay += SPACE_PAUSE.sample(rng);
        }

        secs(delay * multiplier)
    }

    /// Pause used while backspacing out a mistake.
    ///
    /// Drawn from `[0.5 * min_delay, 1.5 * max_delay]`, independent of the
    /// character and of fatigue.
    pub fn short_pause(&self, rng: &mut dyn RngCore) -> Duration {
        secs(Span::new(self.config.min_delay * 0.5, self.config.max_delay * 1.5).sample(rng))
    }
}
