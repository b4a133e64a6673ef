use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;

use crate::control::PauseController;
use crate::model::Action;

/// Where keystrokes end up. The engine never inspects the target surface.
pub trait KeystrokeSink {
    fn press_enter(&mut self) -> Result<()>;
    fn press_backspace(&mut self) -> Result<()>;
    fn insert_text(&mut self, c: char) -> Result<()>;
}

/// Time-suspension primitive used between keystrokes.
///
/// Implementations should return early once `signal` reports an interrupt.
pub trait Sleeper {
    fn sleep(&self, duration: Duration, signal: &PauseController);
}

const SLEEP_STEP: Duration = Duration::from_millis(50);

pub(crate) fn sleep_interruptible(signal: &PauseController, duration: Duration) {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if signal.is_interrupted() {
            return;
        }
        let step = remaining.min(SLEEP_STEP);
        std::thread::sleep(step);
        remaining -= step;
    }
}

/// Real wall-clock sleeping, in short slices so an interrupt is noticed fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, signal: &PauseController) {
        sleep_interruptible(signal, duration);
    }
}

/// Sink and sleeper in one that records everything instead of typing or
/// sleeping. Clones share the same log, so one clone can be the sink while
/// another is the sleeper.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Vec<Action>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn keystroke_count(&self) -> usize {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| a.is_keystroke())
            .count()
    }

    fn push(&self, action: Action) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }
}

impl KeystrokeSink for Recorder {
    fn press_enter(&mut self) -> Result<()> {
        self.push(Action::Enter);
        Ok(())
    }

    fn press_backspace(&mut self) -> Result<()> {
        self.push(Action::Backspace);
        Ok(())
    }

    fn insert_text(&mut self, c: char) -> Result<()> {
        self.push(Action::Text { ch: c });
        Ok(())
    }
}

impl Sleeper for Recorder {
    fn sleep(&self, duration: Duration, _signal: &PauseController) {
        self.push(Action::wait(duration));
    }
}
