use rand::{Rng, RngCore};

use crate::config::{Span, TypingConfig};
use crate::error::{ConfigError, Halt};
use crate::keyboard::typo_for;
use crate::pipeline::{PipelineModule, StreamContext};

// Never slip on the first few characters of a stream.
const MIN_TYPO_INDEX: usize = 3;

// Backspacing a noticed mistake is slower than plain typing.
const BACKSPACE_PAUSE_FACTOR: f64 = 2.5;

/// A typo that has been typed but not yet noticed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCorrection {
    /// What should have been typed instead of the slip.
    pub correct_char: char,
    /// Characters still to be typed before the slip is noticed.
    pub steps_remaining: u32,
    /// Backspaces needed once noticed: the slip plus everything after it.
    pub backtrack_amount: u32,
    /// Characters typed since the slip, to be retyped after the fix.
    pub backlog: Vec<char>,
}

impl PendingCorrection {
    pub fn new(correct_char: char, steps: u32) -> Self {
        Self {
            correct_char,
            steps_remaining: steps,
            backtrack_amount: steps.saturating_add(1),
            backlog: Vec::with_capacity(steps as usize),
        }
    }

    pub fn is_due(&self) -> bool {
        self.steps_remaining == 0
    }

    /// Backspaces that actually land on typed characters.
    ///
    /// Equal to `backtrack_amount` once due; smaller when a stream ends
    /// before the countdown finished, so text before the slip survives.
    /// An early flush therefore erases fewer than `steps + 1` characters,
    /// unlike a due correction.
    pub fn backspaces(&self) -> u32 {
        let typed_since = u32::try_from(self.backlog.len())
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        self.backtrack_amount.min(typed_since)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CorrectionState {
    #[default]
    Idle,
    Pending(PendingCorrection),
}

/// Injects keyboard-neighbor slips and later backspaces over them.
#[derive(Debug, Clone)]
pub struct TypoModule {
    enabled: bool,
    chance: f64,
    steps: Span<u32>,
    state: CorrectionState,
}

impl TypoModule {
    pub fn new(config: &TypingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            enabled: config.enable_typos,
            chance: config.backtrack_chance,
            steps: config.steps_till_backtrack,
            state: CorrectionState::Idle,
        })
    }

    pub fn state(&self) -> &CorrectionState {
        &self.state
    }

    pub fn pending(&self) -> Option<&PendingCorrection> {
        match &self.state {
            CorrectionState::Idle => None,
            CorrectionState::Pending(pending) => Some(pending),
        }
    }

    pub fn should_start_typo(&self, c: char, index: usize, rng: &mut dyn RngCore) -> bool {
        if !self.enabled || self.pending().is_some() {
            return false;
        }
        if index < MIN_TYPO_INDEX || c.is_whitespace() {
            return false;
        }
        rng.gen_bool(self.chance)
    }

    /// Start tracking a slip on `correct_char`. Returns how many characters
    /// will be typed before it is noticed.
    pub fn register_typo(&mut self, correct_char: char, rng: &mut dyn RngCore) -> u32 {
        let steps = self.steps.sample(rng);
        log::debug!("typo on {correct_char:?}, noticed after {steps} more chars");
        self.state = CorrectionState::Pending(PendingCorrection::new(correct_char, steps));
        steps
    }

    /// Register a slip on `c` and return the wrong character to type.
    pub fn generate_typo(&mut self, c: char, rng: &mut dyn RngCore) -> char {
        self.register_typo(c, rng);
        typo_for(c, rng)
    }

    /// Backspace over the slip and everything after it, then retype.
    ///
    /// The pending state is taken up front: if the sequence is cut short by an
    /// interrupt or a sink failure, the correction is abandoned, not retried.
    fn perform_correction(&mut self, ctx: &mut StreamContext<'_>) -> Result<(), Halt> {
        let CorrectionState::Pending(pending) = std::mem::take(&mut self.state) else {
            return Ok(());
        };

        let backspaces = pending.backspaces();
        log::debug!(
            "correcting {:?}: {} backspaces, {} backlog chars",
            pending.correct_char,
            backspaces,
            pending.backlog.len()
        );

        let short_pause = ctx.short_pause();
        for _ in 0..backspaces {
            ctx.press_backspace()?;
            ctx.sleep(short_pause.mul_f64(BACKSPACE_PAUSE_FACTOR))?;
        }

        ctx.send_char(pending.correct_char)?;
        ctx.sleep(short_pause)?;

        for &c in &pending.backlog {
            let delay = ctx.delay_for(c);
            ctx.send_char(c)?;
            ctx.sleep(delay)?;
        }

        Ok(())
    }
}

impl PipelineModule for TypoModule {
    fn name(&self) -> &'static str {
        "typos"
    }

    fn pre_character(&mut self, ctx: &mut StreamContext<'_>) -> Result<(), Halt> {
        match &self.state {
            CorrectionState::Pending(pending) if pending.is_due() => self.perform_correction(ctx),
            _ => Ok(()),
        }
    }

    fn tick(&mut self, c: char) {
        if let CorrectionState::Pending(pending) = &mut self.state {
            pending.backlog.push(c);
            pending.steps_remaining = pending.steps_remaining.saturating_sub(1);
        }
    }

    fn transform(&mut self, ctx: &mut StreamContext<'_>, c: char, index: usize) -> char {
        if self.should_start_typo(c, index, ctx.rng()) {
            self.generate_typo(c, ctx.rng())
        } else {
            c
        }
    }

    fn stream_end(&mut self, ctx: &mut StreamContext<'_>) -> Result<(), Halt> {
        self.perform_correction(ctx)
    }

    fn reset(&mut self) {
        self.state = CorrectionState::Idle;
    }

    fn is_settled(&self) -> bool {
        self.state == CorrectionState::Idle
    }
}
