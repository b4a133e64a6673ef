use std::fmt;
use std::time::Duration;

use rand::RngCore;

use crate::config::TypingConfig;
use crate::control::PauseController;
use crate::delay::DelayModel;
use crate::error::{ConfigError, Halt, SinkAction, SinkError};
use crate::sink::{KeystrokeSink, Sleeper};
use crate::typo::TypoModule;

/// Everything a pipeline module may touch while a stream is running.
///
/// Every keystroke and sleep goes through here so an interrupt stops output
/// between any two keystrokes, including in the middle of a correction.
pub struct StreamContext<'a> {
    sink: &'a mut dyn KeystrokeSink,
    sleeper: &'a dyn Sleeper,
    signal: &'a PauseController,
    delays: &'a DelayModel,
    rng: &'a mut dyn RngCore,
    typed_count: usize,
}

impl<'a> StreamContext<'a> {
    pub fn new(
        sink: &'a mut dyn KeystrokeSink,
        sleeper: &'a dyn Sleeper,
        signal: &'a PauseController,
        delays: &'a DelayModel,
        rng: &'a mut dyn RngCore,
    ) -> Self {
        Self {
            sink,
            sleeper,
            signal,
            delays,
            rng,
            typed_count: 0,
        }
    }

    pub fn rng(&mut self) -> &mut (dyn RngCore + 'a) {
        &mut *self.rng
    }

    /// Characters of the stream typed so far (corrections not included).
    pub fn typed_count(&self) -> usize {
        self.typed_count
    }

    pub(crate) fn set_typed_count(&mut self, typed_count: usize) {
        self.typed_count = typed_count;
    }

    pub fn delay_for(&mut self, c: char) -> Duration {
        self.delays.delay_for(c, self.typed_count, &mut *self.rng)
    }

    pub fn short_pause(&mut self) -> Duration {
        self.delays.short_pause(&mut *self.rng)
    }

    fn ensure_live(&self) -> Result<(), Halt> {
        if self.signal.is_interrupted() {
            Err(Halt::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Type one logical character; newline becomes an Enter press.
    pub fn send_char(&mut self, c: char) -> Result<(), Halt> {
        self.ensure_live()?;
        let (action, result) = if c == '\n' {
            (SinkAction::Enter, self.sink.press_enter())
        } else {
            (SinkAction::Text(c), self.sink.insert_text(c))
        };
        result.map_err(|source| SinkError { action, source })?;
        Ok(())
    }

    pub fn press_backspace(&mut self) -> Result<(), Halt> {
        self.ensure_live()?;
        self.sink.press_backspace().map_err(|source| SinkError {
            action: SinkAction::Backspace,
            source,
        })?;
        Ok(())
    }

    pub fn sleep(&mut self, duration: Duration) -> Result<(), Halt> {
        self.ensure_live()?;
        self.sleeper.sleep(duration, self.signal);
        self.ensure_live()
    }
}

/// A behaviour hooked into the per-character lifecycle.
///
/// For each character the orchestrator runs, across all modules in order,
/// `pre_character` then `tick`; then folds `transform` over the modules to
/// pick what is actually typed. `stream_end` runs once after the last
/// character.
pub trait PipelineModule {
    fn name(&self) -> &'static str;

    fn pre_character(&mut self, _ctx: &mut StreamContext<'_>) -> Result<(), Halt> {
        Ok(())
    }

    fn tick(&mut self, _c: char) {}

    fn transform(&mut self, _ctx: &mut StreamContext<'_>, c: char, _index: usize) -> char {
        c
    }

    fn stream_end(&mut self, _ctx: &mut StreamContext<'_>) -> Result<(), Halt> {
        Ok(())
    }

    /// Drop all per-stream state (restart, interrupt, new stream).
    fn reset(&mut self) {}

    /// No work outstanding that would have to be flushed at stream end.
    fn is_settled(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct Pipeline {
    modules: Vec<Box<dyn PipelineModule>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in module set for `config`.
    pub fn standard(config: &TypingConfig) -> Result<Self, ConfigError> {
        let mut pipeline = Self::new();
        pipeline.register(TypoModule::new(config)?);
        Ok(pipeline)
    }

    pub fn register(&mut self, module: impl PipelineModule + 'static) -> &mut Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Move every module of `other` to the end of this pipeline.
    pub fn append(&mut self, mut other: Pipeline) -> &mut Self {
        self.modules.append(&mut other.modules);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Run the lifecycle for `c` and return the character to type now.
    pub fn process_character(
        &mut self,
        ctx: &mut StreamContext<'_>,
        c: char,
        index: usize,
    ) -> Result<char, Halt> {
        for module in &mut self.modules {
            module.pre_character(ctx)?;
            module.tick(c);
        }

        let mut out = c;
        for module in &mut self.modules {
            out = module.transform(ctx, out, index);
        }
        Ok(out)
    }

    pub fn finish(&mut self, ctx: &mut StreamContext<'_>) -> Result<(), Halt> {
        for module in &mut self.modules {
            module.stream_end(ctx)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        for module in &mut self.modules {
            module.reset();
        }
    }

    pub fn is_settled(&self) -> bool {
        self.modules.iter().all(|m| m.is_settled())
    }
}
