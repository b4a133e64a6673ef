use rand::RngCore;

use crate::config::TypingConfig;
use crate::control::{Checkpoint, PauseController};
use crate::delay::DelayModel;
use crate::error::{Halt, TypingError};
use crate::pipeline::{Pipeline, StreamContext};
use crate::sink::{KeystrokeSink, Sleeper};

/// Terminal result of a stream that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Operator cancelled. Not an error; nothing was retried.
    Interrupted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamProgress {
    pub typed: usize,
    pub total: usize,
}

impl StreamProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.typed as f64 * 100.0 / self.total as f64
    }

    pub fn is_complete(&self) -> bool {
        self.typed >= self.total
    }
}

/// Notifications from the orchestrator. All methods default to no-ops.
pub trait StreamObserver {
    fn on_start(&mut self, _progress: StreamProgress) {}
    fn on_progress(&mut self, _progress: StreamProgress) {}
    fn on_paused(&mut self, _progress: StreamProgress) {}
    fn on_resumed(&mut self, _progress: StreamProgress) {}
    /// Runs after all per-stream state is reset, before character 0 is retyped.
    fn on_restart(&mut self) {}
    fn on_finished(&mut self, _outcome: Outcome, _progress: StreamProgress) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}

/// Logical characters of `text`: carriage returns are dropped, so CRLF input
/// types one Enter per line.
pub fn normalize(text: &str) -> Vec<char> {
    text.chars().filter(|&c| c != '\r').collect()
}

/// Drives one text through the pipeline into a sink, with human timing.
#[derive(Debug)]
pub struct Typist {
    config: TypingConfig,
    delays: DelayModel,
    pipeline: Pipeline,
    progress: StreamProgress,
}

impl Typist {
    /// Validates `config` and sets up the standard pipeline.
    pub fn new(config: TypingConfig) -> Result<Self, TypingError> {
        Self::with_extra_modules(config, Pipeline::new())
    }

    /// Like [`Typist::new`], with `extra` modules run after the standard ones.
    ///
    /// The standard modules are always built from `config`, so every module
    /// and the delay model see the same validated settings.
    pub fn with_extra_modules(
        config: TypingConfig,
        extra: Pipeline,
    ) -> Result<Self, TypingError> {
        config.validate()?;
        let mut pipeline = Pipeline::standard(&config)?;
        pipeline.append(extra);
        Ok(Self {
            delays: DelayModel::new(config.clone()),
            config,
            pipeline,
            progress: StreamProgress::default(),
        })
    }

    pub fn config(&self) -> &TypingConfig {
        &self.config
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    pub fn progress(&self) -> StreamProgress {
        self.progress
    }

    /// No pending correction or other module state left over.
    pub fn is_settled(&self) -> bool {
        self.pipeline.is_settled()
    }

    /// Type `text` into `sink`.
    ///
    /// Sink failures abort the stream and are returned as errors; they are
    /// never retried. An interrupt on `signal` ends the stream with
    /// [`Outcome::Interrupted`] and abandons any pending correction.
    pub fn type_stream(
        &mut self,
        text: &str,
        sink: &mut dyn KeystrokeSink,
        sleeper: &dyn Sleeper,
        signal: &PauseController,
        rng: &mut dyn RngCore,
        observer: &mut dyn StreamObserver,
    ) -> Result<Outcome, TypingError> {
        let chars = normalize(text);
        self.pipeline.reset();
        self.progress = StreamProgress {
            typed: 0,
            total: chars.len(),
        };
        log::info!(
            "typing {} chars through {:?}",
            self.progress.total,
            self.pipeline
        );
        observer.on_start(self.progress);

        let mut ctx = StreamContext::new(sink, sleeper, signal, &self.delays, rng);
        let result = run_stream(
            &mut self.pipeline,
            &mut self.progress,
            &mut ctx,
            &chars,
            signal,
            observer,
        );

        match result {
            Ok(()) => {
                log::info!("stream completed");
                observer.on_finished(Outcome::Completed, self.progress);
                Ok(Outcome::Completed)
            }
            Err(Halt::Interrupted) => {
                if !self.pipeline.is_settled() {
                    log::warn!("interrupted with a correction pending; leaving it uncorrected");
                }
                self.pipeline.reset();
                log::warn!(
                    "stream interrupted at {}/{}",
                    self.progress.typed,
                    self.progress.total
                );
                observer.on_finished(Outcome::Interrupted, self.progress);
                Ok(Outcome::Interrupted)
            }
            Err(Halt::Sink(err)) => {
                self.pipeline.reset();
                Err(err.into())
            }
        }
    }
}

fn run_stream(
    pipeline: &mut Pipeline,
    progress: &mut StreamProgress,
    ctx: &mut StreamContext<'_>,
    chars: &[char],
    signal: &PauseController,
    observer: &mut dyn StreamObserver,
) -> Result<(), Halt> {
    'stream: loop {
        let mut index = 0;
        while index < chars.len() {
            let snapshot = *progress;
            match signal.checkpoint(|| observer.on_paused(snapshot)) {
                Checkpoint::Continue => {}
                Checkpoint::Resumed => observer.on_resumed(*progress),
                Checkpoint::Interrupted => return Err(Halt::Interrupted),
                Checkpoint::Restart => {
                    log::info!("restarting stream from the first character");
                    pipeline.reset();
                    progress.typed = 0;
                    observer.on_restart();
                    continue 'stream;
                }
            }

            ctx.set_typed_count(progress.typed);
            type_character(pipeline, ctx, chars[index], index)?;

            index += 1;
            progress.typed = index;
            observer.on_progress(*progress);
        }

        return pipeline.finish(ctx);
    }
}

fn type_character(
    pipeline: &mut Pipeline,
    ctx: &mut StreamContext<'_>,
    c: char,
    index: usize,
) -> Result<(), Halt> {
    let out = pipeline.process_character(ctx, c, index)?;
    // Timing follows what was meant, not the slip.
    let delay = ctx.delay_for(c);
    ctx.send_char(out)?;
    ctx.sleep(delay)
}
