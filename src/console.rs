//! Operator-facing terminal output. Everything goes to stderr so stdout stays
//! clean for action logs.

use std::io::Write;
use std::time::Duration;

use crate::control::PauseController;
use crate::sink::sleep_interruptible;
use crate::stream::{Outcome, StreamObserver, StreamProgress};

const RESET: &str = "\x1b[0m";
const STATUS: &str = "\x1b[34m";
const PAUSED: &str = "\x1b[33m";
const DONE: &str = "\x1b[32m";
const STOPPED: &str = "\x1b[31m";

/// Count down `secs` seconds on stderr. Returns `false` if interrupted.
pub fn countdown(signal: &PauseController, secs: u64) -> bool {
    if secs == 0 {
        return !signal.is_interrupted();
    }

    eprintln!("Focus the target window. Starting in {secs}s...");
    for remaining in (1..=secs).rev() {
        if signal.is_interrupted() {
            return false;
        }
        eprintln!("{remaining}...");
        sleep_interruptible(signal, Duration::from_secs(1));
    }
    !signal.is_interrupted()
}

/// Status line and pause/restart prompts for a live run.
#[derive(Debug)]
pub struct ConsoleObserver {
    signal: PauseController,
    quiet: bool,
    restart_countdown: u64,
    status_open: bool,
}

impl ConsoleObserver {
    pub fn new(signal: PauseController) -> Self {
        Self {
            signal,
            quiet: false,
            restart_countdown: 0,
            status_open: false,
        }
    }

    /// Suppress the per-character status line.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Seconds to count down after a restart before retyping.
    pub fn restart_countdown(mut self, secs: u64) -> Self {
        self.restart_countdown = secs;
        self
    }

    fn end_status_line(&mut self) {
        if self.status_open {
            eprintln!();
            self.status_open = false;
        }
    }
}

pub fn status_line(progress: StreamProgress) -> String {
    format!(
        "{STATUS}Typing{RESET} {:5.1}% ({}/{})",
        progress.percent(),
        progress.typed,
        progress.total
    )
}

impl StreamObserver for ConsoleObserver {
    fn on_start(&mut self, progress: StreamProgress) {
        eprintln!(
            "Typing {} characters. Press Enter to pause, Ctrl+C to stop.",
            progress.total
        );
    }

    fn on_progress(&mut self, progress: StreamProgress) {
        if self.quiet {
            return;
        }
        eprint!("\r{}", status_line(progress));
        let _ = std::io::stderr().flush();
        self.status_open = true;
    }

    fn on_paused(&mut self, progress: StreamProgress) {
        self.end_status_line();
        eprintln!(
            "{PAUSED}Paused{RESET} at {}/{}. Press Enter to resume, Ctrl+C to restart.",
            progress.typed, progress.total
        );
    }

    fn on_resumed(&mut self, _progress: StreamProgress) {
        eprintln!("Resumed.");
    }

    fn on_restart(&mut self) {
        self.end_status_line();
        eprintln!("{PAUSED}Restarting{RESET} from the beginning. Clear the target text.");
        countdown(&self.signal, self.restart_countdown);
    }

    fn on_finished(&mut self, outcome: Outcome, progress: StreamProgress) {
        self.end_status_line();
        match outcome {
            Outcome::Completed => {
                eprintln!("{DONE}Done{RESET}: typed {} characters.", progress.typed)
            }
            Outcome::Interrupted => eprintln!(
                "{STOPPED}Interrupted{RESET} at {}/{}.",
                progress.typed, progress.total
            ),
        }
    }
}
