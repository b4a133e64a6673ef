//! Operator pause/resume/restart signalling.
//!
//! ```text
//! Running ──request_pause──▶ PauseRequested ──(next char boundary)──▶ Paused
//! Paused  ──resume──▶ Running
//! Paused  ──request_restart──▶ RestartRequested ──(boundary)──▶ Running, from char 0
//! any     ──interrupt──▶ stream stops, not resumable
//! ```
//!
//! External actors only ever write requests; the typing loop is the only
//! reader and acts on them between characters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PauseState {
    #[default]
    Running,
    PauseRequested,
    Paused,
    RestartRequested,
}

/// What the typing loop should do at a character boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    /// The loop was parked and has been resumed.
    Resumed,
    Restart,
    Interrupted,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<PauseState>,
    changed: Condvar,
    interrupted: AtomicBool,
}

/// Cheaply cloneable handle; all clones drive the same state.
#[derive(Debug, Clone, Default)]
pub struct PauseController {
    inner: Arc<Inner>,
}

impl PauseController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PauseState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, from: &[PauseState], to: PauseState) -> bool {
        let mut state = self.lock();
        if !from.contains(&*state) {
            return false;
        }
        log::debug!("pause state {:?} -> {:?}", *state, to);
        *state = to;
        self.inner.changed.notify_all();
        true
    }

    pub fn state(&self) -> PauseState {
        *self.lock()
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Ask the loop to park at the next character boundary.
    pub fn request_pause(&self) -> bool {
        self.transition(&[PauseState::Running], PauseState::PauseRequested)
    }

    /// Resume a parked loop, or withdraw a pause that has not taken effect.
    pub fn resume(&self) -> bool {
        self.transition(
            &[PauseState::Paused, PauseState::PauseRequested],
            PauseState::Running,
        )
    }

    /// Only honoured while paused.
    pub fn request_restart(&self) -> bool {
        self.transition(&[PauseState::Paused], PauseState::RestartRequested)
    }

    /// Enter-key behaviour: pause when running, resume when paused.
    pub fn toggle_pause(&self) -> PauseState {
        let mut state = self.lock();
        let next = match *state {
            PauseState::Running => PauseState::PauseRequested,
            PauseState::Paused | PauseState::PauseRequested => PauseState::Running,
            PauseState::RestartRequested => PauseState::RestartRequested,
        };
        if next != *state {
            log::debug!("pause state {:?} -> {:?}", *state, next);
            *state = next;
            self.inner.changed.notify_all();
        }
        next
    }

    /// Stop the stream for good. Wakes a parked loop.
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        let _state = self.lock();
        self.inner.changed.notify_all();
    }

    /// Block until the loop has actually parked, up to `timeout`.
    pub fn wait_until_paused(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .inner
            .changed
            .wait_timeout_while(state, timeout, |s| {
                *s != PauseState::Paused && !self.is_interrupted()
            })
            .unwrap_or_else(PoisonError::into_inner);
        *state == PauseState::Paused
    }

    /// Called by the typing loop between characters only.
    ///
    /// `on_pause` runs once the loop parks, before it blocks, and must not
    /// call back into this controller's blocking methods.
    pub fn checkpoint(&self, on_pause: impl FnOnce()) -> Checkpoint {
        if self.is_interrupted() {
            return Checkpoint::Interrupted;
        }

        let mut state = self.lock();
        match *state {
            PauseState::Running => return Checkpoint::Continue,
            PauseState::RestartRequested => {
                *state = PauseState::Running;
                return Checkpoint::Restart;
            }
            PauseState::PauseRequested => {
                *state = PauseState::Paused;
                self.inner.changed.notify_all();
            }
            PauseState::Paused => {}
        }
        drop(state);

        on_pause();

        let mut state = self
            .inner
            .changed
            .wait_while(self.lock(), |s| {
                *s == PauseState::Paused && !self.is_interrupted()
            })
            .unwrap_or_else(PoisonError::into_inner);

        if self.is_interrupted() {
            return Checkpoint::Interrupted;
        }
        match *state {
            PauseState::RestartRequested => {
                *state = PauseState::Running;
                Checkpoint::Restart
            }
            // A pause re-requested while waking is honoured at the next boundary.
            _ => Checkpoint::Resumed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn running_loop_continues() {
        let signal = PauseController::new();
        assert_eq!(signal.checkpoint(|| panic!("must not park")), Checkpoint::Continue);
    }

    #[test]
    fn restart_is_only_accepted_while_paused() {
        let signal = PauseController::new();
        assert!(!signal.request_restart());
        assert!(signal.request_pause());
        assert!(!signal.request_restart(), "pause not yet observed");
        assert!(!signal.request_pause(), "already requested");
    }

    #[test]
    fn resume_releases_a_parked_loop() {
        let signal = PauseController::new();
        signal.request_pause();

        let remote = signal.clone();
        let handle = thread::spawn(move || {
            assert!(remote.wait_until_paused(Duration::from_secs(5)));
            assert!(remote.resume());
        });

        let mut parked = false;
        assert_eq!(signal.checkpoint(|| parked = true), Checkpoint::Resumed);
        assert!(parked);
        assert_eq!(signal.state(), PauseState::Running);
        handle.join().unwrap();
    }

    #[test]
    fn restart_from_pause_returns_to_running() {
        let signal = PauseController::new();
        signal.request_pause();

        let remote = signal.clone();
        let handle = thread::spawn(move || {
            assert!(remote.wait_until_paused(Duration::from_secs(5)));
            assert!(remote.request_restart());
        });

        assert_eq!(signal.checkpoint(|| {}), Checkpoint::Restart);
        assert_eq!(signal.state(), PauseState::Running);
        handle.join().unwrap();
    }

    #[test]
    fn interrupt_wakes_a_parked_loop() {
        let signal = PauseController::new();
        signal.request_pause();

        let remote = signal.clone();
        let handle = thread::spawn(move || {
            assert!(remote.wait_until_paused(Duration::from_secs(5)));
            remote.interrupt();
        });

        assert_eq!(signal.checkpoint(|| {}), Checkpoint::Interrupted);
        handle.join().unwrap();
        assert_eq!(signal.checkpoint(|| {}), Checkpoint::Interrupted);
    }

    #[test]
    fn toggle_flips_between_running_and_pause() {
        let signal = PauseController::new();
        assert_eq!(signal.toggle_pause(), PauseState::PauseRequested);
        assert_eq!(signal.toggle_pause(), PauseState::Running);
    }
}
