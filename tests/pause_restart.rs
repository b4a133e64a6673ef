use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use keycadence::config::{Span, TypingConfig};
use keycadence::control::{PauseController, PauseState};
use keycadence::model::Action;
use keycadence::sim::{simulate_typed_text, stats};
use keycadence::sink::{KeystrokeSink, Recorder};
use keycadence::stream::{Outcome, StreamObserver, StreamProgress, Typist};

const TEXT: &str = "abcdefghijklmnopqrst";

/// Fires a control request on the signal right after the Nth keystroke.
struct TriggerSink {
    inner: Recorder,
    signal: PauseController,
    after: usize,
    trigger: fn(&PauseController),
    count: usize,
}

impl TriggerSink {
    fn new(
        inner: Recorder,
        signal: &PauseController,
        after: usize,
        trigger: fn(&PauseController),
    ) -> Self {
        Self {
            inner,
            signal: signal.clone(),
            after,
            trigger,
            count: 0,
        }
    }

    fn bump(&mut self) {
        self.count += 1;
        if self.count == self.after {
            (self.trigger)(&self.signal);
        }
    }
}

impl KeystrokeSink for TriggerSink {
    fn press_enter(&mut self) -> anyhow::Result<()> {
        self.inner.press_enter()?;
        self.bump();
        Ok(())
    }

    fn press_backspace(&mut self) -> anyhow::Result<()> {
        self.inner.press_backspace()?;
        self.bump();
        Ok(())
    }

    fn insert_text(&mut self, c: char) -> anyhow::Result<()> {
        self.inner.insert_text(c)?;
        self.bump();
        Ok(())
    }
}

#[derive(Default)]
struct Events {
    paused_at: Vec<usize>,
    resumed: usize,
    restarts: usize,
    finished: Option<(Outcome, StreamProgress)>,
}

impl StreamObserver for Events {
    fn on_paused(&mut self, progress: StreamProgress) {
        self.paused_at.push(progress.typed);
    }

    fn on_resumed(&mut self, _progress: StreamProgress) {
        self.resumed += 1;
    }

    fn on_restart(&mut self) {
        self.restarts += 1;
    }

    fn on_finished(&mut self, outcome: Outcome, progress: StreamProgress) {
        self.finished = Some((outcome, progress));
    }
}

fn no_typos() -> TypingConfig {
    TypingConfig {
        enable_typos: false,
        ..Default::default()
    }
}

fn request_pause(signal: &PauseController) {
    assert!(signal.request_pause());
}

fn text_keystrokes(actions: &[Action]) -> usize {
    actions
        .iter()
        .filter(|a| matches!(a, Action::Text { .. }))
        .count()
}

#[test]
fn pause_holds_output_until_resumed() {
    let mut typist = Typist::new(no_typos()).unwrap();
    let recorder = Recorder::new();
    let signal = PauseController::new();
    let mut sink = TriggerSink::new(recorder.clone(), &signal, 5, request_pause);

    let operator = {
        let signal = signal.clone();
        let recorder = recorder.clone();
        thread::spawn(move || {
            assert!(signal.wait_until_paused(Duration::from_secs(10)));
            let parked = recorder.keystroke_count();
            thread::sleep(Duration::from_millis(50));
            assert_eq!(recorder.keystroke_count(), parked);
            assert!(signal.resume());
            parked
        })
    };

    let mut events = Events::default();
    let outcome = typist
        .type_stream(
            TEXT,
            &mut sink,
            &recorder,
            &signal,
            &mut StdRng::seed_from_u64(1),
            &mut events,
        )
        .unwrap();

    assert_eq!(operator.join().unwrap(), 5);
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(events.paused_at, vec![5]);
    assert_eq!(events.resumed, 1);

    let actions = recorder.actions();
    assert_eq!(stats(&actions).keystrokes, 20);
    assert_eq!(simulate_typed_text(&actions), TEXT);
    assert_eq!(signal.state(), PauseState::Running);
}

#[test]
fn restart_while_paused_retypes_from_the_first_character() {
    let mut typist = Typist::new(no_typos()).unwrap();
    let recorder = Recorder::new();
    let signal = PauseController::new();
    let mut sink = TriggerSink::new(recorder.clone(), &signal, 5, request_pause);

    let operator = {
        let signal = signal.clone();
        thread::spawn(move || {
            assert!(signal.wait_until_paused(Duration::from_secs(10)));
            assert!(signal.request_restart());
        })
    };

    let mut events = Events::default();
    let outcome = typist
        .type_stream(
            TEXT,
            &mut sink,
            &recorder,
            &signal,
            &mut StdRng::seed_from_u64(2),
            &mut events,
        )
        .unwrap();
    operator.join().unwrap();

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(events.restarts, 1);
    assert_eq!(events.resumed, 0);
    assert_eq!(
        events.finished,
        Some((Outcome::Completed, StreamProgress { typed: 20, total: 20 }))
    );

    let actions = recorder.actions();
    assert_eq!(text_keystrokes(&actions), 25);
    assert_eq!(simulate_typed_text(&actions), format!("abcde{TEXT}"));
}

#[test]
fn restart_drops_a_pending_correction() {
    let config = TypingConfig {
        backtrack_chance: 1.0,
        steps_till_backtrack: Span::new(10, 10),
        ..Default::default()
    };
    let mut typist = Typist::new(config).unwrap();
    let recorder = Recorder::new();
    let signal = PauseController::new();
    // Typo at index 3, pause two characters later, long before it is noticed.
    let mut sink = TriggerSink::new(recorder.clone(), &signal, 6, request_pause);

    let operator = {
        let signal = signal.clone();
        thread::spawn(move || {
            assert!(signal.wait_until_paused(Duration::from_secs(10)));
            assert!(signal.request_restart());
        })
    };

    let outcome = typist
        .type_stream(
            TEXT,
            &mut sink,
            &recorder,
            &signal,
            &mut StdRng::seed_from_u64(3),
            &mut Events::default(),
        )
        .unwrap();
    operator.join().unwrap();

    assert_eq!(outcome, Outcome::Completed);
    assert!(typist.is_settled());

    // The first pass's slip is never backspaced: after the restart only the
    // second pass's own corrections run.
    let actions = recorder.actions();
    let first_backspace = actions
        .iter()
        .position(|a| *a == Action::Backspace)
        .unwrap();
    assert!(text_keystrokes(&actions[..first_backspace]) > 6 + 3);
    let replay = simulate_typed_text(&actions);
    assert!(replay.ends_with(TEXT), "{replay:?}");
    assert_eq!(replay.chars().count(), 26);
}

#[test]
fn interrupt_with_a_pending_correction_stops_immediately() {
    let config = TypingConfig {
        backtrack_chance: 1.0,
        steps_till_backtrack: Span::new(10, 10),
        ..Default::default()
    };
    let mut typist = Typist::new(config).unwrap();
    let recorder = Recorder::new();
    let signal = PauseController::new();
    let mut sink = TriggerSink::new(recorder.clone(), &signal, 5, PauseController::interrupt);

    let mut events = Events::default();
    let outcome = typist
        .type_stream(
            TEXT,
            &mut sink,
            &recorder,
            &signal,
            &mut StdRng::seed_from_u64(4),
            &mut events,
        )
        .unwrap();

    assert_eq!(outcome, Outcome::Interrupted);
    assert_eq!(
        events.finished,
        Some((Outcome::Interrupted, StreamProgress { typed: 4, total: 20 }))
    );

    let actions = recorder.actions();
    assert_eq!(stats(&actions).keystrokes, 5);
    assert_eq!(stats(&actions).backspaces, 0);
    assert!(typist.is_settled());
}

#[test]
fn interrupt_while_paused_ends_the_stream() {
    let mut typist = Typist::new(no_typos()).unwrap();
    let recorder = Recorder::new();
    let signal = PauseController::new();
    let mut sink = TriggerSink::new(recorder.clone(), &signal, 3, request_pause);

    let operator = {
        let signal = signal.clone();
        thread::spawn(move || {
            assert!(signal.wait_until_paused(Duration::from_secs(10)));
            signal.interrupt();
        })
    };

    let outcome = typist
        .type_stream(
            TEXT,
            &mut sink,
            &recorder,
            &signal,
            &mut StdRng::seed_from_u64(5),
            &mut Events::default(),
        )
        .unwrap();
    operator.join().unwrap();

    assert_eq!(outcome, Outcome::Interrupted);
    assert_eq!(recorder.keystroke_count(), 3);
}
