use crate::model::Action;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    pub actions: usize,
    pub keystrokes: usize,
    pub backspaces: usize,
    pub enters: usize,
    pub total_wait_micros: u64,
}

pub fn stats(actions: &[Action]) -> LogStats {
    let mut out = LogStats {
        actions: actions.len(),
        ..Default::default()
    };

    for a in actions {
        match a {
            Action::Wait { micros } => {
                out.total_wait_micros = out.total_wait_micros.saturating_add(*micros);
            }
            Action::Backspace => {
                out.keystrokes += 1;
                out.backspaces += 1;
            }
            Action::Enter => {
                out.keystrokes += 1;
                out.enters += 1;
            }
            Action::Text { .. } => out.keystrokes += 1,
        }
    }

    out
}

/// Replay a recorded session into the text a plain editor would end up with.
///
/// The cursor always sits at the end of the buffer: the engine only appends
/// and backspaces.
pub fn simulate_typed_text(actions: &[Action]) -> String {
    let mut buf: Vec<char> = Vec::new();

    for action in actions {
        match action {
            Action::Text { ch } => buf.push(*ch),
            Action::Enter => buf.push('\n'),
            Action::Backspace => {
                buf.pop();
            }
            Action::Wait { .. } => {}
        }
    }

    buf.into_iter().collect()
}

/// Lengths of each run of consecutive backspaces, waits ignored.
pub fn backspace_runs(actions: &[Action]) -> Vec<usize> {
    let mut runs = Vec::new();
    let mut current = 0usize;

    for action in actions.iter().filter(|a| a.is_keystroke()) {
        if *action == Action::Backspace {
            current += 1;
        } else if current > 0 {
            runs.push(current);
            current = 0;
        }
    }
    if current > 0 {
        runs.push(current);
    }

    runs
}
