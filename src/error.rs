use std::fmt;

use thiserror::Error;

/// A `TypingConfig` field failed validation. Never clamped silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid typing config: `{field}` {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// The keystroke a sink was asked to deliver when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkAction {
    Enter,
    Backspace,
    Text(char),
}

impl fmt::Display for SinkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkAction::Enter => f.write_str("enter"),
            SinkAction::Backspace => f.write_str("backspace"),
            SinkAction::Text(c) => write!(f, "text {c:?}"),
        }
    }
}

/// The keystroke sink rejected an action. Typing is not idempotent, so this is
/// never retried.
#[derive(Debug, Error)]
#[error("keystroke sink failed on {action}")]
pub struct SinkError {
    pub action: SinkAction,
    #[source]
    pub source: anyhow::Error,
}

/// Why a pipeline hook stopped early.
///
/// `Interrupted` is a deliberate operator outcome rather than a failure; the
/// orchestrator turns it into [`Outcome::Interrupted`](crate::stream::Outcome).
#[derive(Debug, Error)]
pub enum Halt {
    #[error("typing interrupted")]
    Interrupted,
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Debug, Error)]
pub enum TypingError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_error_names_the_rejected_action() {
        let err = SinkError {
            action: SinkAction::Text('q'),
            source: anyhow::anyhow!("surface closed"),
        };
        assert_eq!(err.to_string(), "keystroke sink failed on text 'q'");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("surface closed"));
    }
}
