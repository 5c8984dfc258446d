use std::fmt;

/// How an invocation ended. Carried by the terminal [`StreamItem::End`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
}

impl Outcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => write!(f, "completed"),
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// An item travelling from the invocation worker to the stream consumer.
///
/// `End` is the only terminal item. Exactly one is enqueued per request and
/// nothing follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Token(String),
    /// Run metadata reported by the provider, e.g. its completion id.
    Trace(String),
    End(Outcome),
}

impl StreamItem {
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End(_))
    }
}

/// Lifecycle of one request. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestState {
    Created,
    Running,
    Draining,
    Complete,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Created => "created",
            RequestState::Running => "running",
            RequestState::Draining => "draining",
            RequestState::Complete => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Complete)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
