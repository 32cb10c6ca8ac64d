//! Stream state machine

use std::fmt;

/// Why a reader was forced to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The [`StopHandle`](crate::StopHandle) was used
    Stopped,
    /// The cancellation token given to the factory fired
    Cancelled,
}

/// Where a controlled stream stands with respect to end-of-stream.
///
/// ```text
/// Open ──exhausted──▶ MaskedEnd ──data──▶ Open
///   │                    │
///   └──────allow─────────┴──▶ AllowedEnd
///
/// any ──finish──▶ Finished
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// End-of-stream not permitted, source not known to be exhausted
    Open,
    /// Source exhausted, but end-of-stream is withheld from the consumer
    MaskedEnd,
    /// End-of-stream is surfaced the next time the source is exhausted
    AllowedEnd,
    /// Forced termination; parked reads return end-of-stream at once
    Finished(FinishReason),
}

impl StreamState {
    /// Whether an exhausted source may be reported to the consumer
    pub fn eof_allowed(self) -> bool {
        matches!(self, StreamState::AllowedEnd | StreamState::Finished(_))
    }

    pub fn is_finished(self) -> bool {
        matches!(self, StreamState::Finished(_))
    }

    pub fn finish_reason(self) -> Option<FinishReason> {
        match self {
            StreamState::Finished(reason) => Some(reason),
            _ => None,
        }
    }

    pub(crate) fn on_exhausted(self) -> Self {
        match self {
            StreamState::Open => StreamState::MaskedEnd,
            other => other,
        }
    }

    pub(crate) fn on_data(self) -> Self {
        match self {
            StreamState::MaskedEnd => StreamState::Open,
            other => other,
        }
    }

    pub(crate) fn on_allow(self) -> Self {
        match self {
            StreamState::Open | StreamState::MaskedEnd => StreamState::AllowedEnd,
            other => other,
        }
    }

    /// First reason wins
    pub(crate) fn on_finish(self, reason: FinishReason) -> Self {
        match self {
            StreamState::Finished(_) => self,
            _ => StreamState::Finished(reason),
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Open => write!(f, "open"),
            StreamState::MaskedEnd => write!(f, "masked-end"),
            StreamState::AllowedEnd => write!(f, "allowed-end"),
            StreamState::Finished(FinishReason::Stopped) => write!(f, "finished (stopped)"),
            StreamState::Finished(FinishReason::Cancelled) => write!(f, "finished (cancelled)"),
        }
    }
}
