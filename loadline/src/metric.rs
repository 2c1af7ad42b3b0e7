use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a request produced no HTTP status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Timeout,
    Connect,
    /// Status arrived but the body could not be drained.
    Body,
    Other,
}

/// Result of issuing one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Status(u16),
    Failed(FailureKind),
}

impl Outcome {
    /// Sentinel used wherever a failure has to be expressed as a status code.
    pub const FAILURE_CODE: i32 = -1;

    /// 2xx only. Everything else, transport failures included, counts as an error.
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Status(code) if (200..300).contains(code))
    }

    pub fn code(&self) -> i32 {
        match self {
            Outcome::Status(code) => i32::from(*code),
            Outcome::Failed(_) => Self::FAILURE_CODE,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Status(code) => write!(f, "{code}"),
            Outcome::Failed(kind) => write!(f, "failed ({kind:?})"),
        }
    }
}

/// One completed request, created by a worker and handed to the aggregator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    /// Wall-clock second at which the request completed.
    pub second: u64,
    pub latency_ms: f64,
    pub outcome: Outcome,
}

impl OutcomeEvent {
    pub fn new(second: u64, latency_ms: f64, outcome: Outcome) -> Self {
        Self {
            second,
            latency_ms,
            outcome,
        }
    }
}
