//! # Attempt State Machine
//!
//! Retry-across-peers control flow for one shard, kept free of I/O so the
//! bounds can be tested on their own.
//!
//! ```text
//!            select()                 record(Success)
//!  ┌────────┐ ──────► ┌───────────┐ ─────────────────► SUCCESS
//!  │ SELECT │         │ SEND(i)   │ record(Rejected)
//!  └────────┘         └───────────┘ ─────────────────► REJECTED  (4xx: no retry)
//!      ▲                    │ record(NodeFailure)
//!      │   select()         ▼
//!      └──────────────  RETRY(i) ── no candidate left ──► EXHAUSTED
//! ```
//!
//! Each candidate is attempted at most once, so a pool of N nodes costs at
//! most N attempts. `REJECTED` hands the node's answer back to the caller
//! unchanged; retries are for node failures, never for request rejections.

use crate::domain::FailurePolicyConfig;

/// Raw outcome of one backend attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Node answered with a status code
    Status(u16),
    /// Connection refused, reset, DNS failure, broken body
    TransportError,
    /// Per-attempt timeout elapsed
    TimedOut,
}

/// Classification of an attempt outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// 2xx answer
    Success,
    /// Application-level answer (4xx by default); returned without retry
    Rejected,
    /// Node is unhealthy; rotate and try the next one
    NodeFailure,
}

/// Decides which outcomes count as node failures.
///
/// Transport errors and timeouts are always node failures. 2xx is always a
/// success. Everything else follows the configured code lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailurePolicy {
    server_errors_are_node_failures: bool,
    extra_node_failure_codes: Vec<u16>,
    application_error_codes: Vec<u16>,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::from(&FailurePolicyConfig::default())
    }
}

impl From<&FailurePolicyConfig> for FailurePolicy {
    fn from(config: &FailurePolicyConfig) -> Self {
        Self {
            server_errors_are_node_failures: config.server_errors_are_node_failures,
            extra_node_failure_codes: config.extra_node_failure_codes.clone(),
            application_error_codes: config.application_error_codes.clone(),
        }
    }
}

impl FailurePolicy {
    /// Classify one attempt outcome.
    pub fn classify(&self, outcome: AttemptOutcome) -> AttemptVerdict {
        let code = match outcome {
            AttemptOutcome::TransportError | AttemptOutcome::TimedOut => {
                return AttemptVerdict::NodeFailure
            }
            AttemptOutcome::Status(code) => code,
        };

        if (200..300).contains(&code) {
            return AttemptVerdict::Success;
        }
        if self.application_error_codes.contains(&code) {
            return AttemptVerdict::Rejected;
        }
        if self.extra_node_failure_codes.contains(&code) {
            return AttemptVerdict::NodeFailure;
        }
        if self.server_errors_are_node_failures && (500..600).contains(&code) {
            return AttemptVerdict::NodeFailure;
        }
        AttemptVerdict::Rejected
    }
}

/// State of one per-shard dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Choose the next candidate
    Select,
    /// Request in flight to candidate `index`
    Send {
        /// Candidate index
        index: usize,
    },
    /// Candidate `failed` was a node failure
    Retry {
        /// Candidate index that failed
        failed: usize,
    },
    /// Candidate answered 2xx
    Success {
        /// Candidate index
        index: usize,
    },
    /// Candidate answered with an application error
    Rejected {
        /// Candidate index
        index: usize,
    },
    /// Every candidate failed
    Exhausted,
}

impl AttemptState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Success { .. } | AttemptState::Rejected { .. } | AttemptState::Exhausted
        )
    }
}

/// SELECT → SEND → SUCCESS | REJECTED | RETRY | EXHAUSTED over a candidate list.
#[derive(Debug, Clone)]
pub struct AttemptMachine {
    candidates: usize,
    next: usize,
    failures: usize,
    state: AttemptState,
}

impl AttemptMachine {
    /// Start in SELECT over `candidates` nodes.
    pub fn new(candidates: usize) -> Self {
        Self {
            candidates,
            next: 0,
            failures: 0,
            state: AttemptState::Select,
        }
    }

    /// Current state.
    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// SELECT: returns the next candidate index, or moves to EXHAUSTED.
    ///
    /// Returns `None` from any state other than SELECT/RETRY.
    pub fn select(&mut self) -> Option<usize> {
        match self.state {
            AttemptState::Select | AttemptState::Retry { .. } => {
                if self.next < self.candidates {
                    let index = self.next;
                    self.next += 1;
                    self.state = AttemptState::Send { index };
                    Some(index)
                } else {
                    self.state = AttemptState::Exhausted;
                    None
                }
            }
            _ => None,
        }
    }

    /// SEND finished with `verdict`.
    ///
    /// Ignored unless the machine is in SEND.
    pub fn record(&mut self, verdict: AttemptVerdict) -> AttemptState {
        if let AttemptState::Send { index } = self.state {
            self.state = match verdict {
                AttemptVerdict::Success => AttemptState::Success { index },
                AttemptVerdict::Rejected => AttemptState::Rejected { index },
                AttemptVerdict::NodeFailure => {
                    self.failures += 1;
                    AttemptState::Retry { failed: index }
                }
            };
        }
        self.state
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> usize {
        self.next
    }

    /// Node failures recorded so far.
    pub fn failures(&self) -> usize {
        self.failures
    }
}
