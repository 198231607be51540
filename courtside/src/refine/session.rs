//! RefinementSession - iteration state of one refinement loop

use tracing::debug;

use super::Verdict;

/// Refinement state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementState {
    Generating,
    Critiquing,
    Accepted,
    /// Budget spent; the last candidate was force-accepted
    Exhausted,
}

impl RefinementState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RefinementState::Accepted | RefinementState::Exhausted)
    }
}

/// State owned by one refinement loop invocation
#[derive(Debug, Clone)]
pub struct RefinementSession {
    /// Zero-based; at most `max_iterations - 1`
    pub iteration: u32,
    pub max_iterations: u32,
    /// Most recent critic feedback; empty before the first critique
    pub last_critique: String,
    pub accepted: bool,
    pub state: RefinementState,
}

impl RefinementSession {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            iteration: 0,
            max_iterations: max_iterations.max(1),
            last_critique: String::new(),
            accepted: false,
            state: RefinementState::Generating,
        }
    }

    /// The worker is revising a previous candidate
    pub fn is_revising(&self) -> bool {
        self.iteration > 0
    }

    /// Worker produced a candidate; the critic is next
    pub fn candidate_ready(&mut self) {
        self.state = RefinementState::Critiquing;
    }

    /// Apply the critic's verdict and return the new state
    pub fn record(&mut self, verdict: Verdict) -> RefinementState {
        debug!(iteration = self.iteration, ?verdict, "RefinementSession::record: called");
        self.state = match verdict {
            Verdict::Accept => {
                self.accepted = true;
                RefinementState::Accepted
            }
            Verdict::Revise(_) if self.iteration + 1 >= self.max_iterations => {
                self.accepted = true;
                RefinementState::Exhausted
            }
            Verdict::Revise(critique) => {
                self.iteration += 1;
                self.last_critique = critique;
                RefinementState::Generating
            }
        };
        self.state
    }

    /// Worker invocations so far, counting the current one
    pub fn worker_invocations(&self) -> u32 {
        self.iteration + 1
    }
}

/// Worker instructions for the current iteration
///
/// Pure function of `last_critique`: empty gives the original instructions,
/// otherwise the feedback replaces them.
pub fn instructions_for(session: &RefinementSession, original: &str) -> String {
    let critique = session.last_critique.trim();
    if critique.is_empty() {
        original.to_string()
    } else {
        format!("Additional work required: {}", critique)
    }
}
