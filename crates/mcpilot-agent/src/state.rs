//! Run state, outcome, and the report handed back to the caller.

use chrono::Utc;
use std::fmt;
use tracing::debug;

use mcpilot_core::{Attempt, Error, IterationRecord, ToolOutcome};

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The model gave a final answer, kept verbatim.
    Success { value: String },
    /// The run stopped on an error. `retries` is the protocol-retry count
    /// at that point.
    Failed { error: Error, retries: u32 },
    /// The iteration cap was reached without a final answer.
    BudgetExhausted { iterations: usize },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Success { value } => write!(f, "{value}"),
            RunOutcome::Failed { error, retries } => {
                write!(f, "{error} (after {retries} retries)")
            }
            RunOutcome::BudgetExhausted { iterations } => write!(
                f,
                "{}",
                Error::BudgetExhausted {
                    iterations: *iterations
                }
            ),
        }
    }
}

/// Mutable state of one run. Owned by the agent loop and consumed into a
/// [`RunReport`] when the run ends.
#[derive(Debug, Default)]
pub struct RunState {
    history: Vec<IterationRecord>,
    iteration_count: usize,
    retry_count: u32,
    outcome: Option<RunOutcome>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record. Its index is the next gapless position.
    pub fn record(
        &mut self,
        attempt: Attempt,
        tool_result: Option<ToolOutcome>,
        provider_id: Option<String>,
    ) -> &IterationRecord {
        let index = self.history.len();
        self.history.push(IterationRecord {
            index,
            attempt,
            tool_result,
            provider_id,
            recorded_at: Utc::now(),
        });
        self.iteration_count += 1;
        &self.history[index]
    }

    /// Count one protocol-side retry and return the new total.
    pub fn bump_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    /// Enter the terminal state. Only the first call has any effect.
    pub fn finish(&mut self, outcome: RunOutcome) {
        if self.outcome.is_some() {
            debug!(ignored = %outcome, "run already terminal");
            return;
        }
        self.outcome = Some(outcome);
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Consume into a report. A state that never finished reports the
    /// budget as exhausted.
    pub fn into_report(self) -> RunReport {
        let outcome = self.outcome.unwrap_or(RunOutcome::BudgetExhausted {
            iterations: self.iteration_count,
        });
        RunReport {
            outcome,
            history: self.history,
            iterations: self.iteration_count,
            retries: self.retry_count,
        }
    }
}

/// Everything a caller needs after a run.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub history: Vec<IterationRecord>,
    pub iterations: usize,
    pub retries: u32,
}

impl RunReport {
    pub fn final_answer(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Success { value } => Some(value),
            _ => None,
        }
    }
}
