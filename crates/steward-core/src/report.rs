use serde::Serialize;

/// How an orchestration pass ended. `NothingToDo` is deliberately distinct
/// from `Success`: re-running an already-applied operation reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    NothingToDo,
    DryRun,
}

/// Structured result of a multi-step git/remote operation. Steps are recorded
/// as they complete so a failure message can say exactly how far things got.
#[derive(Debug, Clone, Serialize)]
pub struct OpReport {
    pub outcome: Outcome,
    pub message: String,
    pub steps: Vec<String>,
}

impl OpReport {
    pub fn new() -> Self {
        Self {
            outcome: Outcome::Success,
            message: String::new(),
            steps: Vec::new(),
        }
    }

    pub fn step(&mut self, description: impl Into<String>) {
        self.steps.push(description.into());
    }

    pub fn finish(mut self, outcome: Outcome, message: impl Into<String>) -> Self {
        self.outcome = outcome;
        self.message = message.into();
        self
    }
}

impl Default for OpReport {
    fn default() -> Self {
        Self::new()
    }
}
