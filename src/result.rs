use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CrewError;
use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn label(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
        )
    }
}

/// Output of one completed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task: TaskId,
    pub agent: String,
    /// Description as sent to the model, after input substitution.
    pub description: String,
    pub raw: String,
    /// `provider/model` that produced the output; `None` when a short-circuit rule answered.
    pub backend: Option<String>,
    pub attempts: u32,
    pub output_file: Option<PathBuf>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskFailure {
    pub task: TaskId,
    pub category: &'static str,
    pub reason: String,
    pub attempts: u32,
}

impl TaskFailure {
    pub fn from_error(task: TaskId, err: &CrewError, attempts: u32) -> Self {
        Self {
            task,
            category: err.category().code(),
            reason: err.to_string(),
            attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub task: TaskId,
    pub from: TaskState,
    pub to: TaskState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task: TaskId,
    pub state: TaskState,
    pub result: Option<TaskResult>,
    pub failure: Option<TaskFailure>,
    /// Failed upstream task that kept this one pending.
    pub blocked_by: Option<TaskId>,
}

/// Aggregate of one crew run, in task declaration order.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub crew: String,
    pub outcomes: Vec<TaskOutcome>,
    pub transitions: Vec<StateTransition>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineResult {
    pub fn task_results(&self) -> impl Iterator<Item = &TaskResult> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskFailure> {
        self.outcomes.iter().filter_map(|o| o.failure.as_ref())
    }

    pub fn outcome(&self, task: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task.as_str() == task)
    }

    pub fn result_for(&self, task: &str) -> Option<&TaskResult> {
        self.outcome(task).and_then(|o| o.result.as_ref())
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.outcome(task).map(|o| o.state)
    }

    /// Result of the last declared task, if it completed.
    pub fn final_output(&self) -> Option<&TaskResult> {
        self.outcomes.last().and_then(|o| o.result.as_ref())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.state == TaskState::Completed)
    }

    /// Turns recorded failures into an error, naming the first failed task.
    pub fn ensure_success(&self) -> Result<(), CrewError> {
        if let Some(failure) = self.failures().next() {
            let blocked = self
                .outcomes
                .iter()
                .filter(|o| o.blocked_by.is_some())
                .count();
            return Err(CrewError::backend(
                self.crew.clone(),
                format!(
                    "task '{}' failed after {} attempt(s): {} ({} dependent task(s) not run)",
                    failure.task, failure.attempts, failure.reason, blocked
                ),
            ));
        }
        Ok(())
    }

    /// Position of the first transition of `task` into `state`.
    pub fn transition_index(&self, task: &str, state: TaskState) -> Option<usize> {
        self.transitions
            .iter()
            .position(|t| t.task.as_str() == task && t.to == state)
    }
}
