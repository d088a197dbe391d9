//! Sessions
//!
//! A session is one end-to-end run triggered by a single prompt.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

use super::task::{TaskHandle, TaskOutcome, TaskReport, TaskStatus};
use crate::streaming::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// Result of a session, also carried by the `complete` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: String,
    /// Keys of every announced attachment, grouped by task in task order
    pub attachment_keys: Vec<String>,
    pub tasks: Vec<TaskReport>,
    pub duration_ms: u64,
}

impl SessionReport {
    pub fn succeeded(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Ended)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Errored)
            .count()
    }

    /// Concatenated text of all tasks, in task order
    pub fn text(&self) -> String {
        self.tasks.iter().map(|t| t.text.as_str()).collect()
    }
}

/// One aggregation run
#[derive(Debug)]
pub struct Session {
    id: String,
    prompt: String,
    started_at: DateTime<Utc>,
    started: Instant,
    status: SessionStatus,
    tasks: Vec<TaskHandle>,
}

impl Session {
    pub(crate) fn new(prompt: String, fan_out: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt,
            started_at: Utc::now(),
            started: Instant::now(),
            status: SessionStatus::Active,
            tasks: (0..fan_out).map(TaskHandle::new).collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn tasks(&self) -> &[TaskHandle] {
        &self.tasks
    }

    pub(crate) fn task(&self, id: TaskId) -> Option<&TaskHandle> {
        self.tasks.get(id)
    }

    pub(crate) fn all_failed(&self) -> bool {
        self.tasks.iter().all(|t| t.status() == TaskStatus::Errored)
    }

    /// Close the session and build its report. `outcomes` is indexed by task.
    pub(crate) fn complete(&mut self, outcomes: Vec<TaskOutcome>) -> SessionReport {
        self.status = SessionStatus::Completed;

        let mut outcomes = outcomes.into_iter();
        let tasks: Vec<TaskReport> = self
            .tasks
            .iter()
            .map(|handle| handle.report(outcomes.next().unwrap_or_default()))
            .collect();

        SessionReport {
            session_id: self.id.clone(),
            attachment_keys: tasks
                .iter()
                .flat_map(|t| t.attachment_keys.iter().cloned())
                .collect(),
            tasks,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}
