//! Benchmark result validation.
//!
//! A task without samples is skipped: the backend never produced a timing,
//! which is an environment gap rather than a defect. A task with samples must
//! not carry an error.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::runner::TaskReport;

/// Verdict for one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum TaskVerdict {
    Passed,
    Skipped { reason: String },
    Failed { reason: String },
}

/// Verdicts for every task of a run, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub tasks: Vec<(String, TaskVerdict)>,
}

impl ValidationReport {
    pub fn is_success(&self) -> bool {
        !self
            .tasks
            .iter()
            .any(|(_, verdict)| matches!(verdict, TaskVerdict::Failed { .. }))
    }

    pub fn passed(&self) -> usize {
        self.count(|v| matches!(v, TaskVerdict::Passed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|v| matches!(v, TaskVerdict::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|v| matches!(v, TaskVerdict::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&TaskVerdict) -> bool) -> usize {
        self.tasks.iter().filter(|(_, v)| predicate(v)).count()
    }

    /// Convert failed verdicts into an error.
    pub fn ensure_success(&self) -> Result<()> {
        let failures: Vec<String> = self
            .tasks
            .iter()
            .filter_map(|(name, verdict)| match verdict {
                TaskVerdict::Failed { reason } => Some(format!("{}: {}", name, reason)),
                _ => None,
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(failures.join("; ")))
        }
    }
}

/// Check every task result.
pub fn validate(tasks: &[TaskReport]) -> ValidationReport {
    let tasks = tasks
        .iter()
        .map(|task| {
            let verdict = verdict(task);
            if let TaskVerdict::Skipped { reason } = &verdict {
                tracing::info!(task = %task.name, %reason, "task skipped");
            }
            (task.name.clone(), verdict)
        })
        .collect();
    ValidationReport { tasks }
}

fn verdict(task: &TaskReport) -> TaskVerdict {
    let Some(result) = &task.result else {
        return TaskVerdict::Failed {
            reason: "task produced no result".into(),
        };
    };

    if result.samples() == 0 {
        let reason = match &result.error {
            Some(failure) => format!("no samples recorded ({})", failure.message),
            None => "no samples recorded".to_string(),
        };
        return TaskVerdict::Skipped { reason };
    }

    if let Some(failure) = &result.error {
        return TaskVerdict::Failed {
            reason: failure.message.clone(),
        };
    }

    TaskVerdict::Passed
}
