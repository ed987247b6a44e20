//! Benchmark operation labels and actions.

use std::fmt;
use std::str::FromStr;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Whether an operation reads or writes backend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
}

/// The closed set of operations every provider is benchmarked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationLabel {
    List,
    Get,
    Select,
    Events,
    Apply,
    Create,
    Archive,
    Restore,
    Patch,
}

/// Read-classified operations.
pub const READ_OPERATIONS: [OperationLabel; 4] = [
    OperationLabel::List,
    OperationLabel::Get,
    OperationLabel::Select,
    OperationLabel::Events,
];

/// Write-classified operations.
pub const WRITE_OPERATIONS: [OperationLabel; 5] = [
    OperationLabel::Apply,
    OperationLabel::Create,
    OperationLabel::Archive,
    OperationLabel::Restore,
    OperationLabel::Patch,
];

impl OperationLabel {
    /// All labels in registration order.
    pub const ALL: [OperationLabel; 9] = [
        OperationLabel::List,
        OperationLabel::Get,
        OperationLabel::Select,
        OperationLabel::Events,
        OperationLabel::Apply,
        OperationLabel::Create,
        OperationLabel::Archive,
        OperationLabel::Restore,
        OperationLabel::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationLabel::List => "list",
            OperationLabel::Get => "get",
            OperationLabel::Select => "select",
            OperationLabel::Events => "events",
            OperationLabel::Apply => "apply",
            OperationLabel::Create => "create",
            OperationLabel::Archive => "archive",
            OperationLabel::Restore => "restore",
            OperationLabel::Patch => "patch",
        }
    }

    pub fn kind(&self) -> OperationKind {
        if READ_OPERATIONS.contains(self) {
            OperationKind::Read
        } else {
            OperationKind::Write
        }
    }
}

impl fmt::Display for OperationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationLabel {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        OperationLabel::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown operation `{}`", s)))
    }
}

/// Asynchronous action measured by the benchmark runner.
pub type BenchAction = Box<dyn FnMut() -> BoxFuture<'static, Result<()>> + Send>;

/// A labelled benchmark action.
pub struct BenchOperation {
    pub label: String,
    pub action: BenchAction,
}

impl BenchOperation {
    /// Wrap an async closure as a benchmark operation.
    pub fn new<F, Fut>(label: impl Into<String>, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            label: label.into(),
            action: Box::new(move || action().boxed()),
        }
    }
}

impl fmt::Debug for BenchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchOperation")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
