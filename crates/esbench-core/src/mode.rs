//! Run-mode filtering of benchmark operations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operation::{BenchOperation, OperationKind, OperationLabel};

/// Which class of operations a run benchmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    All,
    Read,
    Write,
}

impl RunMode {
    /// Parse a configured mode, falling back to [`RunMode::All`] for
    /// unrecognised values.
    pub fn from_config(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" | "" => RunMode::All,
            "read" => RunMode::Read,
            "write" => RunMode::Write,
            other => {
                tracing::warn!(mode = other, "unrecognised run mode, using `all`");
                RunMode::All
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::All => "all",
            RunMode::Read => "read",
            RunMode::Write => "write",
        }
    }

    /// Whether an operation with this label runs under the mode.
    pub fn is_operation_enabled(&self, label: &str) -> bool {
        match self {
            RunMode::All => true,
            RunMode::Read => is_read_operation(label),
            RunMode::Write => is_write_operation(label),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn kind_of(label: &str) -> Option<OperationKind> {
    label.parse::<OperationLabel>().ok().map(|l| l.kind())
}

/// True for read-classified labels.
pub fn is_read_operation(label: &str) -> bool {
    kind_of(label) == Some(OperationKind::Read)
}

/// True for write-classified labels.
pub fn is_write_operation(label: &str) -> bool {
    kind_of(label) == Some(OperationKind::Write)
}

/// Keep the operations enabled under `mode`, preserving their order.
///
/// `on_skip` is called once with the label of every operation dropped.
/// Actions are never invoked.
pub fn filter_bench_operations(
    operations: Vec<BenchOperation>,
    mode: RunMode,
    mut on_skip: Option<&mut dyn FnMut(&str)>,
) -> Vec<BenchOperation> {
    let mut enabled = Vec::with_capacity(operations.len());
    for operation in operations {
        if mode.is_operation_enabled(&operation.label) {
            enabled.push(operation);
        } else if let Some(callback) = on_skip.as_mut() {
            callback(&operation.label);
        }
    }
    enabled
}
