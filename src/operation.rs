// src/operation.rs

//! Reversible operations and the ordered sequences that carry them between
//! installer phases
//!
//! An [`Operation`] owns all of its payload data, since it is queued during
//! one phase and executed in another. A [`Sequence`] is a FIFO: planning only
//! appends, execution consumes front to back, and the order matters
//! (`RollbackEnable` has to come before the adapter operations that read it).

use crate::config::DEFAULT_ADAPTER_TICKS;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};

/// What an operation does, with its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Turn rollback recording on or off for the rest of the sequence
    RollbackEnable(bool),
    /// Create an adapter with the given display name
    AdapterCreate(String),
    /// Remove every adapter with the given display name
    AdapterDeleteByName(String),
    /// Delete a file (retires a sibling cleanup file)
    FileDelete(PathBuf),
}

impl OperationKind {
    /// Whether executing this kind calls into the adapter driver
    pub fn is_adapter_op(&self) -> bool {
        matches!(self, Self::AdapterCreate(_) | Self::AdapterDeleteByName(_))
    }
}

/// One queued, reversible action plus its progress weight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    /// Progress ticks reserved at planning time and consumed at execution
    pub ticks: u32,
}

impl Operation {
    pub fn rollback_enable(enabled: bool) -> Self {
        Self {
            kind: OperationKind::RollbackEnable(enabled),
            ticks: 0,
        }
    }

    pub fn adapter_create(name: &str) -> Self {
        Self {
            kind: OperationKind::AdapterCreate(name.to_string()),
            ticks: DEFAULT_ADAPTER_TICKS,
        }
    }

    pub fn adapter_delete_by_name(name: &str) -> Self {
        Self {
            kind: OperationKind::AdapterDeleteByName(name.to_string()),
            ticks: DEFAULT_ADAPTER_TICKS,
        }
    }

    pub fn file_delete(path: &Path) -> Self {
        Self {
            kind: OperationKind::FileDelete(path.to_path_buf()),
            ticks: 0,
        }
    }

    /// Override the tick cost
    pub fn with_ticks(mut self, ticks: u32) -> Self {
        self.ticks = ticks;
        self
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OperationKind::RollbackEnable(enabled) => write!(f, "rollback-enable({})", enabled),
            OperationKind::AdapterCreate(name) => write!(f, "adapter-create(\"{}\")", name),
            OperationKind::AdapterDeleteByName(name) => {
                write!(f, "adapter-delete(\"{}\")", name)
            }
            OperationKind::FileDelete(path) => write!(f, "file-delete({})", path.display()),
        }
    }
}

/// Ordered, owned list of operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequence {
    ops: VecDeque<Operation>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation at the tail
    pub fn append(&mut self, op: Operation) {
        self.ops.push_back(op);
    }

    /// Take the next operation to execute
    pub fn pop_front(&mut self) -> Option<Operation> {
        self.ops.pop_front()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter()
    }

    /// Total ticks of the adapter operations in this sequence
    pub fn adapter_ticks(&self) -> u64 {
        self.ops
            .iter()
            .filter(|op| op.kind.is_adapter_op())
            .map(|op| u64::from(op.ticks))
            .sum()
    }
}

impl FromIterator<Operation> for Sequence {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Sequence {
    type Item = Operation;
    type IntoIter = std::collections::vec_deque::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}
