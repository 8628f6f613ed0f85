//! Per-run execution trace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One node execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub node: String,
    pub entered_at: DateTime<Utc>,
    pub exited_at: DateTime<Utc>,
    /// The node recorded errors, was cut off by the deadline, or its task
    /// ended abnormally.
    pub errored: bool,
    /// Fetch round in progress when the node finished.
    pub attempt: u32,
    /// Route label, for conditional nodes.
    pub route: Option<String>,
}

impl TraceEntry {
    pub fn duration_ms(&self) -> u64 {
        (self.exited_at - self.entered_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

/// Ordered record of every node execution in a run.
///
/// Fan-out branches appear after their fan-out node in topology order;
/// their timestamps show they overlapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTrace {
    pub run_id: Uuid,
    entries: Vec<TraceEntry>,
}

impl RunTrace {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Node names in execution order.
    pub fn path(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.node.as_str()).collect()
    }

    /// How many times `node` ran.
    pub fn visits(&self, node: &str) -> usize {
        self.entries.iter().filter(|e| e.node == node).count()
    }

    pub fn errored_nodes(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.errored)
            .map(|e| e.node.as_str())
            .collect()
    }

    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
