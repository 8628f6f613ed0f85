//! Generic graph engine: topology, node contract, executor, trace.

pub mod executor;
pub mod node;
pub mod topology;
pub mod trace;

pub use executor::{ExecutorSettings, GraphExecutor, RunReport, RunStatus};
pub use node::{Node, NodeContext, NodeOutput};
pub use topology::{LoopGuard, NodeKind, Topology, TopologyBuilder};
pub use trace::{RunTrace, TraceEntry};
