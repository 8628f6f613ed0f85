//! Runs a [`Topology`] over one [`TriageState`].
//!
//! The executor owns the state for the duration of a run. Every node gets an
//! `Arc` snapshot and returns a delta, which is merged before the next node
//! is scheduled. Fan-out branches are spawned as separate tasks over one
//! shared snapshot; their deltas are merged in declaration order once all of
//! them have finished, and only then does the join run.
//!
//! A run ends in one of three ways:
//! - the terminal node finishes: [`RunStatus::Completed`]
//! - the deadline elapses: in-flight work is cancelled, a deadline error is
//!   logged, the terminal node runs anyway, and the report is
//!   [`RunStatus::Incomplete`]
//! - a structural error: [`RunError::Fatal`], carrying a best-effort report

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::{warn, Instrument};
use uuid::Uuid;

use super::node::{Node, NodeContext, NodeOutput};
use super::topology::{NodeKind, Topology};
use super::trace::{RunTrace, TraceEntry};
use crate::domain::state::{ErrorEntry, ErrorKind, StateDelta, TriageState};
use crate::error::{GraphError, RunError};
use crate::obs;

/// Time limits applied to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Bound on each port call, handed to nodes through [`NodeContext`].
    pub port_timeout: Duration,
    /// Bound on the whole run, terminal node excluded. `None` means no limit.
    pub deadline: Option<Duration>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            port_timeout: Duration::from_secs(30),
            deadline: Some(Duration::from_secs(120)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// The deadline cut the run short; the terminal node still ran.
    Incomplete,
}

/// Final state and trace of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: TriageState,
    pub trace: RunTrace,
    pub status: RunStatus,
}

impl RunReport {
    pub fn run_id(&self) -> Uuid {
        self.trace.run_id
    }

    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Aborts spawned branch tasks when the fan-out future is dropped.
#[derive(Default)]
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Mutable bookkeeping for one run.
struct Run {
    state: TriageState,
    trace: RunTrace,
    visits: HashMap<String, u32>,
    /// Nodes whose futures have started but not yet reported.
    in_flight: Vec<(String, DateTime<Utc>)>,
}

impl Run {
    fn attempt(&self) -> u32 {
        self.state.retry().attempts()
    }
}

/// Executes a validated topology with one implementation per node.
pub struct GraphExecutor {
    topology: Arc<Topology>,
    nodes: HashMap<String, Arc<dyn Node>>,
    settings: ExecutorSettings,
}

impl std::fmt::Debug for GraphExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphExecutor")
            .field("entry", &self.topology.entry())
            .field("nodes", &self.nodes.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl GraphExecutor {
    /// Pair a topology with node implementations, matched by name. Every
    /// topology node needs exactly one implementation and every
    /// implementation must belong to the topology.
    pub fn new(
        topology: Topology,
        nodes: Vec<Arc<dyn Node>>,
        settings: ExecutorSettings,
    ) -> Result<Self, GraphError> {
        let mut by_name: HashMap<String, Arc<dyn Node>> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let name = node.name().to_string();
            if !topology.contains(&name) {
                return Err(GraphError::UnusedImplementation(name));
            }
            if by_name.insert(name.clone(), node).is_some() {
                return Err(GraphError::DuplicateNode(name));
            }
        }
        if let Some(missing) = topology.names().find(|n| !by_name.contains_key(*n)) {
            return Err(GraphError::MissingImplementation(missing.to_string()));
        }
        Ok(Self {
            topology: Arc::new(topology),
            nodes: by_name,
            settings,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn settings(&self) -> ExecutorSettings {
        self.settings
    }

    /// Run the graph to its terminal node.
    pub async fn run(&self, initial: TriageState) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let span = obs::run_span(&run_id.to_string(), &initial.ticket().id);
        self.run_inner(run_id, initial).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, initial: TriageState) -> Result<RunReport, RunError> {
        let run_key = run_id.to_string();
        let started = std::time::Instant::now();
        obs::emit_run_started(&run_key, &initial.ticket().id);

        let ctx = NodeContext {
            run_id,
            port_timeout: self.settings.port_timeout,
        };
        let mut run = Run {
            state: initial,
            trace: RunTrace::new(run_id),
            visits: HashMap::new(),
            in_flight: Vec::new(),
        };

        let driven = match self.settings.deadline {
            Some(limit) => {
                let at = tokio::time::Instant::now() + limit;
                let timed = tokio::time::timeout_at(at, self.drive(&mut run, &ctx)).await;
                match timed {
                    Ok(result) => result,
                    Err(_) => {
                        self.record_deadline(&mut run, limit);
                        Ok(())
                    }
                }
            }
            None => self.drive(&mut run, &ctx).await,
        };

        let fatal = driven.err();
        if let Some(error) = &fatal {
            obs::emit_run_fatal(&run_key, error);
        }

        // The terminal node always runs, without a deadline.
        let terminal = self.topology.terminal().to_string();
        let finalized = self.step(&mut run, &terminal, &ctx).await;

        let status = if run.state.is_incomplete() {
            RunStatus::Incomplete
        } else {
            RunStatus::Completed
        };
        obs::emit_run_finished(
            &run_key,
            started.elapsed().as_millis() as u64,
            run.trace.len(),
            run.state.errors().len(),
            status == RunStatus::Completed,
        );
        let report = RunReport {
            state: run.state,
            trace: run.trace,
            status,
        };

        match (fatal, finalized) {
            (None, Ok(_)) => Ok(report),
            (Some(error), finalized) => {
                if let Err(finalize_error) = finalized {
                    warn!(error = %finalize_error, "terminal node failed after fatal error");
                }
                Err(RunError::Fatal {
                    error,
                    best_effort: Some(Box::new(report)),
                })
            }
            (None, Err(error)) => {
                obs::emit_run_fatal(&run_key, &error);
                Err(RunError::Fatal {
                    error,
                    best_effort: Some(Box::new(report)),
                })
            }
        }
    }

    /// Walk from the entry up to, not including, the terminal node.
    async fn drive(&self, run: &mut Run, ctx: &NodeContext) -> Result<(), GraphError> {
        let terminal = self.topology.terminal();
        let mut current = self.topology.entry().to_string();

        while current != terminal {
            let kind = self
                .topology
                .kind(&current)
                .ok_or_else(|| GraphError::MissingImplementation(current.clone()))?;

            current = match kind {
                NodeKind::Sequential { next } => {
                    self.step(run, &current, ctx).await?;
                    next.clone()
                        .ok_or_else(|| GraphError::DeadEnd(current.clone()))?
                }
                NodeKind::FanOut { branches, join } => {
                    self.step(run, &current, ctx).await?;
                    self.fan_out(run, branches, ctx).await?;
                    join.clone()
                }
                NodeKind::FanIn { next } => {
                    self.step(run, &current, ctx).await?;
                    next.clone()
                }
                NodeKind::Conditional { routes, guard } => {
                    let visits = run.visits.entry(current.clone()).or_insert(0);
                    *visits += 1;
                    if let Some(guard) = guard {
                        if *visits > guard.max_visits {
                            return Err(GraphError::LoopBoundExceeded {
                                node: current.clone(),
                                visits: *visits,
                                bound: guard.max_visits,
                            });
                        }
                    }
                    let label = self
                        .step(run, &current, ctx)
                        .await?
                        .ok_or_else(|| GraphError::MissingRoute(current.clone()))?;
                    routes
                        .get(&label)
                        .cloned()
                        .ok_or_else(|| GraphError::UnknownRoute {
                            node: current.clone(),
                            label,
                        })?
                }
            };
        }
        Ok(())
    }

    fn node(&self, name: &str) -> Result<Arc<dyn Node>, GraphError> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::MissingImplementation(name.to_string()))
    }

    /// Run one node inline and merge its delta. Returns its route label.
    async fn step(
        &self,
        run: &mut Run,
        name: &str,
        ctx: &NodeContext,
    ) -> Result<Option<String>, GraphError> {
        let node = self.node(name)?;
        let snapshot = Arc::new(run.state.clone());
        let entered = Utc::now();
        run.in_flight.push((name.to_string(), entered));

        let span = obs::node_span(&ctx.run_id.to_string(), name);
        let output = node.run(snapshot, ctx).instrument(span).await;
        let exited = Utc::now();

        run.in_flight.clear();
        let route = output.route.clone();
        self.merge(run, name, (entered, exited), output)?;
        Ok(route)
    }

    /// Spawn every branch over one snapshot, wait for all, then merge.
    async fn fan_out(
        &self,
        run: &mut Run,
        branches: &[String],
        ctx: &NodeContext,
    ) -> Result<(), GraphError> {
        let snapshot = Arc::new(run.state.clone());
        let mut guard = AbortOnDrop::default();
        let mut handles = Vec::with_capacity(branches.len());

        for name in branches {
            let node = self.node(name)?;
            let snapshot = Arc::clone(&snapshot);
            let ctx = ctx.clone();
            let span = obs::node_span(&ctx.run_id.to_string(), name);
            let entered = Utc::now();
            let handle = tokio::spawn(
                async move {
                    let output = node.run(snapshot, &ctx).await;
                    (output, Utc::now())
                }
                .instrument(span),
            );
            guard.0.push(handle.abort_handle());
            run.in_flight.push((name.clone(), entered));
            handles.push(handle);
        }

        let finished = join_all(handles).await;
        let started: Vec<DateTime<Utc>> = run.in_flight.drain(..).map(|(_, at)| at).collect();

        for ((name, result), entered) in branches.iter().zip(finished).zip(started) {
            let (output, exited) = match result {
                Ok(finished) => finished,
                Err(join_error) => {
                    warn!(node = %name, error = %join_error, "fan-out branch ended abnormally");
                    let entry = ErrorEntry::new(
                        name,
                        ErrorKind::Branch {
                            branch: name.clone(),
                        },
                        format!("branch task ended abnormally: {join_error}"),
                        run.attempt(),
                    );
                    (NodeOutput::from(StateDelta::empty().with_error(entry)), Utc::now())
                }
            };
            self.merge(run, name, (entered, exited), output)?;
        }
        Ok(())
    }

    fn merge(
        &self,
        run: &mut Run,
        name: &str,
        (entered, exited): (DateTime<Utc>, DateTime<Utc>),
        output: NodeOutput,
    ) -> Result<(), GraphError> {
        let errored = output.errored();
        let route = output.route;
        let merged = run.state.apply(output.delta);
        let entry = TraceEntry {
            node: name.to_string(),
            entered_at: entered,
            exited_at: exited,
            errored: errored || merged.is_err(),
            attempt: run.attempt(),
            route,
        };
        obs::emit_node_finished(
            &run.trace.run_id.to_string(),
            name,
            entry.duration_ms(),
            entry.errored,
        );
        run.trace.push(entry);
        merged.map_err(|source| GraphError::StateMerge {
            node: name.to_string(),
            source,
        })
    }

    /// Trace the nodes the deadline cut off and log the deadline itself.
    fn record_deadline(&self, run: &mut Run, limit: Duration) {
        let attempt = run.attempt();
        let now = Utc::now();
        let cut_off: Vec<(String, DateTime<Utc>)> = run.in_flight.drain(..).collect();
        let node = cut_off
            .first()
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "executor".to_string());

        for (name, entered) in cut_off {
            run.trace.push(TraceEntry {
                node: name,
                entered_at: entered,
                exited_at: now,
                errored: true,
                attempt,
                route: None,
            });
        }

        warn!(node = %node, ?limit, "run deadline elapsed");
        let delta = StateDelta {
            incomplete: true,
            ..StateDelta::empty()
        }
        .with_error(ErrorEntry::new(
            &node,
            ErrorKind::Deadline,
            format!("run deadline of {limit:?} elapsed"),
            attempt,
        ));
        if let Err(error) = run.state.apply(delta) {
            warn!(error = %error, "could not record deadline");
        }
    }
}
