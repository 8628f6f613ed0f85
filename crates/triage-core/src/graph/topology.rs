//! Static graph topology and its construction-time checks.
//!
//! A topology maps node names to a [`NodeKind`], which carries the node's
//! successors. [`TopologyBuilder::build`] rejects anything the executor could
//! not run safely:
//!
//! - dangling successors, duplicate names, unreachable nodes
//! - fan-outs whose branches do not all lead straight into one matching join
//! - back-edges that do not come from a guarded conditional node, or that
//!   re-enter before the fan-out region
//!
//! Back-edges are found with a depth-first walk from the entry, visiting
//! successors in declaration order so the result is deterministic.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Bound on how often a conditional node may run in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopGuard {
    pub max_visits: u32,
}

impl LoopGuard {
    pub fn new(max_visits: u32) -> Self {
        Self { max_visits }
    }
}

/// Node kind plus outgoing edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// One successor, or none for the terminal node.
    Sequential { next: Option<String> },
    /// Spawns `branches` concurrently; `join` runs once all have finished.
    FanOut { branches: Vec<String>, join: String },
    /// Barrier for the matching fan-out.
    FanIn { next: String },
    /// Picks a successor by route label. Routes that close a loop need a
    /// guard.
    Conditional {
        routes: BTreeMap<String, String>,
        guard: Option<LoopGuard>,
    },
}

impl NodeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Sequential { .. } => "sequential",
            Self::FanOut { .. } => "fanout",
            Self::FanIn { .. } => "fanin",
            Self::Conditional { .. } => "conditional",
        }
    }

    /// Outgoing edges in declaration order. A fan-out's edges are its
    /// branches; the branches carry the edges into the join.
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Self::Sequential { next } => next.iter().map(String::as_str).collect(),
            Self::FanOut { branches, .. } => branches.iter().map(String::as_str).collect(),
            Self::FanIn { next } => vec![next.as_str()],
            Self::Conditional { routes, .. } => routes.values().map(String::as_str).collect(),
        }
    }
}

/// A validated topology.
#[derive(Debug, Clone)]
pub struct Topology {
    entry: String,
    terminal: String,
    nodes: BTreeMap<String, NodeKind>,
    /// Declaration order, used for rendering and trace ordering.
    order: Vec<String>,
    back_edges: Vec<(String, String)>,
}

impl Topology {
    pub fn builder(entry: impl Into<String>, terminal: impl Into<String>) -> TopologyBuilder {
        TopologyBuilder::new(entry, terminal)
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn terminal(&self) -> &str {
        &self.terminal
    }

    pub fn kind(&self, name: &str) -> Option<&NodeKind> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Node names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Back-edges found at build time, as `(from, to)`.
    pub fn back_edges(&self) -> &[(String, String)] {
        &self.back_edges
    }

    /// Render as a Mermaid flowchart.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");
        for name in &self.order {
            let Some(kind) = self.nodes.get(name) else {
                continue;
            };
            match kind {
                NodeKind::Sequential { next: Some(next) } | NodeKind::FanIn { next } => {
                    out.push_str(&format!("    {name} --> {next}\n"));
                }
                NodeKind::Sequential { next: None } => {
                    out.push_str(&format!("    {name} --> END\n"));
                }
                NodeKind::FanOut { branches, .. } => {
                    for branch in branches {
                        out.push_str(&format!("    {name} -.-> {branch}\n"));
                    }
                }
                NodeKind::Conditional { routes, .. } => {
                    for (label, target) in routes {
                        out.push_str(&format!("    {name} -- {label} --> {target}\n"));
                    }
                }
            }
        }
        out
    }
}

/// Collects node declarations, then validates them in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    entry: String,
    terminal: String,
    nodes: Vec<(String, NodeKind)>,
}

impl TopologyBuilder {
    pub fn new(entry: impl Into<String>, terminal: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            terminal: terminal.into(),
            nodes: Vec::new(),
        }
    }

    pub fn node(mut self, name: impl Into<String>, kind: NodeKind) -> Self {
        self.nodes.push((name.into(), kind));
        self
    }

    pub fn sequential(self, name: impl Into<String>, next: impl Into<String>) -> Self {
        self.node(
            name,
            NodeKind::Sequential {
                next: Some(next.into()),
            },
        )
    }

    /// Declare the terminal node (sequential, no successor).
    pub fn end(self, name: impl Into<String>) -> Self {
        self.node(name, NodeKind::Sequential { next: None })
    }

    /// Declare a fan-out together with its branches, each of which leads
    /// into `join`.
    pub fn fan_out<I, S>(mut self, name: impl Into<String>, branches: I, join: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let join = join.into();
        let branches: Vec<String> = branches.into_iter().map(Into::into).collect();
        for branch in &branches {
            self.nodes.push((
                branch.clone(),
                NodeKind::Sequential {
                    next: Some(join.clone()),
                },
            ));
        }
        self.node(name, NodeKind::FanOut { branches, join })
    }

    pub fn fan_in(self, name: impl Into<String>, next: impl Into<String>) -> Self {
        self.node(name, NodeKind::FanIn { next: next.into() })
    }

    pub fn conditional<I, L, T>(self, name: impl Into<String>, routes: I, guard: Option<LoopGuard>) -> Self
    where
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        let routes = routes
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();
        self.node(name, NodeKind::Conditional { routes, guard })
    }

    pub fn build(self) -> Result<Topology, GraphError> {
        let mut nodes = BTreeMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for (name, kind) in self.nodes {
            if nodes.contains_key(&name) {
                return Err(GraphError::DuplicateNode(name));
            }
            order.push(name.clone());
            nodes.insert(name, kind);
        }

        if !nodes.contains_key(&self.entry) {
            return Err(GraphError::MissingEntry(self.entry));
        }
        match nodes.get(&self.terminal) {
            None => return Err(GraphError::MissingTerminal(self.terminal)),
            Some(NodeKind::Sequential { next: None }) => {}
            Some(_) => return Err(GraphError::InvalidTerminal(self.terminal)),
        }

        check_edges(&nodes, &self.terminal)?;
        check_fan_outs(&nodes)?;
        check_reachable(&nodes, &order, &self.entry)?;
        let back_edges = find_back_edges(&nodes, &self.entry);
        check_back_edges(&nodes, &back_edges)?;

        Ok(Topology {
            entry: self.entry,
            terminal: self.terminal,
            nodes,
            order,
            back_edges,
        })
    }
}

fn check_edges(nodes: &BTreeMap<String, NodeKind>, terminal: &str) -> Result<(), GraphError> {
    for (name, kind) in nodes {
        if let NodeKind::Conditional { routes, .. } = kind {
            if routes.is_empty() {
                return Err(GraphError::EmptyRoutes(name.clone()));
            }
        }
        if matches!(kind, NodeKind::Sequential { next: None }) && name != terminal {
            return Err(GraphError::DeadEnd(name.clone()));
        }
        if let NodeKind::FanOut { join, .. } = kind {
            if !nodes.contains_key(join) {
                return Err(GraphError::UnknownSuccessor {
                    from: name.clone(),
                    to: join.clone(),
                });
            }
        }
        for next in kind.successors() {
            if !nodes.contains_key(next) {
                return Err(GraphError::UnknownSuccessor {
                    from: name.clone(),
                    to: next.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn check_fan_outs(nodes: &BTreeMap<String, NodeKind>) -> Result<(), GraphError> {
    let invalid = |node: &str, reason: String| GraphError::InvalidFanOut {
        node: node.to_string(),
        reason,
    };
    let mut joins_claimed: HashMap<&str, &str> = HashMap::new();
    let mut branches_claimed: BTreeSet<&str> = BTreeSet::new();

    for (name, kind) in nodes {
        let NodeKind::FanOut { branches, join } = kind else {
            continue;
        };
        if branches.is_empty() {
            return Err(invalid(name, "no branches".to_string()));
        }
        if !matches!(nodes.get(join), Some(NodeKind::FanIn { .. })) {
            return Err(invalid(name, format!("join {join} is not a fan-in node")));
        }
        if let Some(other) = joins_claimed.insert(join.as_str(), name.as_str()) {
            return Err(invalid(name, format!("join {join} already belongs to {other}")));
        }
        for branch in branches {
            if !branches_claimed.insert(branch.as_str()) {
                return Err(invalid(name, format!("branch {branch} is listed twice")));
            }
            match nodes.get(branch) {
                Some(NodeKind::Sequential { next: Some(next) }) if next == join => {}
                _ => {
                    return Err(invalid(
                        name,
                        format!("branch {branch} must be sequential and lead into {join}"),
                    ))
                }
            }
        }
    }

    for (name, kind) in nodes {
        if matches!(kind, NodeKind::FanIn { .. }) && !joins_claimed.contains_key(name.as_str()) {
            return Err(invalid(name, "fan-in has no matching fan-out".to_string()));
        }
    }
    Ok(())
}

fn check_reachable(
    nodes: &BTreeMap<String, NodeKind>,
    order: &[String],
    entry: &str,
) -> Result<(), GraphError> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([entry]);
    while let Some(name) = queue.pop_front() {
        if !seen.insert(name) {
            continue;
        }
        if let Some(kind) = nodes.get(name) {
            queue.extend(kind.successors());
        }
    }
    match order.iter().find(|n| !seen.contains(n.as_str())) {
        Some(name) => Err(GraphError::Unreachable(name.clone())),
        None => Ok(()),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Open,
    Done,
}

/// Edges that point back at a node still on the DFS stack.
fn find_back_edges(nodes: &BTreeMap<String, NodeKind>, entry: &str) -> Vec<(String, String)> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut back_edges = Vec::new();
    // Explicit stack of (node, next successor index).
    let mut stack: Vec<(&str, usize)> = vec![(entry, 0)];
    marks.insert(entry, Mark::Open);

    while let Some((name, idx)) = stack.pop() {
        let successors = nodes.get(name).map(NodeKind::successors).unwrap_or_default();
        if idx < successors.len() {
            stack.push((name, idx + 1));
            let next = successors[idx];
            match marks.get(next) {
                Some(Mark::Open) => back_edges.push((name.to_string(), next.to_string())),
                Some(Mark::Done) => {}
                None => {
                    marks.insert(next, Mark::Open);
                    stack.push((next, 0));
                }
            }
        } else {
            marks.insert(name, Mark::Done);
        }
    }
    back_edges
}

/// Nodes reachable from any fan-out along forward edges only.
fn fan_out_region<'a>(
    nodes: &'a BTreeMap<String, NodeKind>,
    back_edges: &[(String, String)],
) -> BTreeSet<&'a str> {
    let is_back = |from: &str, to: &str| back_edges.iter().any(|(f, t)| f == from && t == to);
    let mut region = BTreeSet::new();
    let mut queue: VecDeque<&str> = nodes
        .iter()
        .filter(|(_, kind)| matches!(kind, NodeKind::FanOut { .. }))
        .map(|(name, _)| name.as_str())
        .collect();
    while let Some(name) = queue.pop_front() {
        if !region.insert(name) {
            continue;
        }
        if let Some(kind) = nodes.get(name) {
            for next in kind.successors() {
                if !is_back(name, next) {
                    queue.push_back(next);
                }
            }
        }
    }
    region
}

fn check_back_edges(
    nodes: &BTreeMap<String, NodeKind>,
    back_edges: &[(String, String)],
) -> Result<(), GraphError> {
    if back_edges.is_empty() {
        return Ok(());
    }
    let region = fan_out_region(nodes, back_edges);
    for (from, to) in back_edges {
        match nodes.get(from) {
            Some(NodeKind::Conditional {
                guard: Some(guard), ..
            }) if guard.max_visits > 0 => {}
            _ => {
                return Err(GraphError::UnguardedBackEdge {
                    from: from.clone(),
                    to: to.clone(),
                })
            }
        }
        if !region.contains(to.as_str()) {
            return Err(GraphError::BackEdgeOutsideFanOut {
                from: from.clone(),
                to: to.clone(),
            });
        }
    }
    Ok(())
}
