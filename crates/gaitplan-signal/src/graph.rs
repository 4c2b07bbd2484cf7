//! [`SignalGraph`] – setup-time dependency record.
//!
//! Producers pull their inputs lazily, so a cycle in the wiring would only
//! show up in the middle of a tick, as an output that reads itself.  The plan
//! records every edge here while it wires its components and calls
//! [`SignalGraph::validate`] before the first tick.

use std::collections::BTreeMap;

use gaitplan_types::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Directed graph of signal names; an edge `a -> b` means `a` reads `b`.
#[derive(Debug, Clone, Default)]
pub struct SignalGraph {
    nodes: Vec<String>,
    deps: BTreeMap<String, Vec<String>>,
}

impl SignalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a signal.  Registering a name twice is a no-op.
    pub fn add_node(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.deps.contains_key(&name) {
            self.deps.insert(name.clone(), Vec::new());
            self.nodes.push(name);
        }
    }

    /// Record that `node` reads `depends_on`.  Both ends are registered.
    pub fn add_dependency(&mut self, node: impl Into<String>, depends_on: impl Into<String>) {
        let node = node.into();
        let depends_on = depends_on.into();
        self.add_node(node.clone());
        self.add_node(depends_on.clone());
        if let Some(list) = self.deps.get_mut(&node) {
            if !list.contains(&depends_on) {
                list.push(depends_on);
            }
        }
    }

    /// Signals `node` reads, in the order they were recorded.
    pub fn dependencies(&self, node: &str) -> &[String] {
        self.deps.get(node).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check the wiring is acyclic.
    ///
    /// Returns every node in dependency-first order (inputs before the
    /// signals that read them), or [`PlanError::SignalCycle`] carrying the
    /// cycle path with its first node repeated at the end.
    pub fn validate(&self) -> Result<Vec<String>, PlanError> {
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut path: Vec<&str> = Vec::new();
        for node in &self.nodes {
            self.visit(node, &mut marks, &mut path, &mut order)?;
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        marks: &mut BTreeMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), PlanError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Active) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(node.to_string());
                return Err(PlanError::SignalCycle(cycle));
            }
            None => {}
        }
        marks.insert(node, Mark::Active);
        path.push(node);
        if let Some(deps) = self.deps.get(node) {
            for dep in deps {
                self.visit(dep, marks, path, order)?;
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        order.push(node.to_string());
        Ok(())
    }
}
