//! Directed dependency graph with a depth-first startup order.
//!
//! # Design Decisions
//! - Roots and edges are walked in insertion order, so the result is
//!   deterministic
//! - Three-colour marking; a grey node reached again is a cycle, reported
//!   as the path that closes it

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use thiserror::Error;

/// Dependency relations form a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cyclic dependency: {}", format_cycle(.cycle))]
pub struct CyclicDependencyError<K: fmt::Debug> {
    /// Nodes on the cycle; the first node is repeated at the end.
    pub cycle: Vec<K>,
}

fn format_cycle<K: fmt::Debug>(cycle: &[K]) -> String {
    cycle
        .iter()
        .map(|k| format!("{k:?}"))
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Adjacency list from a node to the nodes it depends on.
#[derive(Debug, Clone)]
pub struct DependencyGraph<K> {
    edges: HashMap<K, Vec<K>>,
}

impl<K> Default for DependencyGraph<K> {
    fn default() -> Self {
        Self {
            edges: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash + fmt::Debug> DependencyGraph<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: K) {
        self.edges.entry(node).or_default();
    }

    /// `dependent` must start after `dependency`.
    pub fn add_edge(&mut self, dependent: K, dependency: K) {
        self.add_node(dependent);
        self.add_node(dependency);
        if let Some(deps) = self.edges.get_mut(&dependent) {
            if !deps.contains(&dependency) {
                deps.push(dependency);
            }
        }
    }

    pub fn dependencies(&self, node: &K) -> &[K] {
        self.edges.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every node reachable from `roots`, dependencies before dependents.
    ///
    /// Roots are visited in the given order; each node appears once.
    pub fn startup_order(&self, roots: &[K]) -> Result<Vec<K>, CyclicDependencyError<K>> {
        let mut marks: HashMap<K, Mark> = HashMap::with_capacity(self.edges.len());
        let mut order = Vec::with_capacity(self.edges.len());
        let mut path = Vec::new();

        for root in roots {
            self.visit(*root, &mut marks, &mut path, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        node: K,
        marks: &mut HashMap<K, Mark>,
        path: &mut Vec<K>,
        order: &mut Vec<K>,
    ) -> Result<(), CyclicDependencyError<K>> {
        match marks.get(&node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(node);
                return Err(CyclicDependencyError { cycle });
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        path.push(node);

        for dependency in self.dependencies(&node) {
            self.visit(*dependency, marks, path, order)?;
        }

        path.pop();
        marks.insert(node, Mark::Done);
        order.push(node);
        Ok(())
    }
}
