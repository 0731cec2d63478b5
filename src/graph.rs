//! # Dependency graph over process names.
//!
//! [`DependencyGraph`] validates the `depends_on` edges of a configuration and
//! computes the order in which processes are started and stopped.
//!
//! ## Rules
//! - Edge `A → B` means "A depends on B": B must be ready before A starts.
//! - The start order is a topological order; among processes whose dependencies
//!   are all placed, the one declared first goes first (deterministic).
//! - The stop order is the exact reverse of the start order.
//! - Cycles (including self-dependencies), duplicate names and unknown
//!   dependencies are rejected at construction, never at runtime.
//!
//! ## Example
//! ```rust
//! use procvisor::{DependencyGraph, ProcessConfig};
//!
//! let graph = DependencyGraph::new(&[
//!     ProcessConfig::new("web", "npm").with_depends_on(["api"]),
//!     ProcessConfig::new("api", "cargo").with_depends_on(["db"]),
//!     ProcessConfig::new("db", "postgres"),
//! ])
//! .unwrap();
//!
//! assert_eq!(graph.start_order(), ["db", "api", "web"]);
//! assert_eq!(graph.stop_order(), vec!["web", "api", "db"]);
//! ```

use std::collections::{BTreeSet, HashMap};

use crate::error::ConfigError;
use crate::process::ProcessConfig;

/// Validated, acyclic dependency graph.
#[derive(Clone, Debug)]
pub struct DependencyGraph {
    /// Names in declaration order.
    names: Vec<String>,
    /// Name → declaration index.
    index: HashMap<String, usize>,
    /// `deps[i]`: indices process `i` depends on (declaration order, deduplicated).
    deps: Vec<Vec<usize>>,
    /// `dependents[i]`: indices depending on process `i`.
    dependents: Vec<Vec<usize>>,
    /// Topological start order (indices).
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Builds and validates the graph for the given processes.
    pub fn new(processes: &[ProcessConfig]) -> Result<Self, ConfigError> {
        let mut names = Vec::with_capacity(processes.len());
        let mut index = HashMap::with_capacity(processes.len());
        for (i, p) in processes.iter().enumerate() {
            if index.insert(p.name.clone(), i).is_some() {
                return Err(ConfigError::DuplicateName {
                    name: p.name.clone(),
                });
            }
            names.push(p.name.clone());
        }

        let mut deps = vec![Vec::new(); processes.len()];
        let mut dependents = vec![Vec::new(); processes.len()];
        for (i, p) in processes.iter().enumerate() {
            for dep in &p.depends_on {
                let j = *index
                    .get(dep)
                    .ok_or_else(|| ConfigError::UnknownDependency {
                        process: p.name.clone(),
                        dependency: dep.clone(),
                    })?;
                if !deps[i].contains(&j) {
                    deps[i].push(j);
                    dependents[j].push(i);
                }
            }
        }

        let mut graph = Self {
            names,
            index,
            deps,
            dependents,
            order: Vec::new(),
        };
        graph.order = graph.topological_order()?;
        Ok(graph)
    }

    /// Kahn's algorithm; the ready set is ordered by declaration index.
    fn topological_order(&self) -> Result<Vec<usize>, ConfigError> {
        let n = self.names.len();
        let mut missing: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| missing[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &d in &self.dependents[i] {
                missing[d] -= 1;
                if missing[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        if order.len() == n {
            Ok(order)
        } else {
            let remaining: Vec<usize> = (0..n).filter(|&i| missing[i] > 0).collect();
            Err(ConfigError::CycleDetected {
                cycle: self.find_cycle(&remaining),
            })
        }
    }

    /// Walks dependency edges among unplaced nodes until a node repeats.
    ///
    /// Every unplaced node has at least one unplaced dependency, so the walk always
    /// closes a cycle.
    fn find_cycle(&self, remaining: &[usize]) -> Vec<String> {
        let Some(&start) = remaining.first() else {
            return Vec::new();
        };
        let mut path: Vec<usize> = Vec::new();
        let mut pos: HashMap<usize, usize> = HashMap::new();
        let mut cur = start;

        loop {
            if let Some(&at) = pos.get(&cur) {
                let mut cycle: Vec<String> =
                    path[at..].iter().map(|&i| self.names[i].clone()).collect();
                cycle.push(self.names[cur].clone());
                return cycle;
            }
            pos.insert(cur, path.len());
            path.push(cur);
            match self.deps[cur].iter().find(|d| remaining.contains(d)) {
                Some(&next) => cur = next,
                None => return path.iter().map(|&i| self.names[i].clone()).collect(),
            }
        }
    }

    /// Names in start order.
    pub fn start_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.names[i].as_str()).collect()
    }

    /// Names in stop order (reverse of the start order).
    pub fn stop_order(&self) -> Vec<&str> {
        self.order.iter().rev().map(|&i| self.names[i].as_str()).collect()
    }

    /// Names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Direct dependencies of `name` (empty if unknown).
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.index
            .get(name)
            .map(|&i| self.deps[i].iter().map(|&j| self.names[j].as_str()).collect())
            .unwrap_or_default()
    }

    /// Direct dependents of `name` (empty if unknown).
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.index
            .get(name)
            .map(|&i| {
                self.dependents[i]
                    .iter()
                    .map(|&j| self.names[j].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
