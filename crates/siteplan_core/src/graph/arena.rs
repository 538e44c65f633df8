//! Index-based dependency arena.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

/// Dependency graph stored as dense node indices plus edge lists.
///
/// `K` is the external key (task id, or a template-local index).
#[derive(Debug, Clone)]
pub struct TaskGraph<K> {
    keys: Vec<K>,
    index: HashMap<K, usize>,
    dependencies: Vec<Vec<usize>>,
    unresolved: Vec<(K, K)>,
}

impl<K> Default for TaskGraph<K> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            index: HashMap::new(),
            dependencies: Vec::new(),
            unresolved: Vec::new(),
        }
    }
}

impl<K: Copy + Eq + Hash + Ord> TaskGraph<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from `(node, dependencies)` pairs.
    ///
    /// Nodes are registered before edges are resolved, so input order does
    /// not matter. Dependencies on keys that are not nodes are dropped and
    /// kept in [`TaskGraph::unresolved`]. A repeated node key keeps the
    /// dependencies of its last occurrence.
    pub fn from_edges<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<K>)>,
    {
        let entries: Vec<(K, Vec<K>)> = entries.into_iter().collect();
        let mut graph = Self::new();
        for (key, _) in &entries {
            graph.add_node(*key);
        }
        for (key, deps) in entries {
            let node = graph.index[&key];
            let mut resolved = Vec::with_capacity(deps.len());
            for dep in deps {
                match graph.index.get(&dep) {
                    Some(target) if !resolved.contains(target) => resolved.push(*target),
                    Some(_) => {}
                    None => graph.unresolved.push((key, dep)),
                }
            }
            graph.dependencies[node] = resolved;
        }
        graph
    }

    /// Registers `key` if absent and returns its node index.
    pub fn add_node(&mut self, key: K) -> usize {
        if let Some(existing) = self.index.get(&key) {
            return *existing;
        }
        let node = self.keys.len();
        self.keys.push(key);
        self.index.insert(key, node);
        self.dependencies.push(Vec::new());
        node
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn key(&self, node: usize) -> K {
        self.keys[node]
    }

    pub fn dependencies(&self, node: usize) -> &[usize] {
        &self.dependencies[node]
    }

    /// Edges whose target was not a node when the graph was built.
    pub fn unresolved(&self) -> &[(K, K)] {
        &self.unresolved
    }

    /// Reverse adjacency: for each node, the nodes that depend on it.
    pub fn dependents(&self) -> Vec<Vec<usize>> {
        let mut dependents = vec![Vec::new(); self.len()];
        for (node, deps) in self.dependencies.iter().enumerate() {
            for dep in deps {
                dependents[*dep].push(node);
            }
        }
        dependents
    }

    /// Kahn's algorithm with the smallest ready key released first.
    ///
    /// Returns `None` when the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<usize>> {
        let dependents = self.dependents();
        let mut pending: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<(K, usize)>> = pending
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(node, _)| Reverse((self.keys[node], node)))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse((_, node))) = ready.pop() {
            order.push(node);
            for dependent in &dependents[node] {
                pending[*dependent] -= 1;
                if pending[*dependent] == 0 {
                    ready.push(Reverse((self.keys[*dependent], *dependent)));
                }
            }
        }

        if order.len() == self.len() {
            Some(order)
        } else {
            None
        }
    }
}
