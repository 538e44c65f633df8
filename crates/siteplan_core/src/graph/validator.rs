//! Dependency validation over one project's task graph.
//!
//! # Responsibility
//! - Check a proposed dependency list before it is persisted.
//! - Report the exact offending ids or cycle path.
//!
//! # Invariants
//! - Pure: the input graph is never modified.
//! - Cycle detection is an iterative three-color DFS, linear in edges.

use crate::graph::arena::TaskGraph;
use std::hash::Hash;

/// Why a proposed dependency list was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyViolation<K> {
    /// Proposed ids that are not tasks of the project.
    UnknownReference { missing: Vec<K> },
    /// The edited task lists itself.
    SelfReference(K),
    /// The resulting graph would contain a cycle.
    ///
    /// `path` starts and ends with the same key; each key depends on the
    /// next one.
    Cycle { path: Vec<K> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validates `proposed` as the dependency list of `task`.
///
/// `task = None` (or a key not in `graph`) validates a task about to be
/// created. The check covers the whole graph with the proposed edge set
/// swapped in for `task`.
pub fn validate_dependencies<K>(
    graph: &TaskGraph<K>,
    task: Option<K>,
    proposed: &[K],
) -> Result<(), DependencyViolation<K>>
where
    K: Copy + Eq + Hash + Ord,
{
    if let Some(task) = task {
        if proposed.contains(&task) {
            return Err(DependencyViolation::SelfReference(task));
        }
    }

    let mut missing = Vec::new();
    let mut resolved = Vec::with_capacity(proposed.len());
    for key in proposed {
        match graph.index_of(key) {
            Some(node) => {
                if !resolved.contains(&node) {
                    resolved.push(node);
                }
            }
            None => {
                if !missing.contains(key) {
                    missing.push(*key);
                }
            }
        }
    }
    if !missing.is_empty() {
        return Err(DependencyViolation::UnknownReference { missing });
    }

    // A brand-new node has no dependents yet, so it cannot close a cycle;
    // the DFS still runs to guard the existing edges.
    let overlay = task
        .and_then(|key| graph.index_of(&key))
        .map(|node| (node, resolved.as_slice()));

    match detect_cycle(graph, overlay) {
        Some(path) => Err(DependencyViolation::Cycle {
            path: path.into_iter().map(|node| graph.key(node)).collect(),
        }),
        None => Ok(()),
    }
}

/// Returns one cycle of `graph` as a closed key path, if any exists.
pub fn find_cycle<K>(graph: &TaskGraph<K>) -> Option<Vec<K>>
where
    K: Copy + Eq + Hash + Ord,
{
    detect_cycle(graph, None).map(|path| path.into_iter().map(|node| graph.key(node)).collect())
}

fn detect_cycle<K>(graph: &TaskGraph<K>, overlay: Option<(usize, &[usize])>) -> Option<Vec<usize>>
where
    K: Copy + Eq + Hash + Ord,
{
    let mut color = vec![Color::White; graph.len()];
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..graph.len() {
        if color[root] != Color::White {
            continue;
        }
        color[root] = Color::Gray;
        stack.push((root, 0));

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            let deps = edges_of(graph, overlay, node);
            if top.1 == deps.len() {
                color[node] = Color::Black;
                stack.pop();
                continue;
            }

            let next = deps[top.1];
            top.1 += 1;
            match color[next] {
                Color::White => {
                    color[next] = Color::Gray;
                    stack.push((next, 0));
                }
                Color::Gray => {
                    let start = stack
                        .iter()
                        .position(|(frame, _)| *frame == next)
                        .unwrap_or(0);
                    let mut path: Vec<usize> =
                        stack[start..].iter().map(|(frame, _)| *frame).collect();
                    path.push(next);
                    return Some(path);
                }
                Color::Black => {}
            }
        }
    }

    None
}

fn edges_of<'a, K>(
    graph: &'a TaskGraph<K>,
    overlay: Option<(usize, &'a [usize])>,
    node: usize,
) -> &'a [usize]
where
    K: Copy + Eq + Hash + Ord,
{
    match overlay {
        Some((replaced, deps)) if replaced == node => deps,
        _ => graph.dependencies(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> TaskGraph<u32> {
        // 3 -> 2 -> 1
        TaskGraph::from_edges(vec![(1, vec![]), (2, vec![1]), (3, vec![2])])
    }

    #[test]
    fn accepts_new_task_on_existing_nodes() {
        assert_eq!(validate_dependencies(&chain(), None, &[1, 3]), Ok(()));
        assert_eq!(validate_dependencies(&chain(), Some(4), &[3]), Ok(()));
    }

    #[test]
    fn rejects_unknown_references_with_all_missing_ids() {
        assert_eq!(
            validate_dependencies(&chain(), Some(2), &[7, 1, 8, 7]),
            Err(DependencyViolation::UnknownReference {
                missing: vec![7, 8]
            })
        );
    }

    #[test]
    fn rejects_self_reference() {
        assert_eq!(
            validate_dependencies(&chain(), Some(2), &[2]),
            Err(DependencyViolation::SelfReference(2))
        );
    }

    #[test]
    fn rejects_back_edge_with_cycle_path() {
        match validate_dependencies(&chain(), Some(1), &[3]) {
            Err(DependencyViolation::Cycle { path }) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
                for key in [1, 2, 3] {
                    assert!(path.contains(&key));
                }
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn duplicate_proposed_ids_are_accepted_once() {
        assert_eq!(validate_dependencies(&chain(), Some(3), &[1, 1, 2]), Ok(()));
    }

    #[test]
    fn find_cycle_reports_none_for_dag() {
        assert_eq!(find_cycle(&chain()), None);
        let cyclic = TaskGraph::from_edges(vec![(1, vec![1])]);
        assert_eq!(find_cycle(&cyclic), Some(vec![1, 1]));
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let entries: Vec<(u32, Vec<u32>)> = (0..20_000)
            .map(|key| (key, if key == 0 { vec![] } else { vec![key - 1] }))
            .collect();
        let graph = TaskGraph::from_edges(entries);
        assert!(matches!(
            validate_dependencies(&graph, Some(0), &[19_999]),
            Err(DependencyViolation::Cycle { .. })
        ));
    }
}
