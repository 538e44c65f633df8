//! Critical-path schedule calculator.
//!
//! # Responsibility
//! - Forward pass: earliest start/finish in topological order.
//! - Backward pass: latest start/finish from the target finish.
//! - Pick one deterministic critical path and filter ready tasks.
//!
//! # Invariants
//! - Times are whole days relative to the caller's base date.
//! - Dependencies on ids outside the node set are ignored, so hidden tasks
//!   and out-of-scope tasks never constrain the schedule.
//! - Critical tasks are those with the minimum slack, which is zero
//!   unless an explicit target finish is supplied.

use crate::graph::arena::TaskGraph;
use crate::graph::validator::find_cycle;
use crate::model::task::{Task, TaskId};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;

/// One task as seen by the calculator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleNode<K> {
    pub id: K,
    pub duration: i64,
    /// Earliest allowed start, in days after the base date.
    pub not_before: i64,
    pub dependencies: Vec<K>,
}

impl<K> ScheduleNode<K> {
    pub fn new(id: K, duration: i64, dependencies: Vec<K>) -> Self {
        Self {
            id,
            duration,
            not_before: 0,
            dependencies,
        }
    }
}

/// Computed timing for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask<K> {
    pub id: K,
    pub duration: i64,
    pub earliest_start: i64,
    pub earliest_finish: i64,
    pub latest_start: i64,
    pub latest_finish: i64,
    pub is_critical: bool,
}

impl<K> ScheduledTask<K> {
    pub fn slack(&self) -> i64 {
        self.latest_start - self.earliest_start
    }
}

/// Contiguous chain of critical tasks from a source to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalPath<K> {
    /// Ordered from the first task to run to the last.
    pub task_ids: Vec<K>,
    pub total_duration: i64,
}

/// Output of one calculator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleResult<K> {
    /// Tasks in topological order (dependencies first).
    pub tasks: Vec<ScheduledTask<K>>,
    /// Day offset the backward pass started from.
    pub target_finish: i64,
    /// Latest earliest-finish across all tasks.
    pub project_finish: i64,
    pub critical_path: CriticalPath<K>,
}

impl<K: Copy + Eq> ScheduleResult<K> {
    pub fn task(&self, id: K) -> Option<&ScheduledTask<K>> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn critical_task_ids(&self) -> Vec<K> {
        self.tasks
            .iter()
            .filter(|task| task.is_critical)
            .map(|task| task.id)
            .collect()
    }
}

/// Calculator input errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError<K> {
    DuplicateNode(K),
    NegativeDuration(K),
    Cycle { path: Vec<K> },
}

impl<K: Debug> Display for ScheduleError<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNode(id) => write!(f, "task listed twice in schedule input: {id:?}"),
            Self::NegativeDuration(id) => write!(f, "task has a negative duration: {id:?}"),
            Self::Cycle { path } => write!(f, "task graph contains a cycle: {path:?}"),
        }
    }
}

impl<K: Debug> Error for ScheduleError<K> {}

/// Runs the forward and backward passes over `nodes`.
///
/// `target_finish = None` uses the largest earliest finish.
pub fn compute_schedule<K>(
    nodes: &[ScheduleNode<K>],
    target_finish: Option<i64>,
) -> Result<ScheduleResult<K>, ScheduleError<K>>
where
    K: Copy + Eq + Hash + Ord,
{
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !seen.insert(node.id) {
            return Err(ScheduleError::DuplicateNode(node.id));
        }
        if node.duration < 0 {
            return Err(ScheduleError::NegativeDuration(node.id));
        }
    }

    let graph = TaskGraph::from_edges(
        nodes
            .iter()
            .map(|node| (node.id, node.dependencies.clone())),
    );
    let Some(order) = graph.topological_order() else {
        return Err(ScheduleError::Cycle {
            path: find_cycle(&graph).unwrap_or_default(),
        });
    };

    let by_key: HashMap<K, &ScheduleNode<K>> = nodes.iter().map(|node| (node.id, node)).collect();
    let node_at = |index: usize| by_key[&graph.key(index)];

    let count = graph.len();
    let mut earliest_start = vec![0_i64; count];
    let mut earliest_finish = vec![0_i64; count];
    for &index in &order {
        let node = node_at(index);
        let start = graph
            .dependencies(index)
            .iter()
            .map(|dep| earliest_finish[*dep])
            .fold(node.not_before.max(0), i64::max);
        earliest_start[index] = start;
        earliest_finish[index] = start + node.duration;
    }

    let project_finish = earliest_finish.iter().copied().max().unwrap_or(0);
    let target = target_finish.unwrap_or(project_finish);

    let dependents = graph.dependents();
    let mut latest_start = vec![0_i64; count];
    let mut latest_finish = vec![0_i64; count];
    for &index in order.iter().rev() {
        let finish = dependents[index]
            .iter()
            .map(|dependent| latest_start[*dependent])
            .fold(target, i64::min);
        latest_finish[index] = finish;
        latest_start[index] = finish - node_at(index).duration;
    }

    let min_slack = (0..count)
        .map(|index| latest_start[index] - earliest_start[index])
        .min()
        .unwrap_or(0);
    let critical: Vec<bool> = (0..count)
        .map(|index| latest_start[index] - earliest_start[index] == min_slack)
        .collect();

    let critical_path = pick_critical_path(
        &graph,
        &order,
        &critical,
        &earliest_start,
        &earliest_finish,
        |index| node_at(index).duration,
    );

    let tasks = order
        .iter()
        .map(|&index| ScheduledTask {
            id: graph.key(index),
            duration: node_at(index).duration,
            earliest_start: earliest_start[index],
            earliest_finish: earliest_finish[index],
            latest_start: latest_start[index],
            latest_finish: latest_finish[index],
            is_critical: critical[index],
        })
        .collect();

    Ok(ScheduleResult {
        tasks,
        target_finish: target,
        project_finish,
        critical_path,
    })
}

/// Longest-duration chain of critical tasks linked by tight edges
/// (dependency finishes exactly when the dependent starts).
///
/// Ties go to the lexicographically smallest id sequence.
fn pick_critical_path<K, D>(
    graph: &TaskGraph<K>,
    order: &[usize],
    critical: &[bool],
    earliest_start: &[i64],
    earliest_finish: &[i64],
    duration: D,
) -> CriticalPath<K>
where
    K: Copy + Eq + Hash + Ord,
    D: Fn(usize) -> i64,
{
    let dependents = graph.dependents();
    let tight = |dep: usize, node: usize| {
        critical[dep] && critical[node] && earliest_finish[dep] == earliest_start[node]
    };

    let mut best: Vec<Option<(i64, Vec<K>)>> = vec![None; graph.len()];
    for &node in order {
        if !critical[node] {
            continue;
        }
        let mut candidate: Option<(i64, Vec<K>)> = None;
        for &dep in graph.dependencies(node) {
            if !tight(dep, node) {
                continue;
            }
            if let Some((total, path)) = &best[dep] {
                let mut extended = path.clone();
                extended.push(graph.key(node));
                let next = (total + duration(node), extended);
                if better(&next, candidate.as_ref()) {
                    candidate = Some(next);
                }
            }
        }
        best[node] = Some(candidate.unwrap_or_else(|| (duration(node), vec![graph.key(node)])));
    }

    let mut chosen: Option<(i64, Vec<K>)> = None;
    for &node in order {
        let is_sink = !dependents[node].iter().any(|next| tight(node, *next));
        if !critical[node] || !is_sink {
            continue;
        }
        if let Some(entry) = &best[node] {
            if better(entry, chosen.as_ref()) {
                chosen = Some(entry.clone());
            }
        }
    }

    chosen
        .map(|(total_duration, task_ids)| CriticalPath {
            task_ids,
            total_duration,
        })
        .unwrap_or(CriticalPath {
            task_ids: Vec::new(),
            total_duration: 0,
        })
}

fn better<K: Ord>(candidate: &(i64, Vec<K>), current: Option<&(i64, Vec<K>)>) -> bool {
    match current {
        None => true,
        Some(current) => match candidate.0.cmp(&current.0) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => candidate.1 < current.1,
        },
    }
}

/// Ids of visible, non-terminal tasks whose visible dependencies are all
/// terminal. Result follows the input order.
///
/// This is looser than "every dependency is terminal": a hidden dependency
/// counts as satisfied whatever its status, since a hidden task is out of
/// scope for the project's current configuration. Callers that need the
/// strict rule must filter hidden dependencies themselves. Dependencies
/// outside `tasks` are treated as unmet.
pub fn ready_task_ids(tasks: &[Task]) -> Vec<TaskId> {
    let by_id: HashMap<TaskId, &Task> = tasks.iter().map(|task| (task.id, task)).collect();
    tasks
        .iter()
        .filter(|task| !task.is_hidden && !task.status.is_terminal())
        .filter(|task| {
            task.dependencies.iter().all(|dep| match by_id.get(dep) {
                Some(dep) => dep.is_hidden || dep.status.is_terminal(),
                None => false,
            })
        })
        .map(|task| task.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::TaskStatus;
    use uuid::Uuid;

    fn diamond() -> Vec<ScheduleNode<char>> {
        vec![
            ScheduleNode::new('A', 2, vec![]),
            ScheduleNode::new('B', 3, vec!['A']),
            ScheduleNode::new('C', 1, vec!['A']),
            ScheduleNode::new('D', 1, vec!['B', 'C']),
        ]
    }

    #[test]
    fn diamond_critical_path_and_slack() {
        let result = compute_schedule(&diamond(), None).unwrap();
        assert_eq!(result.project_finish, 6);
        assert_eq!(result.critical_path.task_ids, vec!['A', 'B', 'D']);
        assert_eq!(result.critical_path.total_duration, 6);

        let c = result.task('C').unwrap();
        assert_eq!(c.earliest_start, 2);
        assert_eq!(c.latest_start, 4);
        assert_eq!(c.slack(), 2);
        assert!(!c.is_critical);

        let d = result.task('D').unwrap();
        assert_eq!((d.earliest_start, d.earliest_finish), (5, 6));
        assert_eq!(result.critical_task_ids(), vec!['A', 'B', 'D']);
    }

    #[test]
    fn equal_paths_tie_break_on_smallest_ids() {
        let nodes = vec![
            ScheduleNode::new('A', 1, vec![]),
            ScheduleNode::new('C', 2, vec!['A']),
            ScheduleNode::new('B', 2, vec!['A']),
            ScheduleNode::new('D', 1, vec!['B', 'C']),
        ];
        let result = compute_schedule(&nodes, None).unwrap();
        assert_eq!(result.critical_path.task_ids, vec!['A', 'B', 'D']);
        assert_eq!(result.critical_task_ids().len(), 4);
    }

    #[test]
    fn longer_independent_chain_wins() {
        let nodes = vec![
            ScheduleNode::new('A', 2, vec![]),
            ScheduleNode::new('B', 2, vec![]),
            ScheduleNode::new('Z', 4, vec![]),
        ];
        // A and B finish early; Z alone reaches the finish.
        let result = compute_schedule(&nodes, None).unwrap();
        assert_eq!(result.critical_path.task_ids, vec!['Z']);
    }

    #[test]
    fn not_before_delays_start_and_unknown_deps_are_ignored() {
        let mut late = ScheduleNode::new('B', 1, vec!['A', 'X']);
        late.not_before = 5;
        let nodes = vec![ScheduleNode::new('A', 2, vec![]), late];
        let result = compute_schedule(&nodes, None).unwrap();
        let b = result.task('B').unwrap();
        assert_eq!(b.earliest_start, 5);
        assert_eq!(result.project_finish, 6);
        assert_eq!(result.task('A').unwrap().slack(), 3);
    }

    #[test]
    fn explicit_target_shifts_latest_dates() {
        let result = compute_schedule(&diamond(), Some(10)).unwrap();
        assert_eq!(result.target_finish, 10);
        let a = result.task('A').unwrap();
        assert_eq!(a.slack(), 4);
        assert_eq!(result.critical_path.task_ids, vec!['A', 'B', 'D']);
    }

    #[test]
    fn cycles_and_duplicates_are_rejected() {
        let cyclic = vec![
            ScheduleNode::new(1, 1, vec![2]),
            ScheduleNode::new(2, 1, vec![1]),
        ];
        assert!(matches!(
            compute_schedule(&cyclic, None),
            Err(ScheduleError::Cycle { .. })
        ));

        let duplicated = vec![ScheduleNode::new(1, 1, vec![]), ScheduleNode::new(1, 2, vec![])];
        assert_eq!(
            compute_schedule(&duplicated, None),
            Err(ScheduleError::DuplicateNode(1))
        );
    }

    #[test]
    fn empty_input_yields_empty_schedule() {
        let result = compute_schedule::<u32>(&[], None).unwrap();
        assert!(result.tasks.is_empty());
        assert_eq!(result.project_finish, 0);
        assert!(result.critical_path.task_ids.is_empty());
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    struct Crew(u8);

    #[test]
    fn keys_without_default_still_produce_a_path() {
        let empty = compute_schedule::<Crew>(&[], None).unwrap();
        assert!(empty.critical_path.task_ids.is_empty());
        assert_eq!(empty.critical_path.total_duration, 0);

        let nodes = vec![
            ScheduleNode::new(Crew(1), 2, vec![]),
            ScheduleNode::new(Crew(2), 1, vec![Crew(1)]),
        ];
        let result = compute_schedule(&nodes, None).unwrap();
        assert_eq!(result.critical_path.task_ids, vec![Crew(1), Crew(2)]);
        assert_eq!(result.critical_path.total_duration, 3);
    }

    #[test]
    fn ready_tasks_require_terminal_dependencies() {
        let project = Uuid::new_v4();
        let mut done = Task::new(project, "Survey", 1);
        done.status = TaskStatus::Done;
        let mut hidden = Task::new(project, "Basement", 3);
        hidden.is_hidden = true;
        let open = Task::new(project, "Excavate", 2);

        let mut ready = Task::new(project, "Footings", 2);
        ready.dependencies = vec![done.id, hidden.id];
        let mut blocked = Task::new(project, "Slab", 2);
        blocked.dependencies = vec![done.id, open.id];

        let ids = ready_task_ids(&[
            done.clone(),
            hidden.clone(),
            open.clone(),
            ready.clone(),
            blocked,
        ]);
        assert_eq!(ids, vec![open.id, ready.id]);
    }
}
