//! The dependency-graph scheduler (core component #4, §4.4) — the largest
//! single piece of the core. Drives a map of tasks to completion according
//! to two separate DAGs (start-dependencies, end-dependencies) without
//! knowing anything about what the tasks themselves do.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use auction_shared::{StateLock, TaskHandle, TaskId, TaskState};
use tracing::{debug, warn};

use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Default)]
pub struct Scheduler {
    start_deps: HashMap<TaskId, HashSet<TaskId>>,
    end_deps: HashMap<TaskId, HashSet<TaskId>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with empty dependency sets. Returns `false` if already
    /// present (matching §4.4's boolean-return contract rather than an
    /// error, since callers routinely probe for "already added").
    pub fn add_task(&mut self, id: TaskId) -> bool {
        if self.start_deps.contains_key(&id) {
            return false;
        }
        self.start_deps.insert(id, HashSet::new());
        self.end_deps.insert(id, HashSet::new());
        true
    }

    /// `a` may not start until `b` is `ENDED`. Requires both nodes present
    /// and `a != b`.
    pub fn add_start_depend(&mut self, a: TaskId, b: TaskId) -> SchedulerResult<()> {
        self.add_depend(a, b, true)
    }

    /// `a` may not end until `b` is at least `ENDABLE`.
    pub fn add_end_depend(&mut self, a: TaskId, b: TaskId) -> SchedulerResult<()> {
        self.add_depend(a, b, false)
    }

    fn add_depend(&mut self, a: TaskId, b: TaskId, start: bool) -> SchedulerResult<()> {
        if a == b {
            return Err(SchedulerError::SelfDependency(a));
        }
        if !self.start_deps.contains_key(&a) {
            return Err(SchedulerError::UnknownTask(a));
        }
        if !self.start_deps.contains_key(&b) {
            return Err(SchedulerError::UnknownTask(b));
        }
        let deps = if start { &mut self.start_deps } else { &mut self.end_deps };
        deps.get_mut(&a).expect("presence checked above").insert(b);
        Ok(())
    }

    /// Kahn's-algorithm traversal of the start-dependency graph: `id` only
    /// appears once every `b` it depends on has already appeared. Returns
    /// an empty vector iff the start graph has a cycle (§4.4).
    pub fn topological_sort(&self) -> Vec<TaskId> {
        let mut indegree: HashMap<TaskId, usize> =
            self.start_deps.iter().map(|(id, deps)| (*id, deps.len())).collect();

        let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for (id, deps) in &self.start_deps {
            for dep in deps {
                dependents.entry(*dep).or_default().push(*id);
            }
        }

        let mut queue: VecDeque<TaskId> =
            indegree.iter().filter(|(_, &d)| d == 0).map(|(id, _)| *id).collect();
        let mut order = Vec::with_capacity(self.start_deps.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(deps) = dependents.get(&id) {
                for &dependent in deps {
                    let entry = indegree.get_mut(&dependent).expect("dependent was registered");
                    *entry -= 1;
                    if *entry == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != self.start_deps.len() {
            return Vec::new();
        }
        order
    }

    fn end_partners_ready(&self, id: TaskId, tasks: &HashMap<TaskId, Arc<dyn TaskHandle>>, states: &HashMap<TaskId, TaskState>) -> bool {
        self.end_deps.get(&id).into_iter().flatten().all(|partner| {
            tasks.contains_key(partner) && states.get(partner).is_some_and(TaskState::at_least_endable)
        })
    }

    fn end_partners_reachable(&self, id: TaskId, tasks: &HashMap<TaskId, Arc<dyn TaskHandle>>) -> bool {
        self.end_deps.get(&id).into_iter().flatten().all(|partner| tasks.contains_key(partner))
    }

    fn start_partners_ended(&self, id: TaskId, states: &HashMap<TaskId, TaskState>) -> bool {
        self.start_deps
            .get(&id)
            .into_iter()
            .flatten()
            .all(|partner| states.get(partner) == Some(&TaskState::Ended))
    }

    /// Drives `tasks` to completion. Ids present in `tasks` but not
    /// registered via [`Self::add_task`] are treated as having no
    /// dependencies and no dependents.
    pub async fn execute(&self, tasks: &HashMap<TaskId, Arc<dyn TaskHandle>>) {
        let shared_lock = StateLock::new();
        for (id, task) in tasks {
            if let Err(err) = task.set_state_lock(shared_lock.clone()) {
                warn!(task_id = id, error = %err, "could not install shared state lock before execute");
            }
        }

        loop {
            // Constructed before any state is read: race-free against a
            // notify fired concurrently with this iteration's snapshot.
            let notified = shared_lock.notified();

            let states: HashMap<TaskId, TaskState> =
                tasks.iter().map(|(id, t)| (*id, t.state())).collect();

            let endable: Vec<TaskId> = tasks
                .keys()
                .copied()
                .filter(|id| {
                    states.get(id) == Some(&TaskState::Endable)
                        && self.end_partners_ready(*id, tasks, &states)
                })
                .collect();

            for id in &endable {
                tasks[id].try_end();
            }
            for id in &endable {
                debug!(task_id = id, "waiting for task to reach ENDED");
                tasks[id].wait_for_end().await;
            }

            let states: HashMap<TaskId, TaskState> =
                tasks.iter().map(|(id, t)| (*id, t.state())).collect();

            let startable: Vec<TaskId> = tasks
                .keys()
                .copied()
                .filter(|id| {
                    states.get(id) == Some(&TaskState::New)
                        && self.start_partners_ended(*id, &states)
                        && self.end_partners_reachable(*id, tasks)
                })
                .collect();

            for id in &startable {
                debug!(task_id = id, "starting task");
                tasks[id].spawn_run();
            }

            let any_active = tasks
                .values()
                .any(|t| matches!(t.state(), TaskState::Running | TaskState::Endable | TaskState::Ending));

            if startable.is_empty() && !any_active {
                break;
            }

            if startable.is_empty() && endable.is_empty() {
                notified.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_task_rejects_duplicates() {
        let mut s = Scheduler::new();
        assert!(s.add_task(1));
        assert!(!s.add_task(1));
    }

    #[test]
    fn add_start_depend_rejects_self_loop_and_unknown_nodes() {
        let mut s = Scheduler::new();
        s.add_task(1);
        assert!(matches!(s.add_start_depend(1, 1), Err(SchedulerError::SelfDependency(1))));
        assert!(matches!(s.add_start_depend(1, 2), Err(SchedulerError::UnknownTask(2))));
    }

    #[test]
    fn topological_sort_orders_dependencies_first() {
        let mut s = Scheduler::new();
        s.add_task(1);
        s.add_task(2);
        s.add_task(3);
        s.add_start_depend(2, 1).unwrap(); // 2 depends on 1
        s.add_start_depend(3, 2).unwrap(); // 3 depends on 2

        let order = s.topological_sort();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn topological_sort_detects_cycles() {
        let mut s = Scheduler::new();
        s.add_task(1);
        s.add_task(2);
        s.add_start_depend(1, 2).unwrap();
        s.add_start_depend(2, 1).unwrap();

        assert!(s.topological_sort().is_empty());
    }

    #[test]
    fn topological_sort_with_no_edges_returns_every_node() {
        let mut s = Scheduler::new();
        s.add_task(1);
        s.add_task(2);
        let order = s.topological_sort();
        assert_eq!(order.len(), 2);
        assert!(order.contains(&1) && order.contains(&2));
    }
}
