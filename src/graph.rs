use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::CrewError;
use crate::registry::AgentRegistry;
use crate::task::{TaskDescriptor, TaskId};

/// Validated task list. Dependencies only point backward, so the declaration
/// order is already a topological order.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: Vec<TaskDescriptor>,
    deps: Vec<Vec<usize>>,
    index: HashMap<TaskId, usize>,
}

impl TaskGraph {
    pub fn new(tasks: Vec<TaskDescriptor>) -> Result<Self, CrewError> {
        if tasks.is_empty() {
            return Err(CrewError::config("a crew needs at least one task"));
        }

        let mut declared = HashSet::new();
        for task in &tasks {
            if !declared.insert(task.id.clone()) {
                return Err(CrewError::config(format!(
                    "task id '{}' is declared more than once",
                    task.id
                )));
            }
        }

        let mut index = HashMap::<TaskId, usize>::new();
        let mut deps = Vec::with_capacity(tasks.len());
        for (position, task) in tasks.iter().enumerate() {
            let mut resolved = Vec::with_capacity(task.context.len());
            for dependency in &task.context {
                match index.get(dependency) {
                    Some(dep_idx) => {
                        if !resolved.contains(dep_idx) {
                            resolved.push(*dep_idx);
                        }
                    }
                    None if declared.contains(dependency) => {
                        return Err(CrewError::CyclicOrForwardReference {
                            task: task.id.to_string(),
                            dependency: dependency.to_string(),
                        });
                    }
                    None => return Err(CrewError::not_found("task", dependency.as_str())),
                }
            }

            if let Some(rule) = &task.short_circuit
                && !task.context.contains(&rule.when)
            {
                return Err(CrewError::config(format!(
                    "task '{}' short-circuits on '{}', which is not in its context",
                    task.id, rule.when
                )));
            }

            index.insert(task.id.clone(), position);
            deps.push(resolved);
        }

        Ok(Self { tasks, deps, index })
    }

    /// Every task's agent must be registered.
    pub fn validate_agents(&self, registry: &AgentRegistry) -> Result<(), CrewError> {
        for task in &self.tasks {
            if !registry.contains(&task.agent) {
                return Err(CrewError::not_found("agent", task.agent.as_str()));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[TaskDescriptor] {
        &self.tasks
    }

    pub fn task(&self, idx: usize) -> &TaskDescriptor {
        &self.tasks[idx]
    }

    pub fn index_of(&self, id: &TaskId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn dependencies(&self, idx: usize) -> &[usize] {
        &self.deps[idx]
    }

    pub fn execution_order(&self) -> Vec<usize> {
        (0..self.tasks.len()).collect()
    }

    /// Tasks that depend on `idx` directly or transitively.
    pub fn dependents_closure(&self, idx: usize) -> BTreeSet<usize> {
        let mut closure = BTreeSet::new();
        // dependents always come later in declaration order
        for candidate in idx + 1..self.tasks.len() {
            if self.deps[candidate]
                .iter()
                .any(|dep| *dep == idx || closure.contains(dep))
            {
                closure.insert(candidate);
            }
        }
        closure
    }

    /// The last declared task; its output is the crew's final output.
    pub fn final_task(&self) -> usize {
        self.tasks.len() - 1
    }
}
