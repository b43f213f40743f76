use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

use crate::cycle_check::find_cycle;
use crate::error::GraphError;
use crate::task::Task;

/// Collects tasks and edges, then validates them into a [`TaskGraph`].
#[derive(Debug, Default)]
pub struct TaskGraphBuilder {
    tasks: Vec<Task>,
    ids: HashSet<String>,
    edges: Vec<(String, String)>,
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: Task) -> Result<&mut Self, GraphError> {
        if !self.ids.insert(task.id.clone()) {
            return Err(GraphError::DuplicateTask(task.id));
        }
        self.tasks.push(task);
        Ok(self)
    }

    /// Declare that `from` must succeed before `to` may start.
    ///
    /// Unknown ids are reported by [`validate`](Self::validate).
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        let edge = (from.into(), to.into());
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        self
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        for (from, to) in &self.edges {
            for end in [from, to] {
                if !self.ids.contains(end) {
                    return Err(GraphError::UnknownTask {
                        from: from.clone(),
                        to: to.clone(),
                        unknown: end.clone(),
                    });
                }
            }
        }

        let order: Vec<String> = self.tasks.iter().map(|t| t.id.clone()).collect();
        let (_, dependents) = self.adjacency();
        match find_cycle(&order, &dependents) {
            Some(task_ids) => Err(GraphError::Cycle { task_ids }),
            None => Ok(()),
        }
    }

    pub fn build(self) -> Result<TaskGraph, GraphError> {
        self.validate()?;
        let (dependencies, dependents) = self.adjacency();
        let index = self
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();

        Ok(TaskGraph {
            tasks: self.tasks,
            index,
            dependencies,
            dependents,
        })
    }

    fn adjacency(&self) -> (HashMap<String, Vec<String>>, HashMap<String, Vec<String>>) {
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for (from, to) in &self.edges {
            dependencies.entry(to.clone()).or_default().push(from.clone());
            dependents.entry(from.clone()).or_default().push(to.clone());
        }
        (dependencies, dependents)
    }
}

/// Two tasks writing the same table with no ordering between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConflict {
    pub table: String,
    pub first: String,
    pub second: String,
}

/// Validated, immutable DAG of tasks.
///
/// Holds no run state, so one graph can back any number of runs.
#[derive(Debug)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    dependencies: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
}

impl TaskGraph {
    pub fn builder() -> TaskGraphBuilder {
        TaskGraphBuilder::new()
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tasks without dependencies, in declaration order.
    pub fn roots(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| self.dependencies_of(&t.id).is_empty())
            .map(|t| t.id.as_str())
            .collect()
    }

    /// Every task reachable downstream of `id`, excluding `id` itself.
    pub fn transitive_dependents(&self, id: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = self.dependents_of(id).iter().map(String::as_str).collect();
        let mut out = Vec::new();

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name) {
                continue;
            }
            out.push(name.to_string());
            queue.extend(self.dependents_of(name).iter().map(String::as_str));
        }

        out
    }

    /// Whether `to` is reachable from `from`.
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        self.transitive_dependents(from).iter().any(|d| d == to)
    }

    /// Pairs of tasks that write the same table but may run concurrently.
    pub fn unordered_writers(&self) -> Vec<WriteConflict> {
        let writers: Vec<(&str, &str)> = self
            .tasks
            .iter()
            .filter_map(|t| t.kind.target_table().map(|table| (t.id.as_str(), table)))
            .collect();

        let mut conflicts = Vec::new();
        for (i, (first, table)) in writers.iter().enumerate() {
            for (second, other_table) in &writers[i + 1..] {
                if table == other_table
                    && !self.has_path(first, second)
                    && !self.has_path(second, first)
                {
                    conflicts.push(WriteConflict {
                        table: table.to_string(),
                        first: first.to_string(),
                        second: second.to_string(),
                    });
                }
            }
        }
        conflicts
    }

    /// Dependency tree starting from every root, one task per line.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        for root in self.roots() {
            let _ = writeln!(out, "{root}");
            self.render_chain(root, "  ", &mut out);
        }
        out
    }

    fn render_chain(&self, name: &str, prefix: &str, out: &mut String) {
        for child in self.dependents_of(name) {
            let _ = writeln!(out, "{prefix}└─> {child}");
            self.render_chain(child, &format!("{prefix}    "), out);
        }
    }
}
