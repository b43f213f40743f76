use std::collections::{HashMap, HashSet};

/// Look for a cycle following `edges` (task -> downstream tasks).
///
/// Returns the cycle as a path that starts and ends on the same task, e.g.
/// `["a", "b", "a"]`, or `None` if the graph is acyclic. Roots are visited in
/// the order given so the reported cycle is deterministic.
pub fn find_cycle(order: &[String], edges: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut path: Vec<String> = Vec::new();

    fn dfs(
        task_name: &str,
        edges: &HashMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = path.iter().position(|p| p == task_name) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(task_name.to_string());
            return Some(cycle);
        }
        if visited.contains(task_name) {
            return None;
        }

        visited.insert(task_name.to_string());
        path.push(task_name.to_string());

        if let Some(next) = edges.get(task_name) {
            for child in next {
                if let Some(cycle) = dfs(child, edges, visited, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        None
    }

    for task_name in order {
        if !visited.contains(task_name) {
            if let Some(cycle) = dfs(task_name, edges, &mut visited, &mut path) {
                return Some(cycle);
            }
        }
    }

    None
}
