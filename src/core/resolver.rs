//! Dependency graph and construction order.
//!
//! Builds a DAG from explicit `depends_on` edges and computes a topological
//! order with Kahn's algorithm. Among nodes that are ready at the same time
//! the alphabetically smallest id goes first, so the order is deterministic.

use super::error::BuildError;
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

/// Compute a construction order where every dependency precedes its
/// dependents. `graph` maps node id → ids it depends on.
pub fn build_order(graph: &IndexMap<String, Vec<String>>) -> Result<Vec<String>, BuildError> {
    let mut remaining_deps: HashMap<&str, usize> = HashMap::with_capacity(graph.len());
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::with_capacity(graph.len());

    for (id, deps) in graph {
        remaining_deps.insert(id.as_str(), deps.len());
        for dep in deps {
            if dep == id {
                return Err(BuildError::invalid(format!("'{}' depends on itself", id)));
            }
            if !graph.contains_key(dep) {
                return Err(BuildError::invalid(format!(
                    "'{}' depends on unknown resource '{}'",
                    id, dep
                )));
            }
            dependents.entry(dep.as_str()).or_default().push(id.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = remaining_deps
        .iter()
        .filter(|(_, &n)| n == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(current) = ready.pop_first() {
        order.push(current.to_string());
        for &next in dependents.get(current).map(Vec::as_slice).unwrap_or_default() {
            if let Some(n) = remaining_deps.get_mut(next) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(next);
                }
            }
        }
    }

    if order.len() != graph.len() {
        let mut stuck: Vec<&str> = remaining_deps
            .iter()
            .filter(|(_, &n)| n > 0)
            .map(|(&id, _)| id)
            .collect();
        stuck.sort_unstable();
        return Err(BuildError::invalid(format!(
            "dependency cycle detected involving: {}",
            stuck.join(", ")
        )));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> IndexMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(id, deps)| {
                (
                    id.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_linear() {
        let g = graph(&[("c", &["b"]), ("b", &["a"]), ("a", &[])]);
        assert_eq!(build_order(&g).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_independent_nodes_alphabetical() {
        let g = graph(&[("beta", &[]), ("alpha", &[])]);
        assert_eq!(build_order(&g).unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_diamond() {
        let g = graph(&[
            ("bottom", &["left", "right"]),
            ("right", &["top"]),
            ("left", &["top"]),
            ("top", &[]),
        ]);
        assert_eq!(
            build_order(&g).unwrap(),
            vec!["top", "left", "right", "bottom"]
        );
    }

    #[test]
    fn test_leaves_before_edges() {
        // A grant is ready only once both endpoints exist.
        let g = graph(&[
            ("wcs-prod-grant-wcs-table-prod", &["wcs-prod", "wcs-table-prod"]),
            ("wcs-table-prod", &[]),
            ("wcs-prod", &[]),
        ]);
        let order = build_order(&g).unwrap();
        assert_eq!(order.last().unwrap(), "wcs-prod-grant-wcs-table-prod");
    }

    #[test]
    fn test_cycle() {
        let g = graph(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);
        let err = build_order(&g).unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfiguration(ref m) if m.contains("cycle") && m.contains("a, b")));
    }

    #[test]
    fn test_unknown_dependency() {
        let g = graph(&[("a", &["ghost"])]);
        let err = build_order(&g).unwrap_err();
        assert!(err.to_string().contains("unknown resource 'ghost'"));
    }

    #[test]
    fn test_self_dependency() {
        let g = graph(&[("a", &["a"])]);
        assert!(build_order(&g).unwrap_err().to_string().contains("itself"));
    }

    #[test]
    fn test_empty_graph() {
        assert!(build_order(&IndexMap::new()).unwrap().is_empty());
    }
}
