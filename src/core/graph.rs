//! Dependency graph helpers: start order and transitive dependents.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ConfigError;

/// Returns a start order in which every service follows its dependencies.
///
/// Among services that are ready at the same time, names are taken in
/// lexical order so the result is deterministic.
pub(crate) fn start_order(deps: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>, ConfigError> {
    for (service, list) in deps {
        if let Some(missing) = list.iter().find(|d| !deps.contains_key(*d)) {
            return Err(ConfigError::UnknownDependency {
                service: service.clone(),
                dependency: missing.clone(),
            });
        }
    }

    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = deps
        .iter()
        .map(|(name, list)| (name.as_str(), list.iter().map(String::as_str).collect()))
        .collect();
    let mut order = Vec::with_capacity(deps.len());

    while let Some(next) = remaining
        .iter()
        .find(|(_, pending)| pending.is_empty())
        .map(|(name, _)| *name)
    {
        remaining.remove(next);
        for pending in remaining.values_mut() {
            pending.remove(next);
        }
        order.push(next.to_string());
    }

    if remaining.is_empty() {
        Ok(order)
    } else {
        Err(ConfigError::CyclicDependency {
            cycle: find_cycle(&remaining),
        })
    }
}

/// Walks unresolved edges from the first stuck service until a name repeats.
fn find_cycle(stuck: &BTreeMap<&str, BTreeSet<&str>>) -> Vec<String> {
    let mut path: Vec<&str> = Vec::new();
    let mut cur = match stuck.keys().next() {
        Some(first) => *first,
        None => return Vec::new(),
    };
    loop {
        if let Some(pos) = path.iter().position(|p| *p == cur) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(cur.to_string());
            return cycle;
        }
        path.push(cur);
        match stuck.get(cur).and_then(|pending| pending.iter().next()) {
            Some(next) => cur = *next,
            None => return path.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Returns every service that (transitively) depends on `root`, sorted by name.
pub(crate) fn dependents(deps: &BTreeMap<String, Vec<String>>, root: &str) -> Vec<String> {
    let mut found: BTreeSet<&str> = BTreeSet::new();
    let mut frontier = vec![root];
    while let Some(cur) = frontier.pop() {
        for (name, list) in deps {
            if list.iter().any(|d| d == cur) && found.insert(name.as_str()) {
                frontier.push(name.as_str());
            }
        }
    }
    found.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(n, ds)| (n.to_string(), ds.iter().map(|d| d.to_string()).collect()))
            .collect()
    }

    #[test]
    fn dependencies_come_first() {
        let g = graph(&[
            ("voice", &["audio", "network"]),
            ("audio", &[]),
            ("network", &[]),
            ("lights", &["network"]),
        ]);
        let order = start_order(&g).expect("acyclic");
        let pos = |n: &str| order.iter().position(|x| x == n).expect("present");
        assert!(pos("audio") < pos("voice"));
        assert!(pos("network") < pos("voice"));
        assert!(pos("network") < pos("lights"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let g = graph(&[("a", &["a"])]);
        match start_order(&g) {
            Err(ConfigError::CyclicDependency { cycle }) => assert_eq!(cycle, ["a", "a"]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn longer_cycle_is_named() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]);
        match start_order(&g) {
            Err(ConfigError::CyclicDependency { cycle }) => assert_eq!(cycle, ["a", "b", "c", "a"]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn dependents_are_transitive() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);
        assert_eq!(dependents(&g, "a"), ["b", "c"]);
        assert!(dependents(&g, "d").is_empty());
    }
}
