//! Ordering checks so prerequisites run first.

use std::collections::HashMap;

use crate::error::{CheckerError, Result};

/// Checks and what each one needs, in registration order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Placed,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` and its prerequisites; adding a name again extends them.
    pub fn add(&mut self, name: &str, needs: &[&str]) {
        let needs = needs.iter().map(|n| n.to_string());
        match self.nodes.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => existing.extend(needs),
            None => self.nodes.push((name.to_string(), needs.collect())),
        }
    }

    pub fn needs(&self, name: &str) -> Option<&[String]> {
        self.nodes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, needs)| needs.as_slice())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every prerequisite must itself be a node.
    pub fn validate(&self) -> Result<()> {
        for (name, needs) in &self.nodes {
            if let Some(missing) = needs.iter().find(|n| self.needs(n.as_str()).is_none()) {
                return Err(CheckerError::UnknownCheck {
                    name: format!("{missing} (needed by {name})"),
                });
            }
        }
        Ok(())
    }

    /// All nodes, each after its prerequisites.
    ///
    /// Independent nodes keep registration order. A cycle is reported with
    /// its path, e.g. `a -> b -> a`.
    pub fn order(&self) -> Result<Vec<String>> {
        self.validate()?;
        let mut marks = HashMap::new();
        let mut trail = Vec::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for (name, _) in &self.nodes {
            self.place(name, &mut marks, &mut trail, &mut order)?;
        }
        Ok(order)
    }

    fn place<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        trail: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        match marks.get(name).copied() {
            Some(Mark::Placed) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = trail.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle = trail[start..].to_vec();
                cycle.push(name);
                return Err(CheckerError::CircularDependency {
                    cycle: cycle.join(" -> "),
                });
            }
            None => {}
        }

        marks.insert(name, Mark::InProgress);
        trail.push(name);
        for need in self.needs(name).unwrap_or_default() {
            self.place(need, marks, trail, order)?;
        }
        trail.pop();
        marks.insert(name, Mark::Placed);
        order.push(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[(&str, &[&str])]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (name, needs) in nodes {
            graph.add(name, needs);
        }
        graph
    }

    #[test]
    fn empty_graph_orders_to_nothing() {
        let graph = DependencyGraph::new();
        assert!(graph.is_empty());
        assert!(graph.order().unwrap().is_empty());
    }

    #[test]
    fn independent_checks_keep_registration_order() {
        let graph = graph(&[("z", &[]), ("a", &[]), ("m", &["z"])]);
        assert_eq!(graph.order().unwrap(), vec!["z", "a", "m"]);
    }

    #[test]
    fn prerequisites_registered_later_still_come_first() {
        let graph = graph(&[
            ("search", &["calendar"]),
            ("calendar", &["principal"]),
            ("principal", &[]),
        ]);
        assert_eq!(graph.order().unwrap(), vec!["principal", "calendar", "search"]);
    }

    #[test]
    fn shared_prerequisite_is_placed_once() {
        let graph = graph(&[
            ("principal", &[]),
            ("search", &["principal"]),
            ("sync", &["principal"]),
        ]);
        assert_eq!(graph.order().unwrap(), vec!["principal", "search", "sync"]);
    }

    #[test]
    fn unknown_prerequisite_is_named() {
        let graph = graph(&[("search", &["nonexistent"])]);
        match graph.validate() {
            Err(CheckerError::UnknownCheck { name }) => {
                assert_eq!(name, "nonexistent (needed by search)")
            }
            other => panic!("expected an unknown check, got {:?}", other),
        }
    }

    #[test]
    fn cycle_path_is_reported() {
        let graph = graph(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"])]);
        match graph.order() {
            Err(CheckerError::CircularDependency { cycle }) => assert_eq!(cycle, "a -> c -> b -> a"),
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = graph(&[("a", &["a"])]);
        assert!(matches!(
            graph.order(),
            Err(CheckerError::CircularDependency { cycle }) if cycle == "a -> a"
        ));
    }

    #[test]
    fn adding_twice_merges_prerequisites() {
        let mut graph = graph(&[("p", &[]), ("q", &[]), ("s", &["p"])]);
        graph.add("s", &["q"]);
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.needs("s").unwrap(), ["p", "q"]);
    }
}
