//! Static registry of checks.

use std::fmt;

use super::base::Check;
use super::dependency::DependencyGraph;
use crate::error::{CheckerError, Result};

/// Constructor for one check.
pub type CheckFactory = Box<dyn Fn() -> Box<dyn Check>>;

/// Maps check names to constructors.
///
/// Registration order is kept and breaks ties when ordering checks for a
/// full run.
#[derive(Default)]
pub struct CheckRegistry {
    entries: Vec<(&'static str, CheckFactory)>,
}

impl fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl CheckRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every check this tool ships.
    pub fn builtin() -> Self {
        use super::{calendar, freebusy, objects, principal, principal_search, recurrence, search, sync_token};

        let mut registry = Self::new();
        registry.register(|| Box::new(principal::CheckGetCurrentUserPrincipal));
        registry.register(|| Box::new(calendar::CheckMakeDeleteCalendar));
        registry.register(|| Box::new(calendar::PrepareCalendar));
        registry.register(|| Box::new(search::CheckSearch));
        registry.register(|| Box::new(recurrence::CheckRecurrenceSearch));
        registry.register(|| Box::new(sync_token::CheckSyncToken));
        registry.register(|| Box::new(objects::CheckDeleteObject));
        registry.register(|| Box::new(freebusy::CheckFreeBusyQuery));
        registry.register(|| Box::new(principal_search::CheckPrincipalSearch));
        registry
    }

    /// Add a check; a later registration under the same name replaces it.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn Check> + 'static,
    {
        let name = factory().name();
        let factory: CheckFactory = Box::new(factory);
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push((name, factory)),
        }
    }

    /// Instantiate a check by name.
    pub fn create(&self, name: &str) -> Result<Box<dyn Check>> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, factory)| factory())
            .ok_or_else(|| CheckerError::UnknownCheck {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| *n == name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dependency graph of the registered checks.
    ///
    /// Fails if a check depends on something that is not registered.
    pub fn graph(&self) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for (name, factory) in &self.entries {
            graph.add(name, factory().depends_on());
        }
        graph.validate()?;
        Ok(graph)
    }

    /// Names in an order where dependencies come first.
    pub fn execution_order(&self) -> Result<Vec<String>> {
        self.graph()?.order()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::base::CheckContext;

    struct Named(&'static str, &'static [&'static str]);

    impl Check for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn features_to_be_checked(&self) -> &'static [&'static str] {
            &[]
        }

        fn depends_on(&self) -> &'static [&'static str] {
            self.1
        }

        fn run(&self, _ctx: &mut CheckContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn builtin_graph_is_valid() {
        let registry = CheckRegistry::builtin();
        let order = registry.execution_order().unwrap();
        assert_eq!(order.len(), registry.len());
        assert_eq!(order[0], "get-current-user-principal");

        let idx = |name: &str| order.iter().position(|s| s == name).unwrap();
        assert!(idx("make-delete-calendar") < idx("prepare-calendar"));
        assert!(idx("prepare-calendar") < idx("search"));
        assert!(idx("prepare-calendar") < idx("sync-token"));
        assert!(idx("prepare-calendar") < idx("delete-object"));
        assert!(idx("prepare-calendar") < idx("freebusy-query"));
    }

    #[test]
    fn create_unknown_check_fails() {
        let registry = CheckRegistry::builtin();
        assert!(matches!(
            registry.create("no-such-check"),
            Err(CheckerError::UnknownCheck { .. })
        ));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut registry = CheckRegistry::new();
        registry.register(|| Box::new(Named("lonely", &["missing"])));
        assert!(registry.graph().is_err());
    }

    #[test]
    fn cycles_are_rejected() {
        let mut registry = CheckRegistry::new();
        registry.register(|| Box::new(Named("a", &["b"])));
        registry.register(|| Box::new(Named("b", &["a"])));
        assert!(matches!(
            registry.execution_order(),
            Err(CheckerError::CircularDependency { .. })
        ));
    }

    #[test]
    fn reregistering_replaces() {
        let mut registry = CheckRegistry::new();
        registry.register(|| Box::new(Named("a", &[])));
        registry.register(|| Box::new(Named("a", &["a"])));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.create("a").unwrap().depends_on(), &["a"]);
    }
}
