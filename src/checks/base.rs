//! The check execution protocol.
//!
//! A [`Check`] declares which features it records and which checks must run
//! before it. [`Check::run_check`] takes care of the rest: dependencies run
//! first (with the client's expected feature profile hidden), the check body
//! runs against a [`CheckContext`], and afterwards the features actually
//! written are compared against the declaration.

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};

use tracing::{debug, info};

use crate::caldav::{CalendarRef, DavClient, DavError, Principal};
use crate::checker::{Fixtures, QuirkChecker};
use crate::error::{CheckerError, Result};
use crate::features::{catalog, FeatureSet, FeatureValue, Support, SupportDescriptor};

/// One unit of probing logic.
pub trait Check {
    /// Registry identifier.
    fn name(&self) -> &'static str;

    /// Feature paths the body records, exactly.
    fn features_to_be_checked(&self) -> &'static [&'static str];

    /// Checks that must have run before this one.
    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    /// The check body.
    fn run(&self, ctx: &mut CheckContext<'_>) -> Result<()>;

    /// Run dependencies, then the body, then verify the feature contract.
    ///
    /// With `only_once`, a check that already ran is skipped entirely, and
    /// the same applies to each dependency.
    fn run_check(&self, checker: &mut QuirkChecker, only_once: bool) -> Result<()> {
        execute(self, checker, only_once)
    }
}

/// Hides the client's expected feature profile for as long as it lives.
///
/// The profile is put back on drop, so an error or panic in a dependency
/// cannot leave the client without it.
pub struct FeatureScope<'a> {
    checker: &'a mut QuirkChecker,
    saved: Option<FeatureSet>,
}

impl<'a> FeatureScope<'a> {
    pub fn new(checker: &'a mut QuirkChecker) -> Self {
        let saved = checker.client.replace_features(FeatureSet::new());
        Self {
            checker,
            saved: Some(saved),
        }
    }
}

impl Deref for FeatureScope<'_> {
    type Target = QuirkChecker;

    fn deref(&self) -> &QuirkChecker {
        self.checker
    }
}

impl DerefMut for FeatureScope<'_> {
    fn deref_mut(&mut self) -> &mut QuirkChecker {
        self.checker
    }
}

impl Drop for FeatureScope<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.checker.client.replace_features(saved);
        }
    }
}

fn execute<C: Check + ?Sized>(check: &C, checker: &mut QuirkChecker, only_once: bool) -> Result<()> {
    let name = check.name();
    if only_once && checker.has_run(name) {
        debug!(check = name, "Already run, skipping");
        return Ok(());
    }

    // A custom registry can lead back here through the dependencies.
    if let Some(start) = checker.running.iter().position(|n| *n == name) {
        let mut cycle = checker.running[start..].to_vec();
        cycle.push(name);
        return Err(CheckerError::CircularDependency {
            cycle: cycle.join(" -> "),
        });
    }

    checker.running.push(name);
    let outcome = execute_steps(check, checker, only_once);
    checker.running.pop();
    outcome
}

fn execute_steps<C: Check + ?Sized>(check: &C, checker: &mut QuirkChecker, only_once: bool) -> Result<()> {
    let name = check.name();
    for dependency in check.depends_on() {
        let dep = checker.registry.create(dependency)?;
        debug!(check = name, dependency = *dependency, "Running dependency");
        let mut scope = FeatureScope::new(checker);
        dep.run_check(&mut scope, only_once)?;
    }

    info!(check = name, "Running check");
    let before: BTreeSet<String> = checker.features_checked.paths().map(str::to_string).collect();

    let mut ctx = CheckContext {
        checker: &mut *checker,
        check: name,
        touched: BTreeSet::new(),
    };
    check.run(&mut ctx)?;
    let touched = ctx.touched;

    let newly: BTreeSet<String> = checker
        .features_checked
        .paths()
        .filter(|p| !before.contains(*p))
        .map(str::to_string)
        .chain(touched)
        .collect();
    verify_contract(name, check.features_to_be_checked(), &newly)?;

    checker.mark_run(name);
    info!(check = name, "Check finished");
    Ok(())
}

/// Compare the newly written paths against the declaration.
///
/// A declared path counts as covered when it or one of its ancestors was
/// written. A written path is accepted when it is declared or is an
/// ancestor of a declared path.
pub fn verify_contract(check: &str, declared: &[&str], newly: &BTreeSet<String>) -> Result<()> {
    debug!(check, written = newly.len(), declared = declared.len(), "Verifying feature contract");

    let missing: Vec<String> = declared
        .iter()
        .filter(|d| !newly.contains(**d) && !catalog::ancestors(d).any(|a| newly.contains(a)))
        .map(|d| d.to_string())
        .collect();

    let extra: Vec<String> = newly
        .iter()
        .filter(|p| {
            !declared.contains(&p.as_str()) && !declared.iter().any(|d| catalog::is_ancestor(p, d))
        })
        .cloned()
        .collect();

    if missing.is_empty() && extra.is_empty() {
        Ok(())
    } else {
        Err(CheckerError::ContractViolation {
            check: check.to_string(),
            missing,
            extra,
        })
    }
}

/// Hand an anticipated server error back to the check body.
///
/// Refused credentials and unreachable servers are not something a check
/// can interpret, so those abort the run.
pub fn server_refusal(error: DavError) -> Result<DavError> {
    match error {
        DavError::Authorization { .. } | DavError::Network(_) => Err(error.into()),
        other => Ok(other),
    }
}

/// What a check body gets to work with.
pub struct CheckContext<'a> {
    checker: &'a mut QuirkChecker,
    check: &'static str,
    touched: BTreeSet<String>,
}

impl CheckContext<'_> {
    /// Name of the running check.
    pub fn check_name(&self) -> &'static str {
        self.check
    }

    /// Record an observation for exactly this path.
    ///
    /// The observation is then compared against the server's expected
    /// profile according to the checker's debug mode.
    pub fn set_feature(&mut self, path: &str, value: impl Into<FeatureValue>) -> Result<()> {
        let observed = value.into().into_descriptor();
        self.checker.features_checked.set(path, observed.clone())?;
        self.touched.insert(path.to_string());
        debug!(check = self.check, feature = path, support = %observed, "Recorded feature");
        self.checker.compare_expectation(path, &observed)
    }

    /// Record the same observation for several paths.
    pub fn set_features(&mut self, paths: &[&str], value: impl Into<FeatureValue>) -> Result<()> {
        let descriptor = value.into().into_descriptor();
        for path in paths {
            self.set_feature(path, descriptor.clone())?;
        }
        Ok(())
    }

    /// Resolved descriptor from the observations so far.
    pub fn feature_checked(&self, path: &str) -> Result<SupportDescriptor> {
        self.checker.features_checked.descriptor(path)
    }

    pub fn support_level(&self, path: &str) -> Result<Support> {
        self.checker.features_checked.support_level(path)
    }

    /// True iff the observations so far resolve `path` to full support.
    pub fn is_supported(&self, path: &str) -> Result<bool> {
        self.checker.features_checked.is_supported(path)
    }

    pub fn client(&mut self) -> &mut dyn DavClient {
        self.checker.client.as_mut()
    }

    /// Error for shared test data this check needs but nobody set up.
    pub fn missing_fixture(&self, fixture: &str) -> CheckerError {
        CheckerError::MissingFixture {
            check: self.check.to_string(),
            fixture: fixture.to_string(),
        }
    }

    pub fn principal(&self) -> Result<Principal> {
        self.checker
            .fixtures
            .principal
            .clone()
            .ok_or_else(|| self.missing_fixture("principal"))
    }

    pub fn calendar(&self) -> Result<CalendarRef> {
        self.checker
            .fixtures
            .calendar
            .clone()
            .ok_or_else(|| self.missing_fixture("calendar"))
    }

    /// Calendar holding the test tasks, if tasks could be stored at all.
    pub fn tasklist(&self) -> Option<CalendarRef> {
        self.checker.fixtures.tasklist.clone()
    }

    pub fn fixtures_mut(&mut self) -> &mut Fixtures {
        &mut self.checker.fixtures
    }

    /// Wait for servers whose search index lags behind writes.
    pub fn settle(&self) {
        let delay = self.checker.settle_delay;
        if !delay.is_zero() {
            debug!(check = self.check, ?delay, "Waiting for the server to settle");
            std::thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    use crate::caldav::MockDavClient;
    use crate::checks::CheckRegistry;

    fn written(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn exact_coverage_passes() {
        let declared = ["sync-token", "sync-token.delete"];
        assert!(verify_contract("sync", &declared, &written(&declared)).is_ok());
    }

    #[test]
    fn ancestor_covers_declared_children() {
        let declared = ["search.text", "search.text.case-sensitive", "search.text.substring"];
        assert!(verify_contract("search", &declared, &written(&["search.text"])).is_ok());
    }

    #[test]
    fn missing_feature_is_reported() {
        let declared = ["sync-token", "sync-token.delete"];
        match verify_contract("sync", &declared, &written(&["sync-token.delete"])) {
            Err(CheckerError::ContractViolation { missing, extra, .. }) => {
                assert_eq!(missing, vec!["sync-token"]);
                assert!(extra.is_empty());
            }
            other => panic!("expected violation, got {:?}", other),
        }
    }

    #[test]
    fn undeclared_feature_is_reported() {
        let declared = ["sync-token"];
        match verify_contract("sync", &declared, &written(&["sync-token", "search.category"])) {
            Err(CheckerError::ContractViolation { missing, extra, .. }) => {
                assert!(missing.is_empty());
                assert_eq!(extra, vec!["search.category"]);
            }
            other => panic!("expected violation, got {:?}", other),
        }
    }

    #[test]
    fn ancestor_of_declared_may_be_written() {
        let declared = ["search.recurrences.expanded.event"];
        let newly = written(&["search.recurrences.expanded", "search.recurrences.expanded.event"]);
        assert!(verify_contract("recurrence", &declared, &newly).is_ok());
    }

    #[test]
    fn refusals_are_fatal() {
        assert!(server_refusal(DavError::Authorization { url: "/".into() }).is_err());
        assert!(server_refusal(DavError::Network("down".into())).is_err());
        assert!(server_refusal(DavError::Report { message: "no".into() }).is_ok());
    }

    #[test]
    fn nothing_declared_nothing_written() {
        assert!(verify_contract("noop", &[], &BTreeSet::new()).is_ok());
    }

    /// Records its features and counts how often the body ran.
    #[derive(Clone)]
    struct Counted {
        name: &'static str,
        needs: &'static [&'static str],
        features: &'static [&'static str],
        fails: bool,
        runs: Rc<Cell<usize>>,
    }

    impl Counted {
        fn new(name: &'static str, needs: &'static [&'static str], features: &'static [&'static str]) -> Self {
            Self {
                name,
                needs,
                features,
                fails: false,
                runs: Rc::new(Cell::new(0)),
            }
        }

        fn failing(mut self) -> Self {
            self.fails = true;
            self
        }
    }

    impl Check for Counted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn features_to_be_checked(&self) -> &'static [&'static str] {
            self.features
        }

        fn depends_on(&self) -> &'static [&'static str] {
            self.needs
        }

        fn run(&self, ctx: &mut CheckContext<'_>) -> Result<()> {
            self.runs.set(self.runs.get() + 1);
            if self.fails {
                return Err(ctx.missing_fixture("calendar"));
            }
            ctx.set_features(self.features, true)
        }
    }

    fn checker_with(client: MockDavClient, checks: &[&Counted]) -> QuirkChecker {
        let mut registry = CheckRegistry::new();
        for check in checks {
            let check = (*check).clone();
            registry.register(move || Box::new(check.clone()));
        }
        QuirkChecker::new(Box::new(client))
            .with_settle_delay(Duration::ZERO)
            .with_registry(registry)
    }

    #[test]
    fn only_once_runs_the_body_a_single_time() {
        let base = Counted::new("base", &[], &["sync-token"]);
        let mut checker = checker_with(MockDavClient::new(), &[&base]);
        let check = checker.registry().create("base").unwrap();

        check.run_check(&mut checker, true).unwrap();
        check.run_check(&mut checker, true).unwrap();

        assert_eq!(base.runs.get(), 1);
        assert_eq!(checker.checks_run(), &["base"]);
    }

    #[test]
    fn dependency_that_already_ran_is_not_repeated() {
        let base = Counted::new("base", &[], &["sync-token"]);
        let top = Counted::new("top", &["base"], &["search.text"]);
        let mut checker = checker_with(MockDavClient::new(), &[&base, &top]);

        checker.check_one("base").unwrap();
        checker.check_one("top").unwrap();

        assert_eq!(base.runs.get(), 1);
        assert_eq!(top.runs.get(), 1);
        assert_eq!(checker.checks_run(), &["base", "top"]);
    }

    #[test]
    fn failing_dependency_gives_the_profile_back() {
        let mut profile = FeatureSet::new();
        profile.record([("sync-token", false)], false).unwrap();
        let client = MockDavClient::new().with_features(profile);
        let base = Counted::new("base", &[], &["sync-token"]).failing();
        let top = Counted::new("top", &["base"], &["search.text"]);
        let mut checker = checker_with(client, &[&base, &top]);

        assert!(checker.check_one("top").is_err());

        assert_eq!(base.runs.get(), 1);
        assert_eq!(top.runs.get(), 0);
        let restored = checker.client().features();
        assert!(!restored.is_empty());
        assert_eq!(restored.support_level("sync-token").unwrap(), Support::Unsupported);
    }

    #[test]
    fn rerun_without_only_once_executes_again() {
        let base = Counted::new("base", &[], &["sync-token"]);
        let mut checker = checker_with(MockDavClient::new(), &[&base]);
        let check = checker.registry().create("base").unwrap();

        check.run_check(&mut checker, true).unwrap();
        // Nothing new is written the second time; the contract still holds.
        check.run_check(&mut checker, false).unwrap();

        assert_eq!(base.runs.get(), 2);
        assert_eq!(checker.checks_run(), &["base"]);
    }

    #[test]
    fn self_dependency_is_an_error() {
        let looping = Counted::new("loop", &["loop"], &["sync-token"]);
        let mut checker = checker_with(MockDavClient::new(), &[&looping]);

        match checker.check_one("loop") {
            Err(CheckerError::CircularDependency { cycle }) => assert_eq!(cycle, "loop -> loop"),
            other => panic!("expected a cycle, got {:?}", other),
        }
        assert_eq!(looping.runs.get(), 0);
        assert!(checker.running.is_empty());
    }

    #[test]
    fn mutual_dependency_is_an_error() {
        let a = Counted::new("a", &["b"], &["sync-token"]);
        let b = Counted::new("b", &["a"], &["search.text"]);
        let mut checker = checker_with(MockDavClient::new(), &[&a, &b]);

        match checker.check_one("a") {
            Err(CheckerError::CircularDependency { cycle }) => assert_eq!(cycle, "a -> b -> a"),
            other => panic!("expected a cycle, got {:?}", other),
        }
        assert!(checker.running.is_empty());
        assert!(checker.checks_run().is_empty());
    }
}
