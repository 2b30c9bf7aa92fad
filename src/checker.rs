//! The run orchestrator.
//!
//! A [`QuirkChecker`] owns everything a run shares: the CalDAV client, the
//! ledger of observed features, the set of checks already executed and the
//! calendars the checks write into. It runs checks, tidies up after them
//! and renders the final report.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::caldav::fixtures::{self, TEST_CALENDAR_ID, TEST_TASKLIST_ID};
use crate::caldav::{CalendarRef, DavClient, Principal};
use crate::checks::{server_refusal, CheckRegistry};
use crate::error::{CheckerError, Result};
use crate::features::{catalog, FeatureSet, Support, SupportDescriptor};
use crate::report::{Report, ReportFormat, ReportOutput};
use crate::ui::{Question, UserInterface};

/// Default wait for servers that apply writes lazily.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);

/// Feature holding this tool's calendar policy.
const CALENDAR_POLICY: &str = "test-calendar.compatibility-tests";

/// What to do when an observation contradicts the server's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    /// Do not compare.
    Off,
    /// Warn and keep a record for the report.
    #[default]
    Logging,
    /// Abort the run.
    Assert,
    /// Ask whether to carry on.
    Debugger,
}

impl FromStr for DebugMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(DebugMode::Off),
            "logging" | "log" => Ok(DebugMode::Logging),
            "assert" => Ok(DebugMode::Assert),
            "debugger" | "pdb" => Ok(DebugMode::Debugger),
            _ => Err(format!("unknown debug mode: {}", s)),
        }
    }
}

impl fmt::Display for DebugMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DebugMode::Off => "off",
            DebugMode::Logging => "logging",
            DebugMode::Assert => "assert",
            DebugMode::Debugger => "debugger",
        };
        f.write_str(name)
    }
}

/// An observation that differs from the expected profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mismatch {
    pub feature: String,
    pub expected: SupportDescriptor,
    pub observed: SupportDescriptor,
}

/// Server-side objects shared between checks.
#[derive(Debug, Clone, Default)]
pub struct Fixtures {
    pub principal: Option<Principal>,
    /// Calendar holding the event fixtures.
    pub calendar: Option<CalendarRef>,
    /// Calendar holding the task fixtures; may be the same as `calendar`.
    pub tasklist: Option<CalendarRef>,
}

/// Runs checks against one server and keeps the results.
pub struct QuirkChecker {
    pub(crate) client: Box<dyn DavClient>,
    pub(crate) features_checked: FeatureSet,
    expected_features: FeatureSet,
    checks_run: Vec<&'static str>,
    /// Checks whose bodies or dependencies are executing, outermost first.
    pub(crate) running: Vec<&'static str>,
    pub(crate) registry: CheckRegistry,
    debug_mode: DebugMode,
    pub(crate) settle_delay: Duration,
    pub(crate) fixtures: Fixtures,
    mismatches: Vec<Mismatch>,
    ui: Option<Box<dyn UserInterface>>,
}

impl fmt::Debug for QuirkChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuirkChecker")
            .field("server", &self.client.server_name())
            .field("checks_run", &self.checks_run)
            .field("features_checked", &self.features_checked.len())
            .field("debug_mode", &self.debug_mode)
            .finish()
    }
}

impl QuirkChecker {
    /// Wrap a client. Its current feature profile becomes the expectation.
    pub fn new(client: Box<dyn DavClient>) -> Self {
        let expected_features = client.features().clone();
        Self {
            client,
            features_checked: FeatureSet::new(),
            expected_features,
            checks_run: Vec::new(),
            running: Vec::new(),
            registry: CheckRegistry::builtin(),
            debug_mode: DebugMode::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            fixtures: Fixtures::default(),
            mismatches: Vec::new(),
            ui: None,
        }
    }

    pub fn with_debug_mode(mut self, mode: DebugMode) -> Self {
        self.debug_mode = mode;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// UI used by [`DebugMode::Debugger`] to ask whether to continue.
    pub fn with_ui(mut self, ui: Box<dyn UserInterface>) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn with_registry(mut self, registry: CheckRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Everything observed so far.
    pub fn features_checked(&self) -> &FeatureSet {
        &self.features_checked
    }

    /// The profile observations are compared against.
    pub fn expected_features(&self) -> &FeatureSet {
        &self.expected_features
    }

    /// Names of completed checks, in completion order.
    pub fn checks_run(&self) -> &[&'static str] {
        &self.checks_run
    }

    pub fn has_run(&self, name: &str) -> bool {
        self.checks_run.contains(&name)
    }

    pub(crate) fn mark_run(&mut self, name: &'static str) {
        if !self.has_run(name) {
            self.checks_run.push(name);
        }
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        &self.mismatches
    }

    pub fn fixtures(&self) -> &Fixtures {
        &self.fixtures
    }

    pub fn client(&self) -> &dyn DavClient {
        self.client.as_ref()
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    pub fn debug_mode(&self) -> DebugMode {
        self.debug_mode
    }

    /// Run every registered check once, dependencies first.
    pub fn check_all(&mut self) -> Result<()> {
        let order = self.registry.execution_order()?;
        info!(checks = order.len(), server = self.client.server_name(), "Running all checks");
        for name in order {
            let check = self.registry.create(&name)?;
            check.run_check(self, true)?;
        }
        Ok(())
    }

    /// Run one check and whatever it depends on.
    pub fn check_one(&mut self, name: &str) -> Result<()> {
        let check = self.registry.create(name)?;
        check.run_check(self, true)
    }

    /// Compare an observation with the expected profile.
    pub(crate) fn compare_expectation(&mut self, path: &str, observed: &SupportDescriptor) -> Result<()> {
        if self.debug_mode == DebugMode::Off || self.expected_features.is_empty() {
            return Ok(());
        }
        let checkable = catalog::lookup(path).is_some_and(|info| info.kind.is_machine_checkable());
        if !checkable {
            return Ok(());
        }

        // An unknown observation says nothing about the server.
        if observed.support == Support::Unknown {
            return Ok(());
        }
        let expected = self.expected_features.descriptor(path)?.without_free_text();
        let observed = observed.without_free_text();
        if expected.support == Support::Fragile || observed.support == Support::Fragile || expected == observed {
            return Ok(());
        }

        let mismatch = Mismatch {
            feature: path.to_string(),
            expected,
            observed,
        };
        match self.debug_mode {
            DebugMode::Off => Ok(()),
            DebugMode::Logging => {
                warn!(
                    feature = path,
                    expected = %mismatch.expected,
                    observed = %mismatch.observed,
                    "Observed support differs from the server profile"
                );
                self.mismatches.push(mismatch);
                Ok(())
            }
            DebugMode::Assert => Err(mismatch_error(&mismatch)),
            DebugMode::Debugger => {
                let carry_on = match self.ui.as_mut() {
                    Some(ui) => {
                        ui.error(&format!(
                            "{}: expected {}, observed {}",
                            mismatch.feature, mismatch.expected, mismatch.observed
                        ));
                        let question = Question::new("expectation-mismatch", "Continue the run?", false);
                        ui.confirm(&question)?
                    }
                    None => false,
                };
                if carry_on {
                    self.mismatches.push(mismatch);
                    Ok(())
                } else {
                    Err(mismatch_error(&mismatch))
                }
            }
        }
    }

    /// Whether the server profile asks for test data to be removed.
    pub fn cleanup_wanted(&self) -> Result<bool> {
        let policy = self.expected_features.descriptor(CALENDAR_POLICY)?;
        Ok(policy
            .extra("cleanup")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false))
    }

    /// Remove test data from the server.
    ///
    /// Without `force`, nothing happens unless the calendar policy asks for
    /// cleanup. Calendars this tool created are deleted outright when the
    /// server was seen to support that; otherwise the known test objects
    /// are deleted one by one.
    pub fn cleanup(&mut self, force: bool) -> Result<()> {
        if !force && !self.cleanup_wanted()? {
            debug!("Cleanup not requested by the calendar policy");
            return Ok(());
        }

        let mut calendars: Vec<CalendarRef> = Vec::new();
        for calendar in [self.fixtures.calendar.clone(), self.fixtures.tasklist.clone()]
            .into_iter()
            .flatten()
        {
            if !calendars.iter().any(|c| c.url == calendar.url) {
                calendars.push(calendar);
            }
        }

        let own = |c: &CalendarRef| c.id == TEST_CALENDAR_ID || c.id == TEST_TASKLIST_ID;
        let can_delete = self.features_checked.is_supported("create-calendar")?
            && self.features_checked.is_supported("delete-calendar")?;

        for calendar in &calendars {
            if can_delete && own(calendar) {
                info!(calendar = %calendar.url, "Deleting test calendar");
                if let Err(e) = self.client.delete_calendar(calendar) {
                    let e = server_refusal(e)?;
                    warn!(calendar = %calendar.url, error = %e, "Could not delete test calendar");
                }
            } else {
                self.delete_known_objects(calendar)?;
            }
        }

        self.fixtures.calendar = None;
        self.fixtures.tasklist = None;
        Ok(())
    }

    fn delete_known_objects(&mut self, calendar: &CalendarRef) -> Result<()> {
        for uid in fixtures::KNOWN_UIDS {
            let object = match self.client.object_by_uid(calendar, uid) {
                Ok(object) => object,
                Err(e) => {
                    debug!(uid, error = %e, "Test object not present");
                    continue;
                }
            };
            if let Err(e) = self.client.delete_object(&object) {
                warn!(uid, error = %e, "Could not delete test object");
            }
        }
        Ok(())
    }

    /// Build the run report.
    ///
    /// The verbose form lists every recorded path and adds the executed
    /// checks and any expectation mismatches.
    pub fn report(&self, verbose: bool, format: ReportFormat) -> Result<ReportOutput> {
        let report = Report {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            ts: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            name: self.client.server_name().to_string(),
            url: self.client.url().to_string(),
            features: self.features_checked.dotted(!verbose),
            checks_run: verbose.then(|| self.checks_run.iter().map(|c| c.to_string()).collect()),
            mismatches: verbose.then(|| self.mismatches.clone()),
        };
        report.render(format)
    }
}

fn mismatch_error(mismatch: &Mismatch) -> CheckerError {
    CheckerError::ExpectationMismatch {
        feature: mismatch.feature.clone(),
        expected: mismatch.expected.to_string(),
        observed: mismatch.observed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caldav::{MockBehaviour, MockDavClient};
    use crate::ui::MockUI;

    fn profile(entries: &[(&str, bool)]) -> FeatureSet {
        let mut set = FeatureSet::new();
        set.record(entries.iter().copied(), false).unwrap();
        set
    }

    fn checker(mock: &MockDavClient, mode: DebugMode) -> QuirkChecker {
        QuirkChecker::new(Box::new(mock.clone()))
            .with_debug_mode(mode)
            .with_settle_delay(Duration::ZERO)
    }

    #[test]
    fn debug_mode_parses() {
        assert_eq!("assert".parse::<DebugMode>().unwrap(), DebugMode::Assert);
        assert_eq!("PDB".parse::<DebugMode>().unwrap(), DebugMode::Debugger);
        assert!("loud".parse::<DebugMode>().is_err());
        assert_eq!(DebugMode::default().to_string(), "logging");
    }

    #[test]
    fn logging_mode_collects_mismatches() {
        let mock = MockDavClient::new().with_features(profile(&[("sync-token", true)]));
        let mut checker = checker(&mock, DebugMode::Logging);
        checker
            .compare_expectation("sync-token", &SupportDescriptor::new(Support::Unsupported))
            .unwrap();
        assert_eq!(checker.mismatches().len(), 1);
        assert_eq!(checker.mismatches()[0].feature, "sync-token");
    }

    #[test]
    fn assert_mode_fails_on_mismatch() {
        let mock = MockDavClient::new().with_features(profile(&[("sync-token", true)]));
        let mut checker = checker(&mock, DebugMode::Assert);
        let err = checker
            .compare_expectation("sync-token", &SupportDescriptor::new(Support::Unsupported))
            .unwrap_err();
        assert!(matches!(err, CheckerError::ExpectationMismatch { .. }));
    }

    #[test]
    fn fragile_is_never_a_mismatch() {
        let mock = MockDavClient::new().with_features(profile(&[("sync-token", true)]));
        let mut checker = checker(&mock, DebugMode::Assert);
        checker
            .compare_expectation("sync-token", &SupportDescriptor::new(Support::Fragile))
            .unwrap();
    }

    #[test]
    fn unknown_observation_is_not_a_mismatch() {
        let mock = MockDavClient::new().with_features(profile(&[("sync-token", true)]));
        let mut checker = checker(&mock, DebugMode::Assert);
        checker
            .compare_expectation("sync-token", &SupportDescriptor::new(Support::Unknown))
            .unwrap();
        assert!(checker.mismatches().is_empty());
    }

    #[test]
    fn free_text_is_ignored() {
        let mock = MockDavClient::new().with_features(profile(&[("sync-token", true)]));
        let mut checker = checker(&mock, DebugMode::Assert);
        let observed = SupportDescriptor::new(Support::Full).with_description("took two tries");
        checker.compare_expectation("sync-token", &observed).unwrap();
    }

    #[test]
    fn debugger_mode_asks_the_ui() {
        let mock = MockDavClient::new().with_features(profile(&[("sync-token", true)]));
        let mut ui = MockUI::new();
        ui.answer("expectation-mismatch", true);
        let mut checker = checker(&mock, DebugMode::Debugger).with_ui(Box::new(ui));
        checker
            .compare_expectation("sync-token", &SupportDescriptor::new(Support::Unsupported))
            .unwrap();
        assert_eq!(checker.mismatches().len(), 1);
    }

    #[test]
    fn debugger_mode_without_ui_aborts() {
        let mock = MockDavClient::new().with_features(profile(&[("sync-token", true)]));
        let mut checker = checker(&mock, DebugMode::Debugger);
        assert!(checker
            .compare_expectation("sync-token", &SupportDescriptor::new(Support::Unsupported))
            .is_err());
    }

    #[test]
    fn cleanup_policy_defaults_to_keeping_data() {
        let mock = MockDavClient::with_behaviour(MockBehaviour::default());
        let mut checker = checker(&mock, DebugMode::Off);
        checker.check_one("prepare-calendar").unwrap();
        assert!(!checker.cleanup_wanted().unwrap());
        checker.cleanup(false).unwrap();
        assert!(mock.calendar_ids().contains(&TEST_CALENDAR_ID.to_string()));
        assert!(checker.fixtures().calendar.is_some());
    }

    #[test]
    fn cleanup_deletes_objects_when_calendars_cannot_be_removed() {
        let mock = MockDavClient::with_behaviour(MockBehaviour {
            mkcalendar: false,
            ..MockBehaviour::default()
        });
        let mut checker = checker(&mock, DebugMode::Off);
        checker.check_one("prepare-calendar").unwrap();
        let calendar = checker.fixtures().calendar.clone().unwrap();
        assert_eq!(calendar.id, "default");
        assert!(!mock.object_uids("default").is_empty());

        checker.cleanup(true).unwrap();
        assert!(mock.object_uids("default").is_empty());
        assert!(mock.calendar_ids().contains(&"default".to_string()));
        assert!(checker.fixtures().calendar.is_none());
    }

    #[test]
    fn unknown_check_is_an_error() {
        let mock = MockDavClient::new();
        let mut checker = checker(&mock, DebugMode::Off);
        assert!(matches!(
            checker.check_one("teleport"),
            Err(CheckerError::UnknownCheck { .. })
        ));
    }
}
