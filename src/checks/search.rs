//! calendar-query checks against the shared fixtures.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::base::{server_refusal, Check, CheckContext};
use crate::caldav::fixtures::{self, utc};
use crate::caldav::{CalendarObject, CalendarRef, ComponentType, SearchQuery};
use crate::error::Result;
use crate::features::{Support, SupportDescriptor};

/// Outcome of one search attempt.
pub(crate) enum Outcome {
    Found(Vec<CalendarObject>),
    /// The server rejected the query.
    Failed(String),
}

impl Outcome {
    pub(crate) fn count(&self) -> Option<usize> {
        match self {
            Outcome::Found(objects) => Some(objects.len()),
            Outcome::Failed(_) => None,
        }
    }
}

/// Run a query once.
pub(crate) fn search_once(ctx: &mut CheckContext<'_>, calendar: &CalendarRef, query: &SearchQuery) -> Result<Outcome> {
    match ctx.client().search(calendar, query) {
        Ok(found) => Ok(Outcome::Found(found)),
        Err(e) => {
            let e = server_refusal(e)?;
            debug!(error = %e, "Search rejected");
            Ok(Outcome::Failed(e.to_string()))
        }
    }
}

/// Run a query, retrying once after the settle delay if it found nothing.
pub(crate) fn search_settled(ctx: &mut CheckContext<'_>, calendar: &CalendarRef, query: &SearchQuery) -> Result<Outcome> {
    let first = search_once(ctx, calendar, query)?;
    if first.count() != Some(0) {
        return Ok(first);
    }
    ctx.settle();
    search_once(ctx, calendar, query)
}

/// Full when exactly `expected` objects came back.
fn expect_count(outcome: &Outcome, expected: usize) -> SupportDescriptor {
    match outcome {
        Outcome::Found(objects) if objects.len() == expected => SupportDescriptor::new(Support::Full),
        Outcome::Found(objects) => SupportDescriptor::new(Support::Unsupported).with_description(format!(
            "expected {} result(s), got {}",
            expected,
            objects.len()
        )),
        Outcome::Failed(message) => SupportDescriptor::new(Support::Ungraceful).with_description(message.clone()),
    }
}

fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> SearchQuery {
    SearchQuery::new().time_range(start, end)
}

/// Time-range, text, category and combined filters.
pub struct CheckSearch;

impl CheckSearch {
    fn check_time_ranges(ctx: &mut CheckContext<'_>, calendar: &CalendarRef) -> Result<()> {
        let events = range(utc(2000, 1, 1, 11, 0), utc(2000, 1, 1, 14, 0)).component(ComponentType::Event);
        let outcome = search_settled(ctx, calendar, &events)?;
        ctx.set_feature("search.time-range.event", expect_count(&outcome, 1))?;

        match ctx.tasklist() {
            Some(tasklist) => {
                let tasks = range(utc(2000, 1, 2, 8, 0), utc(2000, 1, 2, 11, 0)).component(ComponentType::Todo);
                let outcome = search_settled(ctx, &tasklist, &tasks)?;
                ctx.set_feature("search.time-range.todo", expect_count(&outcome, 1))
            }
            None => ctx.set_feature("search.time-range.todo", None::<bool>),
        }
    }

    fn check_open_ended(ctx: &mut CheckContext<'_>, calendar: &CalendarRef) -> Result<()> {
        let before = SearchQuery::new()
            .component(ComponentType::Event)
            .until(utc(2000, 1, 1, 14, 0));
        let verdict = match search_settled(ctx, calendar, &before)? {
            Outcome::Found(objects)
                if objects
                    .iter()
                    .any(|o| o.uid().as_deref() == Some(fixtures::SIMPLE_EVENT1)) =>
            {
                SupportDescriptor::new(Support::Full)
            }
            Outcome::Found(_) => SupportDescriptor::new(Support::Unsupported)
                .with_behaviour("range without a start finds nothing"),
            Outcome::Failed(message) => SupportDescriptor::new(Support::Ungraceful).with_description(message),
        };
        ctx.set_feature("search.time-range.open-ended", verdict)
    }

    fn check_text(ctx: &mut CheckContext<'_>, calendar: &CalendarRef) -> Result<()> {
        let exact = SearchQuery::new()
            .component(ComponentType::Event)
            .summary(fixtures::SIMPLE_EVENT1_SUMMARY, false);
        let outcome = search_settled(ctx, calendar, &exact)?;
        let verdict = expect_count(&outcome, 1);
        if !verdict.support.is_full() {
            // Nothing to learn about the finer points.
            return ctx.set_feature("search.text", verdict);
        }
        ctx.set_feature("search.text", true)?;

        let shouting = SearchQuery::new()
            .component(ComponentType::Event)
            .summary(fixtures::SIMPLE_EVENT1_SUMMARY.to_uppercase(), true);
        let case_sensitive = match search_once(ctx, calendar, &shouting)? {
            Outcome::Found(found) if found.is_empty() => SupportDescriptor::new(Support::Full),
            Outcome::Found(_) => SupportDescriptor::new(Support::Unsupported)
                .with_behaviour("case-sensitive collation is ignored"),
            Outcome::Failed(message) => SupportDescriptor::new(Support::Ungraceful).with_description(message),
        };
        ctx.set_feature("search.text.case-sensitive", case_sensitive)?;

        let partial = SearchQuery::new()
            .component(ComponentType::Event)
            .summary("simple event", false);
        let outcome = search_once(ctx, calendar, &partial)?;
        ctx.set_feature("search.text.substring", expect_count(&outcome, 2))
    }

    fn check_category(ctx: &mut CheckContext<'_>, calendar: &CalendarRef) -> Result<()> {
        let query = SearchQuery::new()
            .component(ComponentType::Event)
            .category(fixtures::TEST_CATEGORY);
        let verdict = match search_settled(ctx, calendar, &query)? {
            Outcome::Found(found) if found.is_empty() => SupportDescriptor::new(Support::Unsupported),
            outcome => expect_count(&outcome, 1),
        };
        ctx.set_feature("search.category", verdict)?;

        if !ctx.is_supported("search.category")? {
            return ctx.set_feature("search.combined-is-logical-and", None::<bool>);
        }

        let miss = range(utc(2000, 1, 1, 9, 0), utc(2000, 1, 1, 10, 0))
            .component(ComponentType::Event)
            .category(fixtures::TEST_CATEGORY);
        let hit = range(utc(2000, 1, 1, 11, 0), utc(2000, 1, 1, 12, 30))
            .component(ComponentType::Event)
            .category(fixtures::TEST_CATEGORY);
        let verdict = match (search_once(ctx, calendar, &miss)?, search_once(ctx, calendar, &hit)?) {
            (Outcome::Failed(message), _) | (_, Outcome::Failed(message)) => {
                SupportDescriptor::new(Support::Ungraceful).with_description(message)
            }
            (miss, hit) if miss.count() == Some(0) && hit.count() == Some(1) => SupportDescriptor::new(Support::Full),
            _ => SupportDescriptor::new(Support::Unsupported).with_behaviour("filters are combined with logical OR"),
        };
        ctx.set_feature("search.combined-is-logical-and", verdict)
    }

    fn check_comp_type_optional(ctx: &mut CheckContext<'_>, calendar: &CalendarRef) -> Result<()> {
        let stored = match ctx.client().objects(calendar) {
            Ok(objects) => objects.iter().filter(|o| fixtures::in_test_year(o)).count(),
            Err(e) => {
                let e = server_refusal(e)?;
                return ctx.set_feature(
                    "search.comp-type-optional",
                    SupportDescriptor::new(Support::Unknown).with_description(e.to_string()),
                );
            }
        };
        let year = range(utc(2000, 1, 1, 0, 0), utc(2001, 1, 1, 0, 0));
        let outcome = search_once(ctx, calendar, &year)?;
        ctx.set_feature("search.comp-type-optional", expect_count(&outcome, stored))
    }
}

impl Check for CheckSearch {
    fn name(&self) -> &'static str {
        "search"
    }

    fn features_to_be_checked(&self) -> &'static [&'static str] {
        &[
            "search.time-range.event",
            "search.time-range.todo",
            "search.time-range.open-ended",
            "search.text",
            "search.text.case-sensitive",
            "search.text.substring",
            "search.category",
            "search.combined-is-logical-and",
            "search.comp-type-optional",
        ]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["prepare-calendar"]
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Result<()> {
        let Ok(calendar) = ctx.calendar() else {
            return ctx.set_features(self.features_to_be_checked(), None::<bool>);
        };
        Self::check_time_ranges(ctx, &calendar)?;
        Self::check_open_ended(ctx, &calendar)?;
        Self::check_text(ctx, &calendar)?;
        Self::check_category(ctx, &calendar)?;
        Self::check_comp_type_optional(ctx, &calendar)
    }
}
