//! Recurring objects in calendar-query results.

use super::base::{Check, CheckContext};
use super::search::{search_once, search_settled, Outcome};
use crate::caldav::fixtures::{self, utc};
use crate::caldav::{CalendarObject, CalendarRef, ComponentType, SearchQuery};
use crate::error::Result;
use crate::features::{Support, SupportDescriptor};

/// Second instance of the monthly recurring fixtures.
fn second_instance(component: ComponentType) -> SearchQuery {
    SearchQuery::new()
        .component(component)
        .time_range(utc(2000, 2, 12, 11, 0), utc(2000, 2, 12, 14, 0))
}

/// Verdict for an expanded result: one object holding one plain occurrence.
fn expanded_verdict(outcome: Outcome, component: ComponentType) -> SupportDescriptor {
    let found = match outcome {
        Outcome::Found(found) => found,
        Outcome::Failed(message) => {
            return SupportDescriptor::new(Support::Ungraceful).with_description(message);
        }
    };
    match found.as_slice() {
        [single] if is_plain_occurrence(single, component) => SupportDescriptor::new(Support::Full),
        [single] if single.property("RRULE").is_some() => {
            SupportDescriptor::new(Support::Unsupported).with_behaviour("the master object is returned unexpanded")
        }
        other => SupportDescriptor::new(Support::Unsupported)
            .with_description(format!("expected one expanded occurrence, got {} object(s)", other.len())),
    }
}

fn is_plain_occurrence(object: &CalendarObject, component: ComponentType) -> bool {
    object.component_count(component) == 1 && object.property("RRULE").is_none()
}

/// Implicit recurrence instances and server-side expansion.
pub struct CheckRecurrenceSearch;

impl CheckRecurrenceSearch {
    fn check_implicit(ctx: &mut CheckContext<'_>, calendar: &CalendarRef) -> Result<()> {
        let outcome = search_settled(ctx, calendar, &second_instance(ComponentType::Event))?;
        ctx.set_feature("search.recurrences.includes-implicit.event", implicit_verdict(outcome))?;

        match ctx.tasklist() {
            Some(tasklist) => {
                let outcome = search_settled(ctx, &tasklist, &second_instance(ComponentType::Todo))?;
                ctx.set_feature("search.recurrences.includes-implicit.todo", implicit_verdict(outcome))
            }
            None => ctx.set_feature("search.recurrences.includes-implicit.todo", None::<bool>),
        }
    }

    fn check_expanded(ctx: &mut CheckContext<'_>, calendar: &CalendarRef) -> Result<()> {
        let query = second_instance(ComponentType::Event).expand();
        let outcome = search_once(ctx, calendar, &query)?;
        ctx.set_feature(
            "search.recurrences.expanded.event",
            expanded_verdict(outcome, ComponentType::Event),
        )?;

        match ctx.tasklist() {
            Some(tasklist) => {
                let query = second_instance(ComponentType::Todo).expand();
                let outcome = search_once(ctx, &tasklist, &query)?;
                ctx.set_feature(
                    "search.recurrences.expanded.todo",
                    expanded_verdict(outcome, ComponentType::Todo),
                )?;
            }
            None => ctx.set_feature("search.recurrences.expanded.todo", None::<bool>)?,
        }

        if !ctx.is_supported("search.recurrences.expanded.event")? {
            return ctx.set_feature("search.recurrences.expanded.exception", None::<bool>);
        }

        // The moved instance of the exception fixture.
        let query = SearchQuery::new()
            .component(ComponentType::Event)
            .time_range(utc(2000, 2, 13, 0, 0), utc(2000, 2, 14, 0, 0))
            .expand();
        let verdict = match search_once(ctx, calendar, &query)? {
            Outcome::Found(found) => match found.as_slice() {
                [single]
                    if is_plain_occurrence(single, ComponentType::Event)
                        && single.summary().as_deref() == Some(fixtures::EXCEPTION_SUMMARY) =>
                {
                    SupportDescriptor::new(Support::Full)
                }
                _ => SupportDescriptor::new(Support::Unsupported)
                    .with_behaviour("overridden instance is lost when expanding"),
            },
            Outcome::Failed(message) => SupportDescriptor::new(Support::Ungraceful).with_description(message),
        };
        ctx.set_feature("search.recurrences.expanded.exception", verdict)
    }
}

fn implicit_verdict(outcome: Outcome) -> SupportDescriptor {
    match outcome {
        Outcome::Found(found) if found.len() == 1 => SupportDescriptor::new(Support::Full),
        Outcome::Found(found) => SupportDescriptor::new(Support::Unsupported)
            .with_description(format!("expected 1 result, got {}", found.len())),
        Outcome::Failed(message) => SupportDescriptor::new(Support::Ungraceful).with_description(message),
    }
}

impl Check for CheckRecurrenceSearch {
    fn name(&self) -> &'static str {
        "recurrence-search"
    }

    fn features_to_be_checked(&self) -> &'static [&'static str] {
        &[
            "search.recurrences.includes-implicit.event",
            "search.recurrences.includes-implicit.todo",
            "search.recurrences.expanded.event",
            "search.recurrences.expanded.todo",
            "search.recurrences.expanded.exception",
        ]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["prepare-calendar"]
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Result<()> {
        let Ok(calendar) = ctx.calendar() else {
            return ctx.set_features(self.features_to_be_checked(), None::<bool>);
        };
        Self::check_implicit(ctx, &calendar)?;
        Self::check_expanded(ctx, &calendar)
    }
}
