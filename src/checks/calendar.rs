//! Calendar lifecycle checks and the shared test calendar.

use tracing::{debug, warn};

use super::base::{server_refusal, Check, CheckContext};
use crate::caldav::fixtures::{
    self, MISSING_CALENDAR_ID, MKDEL_CALENDAR_ID, MKDEL_CALENDAR_NAME, TEST_CALENDAR_ID,
    TEST_CALENDAR_NAME, TEST_TASKLIST_ID,
};
use crate::caldav::{
    CalendarLookup, CalendarObject, CalendarRef, ComponentType, DavError, NewCalendar, Principal,
};
use crate::error::Result;
use crate::features::{Support, SupportDescriptor};

/// Calendar ids this tool creates itself.
const OWN_CALENDARS: &[&str] = &[TEST_CALENDAR_ID, TEST_TASKLIST_ID, MKDEL_CALENDAR_ID];

/// Creates, renames, deletes and recreates a scratch calendar.
pub struct CheckMakeDeleteCalendar;

impl CheckMakeDeleteCalendar {
    /// Whether the calendar list still shows `id`.
    fn listed(ctx: &mut CheckContext<'_>, principal: &Principal, id: &str) -> Result<bool> {
        match ctx.client().calendars(principal) {
            Ok(calendars) => Ok(calendars.iter().any(|c| c.id == id)),
            Err(e) => {
                server_refusal(e)?;
                Ok(false)
            }
        }
    }

    fn check_auto_create(ctx: &mut CheckContext<'_>, principal: &Principal) -> Result<()> {
        match ctx
            .client()
            .calendar(principal, CalendarLookup::Id(MISSING_CALENDAR_ID))
        {
            Ok(calendar) => {
                if let Err(e) = ctx.client().delete_calendar(&calendar) {
                    debug!(error = %e, "Could not remove auto-created calendar");
                }
                ctx.set_feature("create-calendar.auto", true)
            }
            Err(e) => {
                server_refusal(e)?;
                ctx.set_feature("create-calendar.auto", false)
            }
        }
    }

    fn check_delete(ctx: &mut CheckContext<'_>, principal: &Principal, calendar: &CalendarRef) -> Result<()> {
        if let Err(e) = ctx.client().delete_calendar(calendar) {
            let e = server_refusal(e)?;
            debug!(error = %e, "Calendar deletion refused");
            ctx.set_feature("delete-calendar", false)?;
            return ctx.set_feature("delete-calendar.free-namespace", None::<bool>);
        }

        if Self::listed(ctx, principal, &calendar.id)? {
            ctx.settle();
            if Self::listed(ctx, principal, &calendar.id)? {
                ctx.set_feature(
                    "delete-calendar",
                    SupportDescriptor::new(Support::Unsupported)
                        .with_behaviour("calendar is still listed after deletion"),
                )?;
                return ctx.set_feature("delete-calendar.free-namespace", None::<bool>);
            }
            ctx.set_feature(
                "delete-calendar",
                SupportDescriptor::new(Support::Fragile)
                    .with_behaviour("deletion takes effect after a delay"),
            )?;
        } else {
            ctx.set_feature("delete-calendar", true)?;
        }

        let again = NewCalendar::new(MKDEL_CALENDAR_ID).with_name(MKDEL_CALENDAR_NAME);
        match ctx.client().make_calendar(principal, &again) {
            Ok(recreated) => {
                if let Err(e) = ctx.client().delete_calendar(&recreated) {
                    warn!(error = %e, calendar = %recreated.url, "Could not remove scratch calendar");
                }
                ctx.set_feature("delete-calendar.free-namespace", true)
            }
            Err(e) => {
                server_refusal(e)?;
                ctx.set_feature("delete-calendar.free-namespace", false)
            }
        }
    }
}

impl Check for CheckMakeDeleteCalendar {
    fn name(&self) -> &'static str {
        "make-delete-calendar"
    }

    fn features_to_be_checked(&self) -> &'static [&'static str] {
        &[
            "create-calendar",
            "create-calendar.auto",
            "create-calendar.set-displayname",
            "delete-calendar",
            "delete-calendar.free-namespace",
            "get-current-user-principal.has-calendar",
        ]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["get-current-user-principal"]
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Result<()> {
        let Ok(principal) = ctx.principal() else {
            return ctx.set_features(self.features_to_be_checked(), None::<bool>);
        };

        let existing = match ctx.client().calendars(&principal) {
            Ok(calendars) => calendars,
            Err(e) => {
                server_refusal(e)?;
                Vec::new()
            }
        };
        let has_calendar = existing.iter().any(|c| !OWN_CALENDARS.contains(&c.id.as_str()));
        ctx.set_feature("get-current-user-principal.has-calendar", has_calendar)?;

        Self::check_auto_create(ctx, &principal)?;

        if let Some(leftover) = existing.iter().find(|c| c.id == MKDEL_CALENDAR_ID) {
            debug!(calendar = %leftover.url, "Removing scratch calendar from an earlier run");
            if let Err(e) = ctx.client().delete_calendar(leftover) {
                server_refusal(e)?;
            }
        }

        let new = NewCalendar::new(MKDEL_CALENDAR_ID).with_name(MKDEL_CALENDAR_NAME);
        let calendar = match ctx.client().make_calendar(&principal, &new) {
            Ok(calendar) => calendar,
            Err(e) => {
                let e = server_refusal(e)?;
                debug!(error = %e, "MKCALENDAR refused");
                ctx.set_feature("create-calendar", false)?;
                return ctx.set_features(
                    &[
                        "create-calendar.set-displayname",
                        "delete-calendar",
                        "delete-calendar.free-namespace",
                    ],
                    None::<bool>,
                );
            }
        };
        ctx.set_feature("create-calendar", true)?;

        let by_name = match ctx
            .client()
            .calendar(&principal, CalendarLookup::Name(MKDEL_CALENDAR_NAME))
        {
            Ok(found) => found.id == calendar.id,
            Err(e) => {
                server_refusal(e)?;
                false
            }
        };
        ctx.set_feature("create-calendar.set-displayname", by_name)?;

        Self::check_delete(ctx, &principal, &calendar)
    }
}

/// Stores the shared test data every search check relies on.
pub struct PrepareCalendar;

impl PrepareCalendar {
    /// Open the shared calendar, creating it when the server allows.
    ///
    /// Servers that cannot create calendars get their first existing one.
    fn open_calendar(ctx: &mut CheckContext<'_>, principal: &Principal) -> Result<Option<CalendarRef>> {
        match ctx
            .client()
            .calendar(principal, CalendarLookup::Id(TEST_CALENDAR_ID))
        {
            Ok(calendar) => return Ok(Some(calendar)),
            Err(e) => {
                server_refusal(e)?;
            }
        }

        if ctx.is_supported("create-calendar")? {
            let new = NewCalendar::new(TEST_CALENDAR_ID).with_name(TEST_CALENDAR_NAME);
            match ctx.client().make_calendar(principal, &new) {
                Ok(calendar) => return Ok(Some(calendar)),
                Err(e) => {
                    let e = server_refusal(e)?;
                    warn!(error = %e, "Could not create the test calendar");
                }
            }
        }

        match ctx.client().calendars(principal) {
            Ok(calendars) => Ok(calendars.into_iter().next()),
            Err(e) => {
                server_refusal(e)?;
                Ok(None)
            }
        }
    }

    fn open_tasklist(ctx: &mut CheckContext<'_>, principal: &Principal) -> Result<Option<CalendarRef>> {
        match ctx
            .client()
            .calendar(principal, CalendarLookup::Id(TEST_TASKLIST_ID))
        {
            Ok(calendar) => return Ok(Some(calendar)),
            Err(e) => {
                server_refusal(e)?;
            }
        }

        if !ctx.is_supported("create-calendar")? {
            return Ok(None);
        }
        let new = NewCalendar::new(TEST_TASKLIST_ID)
            .with_name(TEST_TASKLIST_ID)
            .with_components(&[ComponentType::Todo]);
        match ctx.client().make_calendar(principal, &new) {
            Ok(calendar) => Ok(Some(calendar)),
            Err(e) => {
                server_refusal(e)?;
                Ok(None)
            }
        }
    }

    /// Store an object and read it back by UID.
    fn save_load(ctx: &mut CheckContext<'_>, calendar: &CalendarRef, uid: &str, ical: &str) -> Result<bool> {
        if let Err(e) = ctx.client().save_object(calendar, ical) {
            let e = server_refusal(e)?;
            debug!(uid, error = %e, "Save refused");
            return Ok(false);
        }
        Ok(Self::load(ctx, calendar, uid)?.is_some())
    }

    /// Fetch by UID, retrying once after the settle delay.
    fn load(ctx: &mut CheckContext<'_>, calendar: &CalendarRef, uid: &str) -> Result<Option<CalendarObject>> {
        for attempt in 0..2 {
            if attempt > 0 {
                ctx.settle();
            }
            match ctx.client().object_by_uid(calendar, uid) {
                Ok(object) => return Ok(Some(object)),
                Err(DavError::NotFound { .. }) => continue,
                Err(e) => {
                    server_refusal(e)?;
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    fn check_recurrences(ctx: &mut CheckContext<'_>, calendar: &CalendarRef) -> Result<()> {
        if let Err(e) = ctx.client().save_object(calendar, &fixtures::recurring_event()) {
            server_refusal(e)?;
        }
        if let Err(e) = ctx
            .client()
            .save_object(calendar, &fixtures::recurring_with_exception())
        {
            server_refusal(e)?;
            return ctx.set_feature("save-load.event.recurrences", false);
        }

        let verdict = match Self::load(ctx, calendar, fixtures::RECURRING_EXCEPTION)? {
            None => SupportDescriptor::new(Support::Unsupported),
            Some(object) => {
                let kept_override = object.component_count(ComponentType::Event) == 2
                    && object
                        .property_values("SUMMARY")
                        .iter()
                        .any(|s| s == fixtures::EXCEPTION_SUMMARY);
                if kept_override {
                    SupportDescriptor::new(Support::Full)
                } else {
                    SupportDescriptor::new(Support::Unsupported)
                        .with_behaviour("overridden instances are dropped")
                }
            }
        };
        ctx.set_feature("save-load.event.recurrences", verdict)
    }
}

impl Check for PrepareCalendar {
    fn name(&self) -> &'static str {
        "prepare-calendar"
    }

    fn features_to_be_checked(&self) -> &'static [&'static str] {
        &[
            "save-load.event",
            "save-load.event.recurrences",
            "save-load.todo",
            "save-load.todo.mixed-calendar",
        ]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["make-delete-calendar"]
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Result<()> {
        let Ok(principal) = ctx.principal() else {
            return ctx.set_features(self.features_to_be_checked(), None::<bool>);
        };
        let Some(calendar) = Self::open_calendar(ctx, &principal)? else {
            warn!("No calendar to store the test data in");
            return ctx.set_features(self.features_to_be_checked(), None::<bool>);
        };
        debug!(calendar = %calendar.url, "Using test calendar");
        ctx.fixtures_mut().calendar = Some(calendar.clone());

        let event1 = Self::save_load(ctx, &calendar, fixtures::SIMPLE_EVENT1, &fixtures::simple_event1())?;
        let event2 = Self::save_load(ctx, &calendar, fixtures::SIMPLE_EVENT2, &fixtures::simple_event2())?;
        ctx.set_feature("save-load.event", event1 && event2)?;

        let task = fixtures::simple_task1();
        if Self::save_load(ctx, &calendar, fixtures::SIMPLE_TASK1, &task)? {
            ctx.set_feature("save-load.todo.mixed-calendar", true)?;
            ctx.set_feature("save-load.todo", true)?;
            ctx.fixtures_mut().tasklist = Some(calendar.clone());
        } else {
            ctx.set_feature("save-load.todo.mixed-calendar", false)?;
            let tasklist = match Self::open_tasklist(ctx, &principal)? {
                Some(tasklist) => Self::save_load(ctx, &tasklist, fixtures::SIMPLE_TASK1, &task)?
                    .then_some(tasklist),
                None => None,
            };
            ctx.set_feature("save-load.todo", tasklist.is_some())?;
            ctx.fixtures_mut().tasklist = tasklist;
        }

        Self::check_recurrences(ctx, &calendar)?;

        if let Some(tasklist) = ctx.tasklist() {
            if let Err(e) = ctx.client().save_object(&tasklist, &fixtures::recurring_task()) {
                let e = server_refusal(e)?;
                warn!(error = %e, "Could not store the recurring task");
            }
        }
        Ok(())
    }
}
