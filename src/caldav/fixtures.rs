//! Test data the checks store on the server.
//!
//! Every object lives in the year 2000 and carries a `csc_` UID, so it is
//! easy to tell apart from real user data and to clean up afterwards.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use icalendar::{Calendar, Component, Event, Todo};

use super::CalendarObject;

/// Calendar holding the shared fixtures.
pub const TEST_CALENDAR_ID: &str = "caldav-server-checker-calendar";
/// Display name of the shared calendar.
pub const TEST_CALENDAR_NAME: &str = "caldav-server-checker-calendar";
/// Separate task list, used when the server refuses mixed calendars.
pub const TEST_TASKLIST_ID: &str = "caldav-server-checker-tasklist";
/// Calendar created and deleted by the make/delete check.
pub const MKDEL_CALENDAR_ID: &str = "caldav-server-checker-mkdel-test";
/// Display name given to the make/delete calendar.
pub const MKDEL_CALENDAR_NAME: &str = "csc mkdel test calendar";
/// A calendar id nobody creates.
pub const MISSING_CALENDAR_ID: &str = "caldav-server-checker-does-not-exist";

pub const SIMPLE_EVENT1: &str = "csc_simple_event1";
pub const SIMPLE_EVENT2: &str = "csc_simple_event2";
pub const SIMPLE_TASK1: &str = "csc_simple_task1";
pub const RECURRING_EVENT: &str = "csc_monthly_recurring_event";
pub const RECURRING_EXCEPTION: &str = "csc_monthly_recurring_with_exception";
pub const RECURRING_TASK: &str = "csc_monthly_recurring_task";
pub const SYNC_EVENT: &str = "csc_sync_test_event";
pub const DELETE_EVENT: &str = "csc_delete_test_event";

/// UIDs of every object the checks may leave behind.
pub const KNOWN_UIDS: &[&str] = &[
    SIMPLE_TASK1,
    SIMPLE_EVENT1,
    SIMPLE_EVENT2,
    RECURRING_EVENT,
    RECURRING_TASK,
    RECURRING_EXCEPTION,
    SYNC_EVENT,
    DELETE_EVENT,
];

pub const SIMPLE_EVENT1_SUMMARY: &str = "csc simple event 1";
pub const SIMPLE_EVENT2_SUMMARY: &str = "csc simple event 2";
pub const SIMPLE_TASK1_SUMMARY: &str = "csc simple task 1";
pub const TEST_CATEGORY: &str = "csc_testcategory";
pub const EXCEPTION_SUMMARY: &str = "csc monthly recurring event moved instance";

/// Build a UTC timestamp; an impossible date yields the epoch.
pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or_default()
}

fn wrap(components: impl FnOnce(&mut Calendar)) -> String {
    let mut calendar = Calendar::new();
    components(&mut calendar);
    calendar.done().to_string()
}

fn event(uid: &str, summary: &str, start: &str, end: &str) -> Event {
    Event::new()
        .uid(uid)
        .summary(summary)
        .add_property("DTSTART", start)
        .add_property("DTEND", end)
        .done()
}

pub fn simple_event1() -> String {
    wrap(|cal| {
        cal.push(
            Event::new()
                .uid(SIMPLE_EVENT1)
                .summary(SIMPLE_EVENT1_SUMMARY)
                .add_property("DTSTART", "20000101T120000Z")
                .add_property("DTEND", "20000101T130000Z")
                .add_property("CATEGORIES", TEST_CATEGORY)
                .done(),
        );
    })
}

pub fn simple_event2() -> String {
    wrap(|cal| {
        cal.push(event(
            SIMPLE_EVENT2,
            SIMPLE_EVENT2_SUMMARY,
            "20000102T120000Z",
            "20000102T130000Z",
        ));
    })
}

pub fn simple_task1() -> String {
    wrap(|cal| {
        cal.push(
            Todo::new()
                .uid(SIMPLE_TASK1)
                .summary(SIMPLE_TASK1_SUMMARY)
                .add_property("DTSTART", "20000102T090000Z")
                .add_property("DUE", "20000102T100000Z")
                .done(),
        );
    })
}

pub fn recurring_event() -> String {
    wrap(|cal| {
        cal.push(
            Event::new()
                .uid(RECURRING_EVENT)
                .summary("csc monthly recurring event")
                .add_property("DTSTART", "20000112T120000Z")
                .add_property("DTEND", "20000112T130000Z")
                .add_property("RRULE", "FREQ=MONTHLY;COUNT=12")
                .done(),
        );
    })
}

/// Recurring event whose February instance is moved and renamed.
pub fn recurring_with_exception() -> String {
    wrap(|cal| {
        cal.push(
            Event::new()
                .uid(RECURRING_EXCEPTION)
                .summary("csc monthly recurring event with exception")
                .add_property("DTSTART", "20000113T120000Z")
                .add_property("DTEND", "20000113T130000Z")
                .add_property("RRULE", "FREQ=MONTHLY;COUNT=12")
                .done(),
        );
        cal.push(
            Event::new()
                .uid(RECURRING_EXCEPTION)
                .summary(EXCEPTION_SUMMARY)
                .add_property("RECURRENCE-ID", "20000213T120000Z")
                .add_property("DTSTART", "20000213T140000Z")
                .add_property("DTEND", "20000213T150000Z")
                .done(),
        );
    })
}

pub fn recurring_task() -> String {
    wrap(|cal| {
        cal.push(
            Todo::new()
                .uid(RECURRING_TASK)
                .summary("csc monthly recurring task")
                .add_property("DTSTART", "20000112T120000Z")
                .add_property("DUE", "20000112T130000Z")
                .add_property("RRULE", "FREQ=MONTHLY;COUNT=12")
                .done(),
        );
    })
}

/// Event used by the sync-token check; `revision` changes its summary.
pub fn sync_event(revision: u32) -> String {
    wrap(|cal| {
        cal.push(event(
            SYNC_EVENT,
            &format!("csc sync test event revision {}", revision),
            "20000103T120000Z",
            "20000103T130000Z",
        ));
    })
}

/// Short-lived event for the object deletion check.
///
/// It sits in 1999 so searches over the fixture year never see it.
pub fn delete_event() -> String {
    wrap(|cal| {
        cal.push(event(
            DELETE_EVENT,
            "csc deletion test event",
            "19990601T120000Z",
            "19990601T130000Z",
        ));
    })
}

/// Parse an iCalendar DATE or DATE-TIME value; floating times count as UTC.
pub fn parse_ical_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()) {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    let naive = NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y%m%dT%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// The date that places an object on the calendar.
///
/// DTSTART when present, else DUE, else DTEND.
pub fn anchor_date(object: &CalendarObject) -> Option<DateTime<Utc>> {
    ["DTSTART", "DUE", "DTEND"]
        .iter()
        .find_map(|prop| object.property(prop))
        .and_then(|v| parse_ical_datetime(&v))
}

/// Whether an object belongs to the fixture year.
///
/// Objects without any usable date are left out.
pub fn in_test_year(object: &CalendarObject) -> bool {
    let start = utc(2000, 1, 1, 0, 0);
    let end = utc(2001, 1, 1, 0, 0);
    anchor_date(object).is_some_and(|d| d >= start && d <= end)
}
