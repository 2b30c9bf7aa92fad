//! The CalDAV collaborator.
//!
//! Checks never talk HTTP themselves. They drive a [`DavClient`], which
//! hides the wire protocol behind a handful of calendar operations and
//! carries the expected feature profile of the server under test.
//!
//! - [`http`]: blocking adapter speaking WebDAV/CalDAV with reqwest
//! - [`mock`]: in-memory server used by the test suite
//! - [`fixtures`]: well-known identifiers and iCalendar test data
//! - [`throttle`]: request pacing strategies

pub mod fixtures;
pub mod http;
pub mod mock;
pub mod throttle;
pub mod xml;

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::features::FeatureSet;

pub use http::{DavClientConfig, HttpDavClient};
pub use mock::{MockBehaviour, MockDavClient};
pub use throttle::{FixedDelay, NoDelay, RequestKind, Throttle};

/// Failure reported by the CalDAV collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DavError {
    /// Resource does not exist.
    #[error("Not found: {url}")]
    NotFound { url: String },

    /// The server refused our credentials.
    #[error("Not authorized to access {url}")]
    Authorization { url: String },

    /// A REPORT request was rejected.
    #[error("REPORT failed: {message}")]
    Report { message: String },

    /// Any other unexpected HTTP status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never got an answer.
    #[error("Network error: {0}")]
    Network(String),

    /// The answer could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for collaborator operations.
pub type DavResult<T> = std::result::Result<T, DavError>;

/// iCalendar component kinds the checks care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Event,
    Todo,
    Journal,
}

impl ComponentType {
    /// iCalendar component name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Event => "VEVENT",
            ComponentType::Todo => "VTODO",
            ComponentType::Journal => "VJOURNAL",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "VEVENT" => Some(ComponentType::Event),
            "VTODO" => Some(ComponentType::Todo),
            "VJOURNAL" => Some(ComponentType::Journal),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated user's principal.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub url: String,
    pub display_name: Option<String>,
    /// Collection that holds this principal's calendars.
    pub calendar_home: String,
}

/// A calendar collection on the server.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarRef {
    /// Last path segment of the collection URL.
    pub id: String,
    pub url: String,
    pub name: Option<String>,
}

/// How to find a calendar below a principal.
#[derive(Debug, Clone, Copy)]
pub enum CalendarLookup<'a> {
    Id(&'a str),
    Name(&'a str),
}

/// Parameters for MKCALENDAR.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCalendar {
    pub id: String,
    pub name: Option<String>,
    /// Restricts the collection to these component types; empty means no restriction.
    pub components: Vec<ComponentType>,
}

impl NewCalendar {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            components: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_components(mut self, components: &[ComponentType]) -> Self {
        self.components = components.to_vec();
        self
    }
}

/// A stored calendar object resource.
///
/// The payload is kept as raw iCalendar text. The accessors below do plain
/// line lookups, which is all the checks need to recognise their own data.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarObject {
    pub url: String,
    pub data: String,
}

impl CalendarObject {
    pub fn new(url: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            data: data.into(),
        }
    }

    /// Unfolded content lines.
    fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = Vec::new();
        for raw in self.data.lines() {
            let raw = raw.trim_end_matches('\r');
            if let Some(continuation) = raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
                if let Some(last) = lines.last_mut() {
                    last.push_str(continuation);
                    continue;
                }
            }
            lines.push(raw.to_string());
        }
        lines
    }

    /// All values of a property, in document order.
    pub fn property_values(&self, name: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                let key = key.split(';').next().unwrap_or(key);
                key.eq_ignore_ascii_case(name).then(|| value.to_string())
            })
            .collect()
    }

    /// First value of a property.
    pub fn property(&self, name: &str) -> Option<String> {
        self.property_values(name).into_iter().next()
    }

    pub fn uid(&self) -> Option<String> {
        self.property("UID")
    }

    pub fn summary(&self) -> Option<String> {
        self.property("SUMMARY")
    }

    /// Type of the first VEVENT/VTODO/VJOURNAL in the object.
    pub fn component_type(&self) -> Option<ComponentType> {
        self.lines().iter().find_map(|line| {
            line.strip_prefix("BEGIN:")
                .and_then(ComponentType::from_name)
        })
    }

    /// Number of components of the given type.
    pub fn component_count(&self, component: ComponentType) -> usize {
        let marker = format!("BEGIN:{}", component.as_str());
        self.lines().iter().filter(|l| **l == marker).count()
    }
}

/// A calendar-query REPORT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    /// Restrict to one component type; `None` asks for everything.
    pub component: Option<ComponentType>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Text match on SUMMARY.
    pub summary: Option<TextMatch>,
    /// Text match on CATEGORIES.
    pub category: Option<String>,
    /// Ask the server to expand recurrences within the time range.
    pub expand: bool,
}

/// A text-match filter.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    pub value: String,
    pub case_sensitive: bool,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(mut self, component: ComponentType) -> Self {
        self.component = Some(component);
        self
    }

    pub fn time_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Open-ended range: everything before `end`.
    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.start = None;
        self.end = Some(end);
        self
    }

    pub fn summary(mut self, value: impl Into<String>, case_sensitive: bool) -> Self {
        self.summary = Some(TextMatch {
            value: value.into(),
            case_sensitive,
        });
        self
    }

    pub fn category(mut self, value: impl Into<String>) -> Self {
        self.category = Some(value.into());
        self
    }

    pub fn expand(mut self) -> Self {
        self.expand = true;
        self
    }
}

/// Answer to a sync-collection REPORT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncResult {
    pub token: String,
    pub changed: Vec<CalendarObject>,
    /// URLs reported as gone.
    pub deleted: Vec<String>,
}

impl SyncResult {
    /// True if the report lists neither changes nor deletions.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// Operations the checks need from a CalDAV server.
///
/// Implementations also carry the server's expected feature profile. The
/// engine swaps it out temporarily while dependencies run, so that any
/// feature-conditional workaround in the client stays out of the way.
pub trait DavClient {
    /// Configured name of the server.
    fn server_name(&self) -> &str;

    /// Base URL.
    fn url(&self) -> &str;

    /// Expected feature profile.
    fn features(&self) -> &FeatureSet;

    /// Replace the expected feature profile, returning the previous one.
    fn replace_features(&mut self, features: FeatureSet) -> FeatureSet;

    fn principal(&mut self) -> DavResult<Principal>;

    fn calendars(&mut self, principal: &Principal) -> DavResult<Vec<CalendarRef>>;

    fn calendar(&mut self, principal: &Principal, lookup: CalendarLookup<'_>) -> DavResult<CalendarRef>;

    fn make_calendar(&mut self, principal: &Principal, new: &NewCalendar) -> DavResult<CalendarRef>;

    fn delete_calendar(&mut self, calendar: &CalendarRef) -> DavResult<()>;

    /// Every object in a calendar.
    fn objects(&mut self, calendar: &CalendarRef) -> DavResult<Vec<CalendarObject>>;

    /// Store iCalendar data; the object URL is derived from its UID.
    fn save_object(&mut self, calendar: &CalendarRef, ical: &str) -> DavResult<CalendarObject>;

    fn object_by_uid(&mut self, calendar: &CalendarRef, uid: &str) -> DavResult<CalendarObject>;

    fn delete_object(&mut self, object: &CalendarObject) -> DavResult<()>;

    fn search(&mut self, calendar: &CalendarRef, query: &SearchQuery) -> DavResult<Vec<CalendarObject>>;

    /// sync-collection REPORT; `None` asks for the initial token.
    fn sync_objects(&mut self, calendar: &CalendarRef, token: Option<&str>) -> DavResult<SyncResult>;

    /// free-busy-query REPORT; the raw iCalendar answer.
    fn freebusy(&mut self, calendar: &CalendarRef, start: DateTime<Utc>, end: DateTime<Utc>) -> DavResult<String>;

    /// principal-property-search on the display name; `None` matches everyone.
    fn principal_search(&mut self, name: Option<&str>) -> DavResult<Vec<Principal>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOLDED: &str = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:csc_simple_event1\r\nSUMMARY:csc simple\r\n  event 1\r\nCATEGORIES;LANGUAGE=en:csc_testcategory\r\nEND:VEVENT\r\nBEGIN:VEVENT\r\nUID:csc_simple_event1\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    #[test]
    fn properties_are_unfolded() {
        let obj = CalendarObject::new("/cal/a.ics", FOLDED);
        assert_eq!(obj.summary().as_deref(), Some("csc simple event 1"));
    }

    #[test]
    fn property_parameters_are_ignored() {
        let obj = CalendarObject::new("/cal/a.ics", FOLDED);
        assert_eq!(obj.property("categories").as_deref(), Some("csc_testcategory"));
    }

    #[test]
    fn components_are_counted() {
        let obj = CalendarObject::new("/cal/a.ics", FOLDED);
        assert_eq!(obj.component_type(), Some(ComponentType::Event));
        assert_eq!(obj.component_count(ComponentType::Event), 2);
        assert_eq!(obj.component_count(ComponentType::Todo), 0);
        assert_eq!(obj.property_values("UID").len(), 2);
    }

    #[test]
    fn search_query_builder() {
        let q = SearchQuery::new()
            .component(ComponentType::Todo)
            .summary("x", true)
            .expand();
        assert_eq!(q.component, Some(ComponentType::Todo));
        assert!(q.summary.as_ref().unwrap().case_sensitive);
        assert!(q.expand);
        assert!(q.category.is_none());
    }

    #[test]
    fn dav_error_display() {
        let err = DavError::Status {
            status: 507,
            message: "full".into(),
        };
        assert_eq!(err.to_string(), "HTTP 507: full");
    }
}
