//! In-memory CalDAV server for tests and dry runs.
//!
//! [`MockDavClient`] behaves like a well-mannered server by default. Each
//! flag in [`MockBehaviour`] turns one capability off (or, for
//! `auto_create`, on), so a test can model a specific quirk and watch the
//! checks notice it. Clones share the same server state, which lets a test
//! keep a handle after boxing the client into a checker.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use chrono::{DateTime, Months, Utc};

use super::fixtures::{anchor_date, parse_ical_datetime};
use super::xml::format_icalendar_datetime;
use super::{
    CalendarLookup, CalendarObject, CalendarRef, ComponentType, DavClient, DavError, DavResult,
    NewCalendar, Principal, SearchQuery, SyncResult,
};
use crate::features::FeatureSet;

const BASE_URL: &str = "mock://caldav.test/";
const PRINCIPAL_URL: &str = "mock://caldav.test/principals/tester/";
const HOME_URL: &str = "mock://caldav.test/calendars/tester/";

/// Display name of the mock principal.
pub const MOCK_PRINCIPAL_NAME: &str = "Mock Tester";

/// Capabilities of the simulated server.
#[derive(Debug, Clone, PartialEq)]
pub struct MockBehaviour {
    pub principal: bool,
    /// Looking up a missing calendar creates it.
    pub auto_create: bool,
    pub mkcalendar: bool,
    pub display_name: bool,
    pub delete_calendar: bool,
    /// A deleted calendar id can be created again.
    pub free_namespace: bool,
    /// The principal starts out with a calendar of its own.
    pub has_calendar: bool,
    /// Tasks may be stored next to events.
    pub mixed_calendar: bool,
    pub text_search: bool,
    pub case_sensitive: bool,
    pub substring: bool,
    pub category: bool,
    /// A time range may leave out its start or end.
    pub open_ended_search: bool,
    pub combined_and: bool,
    pub comp_type_optional: bool,
    pub implicit_recurrences: bool,
    pub expand: bool,
    pub sync: bool,
    pub sync_deletes: bool,
    pub principal_search: bool,
    pub freebusy: bool,
    /// Deleting an object actually removes it.
    pub delete_object: bool,
}

impl Default for MockBehaviour {
    fn default() -> Self {
        Self {
            principal: true,
            auto_create: false,
            mkcalendar: true,
            display_name: true,
            delete_calendar: true,
            free_namespace: true,
            has_calendar: true,
            mixed_calendar: true,
            text_search: true,
            case_sensitive: true,
            substring: true,
            category: true,
            open_ended_search: true,
            combined_and: true,
            comp_type_optional: true,
            implicit_recurrences: true,
            expand: true,
            sync: true,
            sync_deletes: true,
            principal_search: true,
            freebusy: true,
            delete_object: true,
        }
    }
}

/// Replaces the built-in search when it returns `Some`.
pub type SearchHandler =
    Box<dyn FnMut(&CalendarRef, &SearchQuery) -> Option<DavResult<Vec<CalendarObject>>>>;

/// Replaces the built-in sync-collection when it returns `Some`.
pub type SyncHandler = Box<dyn FnMut(&CalendarRef, Option<&str>) -> Option<DavResult<SyncResult>>>;

#[derive(Debug, Clone)]
struct MockCalendar {
    name: Option<String>,
    components: Vec<ComponentType>,
    /// UID to iCalendar text.
    objects: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct Change {
    version: u64,
    calendar: String,
    uid: String,
    deleted: bool,
}

#[derive(Default)]
struct MockServer {
    behaviour: MockBehaviour,
    calendars: BTreeMap<String, MockCalendar>,
    /// Ids that cannot be reused.
    tombstones: Vec<String>,
    changes: Vec<Change>,
    version: u64,
    failures: HashMap<String, DavError>,
    calls: Vec<String>,
    search_handler: Option<SearchHandler>,
    sync_handler: Option<SyncHandler>,
}

/// A CalDAV client backed by an in-memory server.
#[derive(Clone)]
pub struct MockDavClient {
    name: String,
    features: FeatureSet,
    server: Rc<RefCell<MockServer>>,
}

impl Default for MockDavClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDavClient {
    /// A well-behaved server.
    pub fn new() -> Self {
        Self::with_behaviour(MockBehaviour::default())
    }

    pub fn with_behaviour(behaviour: MockBehaviour) -> Self {
        let mut server = MockServer {
            behaviour,
            ..Default::default()
        };
        if server.behaviour.has_calendar {
            server.calendars.insert(
                "default".to_string(),
                MockCalendar {
                    name: Some("Personal".to_string()),
                    components: Vec::new(),
                    objects: BTreeMap::new(),
                },
            );
        }
        Self {
            name: "mock".to_string(),
            features: FeatureSet::new(),
            server: Rc::new(RefCell::new(server)),
        }
    }

    /// Set the expected feature profile.
    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Change the simulated capabilities.
    pub fn update_behaviour(&self, update: impl FnOnce(&mut MockBehaviour)) {
        update(&mut self.server.borrow_mut().behaviour);
    }

    /// Make every call of `operation` fail until cleared.
    ///
    /// Operation names match the [`DavClient`] method names.
    pub fn fail_on(&self, operation: &str, error: DavError) {
        self.server
            .borrow_mut()
            .failures
            .insert(operation.to_string(), error);
    }

    pub fn clear_failures(&self) {
        self.server.borrow_mut().failures.clear();
    }

    pub fn set_search_handler(&self, handler: SearchHandler) {
        self.server.borrow_mut().search_handler = Some(handler);
    }

    pub fn set_sync_handler(&self, handler: SyncHandler) {
        self.server.borrow_mut().sync_handler = Some(handler);
    }

    /// Operation names in call order.
    pub fn calls(&self) -> Vec<String> {
        self.server.borrow().calls.clone()
    }

    /// How often `operation` was called.
    pub fn call_count(&self, operation: &str) -> usize {
        self.server
            .borrow()
            .calls
            .iter()
            .filter(|c| *c == operation)
            .count()
    }

    pub fn calendar_ids(&self) -> Vec<String> {
        self.server.borrow().calendars.keys().cloned().collect()
    }

    /// UIDs stored in a calendar; empty if the calendar does not exist.
    pub fn object_uids(&self, calendar_id: &str) -> Vec<String> {
        self.server
            .borrow()
            .calendars
            .get(calendar_id)
            .map(|c| c.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Enter an operation: log it and apply injected failures.
    fn enter(&self, operation: &str) -> DavResult<()> {
        let mut server = self.server.borrow_mut();
        server.calls.push(operation.to_string());
        match server.failures.get(operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn behaviour(&self) -> MockBehaviour {
        self.server.borrow().behaviour.clone()
    }

    fn calendar_url(id: &str) -> String {
        format!("{}{}/", HOME_URL, id)
    }

    fn object_url(calendar: &CalendarRef, uid: &str) -> String {
        format!("{}{}.ics", calendar.url, uid)
    }

    fn calendar_ref(id: &str, calendar: &MockCalendar) -> CalendarRef {
        CalendarRef {
            id: id.to_string(),
            url: Self::calendar_url(id),
            name: calendar.name.clone(),
        }
    }

    fn principal_value() -> Principal {
        Principal {
            url: PRINCIPAL_URL.to_string(),
            display_name: Some(MOCK_PRINCIPAL_NAME.to_string()),
            calendar_home: HOME_URL.to_string(),
        }
    }

    fn not_found(url: impl Into<String>) -> DavError {
        DavError::NotFound { url: url.into() }
    }

    fn stored_objects(&self, calendar: &CalendarRef) -> DavResult<Vec<CalendarObject>> {
        let server = self.server.borrow();
        let stored = server
            .calendars
            .get(&calendar.id)
            .ok_or_else(|| Self::not_found(&calendar.url))?;
        Ok(stored
            .objects
            .iter()
            .map(|(uid, data)| CalendarObject::new(Self::object_url(calendar, uid), data.clone()))
            .collect())
    }

    fn log_change(server: &mut MockServer, calendar: &str, uid: &str, deleted: bool) {
        server.version += 1;
        let version = server.version;
        server.changes.push(Change {
            version,
            calendar: calendar.to_string(),
            uid: uid.to_string(),
            deleted,
        });
    }

    fn builtin_search(&self, calendar: &CalendarRef, query: &SearchQuery) -> DavResult<Vec<CalendarObject>> {
        let behaviour = self.behaviour();
        if query.summary.is_some() && !behaviour.text_search {
            return Err(DavError::Report {
                message: "text-match is not supported".into(),
            });
        }
        if query.category.is_some() && !behaviour.category {
            return Err(DavError::Report {
                message: "text-match on CATEGORIES is not supported".into(),
            });
        }

        let range = match (query.start, query.end) {
            (None, None) => None,
            (Some(start), Some(end)) => Some((start, end)),
            (start, end) => {
                if !behaviour.open_ended_search {
                    return Err(DavError::Report {
                        message: "time-range needs both start and end".into(),
                    });
                }
                Some((start.unwrap_or(DateTime::<Utc>::MIN_UTC), end.unwrap_or(DateTime::<Utc>::MAX_UTC)))
            }
        };
        let mut found = Vec::new();
        for object in self.stored_objects(calendar)? {
            let kind = object.component_type();
            let kind_ok = match query.component {
                Some(wanted) => kind == Some(wanted),
                None => behaviour.comp_type_optional || kind == Some(ComponentType::Event),
            };
            if !kind_ok {
                continue;
            }

            let text_ok = match &query.summary {
                Some(m) => object.property_values("SUMMARY").iter().any(|s| {
                    text_matches(
                        s,
                        &m.value,
                        m.case_sensitive && behaviour.case_sensitive,
                        behaviour.substring,
                    )
                }),
                None => true,
            };
            let category_ok = match &query.category {
                Some(wanted) => object
                    .property_values("CATEGORIES")
                    .iter()
                    .flat_map(|v| v.split(','))
                    .any(|c| c.trim().eq_ignore_ascii_case(wanted)),
                None => true,
            };
            let range_ok = match range {
                Some((start, end)) => instances(&object, behaviour.implicit_recurrences)
                    .iter()
                    .any(|i| i.overlaps(start, end)),
                None => true,
            };

            let matched = if behaviour.combined_and || range.is_none() || query.category.is_none() {
                text_ok && category_ok && range_ok
            } else {
                text_ok && (category_ok || range_ok)
            };
            if !matched {
                continue;
            }

            match range {
                Some((start, end)) if query.expand && behaviour.expand && is_recurring(&object) => {
                    found.extend(expand(&object, start, end));
                }
                _ => found.push(object),
            }
        }
        Ok(found)
    }

    fn builtin_freebusy(&self, calendar: &CalendarRef, start: DateTime<Utc>, end: DateTime<Utc>) -> DavResult<String> {
        if !self.behaviour().freebusy {
            return Err(DavError::Report {
                message: "free-busy-query is not supported".into(),
            });
        }
        let mut busy: Vec<Instance> = self
            .stored_objects(calendar)?
            .iter()
            .flat_map(|object| instances(object, true))
            .filter(|i| i.kind == ComponentType::Event && i.overlaps(start, end))
            .collect();
        busy.sort_by_key(|i| i.start);

        let mut text = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//caldav-server-tester//mock//EN\r\nBEGIN:VFREEBUSY\r\n");
        text.push_str(&format!("DTSTART:{}\r\n", format_icalendar_datetime(start)));
        text.push_str(&format!("DTEND:{}\r\n", format_icalendar_datetime(end)));
        for instance in busy {
            text.push_str(&format!(
                "FREEBUSY:{}/{}\r\n",
                format_icalendar_datetime(instance.start.max(start)),
                format_icalendar_datetime(instance.end.min(end))
            ));
        }
        text.push_str("END:VFREEBUSY\r\nEND:VCALENDAR\r\n");
        Ok(text)
    }

    fn builtin_sync(&self, calendar: &CalendarRef, token: Option<&str>) -> DavResult<SyncResult> {
        let behaviour = self.behaviour();
        if !behaviour.sync {
            return Err(DavError::Report {
                message: "sync-collection is not supported".into(),
            });
        }
        let objects = self.stored_objects(calendar)?;
        let server = self.server.borrow();
        let token_now = format!("v{}", server.version);

        let since = match token {
            None => {
                return Ok(SyncResult {
                    token: token_now,
                    changed: objects,
                    deleted: Vec::new(),
                });
            }
            Some(t) => t
                .strip_prefix('v')
                .and_then(|v| v.parse::<u64>().ok())
                .ok_or_else(|| DavError::Report {
                    message: format!("invalid sync token {}", t),
                })?,
        };

        let mut latest: BTreeMap<&str, bool> = BTreeMap::new();
        for change in server
            .changes
            .iter()
            .filter(|c| c.version > since && c.calendar == calendar.id)
        {
            latest.insert(change.uid.as_str(), change.deleted);
        }

        let mut result = SyncResult {
            token: token_now,
            ..Default::default()
        };
        for (uid, deleted) in latest {
            let url = Self::object_url(calendar, uid);
            if deleted {
                if behaviour.sync_deletes {
                    result.deleted.push(url);
                }
            } else if let Some(object) = objects.iter().find(|o| o.url == url) {
                result.changed.push(object.clone());
            }
        }
        Ok(result)
    }
}

fn text_matches(haystack: &str, needle: &str, case_sensitive: bool, substring: bool) -> bool {
    let (haystack, needle) = if case_sensitive {
        (haystack.to_string(), needle.to_string())
    } else {
        (haystack.to_lowercase(), needle.to_lowercase())
    };
    if substring {
        haystack.contains(&needle)
    } else {
        haystack == needle
    }
}

/// The VEVENT/VTODO/VJOURNAL blocks of a stored object.
fn components(object: &CalendarObject) -> Vec<(ComponentType, CalendarObject)> {
    let mut out = Vec::new();
    let mut current: Option<(ComponentType, String)> = None;
    for line in object.data.lines() {
        let trimmed = line.trim_end_matches('\r');
        if let Some((kind, text)) = current.as_mut() {
            if trimmed == format!("END:{}", kind.as_str()) {
                out.push((*kind, CalendarObject::new(object.url.clone(), text.clone())));
                current = None;
            } else {
                text.push_str(trimmed);
                text.push_str("\r\n");
            }
        } else if let Some(kind) = trimmed.strip_prefix("BEGIN:").and_then(component_kind) {
            current = Some((kind, String::new()));
        }
    }
    out
}

fn component_kind(name: &str) -> Option<ComponentType> {
    [ComponentType::Event, ComponentType::Todo, ComponentType::Journal]
        .into_iter()
        .find(|c| c.as_str() == name)
}

fn is_recurring(object: &CalendarObject) -> bool {
    object.property("RRULE").is_some()
}

/// A concrete occurrence of a component.
#[derive(Debug, Clone)]
struct Instance {
    kind: ComponentType,
    uid: String,
    summary: Option<String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    recurrence_id: Option<DateTime<Utc>>,
}

impl Instance {
    fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if self.start == self.end {
            self.start >= start && self.start < end
        } else {
            self.start < end && self.end > start
        }
    }

    fn render(&self) -> String {
        let end_prop = match self.kind {
            ComponentType::Todo => "DUE",
            _ => "DTEND",
        };
        let mut text = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//caldav-server-tester//mock//EN\r\n");
        text.push_str(&format!("BEGIN:{}\r\nUID:{}\r\n", self.kind.as_str(), self.uid));
        if let Some(rid) = self.recurrence_id {
            text.push_str(&format!("RECURRENCE-ID:{}\r\n", format_icalendar_datetime(rid)));
        }
        text.push_str(&format!("DTSTART:{}\r\n", format_icalendar_datetime(self.start)));
        text.push_str(&format!("{}:{}\r\n", end_prop, format_icalendar_datetime(self.end)));
        if let Some(summary) = &self.summary {
            text.push_str(&format!("SUMMARY:{}\r\n", summary));
        }
        text.push_str(&format!("END:{}\r\nEND:VCALENDAR\r\n", self.kind.as_str()));
        text
    }
}

fn single_instance(kind: ComponentType, component: &CalendarObject) -> Option<Instance> {
    let start = anchor_date(component)?;
    let end = ["DTEND", "DUE"]
        .iter()
        .find_map(|p| component.property(p))
        .and_then(|v| parse_ical_datetime(&v))
        .unwrap_or(start);
    Some(Instance {
        kind,
        uid: component.uid().unwrap_or_default(),
        summary: component.summary(),
        start,
        end,
        recurrence_id: component
            .property("RECURRENCE-ID")
            .and_then(|v| parse_ical_datetime(&v)),
    })
}

/// Monthly recurrence count, if the rule is one the mock understands.
fn monthly_count(rule: &str) -> Option<u32> {
    let parts: HashMap<&str, &str> = rule.split(';').filter_map(|p| p.split_once('=')).collect();
    if parts.get("FREQ") != Some(&"MONTHLY") {
        return None;
    }
    Some(parts.get("COUNT").and_then(|c| c.parse().ok()).unwrap_or(12))
}

/// Occurrences of every component in the object.
///
/// Without `implicit`, recurring masters only contribute their first
/// instance. Overridden instances always count.
fn instances(object: &CalendarObject, implicit: bool) -> Vec<Instance> {
    let parts = components(object);
    let overrides: Vec<Instance> = parts
        .iter()
        .filter(|(_, c)| c.property("RECURRENCE-ID").is_some())
        .filter_map(|(k, c)| single_instance(*k, c))
        .collect();

    let mut out = overrides.clone();
    for (kind, component) in parts.iter().filter(|(_, c)| c.property("RECURRENCE-ID").is_none()) {
        let Some(first) = single_instance(*kind, component) else {
            continue;
        };
        let count = match component.property("RRULE").and_then(|r| monthly_count(&r)) {
            Some(count) if implicit => count,
            _ => 1,
        };
        let duration = first.end - first.start;
        for n in 0..count {
            let Some(start) = first.start.checked_add_months(Months::new(n)) else {
                break;
            };
            if overrides.iter().any(|o| o.recurrence_id == Some(start)) {
                continue;
            }
            out.push(Instance {
                start,
                end: start + duration,
                recurrence_id: (count > 1).then_some(start),
                ..first.clone()
            });
        }
    }
    out
}

/// One single-component object per instance inside the range.
fn expand(object: &CalendarObject, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<CalendarObject> {
    let mut hits: Vec<Instance> = instances(object, true)
        .into_iter()
        .filter(|i| i.overlaps(start, end))
        .collect();
    hits.sort_by_key(|i| i.start);
    hits.into_iter()
        .map(|i| CalendarObject::new(object.url.clone(), i.render()))
        .collect()
}

impl DavClient for MockDavClient {
    fn server_name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        BASE_URL
    }

    fn features(&self) -> &FeatureSet {
        &self.features
    }

    fn replace_features(&mut self, features: FeatureSet) -> FeatureSet {
        std::mem::replace(&mut self.features, features)
    }

    fn principal(&mut self) -> DavResult<Principal> {
        self.enter("principal")?;
        if !self.behaviour().principal {
            return Err(Self::not_found(BASE_URL));
        }
        Ok(Self::principal_value())
    }

    fn calendars(&mut self, _principal: &Principal) -> DavResult<Vec<CalendarRef>> {
        self.enter("calendars")?;
        Ok(self
            .server
            .borrow()
            .calendars
            .iter()
            .map(|(id, c)| Self::calendar_ref(id, c))
            .collect())
    }

    fn calendar(&mut self, _principal: &Principal, lookup: CalendarLookup<'_>) -> DavResult<CalendarRef> {
        self.enter("calendar")?;
        let mut server = self.server.borrow_mut();
        match lookup {
            CalendarLookup::Id(id) => {
                if let Some(calendar) = server.calendars.get(id) {
                    return Ok(Self::calendar_ref(id, calendar));
                }
                if !server.behaviour.auto_create {
                    return Err(Self::not_found(Self::calendar_url(id)));
                }
                let calendar = MockCalendar {
                    name: None,
                    components: Vec::new(),
                    objects: BTreeMap::new(),
                };
                let found = Self::calendar_ref(id, &calendar);
                server.calendars.insert(id.to_string(), calendar);
                Ok(found)
            }
            CalendarLookup::Name(name) => server
                .calendars
                .iter()
                .find(|(_, c)| c.name.as_deref() == Some(name))
                .map(|(id, c)| Self::calendar_ref(id, c))
                .ok_or_else(|| Self::not_found(format!("{}#{}", HOME_URL, name))),
        }
    }

    fn make_calendar(&mut self, _principal: &Principal, new: &NewCalendar) -> DavResult<CalendarRef> {
        self.enter("make_calendar")?;
        let mut server = self.server.borrow_mut();
        let url = Self::calendar_url(&new.id);
        if !server.behaviour.mkcalendar {
            return Err(DavError::Status {
                status: 405,
                message: "MKCALENDAR not allowed".into(),
            });
        }
        if server.calendars.contains_key(&new.id) || server.tombstones.contains(&new.id) {
            return Err(DavError::Status {
                status: 405,
                message: format!("{} already exists", url),
            });
        }
        let calendar = MockCalendar {
            name: new.name.clone().filter(|_| server.behaviour.display_name),
            components: new.components.clone(),
            objects: BTreeMap::new(),
        };
        let created = Self::calendar_ref(&new.id, &calendar);
        server.calendars.insert(new.id.clone(), calendar);
        Ok(created)
    }

    fn delete_calendar(&mut self, calendar: &CalendarRef) -> DavResult<()> {
        self.enter("delete_calendar")?;
        let mut server = self.server.borrow_mut();
        if !server.behaviour.delete_calendar {
            return Err(DavError::Status {
                status: 403,
                message: "calendar deletion is forbidden".into(),
            });
        }
        if server.calendars.remove(&calendar.id).is_none() {
            return Err(Self::not_found(&calendar.url));
        }
        if !server.behaviour.free_namespace {
            server.tombstones.push(calendar.id.clone());
        }
        Ok(())
    }

    fn objects(&mut self, calendar: &CalendarRef) -> DavResult<Vec<CalendarObject>> {
        self.enter("objects")?;
        self.stored_objects(calendar)
    }

    fn save_object(&mut self, calendar: &CalendarRef, ical: &str) -> DavResult<CalendarObject> {
        self.enter("save_object")?;
        let object = CalendarObject::new(String::new(), ical);
        let uid = object
            .uid()
            .ok_or_else(|| DavError::Protocol("calendar data has no UID".into()))?;
        let kind = object
            .component_type()
            .ok_or_else(|| DavError::Protocol("calendar data has no component".into()))?;

        let mut server = self.server.borrow_mut();
        let mixed = server.behaviour.mixed_calendar;
        let stored = server
            .calendars
            .get_mut(&calendar.id)
            .ok_or_else(|| Self::not_found(&calendar.url))?;
        let accepted = if stored.components.is_empty() {
            mixed || kind == ComponentType::Event
        } else {
            stored.components.contains(&kind)
        };
        if !accepted {
            return Err(DavError::Status {
                status: 403,
                message: format!("{} not allowed in {}", kind, calendar.url),
            });
        }
        stored.objects.insert(uid.clone(), ical.to_string());
        Self::log_change(&mut server, &calendar.id, &uid, false);
        Ok(CalendarObject::new(Self::object_url(calendar, &uid), ical))
    }

    fn object_by_uid(&mut self, calendar: &CalendarRef, uid: &str) -> DavResult<CalendarObject> {
        self.enter("object_by_uid")?;
        self.stored_objects(calendar)?
            .into_iter()
            .find(|o| o.uid().as_deref() == Some(uid))
            .ok_or_else(|| Self::not_found(Self::object_url(calendar, uid)))
    }

    fn delete_object(&mut self, object: &CalendarObject) -> DavResult<()> {
        self.enter("delete_object")?;
        let silently_kept = !self.behaviour().delete_object;
        let mut server = self.server.borrow_mut();
        let location = server.calendars.iter_mut().find_map(|(id, c)| {
            let uid = c
                .objects
                .keys()
                .find(|uid| object.url == format!("{}{}.ics", Self::calendar_url(id), uid))?
                .clone();
            if silently_kept {
                return Some((id.clone(), None));
            }
            c.objects.remove(&uid);
            Some((id.clone(), Some(uid)))
        });
        match location {
            Some((calendar, Some(uid))) => {
                Self::log_change(&mut server, &calendar, &uid, true);
                Ok(())
            }
            Some((_, None)) => Ok(()),
            None => Err(Self::not_found(&object.url)),
        }
    }

    fn search(&mut self, calendar: &CalendarRef, query: &SearchQuery) -> DavResult<Vec<CalendarObject>> {
        self.enter("search")?;
        let handler = self.server.borrow_mut().search_handler.take();
        if let Some(mut handler) = handler {
            let answer = handler(calendar, query);
            self.server.borrow_mut().search_handler = Some(handler);
            if let Some(answer) = answer {
                return answer;
            }
        }
        self.builtin_search(calendar, query)
    }

    fn sync_objects(&mut self, calendar: &CalendarRef, token: Option<&str>) -> DavResult<SyncResult> {
        self.enter("sync_objects")?;
        let handler = self.server.borrow_mut().sync_handler.take();
        if let Some(mut handler) = handler {
            let answer = handler(calendar, token);
            self.server.borrow_mut().sync_handler = Some(handler);
            if let Some(answer) = answer {
                return answer;
            }
        }
        self.builtin_sync(calendar, token)
    }

    fn freebusy(&mut self, calendar: &CalendarRef, start: DateTime<Utc>, end: DateTime<Utc>) -> DavResult<String> {
        self.enter("freebusy")?;
        self.builtin_freebusy(calendar, start, end)
    }

    fn principal_search(&mut self, name: Option<&str>) -> DavResult<Vec<Principal>> {
        self.enter("principal_search")?;
        if !self.behaviour().principal_search {
            return Err(DavError::Report {
                message: "principal-property-search is not supported".into(),
            });
        }
        let me = Self::principal_value();
        Ok(match name {
            Some(name) if me.display_name.as_deref() != Some(name) => Vec::new(),
            _ => vec![me],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caldav::fixtures::{self, utc};

    fn setup(behaviour: MockBehaviour) -> (MockDavClient, CalendarRef) {
        let mut client = MockDavClient::with_behaviour(behaviour);
        let principal = client.principal().unwrap();
        let cal = client
            .make_calendar(&principal, &NewCalendar::new("test"))
            .unwrap();
        for ical in [
            fixtures::simple_event1(),
            fixtures::simple_event2(),
            fixtures::recurring_event(),
            fixtures::recurring_with_exception(),
        ] {
            client.save_object(&cal, &ical).unwrap();
        }
        (client, cal)
    }

    #[test]
    fn clones_share_state() {
        let (client, _) = setup(MockBehaviour::default());
        let handle = client.clone();
        assert_eq!(handle.object_uids("test").len(), 4);
        assert_eq!(handle.call_count("save_object"), 4);
    }

    #[test]
    fn time_range_search_finds_implicit_recurrence() {
        let (mut client, cal) = setup(MockBehaviour::default());
        let query = SearchQuery::new()
            .component(ComponentType::Event)
            .time_range(utc(2000, 2, 12, 11, 0), utc(2000, 2, 12, 14, 0));
        let found = client.search(&cal, &query).unwrap();
        assert_eq!(found.len(), 1);
        assert!(is_recurring(&found[0]));

        client.update_behaviour(|b| b.implicit_recurrences = false);
        assert!(client.search(&cal, &query).unwrap().is_empty());
    }

    #[test]
    fn expansion_applies_overrides() {
        let (mut client, cal) = setup(MockBehaviour::default());
        let query = SearchQuery::new()
            .component(ComponentType::Event)
            .time_range(utc(2000, 2, 13, 0, 0), utc(2000, 2, 14, 0, 0))
            .expand();
        let found = client.search(&cal, &query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].summary().as_deref(), Some(fixtures::EXCEPTION_SUMMARY));
        assert!(!is_recurring(&found[0]));
    }

    #[test]
    fn text_search_flags() {
        let (mut client, cal) = setup(MockBehaviour::default());
        let exact = SearchQuery::new().summary("CSC SIMPLE EVENT 1", true);
        assert!(client.search(&cal, &exact).unwrap().is_empty());

        client.update_behaviour(|b| b.case_sensitive = false);
        assert_eq!(client.search(&cal, &exact).unwrap().len(), 1);

        client.update_behaviour(|b| b.text_search = false);
        assert!(matches!(client.search(&cal, &exact), Err(DavError::Report { .. })));
    }

    #[test]
    fn sync_reports_changes_and_deletions() {
        let (mut client, cal) = setup(MockBehaviour::default());
        let initial = client.sync_objects(&cal, None).unwrap();
        assert_eq!(initial.changed.len(), 4);

        let unchanged = client.sync_objects(&cal, Some(&initial.token)).unwrap();
        assert!(unchanged.is_empty());

        let saved = client.save_object(&cal, &fixtures::sync_event(1)).unwrap();
        let after_save = client.sync_objects(&cal, Some(&initial.token)).unwrap();
        assert_eq!(after_save.changed.len(), 1);

        client.delete_object(&saved).unwrap();
        let after_delete = client.sync_objects(&cal, Some(&after_save.token)).unwrap();
        assert_eq!(after_delete.deleted, vec![saved.url]);

        assert!(matches!(
            client.sync_objects(&cal, Some("bogus")),
            Err(DavError::Report { .. })
        ));
    }

    #[test]
    fn open_ended_ranges_reach_to_the_edge() {
        let (mut client, cal) = setup(MockBehaviour::default());
        let until = SearchQuery::new()
            .component(ComponentType::Event)
            .until(utc(2000, 1, 2, 0, 0));
        let uids: Vec<_> = client
            .search(&cal, &until)
            .unwrap()
            .iter()
            .filter_map(CalendarObject::uid)
            .collect();
        assert!(uids.contains(&fixtures::SIMPLE_EVENT1.to_string()));

        client.update_behaviour(|b| b.open_ended_search = false);
        assert!(matches!(client.search(&cal, &until), Err(DavError::Report { .. })));
    }

    #[test]
    fn freebusy_lists_busy_periods() {
        let (mut client, cal) = setup(MockBehaviour::default());
        let answer = client
            .freebusy(&cal, utc(1999, 12, 30, 17, 0), utc(2000, 1, 1, 12, 30))
            .unwrap();
        assert!(answer.contains("BEGIN:VFREEBUSY"));
        assert!(answer.contains("FREEBUSY:"));

        client.update_behaviour(|b| b.freebusy = false);
        assert!(client
            .freebusy(&cal, utc(1999, 12, 30, 17, 0), utc(2000, 1, 1, 12, 30))
            .is_err());
    }

    #[test]
    fn kept_deletions_still_answer_ok() {
        let (mut client, cal) = setup(MockBehaviour {
            delete_object: false,
            ..Default::default()
        });
        let object = client.object_by_uid(&cal, fixtures::SIMPLE_EVENT1).unwrap();
        client.delete_object(&object).unwrap();
        assert!(client.object_by_uid(&cal, fixtures::SIMPLE_EVENT1).is_ok());
    }

    #[test]
    fn injected_failures_persist() {
        let mut client = MockDavClient::new();
        client.fail_on(
            "principal",
            DavError::Authorization {
                url: BASE_URL.into(),
            },
        );
        assert!(client.principal().is_err());
        assert!(client.principal().is_err());
        client.clear_failures();
        assert!(client.principal().is_ok());
    }

    #[test]
    fn unmixed_calendars_reject_tasks() {
        let mut client = MockDavClient::with_behaviour(MockBehaviour {
            mixed_calendar: false,
            ..Default::default()
        });
        let principal = client.principal().unwrap();
        let cal = client
            .make_calendar(&principal, &NewCalendar::new("events"))
            .unwrap();
        assert!(client.save_object(&cal, &fixtures::simple_task1()).is_err());

        let tasks = client
            .make_calendar(
                &principal,
                &NewCalendar::new("tasks").with_components(&[ComponentType::Todo]),
            )
            .unwrap();
        assert!(client.save_object(&tasks, &fixtures::simple_task1()).is_ok());
    }

    #[test]
    fn deleted_ids_stay_taken_without_free_namespace() {
        let mut client = MockDavClient::with_behaviour(MockBehaviour {
            free_namespace: false,
            ..Default::default()
        });
        let principal = client.principal().unwrap();
        let cal = client.make_calendar(&principal, &NewCalendar::new("x")).unwrap();
        client.delete_calendar(&cal).unwrap();
        assert!(client.make_calendar(&principal, &NewCalendar::new("x")).is_err());
    }
}
