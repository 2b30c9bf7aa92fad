//! WebDAV request bodies and multistatus parsing.

use std::collections::HashMap;
use std::io::Cursor;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::{DavError, DavResult, NewCalendar, SearchQuery};

/// DAV namespace
pub const DAV_NS: &str = "DAV:";
/// CalDAV namespace
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";

/// Incremental XML body writer.
struct Body {
    writer: Writer<Cursor<Vec<u8>>>,
}

fn write_err(e: impl std::fmt::Display) -> DavError {
    DavError::Protocol(format!("failed to write request body: {}", e))
}

impl Body {
    fn new() -> Self {
        Self {
            writer: Writer::new(Cursor::new(Vec::new())),
        }
    }

    /// Root element carrying both namespace declarations.
    fn root(&mut self, name: &str) -> DavResult<()> {
        let mut start = BytesStart::new(name);
        start.push_attribute(("xmlns:d", DAV_NS));
        start.push_attribute(("xmlns:c", CALDAV_NS));
        self.writer.write_event(Event::Start(start)).map_err(write_err)
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> DavResult<()> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.writer.write_event(Event::Start(start)).map_err(write_err)
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> DavResult<()> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.writer.write_event(Event::Empty(start)).map_err(write_err)
    }

    fn end(&mut self, name: &str) -> DavResult<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(write_err)
    }

    fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> DavResult<()> {
        self.start(name, attrs)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(write_err)?;
        self.end(name)
    }

    fn finish(self) -> DavResult<String> {
        String::from_utf8(self.writer.into_inner().into_inner()).map_err(write_err)
    }
}

/// PROPFIND body asking for the given DAV/CalDAV properties.
///
/// Property names carry their prefix, `d:` or `c:`.
pub fn propfind_body(props: &[&str]) -> DavResult<String> {
    let mut body = Body::new();
    body.root("d:propfind")?;
    body.start("d:prop", &[])?;
    for prop in props {
        body.empty(prop, &[])?;
    }
    body.end("d:prop")?;
    body.end("d:propfind")?;
    body.finish()
}

/// MKCALENDAR body setting the display name and component set.
pub fn mkcalendar_body(new: &NewCalendar) -> DavResult<String> {
    let mut body = Body::new();
    body.root("c:mkcalendar")?;
    body.start("d:set", &[])?;
    body.start("d:prop", &[])?;
    if let Some(name) = &new.name {
        body.text_element("d:displayname", &[], name)?;
    }
    if !new.components.is_empty() {
        body.start("c:supported-calendar-component-set", &[])?;
        for component in &new.components {
            body.empty("c:comp", &[("name", component.as_str())])?;
        }
        body.end("c:supported-calendar-component-set")?;
    }
    body.end("d:prop")?;
    body.end("d:set")?;
    body.end("c:mkcalendar")?;
    body.finish()
}

/// calendar-query REPORT body for a search.
///
/// Without a component type the property filters go straight under the
/// VCALENDAR filter, which not every server accepts.
pub fn calendar_query_body(query: &SearchQuery) -> DavResult<String> {
    let mut body = Body::new();
    body.root("c:calendar-query")?;

    body.start("d:prop", &[])?;
    body.empty("d:getetag", &[])?;
    match (query.expand, query.start, query.end) {
        (true, Some(start), Some(end)) => {
            body.start("c:calendar-data", &[])?;
            body.empty(
                "c:expand",
                &[
                    ("start", format_icalendar_datetime(start).as_str()),
                    ("end", format_icalendar_datetime(end).as_str()),
                ],
            )?;
            body.end("c:calendar-data")?;
        }
        _ => body.empty("c:calendar-data", &[])?,
    }
    body.end("d:prop")?;

    body.start("c:filter", &[])?;
    body.start("c:comp-filter", &[("name", "VCALENDAR")])?;
    if let Some(component) = query.component {
        body.start("c:comp-filter", &[("name", component.as_str())])?;
    }

    if query.start.is_some() || query.end.is_some() {
        let start = query.start.map(format_icalendar_datetime);
        let end = query.end.map(format_icalendar_datetime);
        let mut attrs = Vec::new();
        if let Some(start) = start.as_deref() {
            attrs.push(("start", start));
        }
        if let Some(end) = end.as_deref() {
            attrs.push(("end", end));
        }
        body.empty("c:time-range", &attrs)?;
    }

    if let Some(summary) = &query.summary {
        let collation = if summary.case_sensitive {
            "i;octet"
        } else {
            "i;ascii-casemap"
        };
        body.start("c:prop-filter", &[("name", "SUMMARY")])?;
        body.text_element("c:text-match", &[("collation", collation)], &summary.value)?;
        body.end("c:prop-filter")?;
    }

    if let Some(category) = &query.category {
        body.start("c:prop-filter", &[("name", "CATEGORIES")])?;
        body.text_element("c:text-match", &[], category)?;
        body.end("c:prop-filter")?;
    }

    if query.component.is_some() {
        body.end("c:comp-filter")?;
    }
    body.end("c:comp-filter")?;
    body.end("c:filter")?;
    body.end("c:calendar-query")?;
    body.finish()
}

/// calendar-query REPORT body matching one UID.
pub fn uid_query_body(uid: &str) -> DavResult<String> {
    let mut body = Body::new();
    body.root("c:calendar-query")?;
    body.start("d:prop", &[])?;
    body.empty("d:getetag", &[])?;
    body.empty("c:calendar-data", &[])?;
    body.end("d:prop")?;
    body.start("c:filter", &[])?;
    body.start("c:comp-filter", &[("name", "VCALENDAR")])?;
    body.start("c:prop-filter", &[("name", "UID")])?;
    body.text_element("c:text-match", &[("collation", "i;octet")], uid)?;
    body.end("c:prop-filter")?;
    body.end("c:comp-filter")?;
    body.end("c:filter")?;
    body.end("c:calendar-query")?;
    body.finish()
}

/// free-busy-query REPORT body (RFC4791 section 7.10).
pub fn freebusy_query_body(start: DateTime<Utc>, end: DateTime<Utc>) -> DavResult<String> {
    let mut body = Body::new();
    body.root("c:free-busy-query")?;
    body.empty(
        "c:time-range",
        &[
            ("start", format_icalendar_datetime(start).as_str()),
            ("end", format_icalendar_datetime(end).as_str()),
        ],
    )?;
    body.end("c:free-busy-query")?;
    body.finish()
}

/// sync-collection REPORT body (RFC6578).
pub fn sync_collection_body(token: Option<&str>) -> DavResult<String> {
    let mut body = Body::new();
    body.root("d:sync-collection")?;
    match token {
        Some(token) => body.text_element("d:sync-token", &[], token)?,
        None => body.empty("d:sync-token", &[])?,
    }
    body.text_element("d:sync-level", &[], "1")?;
    body.start("d:prop", &[])?;
    body.empty("d:getetag", &[])?;
    body.empty("c:calendar-data", &[])?;
    body.end("d:prop")?;
    body.end("d:sync-collection")?;
    body.finish()
}

/// principal-property-search REPORT body (RFC3744) on the display name.
pub fn principal_search_body(name: Option<&str>) -> DavResult<String> {
    let mut body = Body::new();
    body.root("d:principal-property-search")?;
    body.start("d:property-search", &[])?;
    body.start("d:prop", &[])?;
    body.empty("d:displayname", &[])?;
    body.end("d:prop")?;
    body.text_element("d:match", &[], name.unwrap_or(""))?;
    body.end("d:property-search")?;
    body.start("d:prop", &[])?;
    body.empty("d:displayname", &[])?;
    body.empty("c:calendar-home-set", &[])?;
    body.end("d:prop")?;
    body.end("d:principal-property-search")?;
    body.finish()
}

/// One `<response>` of a multistatus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DavResponse {
    pub href: String,
    /// Status given directly on the response (sync-collection deletions).
    pub status: Option<u16>,
    /// Text of properties found with a 2xx propstat, by local name.
    ///
    /// Properties holding an `<href>` (like `current-user-principal`)
    /// map to that href.
    pub props: HashMap<String, String>,
    /// Local names found inside `<resourcetype>`.
    pub resource_types: Vec<String>,
}

impl DavResponse {
    pub fn prop(&self, name: &str) -> Option<&str> {
        self.props.get(name).map(String::as_str)
    }

    pub fn is_calendar(&self) -> bool {
        self.resource_types.iter().any(|t| t == "calendar")
    }
}

/// A parsed multistatus document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Multistatus {
    pub responses: Vec<DavResponse>,
    /// Top-level `<sync-token>`, present in sync-collection answers.
    pub sync_token: Option<String>,
}

/// Parse a 207 multistatus body.
pub fn parse_multistatus(xml: &str) -> DavResult<Multistatus> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut result = Multistatus::default();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<DavResponse> = None;
    let mut propstat_props: HashMap<String, String> = HashMap::new();
    let mut propstat_types: Vec<String> = Vec::new();
    let mut propstat_status: Option<u16> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| DavError::Protocol(format!("malformed multistatus: {}", e)))?;

        match event {
            Event::Start(e) => {
                let local = local_name(e.name().as_ref());
                match local.as_str() {
                    "response" => current = Some(DavResponse::default()),
                    "propstat" => {
                        propstat_props.clear();
                        propstat_types.clear();
                        propstat_status = None;
                    }
                    _ => {}
                }
                if stack.last().map(String::as_str) == Some("resourcetype") {
                    propstat_types.push(local.clone());
                }
                stack.push(local);
            }
            Event::Empty(e) => {
                let local = local_name(e.name().as_ref());
                if stack.last().map(String::as_str) == Some("resourcetype") {
                    propstat_types.push(local);
                }
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|e| DavError::Protocol(e.to_string()))?
                    .to_string();
                handle_text(
                    &stack,
                    text,
                    &mut current,
                    &mut propstat_props,
                    &mut propstat_status,
                    &mut result.sync_token,
                );
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).to_string();
                handle_text(
                    &stack,
                    text,
                    &mut current,
                    &mut propstat_props,
                    &mut propstat_status,
                    &mut result.sync_token,
                );
            }
            Event::End(e) => {
                let local = local_name(e.name().as_ref());
                match local.as_str() {
                    "propstat" => {
                        if let Some(response) = current.as_mut() {
                            if propstat_status.is_none_or(|s| (200..300).contains(&s)) {
                                response.props.extend(propstat_props.drain());
                                response.resource_types.append(&mut propstat_types);
                            }
                        }
                    }
                    "response" => {
                        if let Some(response) = current.take() {
                            result.responses.push(response);
                        }
                    }
                    _ => {}
                }
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(result)
}

fn handle_text(
    stack: &[String],
    text: String,
    current: &mut Option<DavResponse>,
    propstat_props: &mut HashMap<String, String>,
    propstat_status: &mut Option<u16>,
    sync_token: &mut Option<String>,
) {
    let depth = stack.len();
    let Some(element) = stack.last().map(String::as_str) else {
        return;
    };
    let parent = if depth >= 2 {
        stack[depth - 2].as_str()
    } else {
        ""
    };

    match (element, parent) {
        ("sync-token", "multistatus") => *sync_token = Some(text),
        ("href", "response") => {
            if let Some(response) = current.as_mut() {
                response.href = text;
            }
        }
        ("status", "response") => {
            if let Some(response) = current.as_mut() {
                response.status = parse_status_line(&text);
            }
        }
        ("status", "propstat") => *propstat_status = parse_status_line(&text),
        ("href", prop) if stack.iter().any(|s| s == "prop") => {
            propstat_props.entry(prop.to_string()).or_insert(text);
        }
        (prop, _) if stack.iter().any(|s| s == "prop") => {
            propstat_props.insert(prop.to_string(), text);
        }
        _ => {}
    }
}

/// Status code out of `HTTP/1.1 404 Not Found`.
pub fn parse_status_line(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Extracts the local name from a potentially namespaced element name.
fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

/// Formats a datetime for iCalendar time-range filters (UTC format).
pub fn format_icalendar_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}
