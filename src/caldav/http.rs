//! Blocking HTTP adapter for the CalDAV collaborator.
//!
//! Speaks just enough WebDAV/CalDAV (PROPFIND, MKCALENDAR, PUT, DELETE and
//! three REPORT flavours) for the checks. Credentials are passed through as
//! HTTP basic auth.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::{Method, StatusCode, Url};
use tracing::{debug, trace};

use super::throttle::{RequestKind, Throttle};
use super::xml::{self, DavResponse, Multistatus};
use super::{
    CalendarLookup, CalendarObject, CalendarRef, DavClient, DavError, DavResult, NewCalendar,
    Principal, SearchQuery, SyncResult,
};
use crate::features::FeatureSet;

/// Connection settings for [`HttpDavClient`].
#[derive(Debug, Clone)]
pub struct DavClientConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Name used in the report.
    pub server_name: String,
    pub timeout: Duration,
}

impl DavClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            server_name: url.clone(),
            url,
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }
}

/// CalDAV client over blocking reqwest.
pub struct HttpDavClient {
    client: Client,
    config: DavClientConfig,
    base: Url,
    features: FeatureSet,
    throttle: Box<dyn Throttle>,
}

/// Body and headers of one request.
struct DavRequest<'a> {
    method: &'a str,
    url: &'a str,
    body: Option<String>,
    depth: Option<&'a str>,
    content_type: &'a str,
    kind: RequestKind,
}

impl<'a> DavRequest<'a> {
    fn xml(method: &'a str, url: &'a str, depth: &'a str, body: String, kind: RequestKind) -> Self {
        Self {
            method,
            url,
            body: Some(body),
            depth: Some(depth),
            content_type: "application/xml; charset=utf-8",
            kind,
        }
    }

    fn bare(method: &'a str, url: &'a str) -> Self {
        Self {
            method,
            url,
            body: None,
            depth: None,
            content_type: "application/xml; charset=utf-8",
            kind: RequestKind::Write,
        }
    }
}

impl HttpDavClient {
    /// Build a client for the configured server.
    pub fn new(config: DavClientConfig, features: FeatureSet, throttle: Box<dyn Throttle>) -> DavResult<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| DavError::Protocol(format!("invalid server URL {}: {}", config.url, e)))?;

        let client = Client::builder()
            .user_agent(concat!("caldav-server-tester/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| DavError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            base,
            features,
            throttle,
        })
    }

    /// Resolve an href from the server against the base URL.
    fn absolute(&self, href: &str) -> DavResult<String> {
        self.base
            .join(href)
            .map(|u| u.to_string())
            .map_err(|e| DavError::Protocol(format!("bad href {}: {}", href, e)))
    }

    fn child_url(parent: &str, segment: &str, collection: bool) -> String {
        let mut url = parent.to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        url.push_str(segment);
        if collection {
            url.push('/');
        }
        url
    }

    fn send(&self, request: DavRequest<'_>) -> DavResult<String> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| DavError::Protocol(format!("invalid HTTP method: {}", request.method)))?;

        self.throttle.before_request(request.kind);

        let mut builder = self.client.request(method, request.url);
        if let Some(depth) = request.depth {
            builder = builder.header("Depth", depth);
        }
        if let Some(body) = request.body {
            builder = builder
                .header("Content-Type", request.content_type)
                .body(body);
        }
        if let Some(username) = &self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_deref());
        }

        trace!(method = %request.method, url = %request.url, "Sending request");

        let response = builder
            .send()
            .map_err(|e| DavError::Network(format!("{} {} failed: {}", request.method, request.url, e)))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| DavError::Network(format!("failed to read response: {}", e)))?;

        trace!(status = %status, "Received response");

        if status.is_success() {
            return Ok(text);
        }

        Err(status_error(
            status,
            request.url,
            &text,
            request.method == "REPORT",
        ))
    }

    fn multistatus(&self, request: DavRequest<'_>) -> DavResult<Multistatus> {
        let text = self.send(request)?;
        xml::parse_multistatus(&text)
    }

    fn propfind(&self, url: &str, depth: &str, props: &[&str]) -> DavResult<Multistatus> {
        let body = xml::propfind_body(props)?;
        self.multistatus(DavRequest::xml("PROPFIND", url, depth, body, RequestKind::Read))
    }

    fn report(&self, url: &str, depth: &str, body: String) -> DavResult<Multistatus> {
        self.multistatus(DavRequest::xml("REPORT", url, depth, body, RequestKind::Search))
    }

    fn calendar_ref(&self, response: &DavResponse) -> DavResult<CalendarRef> {
        let url = self.absolute(&response.href)?;
        let id = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(CalendarRef {
            id,
            url,
            name: response.prop("displayname").map(str::to_string),
        })
    }

    fn objects_from(&self, multistatus: Multistatus) -> DavResult<Vec<CalendarObject>> {
        multistatus
            .responses
            .into_iter()
            .filter_map(|r| {
                let data = r.props.get("calendar-data")?.clone();
                Some(self.absolute(&r.href).map(|url| CalendarObject::new(url, data)))
            })
            .collect()
    }

    fn principal_from(&self, response: &DavResponse) -> DavResult<Principal> {
        let url = self.absolute(&response.href)?;
        let calendar_home = match response.prop("calendar-home-set") {
            Some(home) => self.absolute(home)?,
            None => url.clone(),
        };
        Ok(Principal {
            url,
            display_name: response.prop("displayname").map(str::to_string),
            calendar_home,
        })
    }
}

/// Map a non-success status to the matching error.
fn status_error(status: StatusCode, url: &str, body: &str, is_report: bool) -> DavError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DavError::Authorization {
            url: url.to_string(),
        },
        StatusCode::NOT_FOUND => DavError::NotFound {
            url: url.to_string(),
        },
        s if is_report => DavError::Report {
            message: format!("{} {}", s, snippet(body)),
        },
        s => DavError::Status {
            status: s.as_u16(),
            message: snippet(body),
        },
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect::<String>().trim().to_string()
}

impl DavClient for HttpDavClient {
    fn server_name(&self) -> &str {
        &self.config.server_name
    }

    fn url(&self) -> &str {
        &self.config.url
    }

    fn features(&self) -> &FeatureSet {
        &self.features
    }

    fn replace_features(&mut self, features: FeatureSet) -> FeatureSet {
        std::mem::replace(&mut self.features, features)
    }

    fn principal(&mut self) -> DavResult<Principal> {
        let base = self.base.to_string();
        let found = self.propfind(&base, "0", &["d:current-user-principal"])?;
        let href = found
            .responses
            .iter()
            .find_map(|r| r.prop("current-user-principal"))
            .ok_or_else(|| DavError::Protocol("server did not report current-user-principal".into()))?
            .to_string();
        let url = self.absolute(&href)?;
        debug!(principal = %url, "Found principal");

        let details = self.propfind(&url, "0", &["d:displayname", "c:calendar-home-set"])?;
        match details.responses.first() {
            Some(response) => {
                let mut principal = self.principal_from(response)?;
                principal.url = url;
                Ok(principal)
            }
            None => Ok(Principal {
                calendar_home: url.clone(),
                url,
                display_name: None,
            }),
        }
    }

    fn calendars(&mut self, principal: &Principal) -> DavResult<Vec<CalendarRef>> {
        let found = self.propfind(
            &principal.calendar_home,
            "1",
            &["d:displayname", "d:resourcetype"],
        )?;
        found
            .responses
            .iter()
            .filter(|r| r.is_calendar())
            .map(|r| self.calendar_ref(r))
            .collect()
    }

    fn calendar(&mut self, principal: &Principal, lookup: CalendarLookup<'_>) -> DavResult<CalendarRef> {
        match lookup {
            CalendarLookup::Id(id) => {
                let url = Self::child_url(&principal.calendar_home, id, true);
                let found = self.propfind(&url, "0", &["d:displayname", "d:resourcetype"])?;
                let response = found
                    .responses
                    .iter()
                    .find(|r| r.is_calendar())
                    .ok_or_else(|| DavError::NotFound { url: url.clone() })?;
                let mut calendar = self.calendar_ref(response)?;
                calendar.id = id.to_string();
                Ok(calendar)
            }
            CalendarLookup::Name(name) => self
                .calendars(principal)?
                .into_iter()
                .find(|c| c.name.as_deref() == Some(name))
                .ok_or_else(|| DavError::NotFound {
                    url: format!("{}#{}", principal.calendar_home, name),
                }),
        }
    }

    fn make_calendar(&mut self, principal: &Principal, new: &NewCalendar) -> DavResult<CalendarRef> {
        let url = Self::child_url(&principal.calendar_home, &new.id, true);
        let body = xml::mkcalendar_body(new)?;
        self.send(DavRequest::xml("MKCALENDAR", &url, "0", body, RequestKind::Write))?;
        Ok(CalendarRef {
            id: new.id.clone(),
            url,
            name: new.name.clone(),
        })
    }

    fn delete_calendar(&mut self, calendar: &CalendarRef) -> DavResult<()> {
        self.send(DavRequest::bare("DELETE", &calendar.url)).map(|_| ())
    }

    fn objects(&mut self, calendar: &CalendarRef) -> DavResult<Vec<CalendarObject>> {
        let body = xml::calendar_query_body(&SearchQuery::new())?;
        let found = self.report(&calendar.url, "1", body)?;
        self.objects_from(found)
    }

    fn save_object(&mut self, calendar: &CalendarRef, ical: &str) -> DavResult<CalendarObject> {
        let uid = CalendarObject::new("", ical)
            .uid()
            .ok_or_else(|| DavError::Protocol("calendar data has no UID".into()))?;
        let url = Self::child_url(&calendar.url, &format!("{}.ics", uid), false);
        self.send(DavRequest {
            method: "PUT",
            url: &url,
            body: Some(ical.to_string()),
            depth: None,
            content_type: "text/calendar; charset=utf-8",
            kind: RequestKind::Write,
        })?;
        Ok(CalendarObject::new(url, ical))
    }

    fn object_by_uid(&mut self, calendar: &CalendarRef, uid: &str) -> DavResult<CalendarObject> {
        let body = xml::uid_query_body(uid)?;
        let found = self.report(&calendar.url, "1", body)?;
        self.objects_from(found)?
            .into_iter()
            .next()
            .ok_or_else(|| DavError::NotFound {
                url: Self::child_url(&calendar.url, uid, false),
            })
    }

    fn delete_object(&mut self, object: &CalendarObject) -> DavResult<()> {
        self.send(DavRequest::bare("DELETE", &object.url)).map(|_| ())
    }

    fn search(&mut self, calendar: &CalendarRef, query: &SearchQuery) -> DavResult<Vec<CalendarObject>> {
        let body = xml::calendar_query_body(query)?;
        let found = self.report(&calendar.url, "1", body)?;
        self.objects_from(found)
    }

    fn sync_objects(&mut self, calendar: &CalendarRef, token: Option<&str>) -> DavResult<SyncResult> {
        let body = xml::sync_collection_body(token)?;
        let found = self.report(&calendar.url, "1", body)?;

        let mut result = SyncResult {
            token: found.sync_token.clone().unwrap_or_default(),
            ..Default::default()
        };
        for response in &found.responses {
            let url = self.absolute(&response.href)?;
            if url.trim_end_matches('/') == calendar.url.trim_end_matches('/') {
                continue;
            }
            if response.status == Some(404) {
                result.deleted.push(url);
            } else {
                let data = response.prop("calendar-data").unwrap_or_default();
                result.changed.push(CalendarObject::new(url, data));
            }
        }
        Ok(result)
    }

    fn freebusy(&mut self, calendar: &CalendarRef, start: DateTime<Utc>, end: DateTime<Utc>) -> DavResult<String> {
        let body = xml::freebusy_query_body(start, end)?;
        self.send(DavRequest::xml("REPORT", &calendar.url, "1", body, RequestKind::Search))
    }

    fn principal_search(&mut self, name: Option<&str>) -> DavResult<Vec<Principal>> {
        let body = xml::principal_search_body(name)?;
        let base = self.base.to_string();
        let found = self.report(&base, "0", body)?;
        found
            .responses
            .iter()
            .map(|r| self.principal_from(r))
            .collect()
    }
}
