//! HTTP client tests against a local mock server.

use caldav_server_tester::caldav::{
    CalendarRef, DavClient, DavClientConfig, DavError, HttpDavClient, NoDelay, SearchQuery,
};
use caldav_server_tester::FeatureSet;
use chrono::{TimeZone, Utc};
use httpmock::prelude::*;

fn client(server: &MockServer) -> HttpDavClient {
    let config = DavClientConfig::new(server.url("/")).with_credentials("alice", "secret");
    HttpDavClient::new(config, FeatureSet::new(), Box::new(NoDelay)).unwrap()
}

fn calendar(server: &MockServer) -> CalendarRef {
    CalendarRef {
        id: "work".into(),
        url: server.url("/calendars/alice/work/"),
        name: Some("Work".into()),
    }
}

const PRINCIPAL_HREF: &str = r#"<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/</d:href>
    <d:propstat>
      <d:prop>
        <d:current-user-principal><d:href>/principals/alice/</d:href></d:current-user-principal>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

const PRINCIPAL_DETAILS: &str = r#"<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/principals/alice/</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>Alice</d:displayname>
        <c:calendar-home-set><d:href>/calendars/alice/</d:href></c:calendar-home-set>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

#[test]
fn discovers_principal_with_basic_auth() {
    let server = MockServer::start();
    let root = server.mock(|when, then| {
        when.path("/")
            .header("Depth", "0")
            .header("Authorization", "Basic YWxpY2U6c2VjcmV0");
        then.status(207).body(PRINCIPAL_HREF);
    });
    let details = server.mock(|when, then| {
        when.path("/principals/alice/").header("Depth", "0");
        then.status(207).body(PRINCIPAL_DETAILS);
    });

    let principal = client(&server).principal().unwrap();

    root.assert();
    details.assert();
    assert_eq!(principal.url, server.url("/principals/alice/"));
    assert_eq!(principal.display_name.as_deref(), Some("Alice"));
    assert_eq!(principal.calendar_home, server.url("/calendars/alice/"));
}

#[test]
fn unauthorized_is_an_authorization_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/");
        then.status(401);
    });

    let err = client(&server).principal().unwrap_err();
    assert!(matches!(err, DavError::Authorization { .. }));
}

#[test]
fn rejected_report_is_a_report_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/calendars/alice/work/").header("Depth", "1");
        then.status(400).body("unsupported filter");
    });

    let err = client(&server)
        .search(&calendar(&server), &SearchQuery::new().category("TESTING"))
        .unwrap_err();
    match err {
        DavError::Report { message } => assert!(message.contains("unsupported filter")),
        other => panic!("expected a report error, got {:?}", other),
    }
}

#[test]
fn sync_collection_splits_changes_and_deletions() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/calendars/alice/work/");
        then.status(207).body(
            r#"<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/calendars/alice/work/</d:href>
    <d:propstat><d:prop><d:getetag>"0"</d:getetag></d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat>
  </d:response>
  <d:response>
    <d:href>/calendars/alice/work/a.ics</d:href>
    <d:propstat>
      <d:prop><c:calendar-data>BEGIN:VCALENDAR</c:calendar-data></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/calendars/alice/work/b.ics</d:href>
    <d:status>HTTP/1.1 404 Not Found</d:status>
  </d:response>
  <d:sync-token>tok-7</d:sync-token>
</d:multistatus>"#,
        );
    });

    let result = client(&server)
        .sync_objects(&calendar(&server), Some("tok-6"))
        .unwrap();
    assert_eq!(result.token, "tok-7");
    assert_eq!(result.changed.len(), 1);
    assert_eq!(result.changed[0].url, server.url("/calendars/alice/work/a.ics"));
    assert_eq!(result.deleted, vec![server.url("/calendars/alice/work/b.ics")]);
}

#[test]
fn saved_objects_are_named_after_their_uid() {
    let server = MockServer::start();
    let put = server.mock(|when, then| {
        when.path("/calendars/alice/work/event-1.ics")
            .header("Content-Type", "text/calendar; charset=utf-8");
        then.status(201);
    });

    let ical = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:event-1\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
    let saved = client(&server).save_object(&calendar(&server), ical).unwrap();

    put.assert();
    assert_eq!(saved.url, server.url("/calendars/alice/work/event-1.ics"));
    assert_eq!(saved.uid().as_deref(), Some("event-1"));
}

#[test]
fn freebusy_returns_the_calendar_text() {
    let server = MockServer::start();
    let report = server.mock(|when, then| {
        when.path("/calendars/alice/work/")
            .header("Depth", "1")
            .body_includes("free-busy-query")
            .body_includes(r#"start="19991230T170000Z""#);
        then.status(200)
            .header("Content-Type", "text/calendar")
            .body("BEGIN:VCALENDAR\r\nBEGIN:VFREEBUSY\r\nEND:VFREEBUSY\r\nEND:VCALENDAR\r\n");
    });

    let start = Utc.with_ymd_and_hms(1999, 12, 30, 17, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2000, 1, 1, 12, 30, 0).unwrap();
    let answer = client(&server).freebusy(&calendar(&server), start, end).unwrap();

    report.assert();
    assert!(answer.contains("BEGIN:VFREEBUSY"));
}
