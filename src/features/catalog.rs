//! Static feature catalog.
//!
//! Every feature path a check may record or a profile may mention has an
//! entry here. The entry's [`FeatureType`] decides whether a difference
//! between the expected and observed support is worth flagging, and its
//! default answers queries for paths nobody recorded.

use serde::Serialize;

use super::support::Support;

/// What kind of behaviour a feature describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureType {
    /// A capability the server may or may not implement.
    ServerFeature,
    /// Server behaviour outside (or against) the RFCs.
    ServerPeculiarity,
    /// Something the client has to do differently; cannot be checked directly.
    ClientFeature,
    /// Settings for the test harness itself.
    TestsBehaviour,
}

impl FeatureType {
    /// Whether a check can observe this feature on the wire.
    pub fn is_machine_checkable(&self) -> bool {
        matches!(self, FeatureType::ServerFeature | FeatureType::ServerPeculiarity)
    }
}

/// Catalog entry for one feature path.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeatureInfo {
    /// Dotted path.
    pub path: &'static str,
    /// Kind of feature.
    #[serde(rename = "type")]
    pub kind: FeatureType,
    /// Support assumed when nothing was recorded.
    pub default: Support,
    /// Human-readable description.
    pub description: &'static str,
}

const fn server(path: &'static str, description: &'static str) -> FeatureInfo {
    FeatureInfo {
        path,
        kind: FeatureType::ServerFeature,
        default: Support::Full,
        description,
    }
}

const fn peculiarity(path: &'static str, description: &'static str) -> FeatureInfo {
    FeatureInfo {
        path,
        kind: FeatureType::ServerPeculiarity,
        default: Support::Unsupported,
        description,
    }
}

static FEATURES: &[FeatureInfo] = &[
    server(
        "get-current-user-principal",
        "Server answers the current-user-principal property (RFC5397)",
    ),
    server(
        "get-current-user-principal.has-calendar",
        "The principal owns at least one readable calendar out of the box",
    ),
    server("create-calendar", "MKCALENDAR creates a new calendar"),
    peculiarity(
        "create-calendar.auto",
        "Accessing a calendar that does not exist silently creates it",
    ),
    server(
        "create-calendar.set-displayname",
        "A display name given at creation time can be used to look the calendar up",
    ),
    server("delete-calendar", "DELETE removes a calendar"),
    server(
        "delete-calendar.free-namespace",
        "The id of a deleted calendar can be reused immediately",
    ),
    server("save-load", "Calendar objects can be stored and fetched back"),
    server("save-load.event", "Events can be stored and fetched back"),
    server(
        "save-load.event.recurrences",
        "Recurring events, including overridden instances, survive a round trip",
    ),
    server("save-load.todo", "Tasks can be stored and fetched back"),
    server(
        "save-load.todo.mixed-calendar",
        "Tasks and events can live in the same calendar",
    ),
    server("delete-object", "DELETE removes a calendar object"),
    server("search", "calendar-query REPORT (RFC4791 section 7.8)"),
    server("search.time-range", "Time-range filters"),
    server("search.time-range.event", "Time-range search finds events"),
    server("search.time-range.todo", "Time-range search finds tasks"),
    server(
        "search.time-range.open-ended",
        "A time range with only an end (or only a start) is accepted",
    ),
    server("search.text", "Text-match filters on properties"),
    server(
        "search.text.case-sensitive",
        "Text matching honours the case-sensitive collation",
    ),
    server(
        "search.text.substring",
        "Text matching finds substrings, not only exact values",
    ),
    server("search.category", "Text-match filters on CATEGORIES"),
    server(
        "search.combined-is-logical-and",
        "Several filters in one query are combined with logical AND",
    ),
    server(
        "search.comp-type-optional",
        "A query without a component filter returns every component type",
    ),
    server("search.recurrences", "Searches that involve recurring objects"),
    server(
        "search.recurrences.includes-implicit",
        "Time-range search matches recurrences that are not stored explicitly",
    ),
    server(
        "search.recurrences.includes-implicit.event",
        "Time-range search matches implicit event recurrences",
    ),
    server(
        "search.recurrences.includes-implicit.todo",
        "Time-range search matches implicit task recurrences",
    ),
    server(
        "search.recurrences.expanded",
        "Server-side expansion of recurrences (the expand element)",
    ),
    server(
        "search.recurrences.expanded.event",
        "Server-side expansion of recurring events",
    ),
    server(
        "search.recurrences.expanded.todo",
        "Server-side expansion of recurring tasks",
    ),
    server(
        "search.recurrences.expanded.exception",
        "Server-side expansion applies overridden instances",
    ),
    server("freebusy-query", "free-busy-query REPORT (RFC4791 section 7.10)"),
    server("sync-token", "sync-collection REPORT (RFC6578)"),
    server(
        "sync-token.delete",
        "sync-collection reports deleted objects",
    ),
    server("principal-search", "principal-property-search REPORT (RFC3744)"),
    server(
        "principal-search.by-name",
        "Principals can be searched by display name",
    ),
    server(
        "principal-search.list-all",
        "A principal search without filter lists principals",
    ),
    FeatureInfo {
        path: "rate-limit",
        kind: FeatureType::ClientFeature,
        default: Support::Unsupported,
        description: "The client should pause between requests",
    },
    FeatureInfo {
        path: "test-calendar",
        kind: FeatureType::TestsBehaviour,
        default: Support::Full,
        description: "How test suites should treat calendars on this server",
    },
    FeatureInfo {
        path: "test-calendar.compatibility-tests",
        kind: FeatureType::TestsBehaviour,
        default: Support::Full,
        description: "Calendar policy for this tool; the cleanup key decides whether test data is removed",
    },
];

/// All catalog entries.
pub fn all() -> &'static [FeatureInfo] {
    FEATURES
}

/// Look up a feature path.
pub fn lookup(path: &str) -> Option<&'static FeatureInfo> {
    FEATURES.iter().find(|f| f.path == path)
}

/// Whether the catalog knows this path.
pub fn contains(path: &str) -> bool {
    lookup(path).is_some()
}

/// Ancestor prefixes of a dotted path, nearest first.
///
/// `"a.b.c"` yields `"a.b"` then `"a"`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut rest = path;
    std::iter::from_fn(move || {
        let idx = rest.rfind('.')?;
        rest = &rest[..idx];
        Some(rest)
    })
}

/// Whether `ancestor` is a strict dotted prefix of `path`.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'.'
}
