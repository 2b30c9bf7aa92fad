//! RFC 6578 sync-collection behaviour.

use tracing::debug;

use super::base::{server_refusal, Check, CheckContext};
use crate::caldav::fixtures;
use crate::caldav::{CalendarObject, CalendarRef, SyncResult};
use crate::error::Result;
use crate::features::{Support, SupportDescriptor};

/// Tracks a sync token across rounds and remembers anomalies.
struct SyncSession {
    calendar: CalendarRef,
    token: String,
    /// The server reported something that did not happen, or missed something that did.
    fragile: bool,
    /// Changes only show up after a delay.
    time_based: bool,
}

impl SyncSession {
    /// Next round from the current token; `None` when the server rejects it.
    fn round(&mut self, ctx: &mut CheckContext<'_>) -> Result<Option<SyncResult>> {
        match ctx.client().sync_objects(&self.calendar, Some(&self.token)) {
            Ok(result) => {
                debug!(
                    changed = result.changed.len(),
                    deleted = result.deleted.len(),
                    "Sync round"
                );
                if !result.token.is_empty() {
                    self.token = result.token.clone();
                }
                Ok(Some(result))
            }
            Err(e) => {
                let e = server_refusal(e)?;
                debug!(error = %e, "Sync round rejected");
                self.fragile = true;
                Ok(None)
            }
        }
    }

    /// A round that must report something, retried once after settling.
    fn expect_changes(&mut self, ctx: &mut CheckContext<'_>) -> Result<Option<SyncResult>> {
        match self.round(ctx)? {
            Some(result) if !result.is_empty() => Ok(Some(result)),
            _ => {
                ctx.settle();
                Ok(self.round(ctx)?.filter(|r| !r.is_empty()))
            }
        }
    }
}

/// Whether a reported href names the given object.
fn same_resource(href: &str, object: &CalendarObject) -> bool {
    fn last_segment(url: &str) -> Option<&str> {
        url.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
    }
    href == object.url || last_segment(&object.url).is_some_and(|segment| last_segment(href) == Some(segment))
}

/// Incremental sync: reported changes, reported deletions.
pub struct CheckSyncToken;

impl CheckSyncToken {
    fn remove_leftover(ctx: &mut CheckContext<'_>, calendar: &CalendarRef) -> Result<()> {
        if let Ok(object) = ctx.client().object_by_uid(calendar, fixtures::SYNC_EVENT) {
            if let Err(e) = ctx.client().delete_object(&object) {
                server_refusal(e)?;
            }
        }
        Ok(())
    }

    fn check_deletion(ctx: &mut CheckContext<'_>, session: &mut SyncSession, object: &CalendarObject) -> Result<()> {
        if session.time_based {
            ctx.settle();
        }
        if let Err(e) = ctx.client().delete_object(object) {
            let e = server_refusal(e)?;
            debug!(error = %e, "Could not delete sync test object");
            return ctx.set_feature("sync-token.delete", None::<bool>);
        }

        let reported = session
            .expect_changes(ctx)?
            .is_some_and(|r| r.deleted.iter().any(|href| same_resource(href, object)));
        let verdict = if reported {
            SupportDescriptor::new(Support::Full)
        } else {
            SupportDescriptor::new(Support::Unsupported).with_behaviour("deleted objects are not reported")
        };
        ctx.set_feature("sync-token.delete", verdict)
    }
}

impl Check for CheckSyncToken {
    fn name(&self) -> &'static str {
        "sync-token"
    }

    fn features_to_be_checked(&self) -> &'static [&'static str] {
        &["sync-token", "sync-token.delete"]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["prepare-calendar"]
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Result<()> {
        let Ok(calendar) = ctx.calendar() else {
            return ctx.set_features(self.features_to_be_checked(), None::<bool>);
        };
        Self::remove_leftover(ctx, &calendar)?;

        let initial = match ctx.client().sync_objects(&calendar, None) {
            Ok(result) if !result.token.is_empty() => result,
            Ok(_) => return ctx.set_feature("sync-token", false),
            Err(e) => {
                let e = server_refusal(e)?;
                debug!(error = %e, "sync-collection rejected");
                return ctx.set_feature(
                    "sync-token",
                    SupportDescriptor::new(Support::Unsupported).with_description(e.to_string()),
                );
            }
        };

        let mut session = SyncSession {
            calendar: calendar.clone(),
            token: initial.token,
            fragile: false,
            time_based: false,
        };

        // Nothing changed, so nothing may be reported.
        if session.round(ctx)?.is_some_and(|r| !r.is_empty()) {
            session.fragile = true;
        }

        let object = match ctx.client().save_object(&calendar, &fixtures::sync_event(1)) {
            Ok(object) => object,
            Err(e) => {
                let e = server_refusal(e)?;
                debug!(error = %e, "Could not store sync test object");
                return ctx.set_features(&["sync-token", "sync-token.delete"], None::<bool>);
            }
        };

        match session.round(ctx)? {
            Some(result) if !result.is_empty() => {}
            _ => {
                ctx.settle();
                match session.round(ctx)? {
                    Some(result) if !result.is_empty() => session.time_based = true,
                    _ => {
                        Self::check_deletion(ctx, &mut session, &object)?;
                        return ctx.set_feature(
                            "sync-token",
                            SupportDescriptor::new(Support::Unsupported).with_behaviour("changes are not reported"),
                        );
                    }
                }
            }
        }

        if session.time_based {
            let modified = match ctx.client().save_object(&calendar, &fixtures::sync_event(2)) {
                Ok(modified) => Some(modified),
                Err(e) => {
                    server_refusal(e)?;
                    None
                }
            };
            if modified.is_some() {
                ctx.settle();
                if session.round(ctx)?.map_or(true, |r| r.changed.is_empty()) {
                    session.fragile = true;
                }
            }
        }

        Self::check_deletion(ctx, &mut session, &object)?;

        let verdict = if session.fragile {
            SupportDescriptor::new(Support::Fragile)
        } else if session.time_based {
            SupportDescriptor::new(Support::Fragile).with_behaviour("time-based")
        } else {
            SupportDescriptor::new(Support::Full)
        };
        ctx.set_feature("sync-token", verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hrefs_match_by_last_segment() {
        let object = CalendarObject::new("https://dav.example/cal/csc_sync_test_event.ics", "");
        assert!(same_resource("/cal/csc_sync_test_event.ics", &object));
        assert!(same_resource(&object.url, &object));
        assert!(!same_resource("/cal/other.ics", &object));
    }

    #[test]
    fn longer_names_with_the_same_suffix_do_not_match() {
        let object = CalendarObject::new("https://dav.example/cal/csc_sync_test_event.ics", "");
        assert!(!same_resource("/cal/xcsc_sync_test_event.ics", &object));
        assert!(!same_resource("/csc_sync_test_event.ics.bak", &object));
        assert!(same_resource("/elsewhere/csc_sync_test_event.ics/", &object));
    }
}
