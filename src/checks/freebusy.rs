//! free-busy-query REPORT.

use tracing::debug;

use super::base::{server_refusal, Check, CheckContext};
use crate::caldav::fixtures::utc;
use crate::error::Result;
use crate::features::{Support, SupportDescriptor};

/// Asks for busy time around the first fixture event.
pub struct CheckFreeBusyQuery;

impl Check for CheckFreeBusyQuery {
    fn name(&self) -> &'static str {
        "freebusy-query"
    }

    fn features_to_be_checked(&self) -> &'static [&'static str] {
        &["freebusy-query"]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["prepare-calendar"]
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Result<()> {
        let Ok(calendar) = ctx.calendar() else {
            return ctx.set_features(self.features_to_be_checked(), None::<bool>);
        };

        let start = utc(1999, 12, 30, 17, 0);
        let end = utc(2000, 1, 1, 12, 30);
        let verdict = match ctx.client().freebusy(&calendar, start, end) {
            Ok(answer) if answer.contains("BEGIN:VFREEBUSY") => SupportDescriptor::new(Support::Full),
            Ok(answer) => {
                debug!(bytes = answer.len(), "free-busy answer without VFREEBUSY");
                SupportDescriptor::new(Support::Unsupported).with_behaviour("answer carries no VFREEBUSY")
            }
            Err(e) => {
                let e = server_refusal(e)?;
                SupportDescriptor::new(Support::Unsupported).with_description(e.to_string())
            }
        };
        ctx.set_feature("freebusy-query", verdict)
    }
}
