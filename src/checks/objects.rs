//! Deleting single calendar objects.

use tracing::debug;

use super::base::{server_refusal, Check, CheckContext};
use crate::caldav::fixtures;
use crate::caldav::{CalendarRef, DavError};
use crate::error::Result;
use crate::features::{Support, SupportDescriptor};

/// Stores a throwaway event, deletes it and looks for it again.
pub struct CheckDeleteObject;

impl CheckDeleteObject {
    /// Whether the event can still be fetched by UID.
    fn still_there(ctx: &mut CheckContext<'_>, calendar: &CalendarRef) -> Result<bool> {
        match ctx.client().object_by_uid(calendar, fixtures::DELETE_EVENT) {
            Ok(_) => Ok(true),
            Err(DavError::NotFound { .. }) => Ok(false),
            Err(e) => {
                let e = server_refusal(e)?;
                debug!(error = %e, "Lookup after deletion failed");
                Ok(false)
            }
        }
    }
}

impl Check for CheckDeleteObject {
    fn name(&self) -> &'static str {
        "delete-object"
    }

    fn features_to_be_checked(&self) -> &'static [&'static str] {
        &["delete-object"]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["prepare-calendar"]
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Result<()> {
        let Ok(calendar) = ctx.calendar() else {
            return ctx.set_features(self.features_to_be_checked(), None::<bool>);
        };

        let object = match ctx.client().save_object(&calendar, &fixtures::delete_event()) {
            Ok(object) => object,
            Err(e) => {
                let e = server_refusal(e)?;
                debug!(error = %e, "Could not store the deletion test event");
                return ctx.set_feature("delete-object", None::<bool>);
            }
        };

        if let Err(e) = ctx.client().delete_object(&object) {
            let e = server_refusal(e)?;
            return ctx.set_feature(
                "delete-object",
                SupportDescriptor::new(Support::Unsupported).with_description(e.to_string()),
            );
        }

        let verdict = if !Self::still_there(ctx, &calendar)? {
            SupportDescriptor::new(Support::Full)
        } else {
            ctx.settle();
            if Self::still_there(ctx, &calendar)? {
                SupportDescriptor::new(Support::Unsupported).with_behaviour("deleted object is still there")
            } else {
                SupportDescriptor::new(Support::Fragile).with_behaviour("deletion takes effect after a delay")
            }
        };
        ctx.set_feature("delete-object", verdict)
    }
}
