//! principal-property-search (RFC 3744).

use tracing::debug;

use super::base::{server_refusal, Check, CheckContext};
use crate::caldav::{DavError, Principal};
use crate::error::Result;
use crate::features::{Support, SupportDescriptor};

fn rejected(error: DavError) -> Result<SupportDescriptor> {
    let error = server_refusal(error)?;
    debug!(error = %error, "Principal search rejected");
    Ok(match error {
        DavError::Report { .. } | DavError::Status { .. } => {
            SupportDescriptor::new(Support::Ungraceful).with_description(error.to_string())
        }
        other => SupportDescriptor::new(Support::Unsupported).with_description(other.to_string()),
    })
}

/// Looks the current user up by display name, then lists everyone.
pub struct CheckPrincipalSearch;

impl CheckPrincipalSearch {
    fn by_name(ctx: &mut CheckContext<'_>, principal: &Principal) -> Result<SupportDescriptor> {
        let Some(name) = principal.display_name.as_deref() else {
            return Ok(SupportDescriptor::new(Support::Unknown).with_description("principal has no display name"));
        };
        match ctx.client().principal_search(Some(name)) {
            Ok(found) if found.iter().any(|p| p.url == principal.url) => Ok(SupportDescriptor::new(Support::Full)),
            Ok(_) => Ok(SupportDescriptor::new(Support::Unsupported)
                .with_description("searching by display name did not find the current user")),
            Err(e) => rejected(e),
        }
    }

    fn list_all(ctx: &mut CheckContext<'_>) -> Result<SupportDescriptor> {
        match ctx.client().principal_search(None) {
            Ok(found) if !found.is_empty() => Ok(SupportDescriptor::new(Support::Full)),
            Ok(_) => Ok(SupportDescriptor::new(Support::Unsupported)),
            Err(e) => rejected(e),
        }
    }
}

impl Check for CheckPrincipalSearch {
    fn name(&self) -> &'static str {
        "principal-search"
    }

    fn features_to_be_checked(&self) -> &'static [&'static str] {
        &["principal-search.by-name", "principal-search.list-all"]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["get-current-user-principal"]
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Result<()> {
        let Ok(principal) = ctx.principal() else {
            return ctx.set_features(&["principal-search.by-name", "principal-search.list-all"], None::<bool>);
        };
        let by_name = Self::by_name(ctx, &principal)?;
        ctx.set_feature("principal-search.by-name", by_name)?;
        let list_all = Self::list_all(ctx)?;
        ctx.set_feature("principal-search.list-all", list_all)
    }
}
