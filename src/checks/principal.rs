//! Current-user-principal discovery.

use tracing::debug;

use super::base::{server_refusal, Check, CheckContext};
use crate::error::Result;

/// Finds the principal every other check builds on.
///
/// Any failure other than an authorization error means the feature is
/// unsupported. Refused credentials abort the run, since nothing else can
/// be checked either.
pub struct CheckGetCurrentUserPrincipal;

impl Check for CheckGetCurrentUserPrincipal {
    fn name(&self) -> &'static str {
        "get-current-user-principal"
    }

    fn features_to_be_checked(&self) -> &'static [&'static str] {
        &["get-current-user-principal"]
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Result<()> {
        match ctx.client().principal() {
            Ok(principal) => {
                debug!(principal = %principal.url, "Found principal");
                ctx.fixtures_mut().principal = Some(principal);
                ctx.set_feature("get-current-user-principal", true)
            }
            Err(e) => {
                let e = server_refusal(e)?;
                debug!(error = %e, "Principal lookup failed");
                ctx.fixtures_mut().principal = None;
                ctx.set_feature("get-current-user-principal", false)
            }
        }
    }
}
