//! Sticky-session token extraction.

use waypoint_core::{CallContext, LB_SESSION_ID};

/// Session token of the call, or an empty string when it carries none.
///
/// Calls whose arguments expose cookies read the `lb-session-id` cookie and
/// nothing else. Other calls read the `lb-session-id` metadata entry, which
/// holds `lb-session-id=<token>`; only the part after the first `=` is used.
#[must_use]
pub fn session_token(ctx: &CallContext) -> String {
    if let Some(jar) = ctx.args.as_deref().and_then(|args| args.cookies()) {
        return jar.cookie(LB_SESSION_ID).unwrap_or_default().to_string();
    }
    let value = ctx.read_metadata(LB_SESSION_ID);
    value
        .split_once('=')
        .map(|(_, token)| token.to_string())
        .unwrap_or_default()
}
