//! Default User-Agent string for download traffic.
//!
//! Single source for project URL and UA format so every request identifies
//! the tool consistently (good citizenship; RFC 9308).

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/modelfetch";

/// Default User-Agent for download requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("modelfetch/{version} (model-fetch-tool; +{PROJECT_UA_URL})")
}
