//! Conversion between the config resource and its editable text form.
//!
//! The allow-list is edited as one openid per line. Blank lines are dropped
//! and each line is trimmed, so the text view is lossy but stable:
//! encoding an already-normalized list and decoding it again is a no-op.

use crate::error::{ApiError, ApiResult};
use crate::models::RemoteConfig;

pub const FIELD_MAX_REQUESTS: &str = "rate limit max requests";
pub const FIELD_WINDOW_SECONDS: &str = "rate limit window seconds";

/// Largest integer that survives a round trip through a JSON number
/// without losing precision.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Editable text state of the config form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigForm {
    pub admin_openids: String,
    pub rate_limit_max_requests: String,
    pub rate_limit_window_seconds: String,
}

impl ConfigForm {
    /// Populate the form from a config read back from the server.
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            admin_openids: encode_openids(config.admin_openids.as_deref()),
            rate_limit_max_requests: encode_number(config.rate_limit_max_requests),
            rate_limit_window_seconds: encode_number(config.rate_limit_window_seconds),
        }
    }
}

/// Split on line breaks, trim, drop blanks. An empty result is `None`,
/// which clears the allow-list on the server.
pub fn decode_openids(text: &str) -> Option<Vec<String>> {
    let ids: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

pub fn encode_openids(ids: Option<&[String]>) -> String {
    ids.map(|ids| ids.join("\n")).unwrap_or_default()
}

/// Parse a rate-limit field. Blank text leaves the field unset; anything
/// else must be an integer strictly greater than zero.
///
/// Input is read as a decimal number first, so `"10.0"` is accepted as 10
/// while `"2.5"`, `"0"`, `"-3"` and `"abc"` are rejected.
pub fn decode_number(text: &str, field: &str) -> ApiResult<Option<i64>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let invalid = || ApiError::InvalidNumber {
        field: field.to_string(),
    };

    let value: f64 = text.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value.fract() != 0.0 || value <= 0.0 || value > MAX_EXACT_INTEGER {
        return Err(invalid());
    }
    Ok(Some(value as i64))
}

pub fn encode_number(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Validate the whole form and assemble the `PUT /config` payload.
///
/// Fails on the first invalid field; nothing partial is returned.
pub fn build_payload(form: &ConfigForm) -> ApiResult<RemoteConfig> {
    let admin_openids = decode_openids(&form.admin_openids);
    let rate_limit_max_requests = decode_number(&form.rate_limit_max_requests, FIELD_MAX_REQUESTS)?;
    let rate_limit_window_seconds =
        decode_number(&form.rate_limit_window_seconds, FIELD_WINDOW_SECONDS)?;

    Ok(RemoteConfig {
        admin_openids,
        rate_limit_max_requests,
        rate_limit_window_seconds,
    })
}
