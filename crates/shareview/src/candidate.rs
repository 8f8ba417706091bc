//! Candidate data-fetch URLs: the shape predicate, identity and expiry
//! extraction, and the variant preference used when several URLs match.
//!
//! The wire shape is
//! `https://<data host>/v0.3/view/<VIEW_ID>/readSharedViewData?accessPolicy=<json>&...`
//! where the `accessPolicy` JSON carries `shareId` and, usually, `expires`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use url::Url;

const API_VERSION_SEGMENT: &str = "v0.3";
const VIEW_SEGMENT: &str = "view";
const ENDPOINT_SEGMENT: &str = "readSharedViewData";
const ACCESS_POLICY_PARAM: &str = "accessPolicy";

/// Marker of the nested response format inside the (still encoded) query.
const NESTED_FORMAT_MARKER: &str = "shouldUseNestedResponseFormat%22%3Atrue";
/// Marker of the msgpack result toggle.
const RESULT_ENCODING_TOGGLE: &str = "allowMsgpackOfResult";

/// Whether `raw` is a shared-view data read served from `data_host`.
///
/// The host must be `data_host` itself or one of its subdomains, the path
/// must be `/v0.3/view/<id>/readSharedViewData` and a query string must be
/// present.
pub fn is_data_request(raw: &str, data_host: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") || url.query().is_none() {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    if !host_in_family(host, data_host) {
        return false;
    }
    let Some(segments) = url.path_segments() else {
        return false;
    };
    let segments: Vec<&str> = segments.collect();
    matches!(
        segments.as_slice(),
        [API_VERSION_SEGMENT, VIEW_SEGMENT, id, ENDPOINT_SEGMENT] if !id.is_empty()
    )
}

fn host_in_family(host: &str, family: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let family = family.trim_start_matches('.').to_ascii_lowercase();
    host == family || host.ends_with(&format!(".{family}"))
}

/// Prefer the nested response format and avoid the msgpack toggle variant.
///
/// This encodes what the service currently emits; it is observed behavior,
/// so keep every string heuristic about variants in this one function.
pub fn is_preferred_variant(raw: &str) -> bool {
    raw.contains(NESTED_FORMAT_MARKER) && !raw.contains(RESULT_ENCODING_TOGGLE)
}

/// Sort rank used when selecting among matching URLs (lower wins).
pub fn preference_rank(raw: &str) -> u8 {
    if is_preferred_variant(raw) {
        0
    } else {
        1
    }
}

/// A request URL with the identity fields parsed out of it.
///
/// Any field may be `None` when the URL does not have the expected shape;
/// parsing never fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub view_id: Option<String>,
    pub share_id: Option<String>,
    pub expiry: Option<DateTime<FixedOffset>>,
}

impl Candidate {
    pub fn parse(raw: &str) -> Self {
        let parsed = Url::parse(raw).ok();
        let policy = parsed.as_ref().and_then(access_policy);

        let view_id = parsed.as_ref().and_then(view_id_from_path);
        let share_id = policy
            .as_ref()
            .and_then(|p| p.get("shareId"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let expiry = policy
            .as_ref()
            .and_then(|p| p.get("expires"))
            .and_then(Value::as_str)
            .and_then(parse_expiry);

        Self {
            url: raw.to_string(),
            view_id,
            share_id,
            expiry,
        }
    }
}

/// The segment right after the first `view` segment.
fn view_id_from_path(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == VIEW_SEGMENT)?;
    segments
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Decode the JSON object carried by the `accessPolicy` query parameter.
fn access_policy(url: &Url) -> Option<Value> {
    let (_, raw) = url
        .query_pairs()
        .find(|(name, _)| name == ACCESS_POLICY_PARAM)?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("unparseable accessPolicy in {url}: {e}");
            None
        }
    }
}

/// Parse an ISO-8601 expiry. A trailing `Z` is normalized to `+00:00`,
/// `+HHMM` offsets and a space separator are accepted, and timestamps or
/// bare dates without any offset are taken as UTC.
pub fn parse_expiry(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    let mut normalized = match raw.strip_suffix('Z').or_else(|| raw.strip_suffix('z')) {
        Some(stem) => format!("{stem}+00:00"),
        None => raw.to_string(),
    };
    if normalized.get(10..11) == Some(" ") {
        normalized.replace_range(10..11, "T");
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(ts);
    }
    if let Ok(ts) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive).fixed_offset());
    }
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}
