//! Fetch of the discovered data URL.
//!
//! Plain HTTP, no browser. The request carries the headers the service's
//! own web client sends, so the signed URL is served as JSON.

use serde_json::Value;
use std::time::Duration;

use crate::error::FetchError;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_TIME_ZONE: &str = "America/Chicago";
pub const DEFAULT_LOCALE: &str = "en";

/// HTTP client for shared-view data reads.
#[derive(Clone)]
pub struct DataClient {
    client: reqwest::Client,
    time_zone: String,
    locale: String,
}

impl DataClient {
    /// Create a client presenting `user_agent` (use the one discovery ran with).
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            time_zone: DEFAULT_TIME_ZONE.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
        })
    }

    /// Override the time zone and locale markers.
    pub fn with_locale(mut self, time_zone: impl Into<String>, locale: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self.locale = locale.into();
        self
    }

    /// GET `url` and parse the body as JSON. Non-2xx is `FetchError::Status`.
    pub async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let resp = self
            .client
            .get(url)
            .header("accept", "*/*")
            .header("x-requested-with", "XMLHttpRequest")
            .header("x-airtable-inter-service-client", "webClient")
            .header("x-time-zone", self.time_zone.as_str())
            .header("x-user-locale", self.locale.as_str())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = resp.text().await?;
        let value = serde_json::from_str(&body)?;
        tracing::debug!("fetched {} bytes from data URL", body.len());
        Ok(value)
    }
}
