//! Client side of `/generate-blog`, as a chat relay sees it.
//!
//! A relay forwards one chat message as `{"prompt": ...}` and shows the user
//! whatever text it can find in the answer. It never shows an error: every
//! failure becomes [`APOLOGY`].

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

/// What the chat user sees when anything goes wrong.
pub const APOLOGY: &str =
    "Sorry, I couldn't write that article right now. Please try again in a moment.";

/// Fields searched for the reply text, in order.
pub const REPLY_FIELDS: [&str; 4] = ["answer", "result", "text", "content"];

const RELAY_TIMEOUT: Duration = Duration::from_secs(120);

/// Turn an HTTP reply into the text a chat user sees.
///
/// Non-200 statuses and non-JSON bodies give [`APOLOGY`]. Otherwise the first
/// non-empty string among [`REPLY_FIELDS`] wins; without one the serialized
/// payload is shown as is.
pub fn reply_text(status: u16, body: &str) -> String {
    if status != 200 {
        return APOLOGY.to_string();
    }
    let payload: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return APOLOGY.to_string(),
    };
    if let Some(text) = payload.as_str() {
        return text.to_string();
    }
    REPLY_FIELDS
        .iter()
        .filter_map(|field| payload.get(field).and_then(Value::as_str))
        .find(|text| !text.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

/// Posts prompts to a running server.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    url: String,
}

impl RelayClient {
    /// `base_url` is the server root; `/generate-blog` is appended.
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/generate-blog", base_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Ask for an article. Never fails; a broken exchange yields [`APOLOGY`].
    pub async fn ask(&self, text: &str) -> String {
        let response = match self
            .client
            .post(&self.url)
            .json(&json!({ "prompt": text }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, url = %self.url, "relay request failed");
                return APOLOGY.to_string();
            }
        };
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => {
                if status != 200 {
                    warn!(status, "relay got an error reply");
                }
                reply_text(status, &body)
            }
            Err(e) => {
                warn!(error = %e, "relay could not read the reply");
                APOLOGY.to_string()
            }
        }
    }
}
