use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::error::{Result, SourceError};
use crate::limiter::RateLimiter;

/// One page of `conversations.history`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub ok: bool,
    /// Raw message envelopes, kept untyped so they can be stored verbatim.
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "de_flag")]
    pub has_more: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `users.info`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub ok: bool,
    pub user: Option<UserEntry>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserEntry {
    pub profile: Option<UserProfile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub image_original: Option<String>,
}

/// Raw source platform transport. One method, one HTTP round trip.
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// Up to `limit` messages of `channel` newer than `oldest`.
    async fn history(&self, channel: &str, oldest: f64, limit: u32) -> Result<HistoryPage>;

    async fn user_info(&self, user_id: &str) -> Result<UserInfo>;
}

/// Slack Web API client.
pub struct HttpSourceApi {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl HttpSourceApi {
    pub fn new(token: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| relay_core::config::DEFAULT_SOURCE_API.to_string()),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);
        debug!(%method, "calling source API");

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, %method, body = %text, "source API error");
            return Err(SourceError::Api {
                status,
                message: text,
            });
        }

        resp.json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SourceApi for HttpSourceApi {
    async fn history(&self, channel: &str, oldest: f64, limit: u32) -> Result<HistoryPage> {
        self.get(
            "conversations.history",
            &[
                ("channel", channel.to_string()),
                ("limit", limit.to_string()),
                ("oldest", format!("{oldest:.6}")),
            ],
        )
        .await
    }

    async fn user_info(&self, user_id: &str) -> Result<UserInfo> {
        self.get("users.info", &[("user", user_id.to_string())])
            .await
    }
}

/// A [`SourceApi`] behind a shared [`RateLimiter`].
///
/// History paging and profile lookups both count against the same limit.
pub struct PacedSource {
    api: Arc<dyn SourceApi>,
    limiter: RateLimiter,
}

impl PacedSource {
    pub fn new(api: Arc<dyn SourceApi>, limiter: RateLimiter) -> Self {
        Self { api, limiter }
    }

    pub async fn history(&self, channel: &str, oldest: f64, limit: u32) -> Result<HistoryPage> {
        self.limiter.wait_if_needed().await;
        self.api.history(channel, oldest, limit).await
    }

    pub async fn user_info(&self, user_id: &str) -> Result<UserInfo> {
        self.limiter.wait_if_needed().await;
        self.api.user_info(user_id).await
    }
}

/// `has_more` is a JSON bool, but integer flags (`1`) are accepted too.
fn de_flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(d)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n == 1,
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_page_accepts_integer_flag() {
        let page: HistoryPage =
            serde_json::from_str(r#"{"ok":true,"messages":[],"has_more":1}"#).unwrap();
        assert!(page.has_more);

        let page: HistoryPage =
            serde_json::from_str(r#"{"ok":true,"messages":[],"has_more":false}"#).unwrap();
        assert!(!page.has_more);
    }

    #[test]
    fn history_page_tolerates_error_shape() {
        let page: HistoryPage =
            serde_json::from_str(r#"{"ok":false,"error":"channel_not_found"}"#).unwrap();
        assert!(!page.ok);
        assert!(page.messages.is_empty());
        assert_eq!(page.error.as_deref(), Some("channel_not_found"));
    }

    #[test]
    fn user_info_parses_profile() {
        let json = r#"{"ok":true,"user":{"id":"U1","profile":{"real_name":"Ada Lovelace","display_name":"ada","image_original":"https://img/ada.png"}}}"#;
        let info: UserInfo = serde_json::from_str(json).unwrap();
        let profile = info.user.unwrap().profile.unwrap();
        assert_eq!(profile.real_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(profile.display_name.as_deref(), Some("ada"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = HttpSourceApi::new("t".into(), Some("http://localhost:9/api/".into()));
        assert_eq!(api.base_url, "http://localhost:9/api");
    }
}
