use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

/// What the dispatcher needs to know about a webhook answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebhookResponse {
    pub status: u16,
    /// Raw retry-after value as sent by the destination, unit unverified.
    pub retry_after: Option<f64>,
}

impl WebhookResponse {
    pub fn ok() -> Self {
        Self {
            status: 200,
            retry_after: None,
        }
    }

    /// Only 200 and 204 count as delivered.
    pub fn is_delivered(&self) -> bool {
        matches!(self.status, 200 | 204)
    }
}

/// Outbound webhook transport.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn post(&self, payload: &Value) -> Result<WebhookResponse>;
}

/// POSTs JSON payloads to a single webhook URL.
pub struct HttpWebhook {
    client: reqwest::Client,
    url: String,
}

impl HttpWebhook {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl WebhookSink for HttpWebhook {
    async fn post(&self, payload: &Value) -> Result<WebhookResponse> {
        let resp = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .json(payload)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let header_retry = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok());

        let retry_after = if header_retry.is_some() || resp.status().is_success() {
            header_retry
        } else {
            // Discord also reports the wait in the JSON body.
            let text = resp.text().await.unwrap_or_default();
            debug!(status, body = %text, "webhook rejected payload");
            body_retry_after(&text)
        };

        Ok(WebhookResponse {
            status,
            retry_after,
        })
    }
}

fn body_retry_after(body: &str) -> Option<f64> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("retry_after")?
        .as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_200_and_204_are_delivered() {
        for status in [200u16, 204] {
            assert!(WebhookResponse { status, retry_after: None }.is_delivered());
        }
        for status in [201u16, 400, 429, 500] {
            assert!(!WebhookResponse { status, retry_after: None }.is_delivered());
        }
    }

    #[test]
    fn retry_after_from_body() {
        assert_eq!(
            body_retry_after(r#"{"message":"You are being rate limited.","retry_after":64.57,"global":false}"#),
            Some(64.57)
        );
        assert_eq!(body_retry_after("rate limited"), None);
        assert_eq!(body_retry_after(r#"{"code":50006}"#), None);
    }
}
