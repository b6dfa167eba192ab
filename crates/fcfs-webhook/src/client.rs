//! Signed HTTP delivery to the integration target.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::signing;

/// What happened to one delivery attempt, in the dispatcher's terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 2xx — the event is done.
    Delivered,
    /// Transport failure, timeout, 5xx, 408 or 429 — worth another attempt.
    Retryable { reason: String },
    /// Any other 4xx (and anything else unexpected) — the request itself is
    /// wrong; retrying cannot help. Parks the event with the body captured.
    Rejected { status: u16, body: String },
}

/// Classify an HTTP status code. 408 (request timeout) and 429 (rate limit)
/// are the two 4xx codes that are transient by definition.
pub fn classify_status(status: u16, body: &str) -> DeliveryOutcome {
    match status {
        200..=299 => DeliveryOutcome::Delivered,
        408 | 429 => DeliveryOutcome::Retryable {
            reason: format!("http {status}"),
        },
        500..=599 => DeliveryOutcome::Retryable {
            reason: format!("http {status}"),
        },
        _ => DeliveryOutcome::Rejected {
            status,
            body: body.to_string(),
        },
    }
}

pub struct WebhookClient {
    http: reqwest::Client,
    target_url: String,
    secret: Vec<u8>,
}

impl WebhookClient {
    pub fn new(target_url: &str, secret: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build webhook http client")?;
        Ok(Self {
            http,
            target_url: target_url.to_string(),
            secret: secret.as_bytes().to_vec(),
        })
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// POST one event. Every attempt carries a fresh timestamp and signature
    /// over the exact bytes sent.
    pub async fn deliver(&self, event_id: &str, event_name: &str, payload: &Value) -> DeliveryOutcome {
        let body = payload.to_string();
        let timestamp = Utc::now().timestamp();
        let signature = match signing::sign(&self.secret, timestamp, body.as_bytes()) {
            Ok(s) => s,
            Err(e) => {
                return DeliveryOutcome::Retryable {
                    reason: format!("sign: {e}"),
                }
            }
        };

        let result = self
            .http
            .post(&self.target_url)
            .header("Content-Type", "application/json")
            .header("X-Event-Id", event_id)
            .header("X-Event-Name", event_name)
            .header("X-Timestamp", timestamp.to_string())
            .header("X-Signature", signature)
            .body(body)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            // Connect failures, DNS, timeouts: all transport-level, all retryable.
            Err(e) => {
                return DeliveryOutcome::Retryable {
                    reason: format!("transport: {e}"),
                }
            }
        };

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        debug!(event_id, status, "delivery attempt settled");
        classify_status(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_hundreds_are_delivered() {
        assert_eq!(classify_status(200, ""), DeliveryOutcome::Delivered);
        assert_eq!(classify_status(204, ""), DeliveryOutcome::Delivered);
    }

    #[test]
    fn transient_statuses_are_retryable() {
        for status in [500, 502, 503, 599, 408, 429] {
            assert!(matches!(
                classify_status(status, ""),
                DeliveryOutcome::Retryable { .. }
            ));
        }
    }

    #[test]
    fn caller_errors_are_rejected_with_body() {
        let outcome = classify_status(422, "bad payload");
        assert_eq!(
            outcome,
            DeliveryOutcome::Rejected {
                status: 422,
                body: "bad payload".to_string()
            }
        );
        assert!(matches!(
            classify_status(400, ""),
            DeliveryOutcome::Rejected { .. }
        ));
        assert!(matches!(
            classify_status(404, ""),
            DeliveryOutcome::Rejected { .. }
        ));
    }
}
