//! Optional side publishers
//!
//! Both ports are best-effort from the pipeline's point of view: the
//! orchestrator logs their failures and carries on with the tick.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{instrument, trace};

use crate::config::Webhook;
use crate::metrics::Measurement;

/// Topic published after every persisted batch
pub const TOPIC_METRICS_COLLECTED: &str = "metrics.collected";

/// Topic published for every critical measurement
pub const TOPIC_ALERTS_CRITICAL: &str = "alerts.critical";

/// Re-export of persisted batches to an external metrics system
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn publish_batch(&self, measurements: &[Measurement]) -> anyhow::Result<()>;
}

/// Topic-based notification channel
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish_event(&self, topic: &str, event: serde_json::Value) -> anyhow::Result<()>;
}

fn build_client(timeout_secs: u64) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

async fn post_json(client: &Client, url: &str, payload: &serde_json::Value) -> anyhow::Result<()> {
    let response = client
        .post(url)
        .json(payload)
        .send()
        .await
        .context("failed to send webhook request")?;

    if !response.status().is_success() {
        anyhow::bail!("webhook responded with status: {}", response.status());
    }

    Ok(())
}

/// Posts each batch as `{"measurements": [...], "count": n, "timestamp": ...}`
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(webhook: &Webhook) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(webhook.timeout_secs)?,
            url: webhook.url.clone(),
        })
    }
}

#[async_trait]
impl MetricsSink for WebhookSink {
    #[instrument(skip_all, fields(count = measurements.len()))]
    async fn publish_batch(&self, measurements: &[Measurement]) -> anyhow::Result<()> {
        let payload = json!({
            "measurements": measurements,
            "count": measurements.len(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        post_json(&self.client, &self.url, &payload).await?;
        trace!("published batch to metrics sink");
        Ok(())
    }
}

/// Posts each event as `{"topic": ..., "event": ..., "timestamp": ...}`
#[derive(Debug, Clone)]
pub struct WebhookEventBus {
    client: Client,
    url: String,
}

impl WebhookEventBus {
    pub fn new(webhook: &Webhook) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(webhook.timeout_secs)?,
            url: webhook.url.clone(),
        })
    }
}

#[async_trait]
impl EventBus for WebhookEventBus {
    #[instrument(skip(self, event))]
    async fn publish_event(&self, topic: &str, event: serde_json::Value) -> anyhow::Result<()> {
        let payload = json!({
            "topic": topic,
            "event": event,
            "timestamp": Utc::now().to_rfc3339(),
        });

        post_json(&self.client, &self.url, &payload).await?;
        trace!("published event on {topic}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MeasurementValue, MetricKind};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn webhook(server: &MockServer, route: &str) -> Webhook {
        Webhook {
            url: format!("{}{route}", server.uri()),
            timeout_secs: 2,
        }
    }

    #[tokio::test]
    async fn test_sink_posts_batch() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ingest"))
            .and(body_partial_json(json!({ "count": 1 })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sink = WebhookSink::new(&webhook(&server, "/ingest")).unwrap();
        let measurement = Measurement::new(
            MetricKind::Cpu,
            "cpu_usage",
            MeasurementValue::new(12.0, "%").unwrap(),
            Utc::now(),
        );

        sink.publish_batch(&[measurement]).await.unwrap();
    }

    #[tokio::test]
    async fn test_event_bus_posts_topic() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/events"))
            .and(body_partial_json(json!({
                "topic": TOPIC_ALERTS_CRITICAL,
                "event": { "metric_type": "disk" }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let bus = WebhookEventBus::new(&webhook(&server, "/events")).unwrap();
        bus.publish_event(TOPIC_ALERTS_CRITICAL, json!({ "metric_type": "disk" }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let bus = WebhookEventBus::new(&webhook(&server, "/events")).unwrap();
        let result = bus.publish_event(TOPIC_METRICS_COLLECTED, json!({})).await;

        assert!(result.is_err());
    }
}
