//! Lifecycle event sinks. Publishing is fire-and-forget for the workflows:
//! a failed publish is logged and counted, never surfaced to the caller.

use super::{ClientError, check};
use crate::metrics_defs::EVENTS_PUBLISH_FAILED;
use async_trait::async_trait;
use serde_json::{Value, json};
use shared::counter;
use std::sync::Arc;
use url::Url;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), ClientError>;
}

/// Publishes and logs failures instead of returning them.
pub async fn publish_logged(publisher: &Arc<dyn EventPublisher>, topic: &str, payload: Value) {
    if let Err(e) = publisher.publish(topic, &payload).await {
        counter!(EVENTS_PUBLISH_FAILED, "topic" => topic.to_string()).increment(1);
        tracing::error!(topic, error = %e, "failed to publish event");
    }
}

pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), ClientError> {
        tracing::info!(topic, %payload, "event");
        Ok(())
    }
}

pub struct HttpPublisher {
    client: reqwest::Client,
    url: Url,
}

impl HttpPublisher {
    pub fn new(url: Url) -> Self {
        HttpPublisher {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl EventPublisher for HttpPublisher {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), ClientError> {
        let body = json!({ "topic": topic, "payload": payload });
        let response = self.client.post(self.url.clone()).json(&body).send().await?;
        check(&self.url, response).await?;
        Ok(())
    }
}
