//! Outbound domain events.
//!
//! Events are handed over only after the unit of work that raised them has
//! committed. Delivery is best-effort; a failed publish is logged and never
//! undoes committed state.

use async_trait::async_trait;

use crate::domain::events::DomainEvent;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent);

    async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in &events {
            self.publish(event).await;
        }
    }
}

/// Publishes JSON payloads on `<prefix>.<aggregate>.<event>` subjects.
#[derive(Clone, Debug)]
pub struct NatsPublisher {
    client: async_nats::Client,
    prefix: String,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) {
        let subject = format!("{}.{}", self.prefix, event.subject());
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(%subject, error = %e, "failed to encode event");
                return;
            }
        };
        if let Err(e) = self.client.publish(subject.clone(), payload.into()).await {
            tracing::warn!(%subject, error = %e, "failed to publish event");
        }
    }
}

/// Fallback when no bus is configured: events only reach the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DomainEvent) {
        tracing::info!(subject = event.subject(), ?event, "domain event");
    }
}
