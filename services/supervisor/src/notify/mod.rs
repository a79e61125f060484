//! Delivery of room notifications to subscribed observers.
//!
//! Payloads are pre-encoded envelopes from `roomvisor-events`; the notifier
//! only routes them to a topic.

use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

/// Notification delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to publish to '{topic}': {source}")]
    Publish {
        topic: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Publishes encoded messages on a topic.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), NotifyError>;
}

/// Notifier built on Postgres `NOTIFY`; the topic is the channel name.
#[derive(Clone)]
pub struct PgNotifier {
    pool: PgPool,
}

impl PgNotifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for PgNotifier {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), NotifyError> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(topic)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|source| NotifyError::Publish {
                topic: topic.to_string(),
                source,
            })?;

        debug!(topic, "Notification published");
        Ok(())
    }
}

/// Notifier that keeps every message in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(topic, payload)` pairs in publish order.
    pub fn published(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), NotifyError> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.publish("room.1", "a").await.unwrap();
        notifier.publish("room.2", "b").await.unwrap();

        assert_eq!(
            notifier.published(),
            vec![
                ("room.1".to_string(), "a".to_string()),
                ("room.2".to_string(), "b".to_string()),
            ]
        );
    }
}
