//! The bus contract the resolution pipeline publishes through (spec §4.7).
//!
//! Grounded in the same one-trait-per-concern shape `er_store` uses for
//! storage seams: a narrow `async_trait`, `error_stack::Result` return type.
//! The real deployment target is a Kafka-compatible bus keyed by
//! [`PipelineEvent::partition_key`]; this crate ships only the contract plus
//! an in-memory recorder for tests.

use async_trait::async_trait;
use er_types::error::EventPublishError;
use er_types::events::PipelineEvent;
use error_stack::Result;

/// Publishes pipeline events after the transaction that produced them
/// commits (spec §5: "Event emission is strictly after the DB commit that
/// caused it; partial failure of emission is retried").
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: PipelineEvent) -> Result<(), EventPublishError>;
}

/// Records published events in memory, in publish order, for test assertions.
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: std::sync::Mutex<Vec<PipelineEvent>>,
}

impl RecordingEventPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones out everything published so far, in publish order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned by a prior panic while
    /// holding the lock.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().expect("recording publisher mutex poisoned").clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    #[tracing::instrument(level = "debug", skip(self, event))]
    async fn publish(&self, event: PipelineEvent) -> Result<(), EventPublishError> {
        self.events.lock().expect("recording publisher mutex poisoned").push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use er_types::events::{EntityEvent, EntityEventType};
    use er_types::ids::{MergedEntityId, TenantId};

    use super::*;

    #[tokio::test]
    async fn recorder_preserves_publish_order() {
        let publisher = RecordingEventPublisher::new();
        let tenant_id = TenantId::new();
        for event_type in [EntityEventType::Created, EntityEventType::Updated] {
            publisher
                .publish(PipelineEvent::Entity(EntityEvent {
                    event_type,
                    schema_version: er_types::events::SCHEMA_VERSION.to_owned(),
                    tenant_id,
                    entity_id: MergedEntityId::new(),
                    entity_type: "person".into(),
                    data: None,
                    source_entities: None,
                    version: 1,
                    timestamp: time::OffsetDateTime::now_utc(),
                    correlation_id: None,
                }))
                .await
                .expect("publish");
        }

        let recorded = publisher.events();
        assert_eq!(recorded.len(), 2);
        let PipelineEvent::Entity(first) = &recorded[0] else { panic!("expected entity event") };
        assert_eq!(first.event_type, EntityEventType::Created);
    }
}
