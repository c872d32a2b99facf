//! Kubernetes Event emission for traffic routing changes.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};

/// Name reported as the Event source
pub const REPORTER_NAME: &str = "kulta-traefik";

/// An observational event about a traffic routing change
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficEvent {
    pub reason: String,
    pub action: String,
    pub note: String,
}

/// Trait for publishing events
///
/// Production code uses `KubeEventRecorder` which writes `events.k8s.io` Events.
/// Tests use `MockEventRecorder` which stores events in memory for assertions.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn publish(
        &self,
        reference: &ObjectReference,
        event: TrafficEvent,
    ) -> Result<(), kube::Error>;
}

/// Event recorder backed by `kube::runtime::events::Recorder`
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    /// Create a recorder reporting as `kulta-traefik`
    ///
    /// `instance` is usually the controller pod name (`POD_NAME`).
    pub fn new(client: kube::Client, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: REPORTER_NAME.to_string(),
            instance,
        };
        KubeEventRecorder {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn publish(
        &self,
        reference: &ObjectReference,
        event: TrafficEvent,
    ) -> Result<(), kube::Error> {
        self.recorder
            .publish(
                &Event {
                    type_: EventType::Normal,
                    reason: event.reason,
                    note: Some(event.note),
                    action: event.action,
                    secondary: None,
                },
                reference,
            )
            .await
    }
}

/// Mock event recorder for testing - stores events in memory
#[cfg(test)]
pub struct MockEventRecorder {
    events: std::sync::Arc<std::sync::Mutex<Vec<(ObjectReference, TrafficEvent)>>>,
}

#[cfg(test)]
impl Default for MockEventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MockEventRecorder {
    pub fn new() -> Self {
        MockEventRecorder {
            events: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    #[allow(clippy::unwrap_used)]
    pub fn get_published_events(&self) -> Vec<(ObjectReference, TrafficEvent)> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl EventRecorder for MockEventRecorder {
    async fn publish(
        &self,
        reference: &ObjectReference,
        event: TrafficEvent,
    ) -> Result<(), kube::Error> {
        #[allow(clippy::unwrap_used)]
        self.events
            .lock()
            .unwrap()
            .push((reference.clone(), event));
        Ok(())
    }
}
