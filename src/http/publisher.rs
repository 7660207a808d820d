//! Best-effort delivery of committed order events to NATS.

use tracing::{debug, warn};

use crate::domain::events::OrderEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn disabled() -> Self { Self::default() }

    pub fn is_enabled(&self) -> bool { self.nats.is_some() }

    /// The transaction is already committed; a failed publish is only logged.
    pub async fn publish(&self, event: &OrderEvent) {
        let Some(nats) = &self.nats else { return };
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(order_id = %event.order_id(), error = %err, "order event not serializable");
                return;
            }
        };
        match nats.publish(event.subject().to_string(), payload.into()).await {
            Ok(()) => debug!(order_id = %event.order_id(), subject = event.subject(), "order event published"),
            Err(err) => warn!(order_id = %event.order_id(), error = %err, "order event publish failed"),
        }
    }
}
