use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use crate::events::{ContractEvent, EventDefinition};
use crate::registry::Registry;

/// Where formatted event messages end up.
///
/// Delivery is fire-and-forget; failures stay inside the sink.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, target: &str, text: &str);
}

/// Routes incoming contract events to the notification target of their contract.
pub struct Dispatcher {
    registry: Arc<Registry>,
    sink: Arc<dyn NotificationSink>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { registry, sink }
    }

    /// Resolves `event` against the registry as it is now and delivers it.
    ///
    /// Events for unknown contracts or unsubscribed names are dropped; they
    /// are leftovers from listeners that were detached while in flight.
    pub async fn dispatch(&self, event: &ContractEvent) {
        let Some(route) = self.registry.resolve(&event.address, &event.name) else {
            debug!("Dropping {} from {}: not subscribed", event.name, event.address);
            return;
        };

        let Some(message) = format_message(&route.event, &route.address, &event.args) else {
            warn!(
                "Dropping {} from {}: got {} arguments, expected {}",
                event.name,
                event.address,
                event.args.len(),
                route.event.parameters.len()
            );
            return;
        };

        self.sink.deliver(&route.target, &message).await;
    }

    /// Drains `rx` until every sender is gone.
    pub async fn run(self, mut rx: Receiver<ContractEvent>) {
        info!("Dispatcher active. Waiting for events...");
        while let Some(event) = rx.recv().await {
            debug!("Processing event: {} from {}", event.name, event.address);
            self.dispatch(&event).await;
        }
        info!("Event channel closed, dispatcher stopping");
    }
}

/// Renders an event as a header line plus one `name: value` line per parameter.
///
/// Returns `None` when the argument count does not match the definition.
pub fn format_message(
    event: &EventDefinition,
    address: &str,
    args: &[String],
) -> Option<String> {
    if args.len() != event.parameters.len() {
        return None;
    }

    let mut message = format!(">>> {} - {}", event.name, address);
    for (index, value) in args.iter().enumerate() {
        message.push('\n');
        message.push_str(&event.parameter_label(index));
        message.push_str(": ");
        message.push_str(value);
    }
    Some(message)
}
