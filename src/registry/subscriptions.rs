use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::registry::Registry;

impl Registry {
    pub fn list_all_events(&self, address: &str) -> Result<Vec<String>> {
        self.with_entry(address, |entry| {
            if entry.all_events.is_empty() {
                return Err(RegistryError::NoEvents(entry.address.clone()));
            }
            Ok(entry.all_events.iter().map(|e| e.name.clone()).collect())
        })
    }

    pub fn list_subscribed(&self, address: &str) -> Result<Vec<String>> {
        self.with_entry(address, |entry| {
            if entry.subscribed_events.is_empty() {
                return Err(RegistryError::NoneSubscribed(entry.address.clone()));
            }
            Ok(entry.subscribed_events.iter().map(|e| e.name.clone()).collect())
        })
    }

    /// Starts listening to `event_name` on the contract at `address`.
    ///
    /// Returns the catalog spelling of the event once the listener is
    /// attached. The subscription is recorded while the attach is in flight
    /// and rolled back if it fails. An unsubscribe that lands during the
    /// attach wins, and the fresh listener is detached again.
    pub async fn subscribe(&self, address: &str, event_name: &str) -> Result<String> {
        let (handle, name) = self.with_entry(address, |entry| {
            let event = entry
                .catalog_event(event_name)
                .cloned()
                .ok_or_else(|| RegistryError::UnknownEvent(event_name.to_string()))?;

            if entry.subscribed_position(event_name).is_some() {
                return Err(RegistryError::AlreadySubscribed(event.name));
            }

            let name = event.name.clone();
            entry.subscribed_events.push(event);
            Ok((entry.handle.clone(), name))
        })?;

        if let Err(e) = handle.on(&name).await {
            warn!("Failed to attach {} listener on {}: {}", name, address, e);
            let _ = self.with_entry(address, |entry| {
                entry.subscribed_events.retain(|event| event.name != name);
                Ok(())
            });
            return Err(e);
        }

        let still_subscribed = self
            .with_entry(address, |entry| {
                Ok(entry.subscribed_events.iter().any(|event| event.name == name))
            })
            .unwrap_or(false);
        if still_subscribed {
            info!("Subscribed to {} on {}", name, address);
        } else {
            debug!("{} on {} was unsubscribed while attaching", name, address);
            handle.off(&name);
        }
        Ok(name)
    }

    /// Stops listening to `event_name` and returns its catalog spelling.
    pub fn unsubscribe(&self, address: &str, event_name: &str) -> Result<String> {
        self.with_entry(address, |entry| {
            let position = entry
                .subscribed_position(event_name)
                .ok_or_else(|| RegistryError::NotSubscribed(event_name.to_string()))?;

            let event = entry.subscribed_events.remove(position);
            entry.handle.off(&event.name);
            info!("Unsubscribed from {} on {}", event.name, entry.address);
            Ok(event.name)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::RegistryError;
    use crate::registry::testing::*;
    use crate::registry::Registry;
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_subscribe_is_case_insensitive_both_ways() {
        let (registry, calls) = registry();
        registry.register("0xABC", &transfer_abi(), "general").unwrap();

        assert_eq!(registry.subscribe("0xABC", "transfer").await.unwrap(), "Transfer");
        assert_eq!(registry.list_subscribed("0xABC").unwrap(), vec!["Transfer"]);
        assert_eq!(*calls.lock().unwrap(), vec!["on 0xABC Transfer"]);

        assert_eq!(registry.unsubscribe("0xABC", "TRANSFER").unwrap(), "Transfer");
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["on 0xABC Transfer", "off 0xABC Transfer"]
        );
    }

    #[tokio::test]
    async fn test_subscribe_twice_is_rejected() {
        let (registry, calls) = registry();
        registry.register("0xABC", &transfer_abi(), "general").unwrap();
        registry.subscribe("0xABC", "Transfer").await.unwrap();

        assert_eq!(
            registry.subscribe("0xABC", "tRaNsFeR").await,
            Err(RegistryError::AlreadySubscribed("Transfer".to_string()))
        );
        assert_eq!(registry.list_subscribed("0xABC").unwrap().len(), 1);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_unknown_event() {
        let (registry, calls) = registry();
        registry.register("0xABC", &transfer_abi(), "general").unwrap();
        assert_eq!(
            registry.subscribe("0xABC", "Mint").await,
            Err(RegistryError::UnknownEvent("Mint".to_string()))
        );
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_operations_on_unknown_contract() {
        let (registry, _) = registry();
        let not_found = Err(RegistryError::NotFound("0xABC".to_string()));
        assert_eq!(registry.subscribe("0xABC", "Transfer").await, not_found);
        assert_eq!(registry.unsubscribe("0xABC", "Transfer"), not_found);
        assert_eq!(
            registry.list_all_events("0xABC"),
            Err(RegistryError::NotFound("0xABC".to_string()))
        );
        assert_eq!(
            registry.list_subscribed("0xABC"),
            Err(RegistryError::NotFound("0xABC".to_string()))
        );
    }

    #[test]
    fn test_unsubscribe_never_subscribed() {
        let (registry, calls) = registry();
        registry.register("0xABC", &transfer_abi(), "general").unwrap();
        assert_eq!(
            registry.unsubscribe("0xABC", "Approval"),
            Err(RegistryError::NotSubscribed("Approval".to_string()))
        );
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_exactly_one() {
        let (registry, _) = registry();
        registry.register("0xABC", &transfer_abi(), "general").unwrap();
        registry.subscribe("0xABC", "Transfer").await.unwrap();
        registry.subscribe("0xABC", "Approval").await.unwrap();

        registry.unsubscribe("0xABC", "transfer").unwrap();
        assert_eq!(registry.list_subscribed("0xABC").unwrap(), vec!["Approval"]);
    }

    #[test]
    fn test_empty_listings() {
        let (registry, _) = registry();
        registry.register("0xABC", &[], "general").unwrap();
        assert_eq!(
            registry.list_all_events("0xABC"),
            Err(RegistryError::NoEvents("0xABC".to_string()))
        );
        assert_eq!(
            registry.list_subscribed("0xABC"),
            Err(RegistryError::NoneSubscribed("0xABC".to_string()))
        );
    }

    #[tokio::test]
    async fn test_refused_attach_is_not_recorded() {
        let connection = FakeConnection {
            refuse_attach: true,
            ..Default::default()
        };
        let registry = Registry::new(Arc::new(connection));
        registry.register("0xABC", &transfer_abi(), "general").unwrap();

        assert!(matches!(
            registry.subscribe("0xABC", "Transfer").await,
            Err(RegistryError::ListenerAttach { .. })
        ));
        assert_eq!(
            registry.list_subscribed("0xABC"),
            Err(RegistryError::NoneSubscribed("0xABC".to_string()))
        );

        // a later attempt is not blocked by the failed one
        assert!(matches!(
            registry.subscribe("0xABC", "Transfer").await,
            Err(RegistryError::ListenerAttach { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_during_attach_detaches_listener() {
        let gate = Arc::new(Notify::new());
        let connection = FakeConnection {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let calls = connection.calls.clone();
        let registry = Arc::new(Registry::new(Arc::new(connection)));
        registry.register("0xABC", &transfer_abi(), "general").unwrap();

        let pending = tokio::spawn({
            let registry = registry.clone();
            async move { registry.subscribe("0xABC", "Transfer").await }
        });
        while registry.list_subscribed("0xABC").is_err() {
            tokio::task::yield_now().await;
        }

        assert_eq!(registry.unsubscribe("0xABC", "Transfer").unwrap(), "Transfer");
        gate.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), "Transfer");

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["off 0xABC Transfer", "on 0xABC Transfer", "off 0xABC Transfer"]
        );
        assert_eq!(
            registry.list_subscribed("0xABC"),
            Err(RegistryError::NoneSubscribed("0xABC".to_string()))
        );
    }
}
