mod subscriptions;

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{RegistryError, Result};
use crate::events::{extract_events, EventDefinition};
use crate::listener::{Connection, ContractHandle};

/// Result of a successful `register` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    AlreadyRegistered,
}

/// A tracked contract together with its event catalog and live subscriptions.
#[derive(Debug)]
pub struct ContractEntry {
    pub address: String,
    pub handle: Arc<dyn ContractHandle>,
    pub all_events: Vec<EventDefinition>,
    pub subscribed_events: Vec<EventDefinition>,
    pub notification_target: String,
}

impl ContractEntry {
    pub fn catalog_event(&self, name: &str) -> Option<&EventDefinition> {
        self.all_events.iter().find(|e| e.matches(name))
    }

    pub fn subscribed_position(&self, name: &str) -> Option<usize> {
        self.subscribed_events.iter().position(|e| e.matches(name))
    }
}

/// Read-only view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSummary {
    pub address: String,
    pub notification_target: String,
    pub all_events: Vec<String>,
    pub subscribed_events: Vec<String>,
}

/// What the dispatcher needs to render one incoming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub address: String,
    pub target: String,
    pub event: EventDefinition,
}

/// Every contract the process knows about, keyed by address in registration order.
///
/// All state sits behind one mutex; no operation holds it across an await.
pub struct Registry {
    connection: Arc<dyn Connection>,
    contracts: Mutex<IndexMap<String, ContractEntry>>,
}

impl Registry {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            contracts: Mutex::new(IndexMap::new()),
        }
    }

    fn contracts(&self) -> MutexGuard<'_, IndexMap<String, ContractEntry>> {
        self.contracts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds the contract at `address` unless it is already tracked.
    ///
    /// A known address returns `AlreadyRegistered` before `raw` is looked at.
    pub fn register(&self, address: &str, raw: &[Value], target: &str) -> Result<Registration> {
        let address = self.connection.canonical_address(address);

        let mut contracts = self.contracts();
        if contracts.contains_key(&address) {
            debug!("Contract {} already registered", address);
            return Ok(Registration::AlreadyRegistered);
        }

        let all_events = extract_events(raw)?;
        let handle = self.connection.bind(&address, raw)?;

        info!(
            "Registered contract {} with {} events -> {}",
            address,
            all_events.len(),
            target
        );
        contracts.insert(
            address.clone(),
            ContractEntry {
                address,
                handle,
                all_events,
                subscribed_events: Vec::new(),
                notification_target: target.to_string(),
            },
        );
        Ok(Registration::Added)
    }

    pub fn list(&self) -> Vec<String> {
        self.contracts().keys().cloned().collect()
    }

    /// Runs `f` against the entry for `address` with the registry locked.
    pub(crate) fn with_entry<T>(
        &self,
        address: &str,
        f: impl FnOnce(&mut ContractEntry) -> Result<T>,
    ) -> Result<T> {
        let mut contracts = self.contracts();
        let entry = contracts
            .get_mut(address)
            .ok_or_else(|| RegistryError::NotFound(address.to_string()))?;
        f(entry)
    }

    pub fn find(&self, address: &str) -> Result<ContractSummary> {
        self.with_entry(address, |entry| {
            Ok(ContractSummary {
                address: entry.address.clone(),
                notification_target: entry.notification_target.clone(),
                all_events: entry.all_events.iter().map(|e| e.name.clone()).collect(),
                subscribed_events: entry
                    .subscribed_events
                    .iter()
                    .map(|e| e.name.clone())
                    .collect(),
            })
        })
    }

    /// Looks up the subscribed definition for an incoming event.
    ///
    /// The event name must match the canonical name exactly, since listeners
    /// are attached under it.
    pub fn resolve(&self, address: &str, event_name: &str) -> Option<Route> {
        let contracts = self.contracts();
        let entry = contracts.get(address)?;
        let event = entry
            .subscribed_events
            .iter()
            .find(|e| e.name == event_name)?;
        Some(Route {
            address: entry.address.clone(),
            target: entry.notification_target.clone(),
            event: event.clone(),
        })
    }
}
