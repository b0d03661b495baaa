mod decode;

use alloy::json_abi::Event;
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy::pubsub::{PubSubFrontend, Subscription};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log};
use async_trait::async_trait;
use eyre::Result as EyreResult;
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{RegistryError, Result};
use crate::events::ContractEvent;

pub use decode::{contract_events, decode_event, format_value, is_foreign_log};

pub type WsProvider = RootProvider<PubSubFrontend>;

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);
const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(60);

/// Source of contract handles; one handle per registered address.
pub trait Connection: Send + Sync {
    /// The form the chain reports `address` in; registry keys use it.
    fn canonical_address(&self, address: &str) -> String {
        address.to_string()
    }

    fn bind(&self, address: &str, raw: &[Value]) -> Result<Arc<dyn ContractHandle>>;
}

/// A live binding to one deployed contract.
///
/// `on` returns only once the node has accepted the subscription. At most one
/// listener per event name is attached at any time, and after `off` returns
/// the listener produces no further events.
#[async_trait]
pub trait ContractHandle: Send + Sync + Debug {
    async fn on(&self, event_name: &str) -> Result<()>;
    fn off(&self, event_name: &str);
}

pub async fn connect(rpc_url: &str) -> EyreResult<WsProvider> {
    let url = Url::parse(rpc_url)?;
    let ws = WsConnect::new(url);
    let provider = ProviderBuilder::new().on_ws(ws).await?;
    Ok(provider)
}

/// Binds contracts against a websocket provider and forwards decoded events to `tx`.
pub struct AlloyConnection {
    provider: Arc<WsProvider>,
    tx: Sender<ContractEvent>,
}

impl AlloyConnection {
    pub fn new(provider: Arc<WsProvider>, tx: Sender<ContractEvent>) -> Self {
        Self { provider, tx }
    }
}

impl Connection for AlloyConnection {
    fn canonical_address(&self, address: &str) -> String {
        Address::from_str(address)
            .map(|a| a.to_checksum(None))
            .unwrap_or_else(|_| address.to_string())
    }

    fn bind(&self, address: &str, raw: &[Value]) -> Result<Arc<dyn ContractHandle>> {
        let address = Address::from_str(address).map_err(|e| {
            RegistryError::MalformedInterface(format!("invalid address {}: {}", address, e))
        })?;
        let events = contract_events(raw)?;

        Ok(Arc::new(AlloyContract {
            address,
            events,
            provider: self.provider.clone(),
            tx: self.tx.clone(),
            listeners: Mutex::new(HashMap::new()),
        }))
    }
}

pub struct AlloyContract {
    address: Address,
    events: Vec<Event>,
    provider: Arc<WsProvider>,
    tx: Sender<ContractEvent>,
    listeners: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl AlloyContract {
    fn named_selectors(&self) -> Vec<B256> {
        self.events
            .iter()
            .filter(|e| !e.anonymous)
            .map(Event::selector)
            .collect()
    }
}

impl Debug for AlloyContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyContract")
            .field("address", &self.address)
            .field("events", &self.events.iter().map(|e| &e.name).collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl ContractHandle for AlloyContract {
    async fn on(&self, event_name: &str) -> Result<()> {
        let event = self
            .events
            .iter()
            .find(|e| e.name == event_name)
            .cloned()
            .ok_or_else(|| RegistryError::ListenerAttach {
                event: event_name.to_string(),
                reason: "event missing from contract ABI".to_string(),
            })?;

        let mut filter = Filter::new()
            .address(self.address)
            .from_block(BlockNumberOrTag::Latest);
        if !event.anonymous {
            filter = filter.event_signature(event.selector());
        }

        let sub = self.provider.subscribe_logs(&filter).await.map_err(|e| {
            RegistryError::ListenerAttach {
                event: event_name.to_string(),
                reason: e.to_string(),
            }
        })?;
        info!("Listening for {} on {}", event.name, self.address);

        let watcher = EventWatcher {
            provider: self.provider.clone(),
            filter,
            named_selectors: self.named_selectors(),
            event,
            tx: self.tx.clone(),
        };
        let task = tokio::spawn(watcher.run(sub));

        if let Ok(mut listeners) = self.listeners.lock() {
            if let Some(previous) = listeners.insert(event_name.to_string(), task) {
                previous.abort();
            }
        }
        Ok(())
    }

    fn off(&self, event_name: &str) {
        if let Ok(mut listeners) = self.listeners.lock() {
            if let Some(task) = listeners.remove(event_name) {
                task.abort();
                debug!("Detached {} listener on {}", event_name, self.address);
            }
        }
    }
}

impl Drop for AlloyContract {
    fn drop(&mut self) {
        if let Ok(listeners) = self.listeners.lock() {
            for task in listeners.values() {
                task.abort();
            }
        }
    }
}

/// Streams logs for one event of one contract until its task is aborted.
///
/// A dropped stream is resubscribed with backoff, so the listener stays
/// attached for as long as the event is subscribed.
struct EventWatcher {
    provider: Arc<WsProvider>,
    filter: Filter,
    named_selectors: Vec<B256>,
    event: Event,
    tx: Sender<ContractEvent>,
}

impl EventWatcher {
    async fn run(self, sub: Subscription<Log>) {
        let mut stream = sub.into_stream();

        loop {
            while let Some(log) = stream.next().await {
                if is_foreign_log(&self.event, log.topics(), &self.named_selectors) {
                    continue;
                }

                let args = match decode_event(&self.event, log.topics(), &log.data().data) {
                    Ok(args) => args,
                    Err(e) => {
                        // anonymous listeners see every log of the contract
                        if !self.event.anonymous {
                            warn!("Failed to decode {} log: {}", self.event.name, e);
                        }
                        continue;
                    }
                };

                let address = log.address().to_checksum(None);
                let payload = ContractEvent::new(address, self.event.name.clone(), args);
                if let Err(e) = self.tx.send(payload).await {
                    error!("Failed to send event: {}", e);
                    return;
                }
            }

            warn!("Log stream for {} ended, resubscribing", self.event.name);
            stream = self.resubscribe().await.into_stream();
        }
    }

    async fn resubscribe(&self) -> Subscription<Log> {
        let mut delay = RESUBSCRIBE_DELAY;
        loop {
            tokio::time::sleep(delay).await;
            match self.provider.subscribe_logs(&self.filter).await {
                Ok(sub) => {
                    info!("Resubscribed to {}", self.event.name);
                    return sub;
                }
                Err(e) => {
                    error!("Failed to resubscribe to {}: {}", self.event.name, e);
                    delay = (delay * 2).min(MAX_RESUBSCRIBE_DELAY);
                }
            }
        }
    }
}
