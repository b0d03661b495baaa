//! Line-oriented command surface.
//!
//! Parses user commands, runs them against the registry and renders the
//! outcome as reply text. This is the only place that turns a
//! [`RegistryError`] into something meant for a person to read.

use alloy::primitives::Address;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::explorer::InterfaceLookup;
use crate::registry::{Registration, Registry};

pub const HELP: &str = "\
addcontract <address> [channel]   fetch the ABI and start tracking a contract
getcontracts                      list tracked contracts
geteventsall <address>            list every event the contract declares
geteventssubscribed <address>     list the events being listened to
eventsubscribe <address> <event>  start notifying on an event
eventunsubscribe <address> <event> stop notifying on an event
help                              show this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddContract { address: String, channel: Option<String> },
    GetContracts,
    GetEventsAll { address: String },
    GetEventsSubscribed { address: String },
    EventSubscribe { address: String, event: String },
    EventUnsubscribe { address: String, event: String },
    Help,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command {0}, try help")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default().trim_start_matches('/').to_lowercase();
        let args: Vec<String> = parts.map(str::to_string).collect();

        let command = match (name.as_str(), args.as_slice()) {
            ("addcontract", [address]) => Command::AddContract {
                address: address.clone(),
                channel: None,
            },
            ("addcontract", [address, channel]) => Command::AddContract {
                address: address.clone(),
                channel: Some(channel.clone()),
            },
            ("addcontract", _) => {
                return Err(CommandError::Usage("addcontract <address> [channel]"))
            }
            ("getcontracts", []) => Command::GetContracts,
            ("geteventsall", [address]) => Command::GetEventsAll { address: address.clone() },
            ("geteventsall", _) => return Err(CommandError::Usage("geteventsall <address>")),
            ("geteventssubscribed", [address]) => Command::GetEventsSubscribed {
                address: address.clone(),
            },
            ("geteventssubscribed", _) => {
                return Err(CommandError::Usage("geteventssubscribed <address>"))
            }
            ("eventsubscribe", [address, event]) => Command::EventSubscribe {
                address: address.clone(),
                event: event.clone(),
            },
            ("eventsubscribe", _) => {
                return Err(CommandError::Usage("eventsubscribe <address> <eventname>"))
            }
            ("eventunsubscribe", [address, event]) => Command::EventUnsubscribe {
                address: address.clone(),
                event: event.clone(),
            },
            ("eventunsubscribe", _) => {
                return Err(CommandError::Usage("eventunsubscribe <address> <eventname>"))
            }
            ("getcontracts", _) => return Err(CommandError::Usage("getcontracts")),
            ("help", _) => Command::Help,
            _ => return Err(CommandError::Unknown(name)),
        };
        Ok(command)
    }
}

/// A rendered answer; `ephemeral` replies are errors meant only for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub ephemeral: bool,
}

impl Reply {
    fn public(content: impl Into<String>) -> Self {
        Self { content: content.into(), ephemeral: false }
    }

    fn ephemeral(content: impl Into<String>) -> Self {
        Self { content: content.into(), ephemeral: true }
    }
}

impl From<CommandError> for Reply {
    fn from(e: CommandError) -> Self {
        Reply::ephemeral(e.to_string())
    }
}

impl From<RegistryError> for Reply {
    fn from(e: RegistryError) -> Self {
        let content = match e {
            RegistryError::NotFound(_) => {
                "No contract saved under that address, use addcontract first".to_string()
            }
            RegistryError::NoEvents(_) => "This contract has no events".to_string(),
            RegistryError::NoneSubscribed(_) => {
                "Not subscribed to any events on this contract".to_string()
            }
            RegistryError::UnknownEvent(_) => "Cant find event with that name".to_string(),
            RegistryError::AlreadySubscribed(_) => "already listening to that event".to_string(),
            RegistryError::NotSubscribed(_) => "This event hasn't been subscribed to".to_string(),
            RegistryError::InterfaceLookupFailed(_) => {
                "Etherscan failed to provide the abi from this address".to_string()
            }
            RegistryError::InterfaceLookupUnavailable(_) => {
                "Failed to connect to etherscan api".to_string()
            }
            RegistryError::MalformedInterface(reason) => {
                format!("Etherscan returned an unreadable abi: {}", reason)
            }
            RegistryError::ListenerAttach { event, reason } => {
                format!("Could not listen to {}: {}", event, reason)
            }
        };
        Reply::ephemeral(content)
    }
}

/// Addresses that parse are rewritten to checksum form, which is how the
/// chain reports them; anything else is passed through untouched.
pub fn canonical_address(input: &str) -> String {
    Address::from_str(input)
        .map(|a| a.to_checksum(None))
        .unwrap_or_else(|_| input.to_string())
}

pub struct CommandHandler {
    registry: Arc<Registry>,
    explorer: Arc<dyn InterfaceLookup>,
    default_channel: String,
}

impl CommandHandler {
    pub fn new(
        registry: Arc<Registry>,
        explorer: Arc<dyn InterfaceLookup>,
        default_channel: String,
    ) -> Self {
        Self {
            registry,
            explorer,
            default_channel,
        }
    }

    /// Parses and runs one input line.
    pub async fn handle_line(&self, line: &str) -> Reply {
        match line.parse::<Command>() {
            Ok(command) => self.execute(command).await,
            Err(e) => e.into(),
        }
    }

    pub async fn execute(&self, command: Command) -> Reply {
        match command {
            Command::AddContract { address, channel } => {
                let channel = channel.unwrap_or_else(|| self.default_channel.clone());
                let address = canonical_address(&address);
                match self.add_contract(&address, &channel).await {
                    Ok(_) => Reply::public(format!("Successfully added contract:{}", address)),
                    Err(e) => {
                        warn!("addcontract {} failed: {}", address, e);
                        e.into()
                    }
                }
            }
            Command::GetContracts => {
                let contracts = self.registry.list();
                if contracts.is_empty() {
                    Reply::public(
                        "There are no contracts in the list, you can add one with addcontract",
                    )
                } else {
                    Reply::public(contracts.join("\n"))
                }
            }
            Command::GetEventsAll { address } => {
                render_list(self.registry.list_all_events(&canonical_address(&address)))
            }
            Command::GetEventsSubscribed { address } => {
                render_list(self.registry.list_subscribed(&canonical_address(&address)))
            }
            Command::EventSubscribe { address, event } => {
                match self.registry.subscribe(&canonical_address(&address), &event).await {
                    Ok(_) => Reply::public(format!("Subscribed to {}", event)),
                    Err(e) => e.into(),
                }
            }
            Command::EventUnsubscribe { address, event } => {
                match self.registry.unsubscribe(&canonical_address(&address), &event) {
                    Ok(_) => Reply::public(format!("Unsubscribed to {}", event)),
                    Err(e) => e.into(),
                }
            }
            Command::Help => Reply::public(HELP),
        }
    }

    /// Fetches the ABI for `address` and registers it against `channel`.
    pub async fn add_contract(
        &self,
        address: &str,
        channel: &str,
    ) -> Result<Registration, RegistryError> {
        let raw = self.explorer.fetch_abi(address).await?;
        let registration = self.registry.register(address, &raw, channel)?;
        if registration == Registration::AlreadyRegistered {
            if let Ok(existing) = self.registry.find(address) {
                info!(
                    "{} was already registered, still notifying {}",
                    existing.address, existing.notification_target
                );
            }
        }
        Ok(registration)
    }
}

fn render_list(result: Result<Vec<String>, RegistryError>) -> Reply {
    match result {
        Ok(names) => Reply::public(names.join("\n")),
        Err(e) => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::registry::testing::{registry, transfer_abi};
    use async_trait::async_trait;
    use serde_json::Value;

    struct StaticLookup(Result<Vec<Value>>);

    #[async_trait]
    impl InterfaceLookup for StaticLookup {
        async fn fetch_abi(&self, _address: &str) -> Result<Vec<Value>> {
            self.0.clone()
        }
    }

    fn handler(lookup: Result<Vec<Value>>) -> CommandHandler {
        let (registry, _) = registry();
        CommandHandler::new(
            Arc::new(registry),
            Arc::new(StaticLookup(lookup)),
            "general".to_string(),
        )
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "/addcontract 0xabc".parse::<Command>(),
            Ok(Command::AddContract { address: "0xabc".to_string(), channel: None })
        );
        assert_eq!(
            "EventSubscribe 0xabc Transfer".parse::<Command>(),
            Ok(Command::EventSubscribe {
                address: "0xabc".to_string(),
                event: "Transfer".to_string()
            })
        );
        assert_eq!("getcontracts".parse::<Command>(), Ok(Command::GetContracts));
        assert_eq!("help".parse::<Command>(), Ok(Command::Help));
        assert_eq!(
            "eventsubscribe 0xabc".parse::<Command>(),
            Err(CommandError::Usage("eventsubscribe <address> <eventname>"))
        );
        assert_eq!(
            "frobnicate".parse::<Command>(),
            Err(CommandError::Unknown("frobnicate".to_string()))
        );
    }

    #[test]
    fn test_canonical_address() {
        assert_eq!(
            canonical_address("0xdac17f958d2ee523a2206206994597c13d831ec7"),
            "0xdAC17F958D2ee523a2206206994597C13D831ec7"
        );
        assert_eq!(canonical_address("0xABC"), "0xABC");
    }

    #[tokio::test]
    async fn test_full_command_flow() {
        let handler = handler(Ok(transfer_abi()));

        assert_eq!(
            handler.handle_line("getcontracts").await,
            Reply::public("There are no contracts in the list, you can add one with addcontract")
        );
        assert_eq!(
            handler.handle_line("addcontract 0xABC").await,
            Reply::public("Successfully added contract:0xABC")
        );
        assert_eq!(handler.handle_line("getcontracts").await, Reply::public("0xABC"));
        assert_eq!(
            handler.handle_line("geteventsall 0xABC").await,
            Reply::public("Transfer\nApproval")
        );
        assert_eq!(
            handler.handle_line("eventsubscribe 0xABC transfer").await,
            Reply::public("Subscribed to transfer")
        );
        assert_eq!(
            handler.handle_line("eventsubscribe 0xABC Transfer").await,
            Reply::ephemeral("already listening to that event")
        );
        assert_eq!(
            handler.handle_line("geteventssubscribed 0xABC").await,
            Reply::public("Transfer")
        );
        assert_eq!(
            handler.handle_line("eventunsubscribe 0xABC TRANSFER").await,
            Reply::public("Unsubscribed to TRANSFER")
        );
        assert_eq!(
            handler.handle_line("geteventssubscribed 0xABC").await,
            Reply::ephemeral("Not subscribed to any events on this contract")
        );
    }

    #[tokio::test]
    async fn test_lookup_failures_render() {
        let failed = handler(Err(RegistryError::InterfaceLookupFailed("NOTOK".to_string())));
        assert_eq!(
            failed.handle_line("addcontract 0xABC").await,
            Reply::ephemeral("Etherscan failed to provide the abi from this address")
        );
        assert_eq!(
            failed.handle_line("geteventsall 0xABC").await,
            Reply::ephemeral("No contract saved under that address, use addcontract first")
        );

        let down = handler(Err(RegistryError::InterfaceLookupUnavailable("refused".to_string())));
        assert_eq!(
            down.handle_line("addcontract 0xABC").await,
            Reply::ephemeral("Failed to connect to etherscan api")
        );
    }

    #[tokio::test]
    async fn test_add_contract_twice_reports_success() {
        let handler = handler(Ok(transfer_abi()));
        assert_eq!(
            handler.add_contract("0xABC", "general").await,
            Ok(Registration::Added)
        );
        assert_eq!(
            handler.add_contract("0xABC", "other").await,
            Ok(Registration::AlreadyRegistered)
        );
        assert_eq!(
            handler.registry.find("0xABC").unwrap().notification_target,
            "general"
        );
    }
}
