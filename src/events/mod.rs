pub mod abi;

use serde::{Deserialize, Serialize};

pub use abi::extract_events;

/// One positional argument of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub indexed: bool,
}

/// An event a contract can emit, as declared in its interface description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub name: String,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(rename = "inputs")]
    pub parameters: Vec<EventParameter>,
}

impl EventDefinition {
    /// Event names compare case-insensitively everywhere in the registry.
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Display name of the parameter at `index`; unnamed parameters get `arg<i>`.
    pub fn parameter_label(&self, index: usize) -> String {
        match self.parameters.get(index) {
            Some(p) if !p.name.is_empty() => p.name.clone(),
            _ => format!("arg{}", index),
        }
    }
}

/// An event payload pushed by the blockchain connection.
///
/// `args` are already rendered to text and ordered like the declared parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub address: String,
    pub name: String,
    pub args: Vec<String>,
}

impl ContractEvent {
    pub fn new(address: impl Into<String>, name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            args,
        }
    }
}
