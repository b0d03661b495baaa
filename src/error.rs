use thiserror::Error;

/// Outcome of a failed registry, subscription or lookup operation.
///
/// None of these are fatal. The command surface decides how each one reads
/// to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no contract registered under {0}")]
    NotFound(String),

    #[error("malformed interface description: {0}")]
    MalformedInterface(String),

    #[error("event {0} is not part of the contract interface")]
    UnknownEvent(String),

    #[error("already listening to {0}")]
    AlreadySubscribed(String),

    #[error("not subscribed to {0}")]
    NotSubscribed(String),

    #[error("contract {0} declares no events")]
    NoEvents(String),

    #[error("no events subscribed on {0}")]
    NoneSubscribed(String),

    #[error("interface lookup failed: {0}")]
    InterfaceLookupFailed(String),

    #[error("interface lookup unavailable: {0}")]
    InterfaceLookupUnavailable(String),

    #[error("could not attach listener for {event}: {reason}")]
    ListenerAttach { event: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
