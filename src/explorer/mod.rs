use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::ExplorerConfig;
use crate::error::{RegistryError, Result};

/// Turns a contract address into its raw interface description.
#[async_trait]
pub trait InterfaceLookup: Send + Sync {
    async fn fetch_abi(&self, address: &str) -> Result<Vec<Value>>;
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: Value,
}

/// Etherscan `contract/getabi` client.
pub struct EtherscanClient {
    client: Client,
    config: ExplorerConfig,
}

impl EtherscanClient {
    pub fn new(config: ExplorerConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl InterfaceLookup for EtherscanClient {
    async fn fetch_abi(&self, address: &str) -> Result<Vec<Value>> {
        debug!("Fetching ABI for {}", address);

        let response = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("module", "contract"),
                ("action", "getabi"),
                ("address", address),
                ("apikey", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                error!("Failed to reach explorer: {}", e);
                RegistryError::InterfaceLookupUnavailable(e.to_string())
            })?;

        let body: EtherscanResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::InterfaceLookupUnavailable(e.to_string()))?;

        if body.status != "1" {
            let reason = match body.result {
                Value::String(s) if !s.is_empty() => s,
                _ => body.message,
            };
            return Err(RegistryError::InterfaceLookupFailed(reason));
        }

        // the ABI arrives as a JSON document encoded inside a string
        match body.result {
            Value::String(abi) => serde_json::from_str(&abi)
                .map_err(|e| RegistryError::MalformedInterface(e.to_string())),
            Value::Array(entries) => Ok(entries),
            other => Err(RegistryError::MalformedInterface(format!(
                "unexpected result: {}",
                other
            ))),
        }
    }
}
