//! ENS name resolution over plain JSON-RPC `eth_call`.

use std::time::Duration;

use alloy_primitives::{Address, B256, address, hex, keccak256};
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{ResolveError, RpcError};
use crate::resolver::{AddressResolver, parse_literal_address};

/// ENS registry, same address on mainnet and the main testnets.
const ENS_REGISTRY: Address = address!("00000000000C2E074eC69A0dFb2997BA6C7d2e1e");
/// `resolver(bytes32)`
const RESOLVER_SELECTOR: [u8; 4] = [0x01, 0x78, 0xb8, 0xbf];
/// `addr(bytes32)`
const ADDR_SELECTOR: [u8; 4] = [0x3b, 0x3b, 0x57, 0xde];

#[derive(Debug, Deserialize)]
struct EthCallResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Resolves `*.eth`-style names against an Ethereum JSON-RPC node.
#[derive(Debug, Clone)]
pub struct EnsResolver {
    client: reqwest::Client,
    rpc_url: String,
    registry: Address,
}

impl EnsResolver {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            rpc_url: rpc_url.into(),
            registry: ENS_REGISTRY,
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ResolveError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": to.to_checksum(None), "data": hex::encode_prefixed(&data) },
                "latest"
            ],
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ResolveError::Rpc {
                endpoint: self.rpc_url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Rpc {
                endpoint: self.rpc_url.clone(),
                reason: format!("HTTP {status}"),
            });
        }

        let parsed: EthCallResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::MalformedResponse(e.to_string()))?;
        if let Some(error) = parsed.error {
            return Err(ResolveError::Rpc {
                endpoint: self.rpc_url.clone(),
                reason: error.to_string(),
            });
        }
        let raw = parsed
            .result
            .ok_or_else(|| ResolveError::MalformedResponse("missing result".to_string()))?;
        hex::decode(&raw).map_err(|e| ResolveError::MalformedResponse(format!("{raw}: {e}")))
    }

    async fn call_with_node(
        &self,
        to: Address,
        selector: [u8; 4],
        node: B256,
    ) -> Result<Option<Address>, ResolveError> {
        let mut data = selector.to_vec();
        data.extend_from_slice(node.as_slice());
        let word = self.eth_call(to, data).await?;
        Ok(address_from_word(&word))
    }
}

/// EIP-137 namehash. Labels are lowercased; full UTS-46 normalization is
/// left to the caller.
pub fn namehash(name: &str) -> Result<B256, ResolveError> {
    let name = name.trim().to_lowercase();
    let mut node = B256::ZERO;
    if name.is_empty() {
        return Ok(node);
    }
    for label in name.rsplit('.') {
        if label.is_empty() {
            return Err(ResolveError::InvalidName(name.clone()));
        }
        let label_hash = keccak256(label.as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(node.as_slice());
        buf[32..].copy_from_slice(label_hash.as_slice());
        node = keccak256(buf);
    }
    Ok(node)
}

/// Right-most 20 bytes of an ABI word; `None` for empty or zero results.
fn address_from_word(word: &[u8]) -> Option<Address> {
    if word.len() < 32 {
        return None;
    }
    let address = Address::from_slice(&word[12..32]);
    (!address.is_zero()).then_some(address)
}

#[async_trait]
impl AddressResolver for EnsResolver {
    async fn resolve(&self, input: &str) -> Result<Option<Address>, ResolveError> {
        if let Some(address) = parse_literal_address(input) {
            return Ok(Some(address));
        }
        if !input.contains('.') {
            return Ok(None);
        }

        let node = namehash(input)?;
        let Some(resolver) = self
            .call_with_node(self.registry, RESOLVER_SELECTOR, node)
            .await?
        else {
            tracing::debug!(name = input, "No ENS resolver set");
            return Ok(None);
        };
        let resolved = self.call_with_node(resolver, ADDR_SELECTOR, node).await?;
        tracing::debug!(name = input, resolved = ?resolved, "ENS lookup finished");
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namehash_matches_eip137_vectors() {
        assert_eq!(namehash("").unwrap(), B256::ZERO);
        assert_eq!(
            hex::encode(namehash("eth").unwrap()),
            "93cdeb708b7545dc668eb9280176169d1c33cfd8ed6f04690a0bcc88a93fc4ae"
        );
        assert_eq!(
            hex::encode(namehash("foo.eth").unwrap()),
            "de9b09fd7c5f901e23a3f19fecc54828e9c848539801e86591bd9801b019f84f"
        );
    }

    #[test]
    fn namehash_rejects_empty_labels() {
        assert!(matches!(
            namehash("foo..eth"),
            Err(ResolveError::InvalidName(_))
        ));
    }

    #[test]
    fn zero_word_is_not_an_address() {
        assert_eq!(address_from_word(&[0u8; 32]), None);
        assert_eq!(address_from_word(&[]), None);
        let mut word = [0u8; 32];
        word[31] = 1;
        assert_eq!(
            address_from_word(&word),
            Some(Address::with_last_byte(1))
        );
    }

    #[tokio::test]
    async fn literal_addresses_skip_the_network() {
        let resolver = EnsResolver::new("http://127.0.0.1:1", Duration::from_millis(50));
        let resolved = resolver
            .resolve("0x0000000000000000000000000000000000000001")
            .await
            .unwrap();
        assert_eq!(resolved, Some(Address::with_last_byte(1)));
        assert_eq!(resolver.resolve("notaname").await.unwrap(), None);
    }
}
