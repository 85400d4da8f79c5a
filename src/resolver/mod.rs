//! Address resolution: human-readable name or literal hex → address.

mod ens;

use std::collections::HashMap;

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::error::ResolveError;

pub use self::ens::EnsResolver;

/// Resolution capability the broker depends on.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve a name or literal address. `Ok(None)` means "not found".
    async fn resolve(&self, input: &str) -> Result<Option<Address>, ResolveError>;
}

/// Accepts `0x` + 40 hex digits. Mixed-case input must carry a valid
/// EIP-55 checksum; all-lowercase or all-uppercase input is accepted as is.
pub fn is_well_formed_address(text: &str) -> bool {
    let text = text.trim();
    let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) else {
        return false;
    };
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return false;
    }
    let has_lower = hex.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = hex.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(format!("0x{hex}"), None).is_ok();
    }
    true
}

/// Parse a well-formed literal address.
pub fn parse_literal_address(text: &str) -> Option<Address> {
    if !is_well_formed_address(text) {
        return None;
    }
    let text = text.trim();
    text[2..].parse::<Address>().ok()
}

/// Resolver with no network access: literal addresses plus a fixed name table.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    names: HashMap<String, Address>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &str, address: Address) -> Self {
        self.names.insert(name.trim().to_ascii_lowercase(), address);
        self
    }
}

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self, input: &str) -> Result<Option<Address>, ResolveError> {
        if let Some(address) = self.names.get(&input.trim().to_ascii_lowercase()) {
            return Ok(Some(*address));
        }
        Ok(parse_literal_address(input))
    }
}
