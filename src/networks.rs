//! Primary EVM networks offered for the chain selection.

/// Chain id and display name of a selectable network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Network {
    pub chain_id: u64,
    pub name: &'static str,
}

pub const DEFAULT_CHAIN_ID: u64 = 1;

pub const PRIMARY_NETWORKS: &[Network] = &[
    Network { chain_id: 1, name: "Ethereum Mainnet" },
    Network { chain_id: 42161, name: "Arbitrum One" },
    Network { chain_id: 43114, name: "Avalanche C-Chain" },
    Network { chain_id: 56, name: "BNB Smart Chain Mainnet" },
    Network { chain_id: 250, name: "Fantom Opera" },
    Network { chain_id: 5, name: "Goerli" },
    Network { chain_id: 100, name: "Gnosis" },
    Network { chain_id: 10, name: "OP Mainnet" },
    Network { chain_id: 137, name: "Polygon Mainnet" },
];

pub fn by_chain_id(chain_id: u64) -> Option<&'static Network> {
    PRIMARY_NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

/// First network whose name contains `query` (case-insensitive).
pub fn find_by_name(query: &str) -> Option<&'static Network> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }
    PRIMARY_NETWORKS
        .iter()
        .find(|n| n.name.to_lowercase().contains(&query))
}

/// Accepts a numeric chain id, a CAIP-2 `eip155:<id>` identifier, or a
/// network name fragment.
pub fn parse_chain(value: &str) -> Option<u64> {
    let value = value.trim();
    let numeric = value.strip_prefix("eip155:").unwrap_or(value);
    if let Ok(id) = numeric.parse::<u64>() {
        return Some(id);
    }
    find_by_name(value).map(|n| n.chain_id)
}

/// CAIP-2 identifier for an EVM chain id.
pub fn caip2(chain_id: u64) -> String {
    format!("eip155:{chain_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookup_is_case_insensitive_substring() {
        assert_eq!(find_by_name("polygon").map(|n| n.chain_id), Some(137));
        assert_eq!(find_by_name("ARBITRUM").map(|n| n.chain_id), Some(42161));
        assert_eq!(find_by_name("nowhere"), None);
    }

    #[test]
    fn parse_chain_accepts_ids_caip2_and_names() {
        assert_eq!(parse_chain("10"), Some(10));
        assert_eq!(parse_chain("eip155:137"), Some(137));
        assert_eq!(parse_chain("gnosis"), Some(100));
        assert_eq!(parse_chain(""), None);
        assert_eq!(caip2(1), "eip155:1");
        assert_eq!(by_chain_id(56).map(|n| n.name), Some("BNB Smart Chain Mainnet"));
    }
}
