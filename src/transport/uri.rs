//! WalletConnect v2 pairing URI parsing.
//!
//! Format: `wc:<topic>@2?relay-protocol=irn&symKey=<64 hex>[&expiryTimestamp=<unix secs>]`.

use std::str::FromStr;

use secrecy::SecretString;

use crate::error::TransportError;

const SUPPORTED_VERSION: u32 = 2;

/// A parsed, one-time-use pairing invitation.
#[derive(Debug, Clone)]
pub struct PairingUri {
    pub topic: String,
    pub version: u32,
    pub relay_protocol: String,
    pub sym_key: SecretString,
    pub expiry_timestamp: Option<i64>,
}

impl PairingUri {
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TransportError::InvalidUri("pairing URI is empty".to_string()));
        }

        let parsed =
            url::Url::parse(raw).map_err(|e| TransportError::InvalidUri(format!("{e}")))?;
        if parsed.scheme() != "wc" {
            return Err(TransportError::InvalidUri(format!(
                "expected 'wc:' scheme, got '{}:'",
                parsed.scheme()
            )));
        }

        let (topic, version) = parsed.path().split_once('@').ok_or_else(|| {
            TransportError::InvalidUri("missing '@<version>' after topic".to_string())
        })?;
        let version: u32 = version
            .parse()
            .map_err(|_| TransportError::InvalidUri(format!("invalid version '{version}'")))?;
        if version != SUPPORTED_VERSION {
            return Err(TransportError::InvalidUri(format!(
                "unsupported protocol version {version}; only v{SUPPORTED_VERSION} pairings are accepted"
            )));
        }
        if topic.is_empty() || !topic.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TransportError::InvalidUri(
                "topic must be a non-empty hex string".to_string(),
            ));
        }

        let mut relay_protocol = None;
        let mut sym_key = None;
        let mut expiry_timestamp = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "relay-protocol" => relay_protocol = Some(value.into_owned()),
                "symKey" => sym_key = Some(value.into_owned()),
                "expiryTimestamp" => {
                    expiry_timestamp = Some(value.parse::<i64>().map_err(|_| {
                        TransportError::InvalidUri(format!("invalid expiryTimestamp '{value}'"))
                    })?)
                }
                _ => {}
            }
        }

        let sym_key = sym_key
            .ok_or_else(|| TransportError::InvalidUri("missing symKey parameter".to_string()))?;
        if sym_key.len() != 64 || !sym_key.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TransportError::InvalidUri(
                "symKey must be 32 bytes of hex".to_string(),
            ));
        }

        Ok(Self {
            topic: topic.to_ascii_lowercase(),
            version,
            relay_protocol: relay_protocol.unwrap_or_else(|| "irn".to_string()),
            sym_key: SecretString::from(sym_key),
            expiry_timestamp,
        })
    }

    /// True if the invitation carries an expiry that is already in the past.
    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.expiry_timestamp
            .map(|expiry| expiry <= now_unix)
            .unwrap_or(false)
    }
}

impl FromStr for PairingUri {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
