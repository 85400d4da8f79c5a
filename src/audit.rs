//! Append-only audit trail of transaction requests the broker accepted.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Transaction fields as carried in the first `eth_sendTransaction` param.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFields {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    /// Hex quantity exactly as received on the wire.
    #[serde(default)]
    pub value: Option<String>,
}

impl TransactionFields {
    /// Extract the fields from a JSON-RPC params array (`[{from, to, ...}]`).
    pub fn from_params(params: &serde_json::Value) -> Result<Self, String> {
        let first = params
            .as_array()
            .and_then(|items| items.first())
            .or_else(|| params.is_object().then_some(params))
            .ok_or_else(|| "expected a transaction object as the first param".to_string())?;
        let fields: Self = serde_json::from_value(first.clone())
            .map_err(|e| format!("invalid transaction object: {e}"))?;
        if let Some(ref value) = fields.value {
            hex_to_decimal(value)?;
        }
        Ok(fields)
    }

    /// Decimal rendering of `value`; a missing value counts as zero.
    pub fn decimal_value(&self) -> Result<String, String> {
        match self.value.as_deref() {
            Some(value) => hex_to_decimal(value),
            None => Ok("0".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: u64,
    pub from: String,
    pub to: String,
    pub data: String,
    /// Decimal string converted from the wire's hex quantity.
    pub value: String,
    pub received_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn from_fields(id: u64, fields: &TransactionFields) -> Result<Self, String> {
        Ok(Self {
            id,
            from: fields.from.clone(),
            to: fields.to.clone().unwrap_or_default(),
            data: fields.data.clone().unwrap_or_else(|| "0x".to_string()),
            value: fields.decimal_value()?,
            received_at: Utc::now(),
        })
    }
}

/// Convert a hex quantity (`0x`-prefixed, up to 256 bits) to decimal.
pub fn hex_to_decimal(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| format!("value '{value}' is not a 0x-prefixed hex quantity"))?;
    if digits.is_empty() {
        return Ok("0".to_string());
    }
    U256::from_str_radix(digits, 16)
        .map(|v| v.to_string())
        .map_err(|e| format!("value '{value}' is not a valid hex quantity: {e}"))
}

/// Convert a decimal string back to a minimal `0x` hex quantity.
pub fn decimal_to_hex(value: &str) -> Result<String, String> {
    U256::from_str_radix(value.trim(), 10)
        .map(|v| format!("0x{v:x}"))
        .map_err(|e| format!("value '{value}' is not a valid decimal quantity: {e}"))
}

/// Newest-first list of transaction records, deduplicated by request id.
#[derive(Debug, Default)]
pub struct AuditLog {
    records: Mutex<Vec<TransactionRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record unless one with the same id exists. Returns true if added.
    pub async fn record(&self, record: TransactionRecord) -> bool {
        let mut records = self.records.lock().await;
        if records.iter().any(|r| r.id == record.id) {
            return false;
        }
        records.insert(0, record);
        true
    }

    pub async fn list(&self) -> Vec<TransactionRecord> {
        self.records.lock().await.clone()
    }

    pub async fn get(&self, id: u64) -> Option<TransactionRecord> {
        self.records.lock().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Operator-initiated wipe.
    pub async fn clear(&self) {
        let mut records = self.records.lock().await;
        tracing::info!("Clearing {} transaction record(s)", records.len());
        records.clear();
    }
}
