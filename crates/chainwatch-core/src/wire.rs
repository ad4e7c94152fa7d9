//! Serde model of a node's `getTransaction` result.
//!
//! Every optional field has an explicit absent representation; conversion to
//! [`TransactionRecord`] never faults on a missing piece.

use serde::Deserialize;
use serde_json::Value;

use crate::record::{CompiledInstruction, TokenBalance, TransactionRecord};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTransaction {
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    pub meta: WireMeta,
    pub transaction: WireEnvelope,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub fee: Option<u64>,
    #[serde(default)]
    pub compute_units_consumed: Option<u64>,
    #[serde(default)]
    pub log_messages: Option<Vec<String>>,
    #[serde(default)]
    pub pre_balances: Vec<u64>,
    #[serde(default)]
    pub post_balances: Vec<u64>,
    #[serde(default)]
    pub pre_token_balances: Option<Vec<WireTokenBalance>>,
    #[serde(default)]
    pub post_token_balances: Option<Vec<WireTokenBalance>>,
    #[serde(default)]
    pub loaded_addresses: Option<WireLoadedAddresses>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireLoadedAddresses {
    #[serde(default)]
    pub writable: Vec<String>,
    #[serde(default)]
    pub readonly: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTokenBalance {
    pub account_index: usize,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub ui_token_amount: WireTokenAmount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTokenAmount {
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub ui_amount: Option<f64>,
    #[serde(default)]
    pub ui_amount_string: Option<String>,
}

impl WireTokenAmount {
    /// Whole-token amount, preferring the node's own decimal string.
    pub fn value(&self) -> f64 {
        if let Some(v) = self.ui_amount_string.as_deref().and_then(|s| s.parse().ok()) {
            return v;
        }
        if let Some(v) = self.ui_amount {
            return v;
        }
        self.amount
            .as_deref()
            .and_then(|a| a.parse::<f64>().ok())
            .map(|raw| raw / 10f64.powi(i32::from(self.decimals.unwrap_or(0))))
            .unwrap_or(0.0)
    }

    /// Base-unit amount, if present and integral.
    pub fn raw(&self) -> Option<u64> {
        self.amount.as_deref().and_then(|a| a.parse().ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireEnvelope {
    #[serde(default)]
    pub message: WireMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(default)]
    pub account_keys: Vec<WireAccountKey>,
    #[serde(default)]
    pub instructions: Vec<WireInstruction>,
}

/// `json` encoding gives bare strings, `jsonParsed` gives objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireAccountKey {
    Plain(String),
    Parsed { pubkey: String },
}

impl WireAccountKey {
    pub fn pubkey(&self) -> &str {
        match self {
            Self::Plain(key) | Self::Parsed { pubkey: key } => key,
        }
    }
}

/// Compiled instructions carry indices; parsed ones (from `jsonParsed`)
/// carry names and are kept only as opaque values.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireInstruction {
    #[serde(rename_all = "camelCase")]
    Compiled {
        program_id_index: usize,
        #[serde(default)]
        accounts: Vec<usize>,
        #[serde(default)]
        data: String,
    },
    Other(Value),
}

impl WireTransaction {
    pub fn into_record(self, signature: &str) -> TransactionRecord {
        let meta = self.meta;
        let envelope = self.transaction;

        let mut account_keys: Vec<String> = envelope
            .message
            .account_keys
            .iter()
            .map(|k| k.pubkey().to_string())
            .collect();
        if let Some(loaded) = meta.loaded_addresses {
            account_keys.extend(loaded.writable);
            account_keys.extend(loaded.readonly);
        }

        let instructions = envelope
            .message
            .instructions
            .into_iter()
            .filter_map(|ix| match ix {
                WireInstruction::Compiled { program_id_index, accounts, data } => {
                    Some(CompiledInstruction { program_id_index, accounts, data })
                }
                WireInstruction::Other(_) => None,
            })
            .collect();

        TransactionRecord {
            signature: signature.to_string(),
            slot: self.slot,
            block_time: self.block_time,
            failure: meta.err,
            fee: meta.fee,
            compute_units: meta.compute_units_consumed,
            logs: meta.log_messages.unwrap_or_default(),
            account_keys,
            pre_balances: meta.pre_balances,
            post_balances: meta.post_balances,
            pre_token_balances: token_balances(meta.pre_token_balances),
            post_token_balances: token_balances(meta.post_token_balances),
            instructions,
        }
    }
}

fn token_balances(entries: Option<Vec<WireTokenBalance>>) -> Vec<TokenBalance> {
    entries
        .unwrap_or_default()
        .into_iter()
        .map(|b| TokenBalance {
            account_index: b.account_index,
            ui_amount: b.ui_token_amount.value(),
            raw_amount: b.ui_token_amount.raw(),
            decimals: b.ui_token_amount.decimals,
            mint: b.mint,
            owner: b.owner,
        })
        .collect()
}

/// Parse a `getTransaction` result value. `null` means "not available yet"
/// and yields `Ok(None)`; any other value must carry `meta` and
/// `transaction`, so foreign shapes surface as errors.
pub fn record_from_value(
    signature: &str,
    value: Value,
) -> Result<Option<TransactionRecord>, serde_json::Error> {
    if value.is_null() {
        return Ok(None);
    }
    let wire: WireTransaction = serde_json::from_value(value)?;
    Ok(Some(wire.into_record(signature)))
}
