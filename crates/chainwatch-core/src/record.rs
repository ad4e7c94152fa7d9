//! The enriched transaction handed to analyzers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A token balance entry, keyed by account position and mint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: String,
    pub owner: Option<String>,
    /// Balance in whole-token units (decimals already applied).
    pub ui_amount: f64,
    /// Balance in base units, when the node reported it.
    #[serde(default)]
    pub raw_amount: Option<u64>,
    #[serde(default)]
    pub decimals: Option<u8>,
}

/// An executed instruction, with accounts referenced by position in
/// [`TransactionRecord::account_keys`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledInstruction {
    pub program_id_index: usize,
    pub accounts: Vec<usize>,
    pub data: String,
}

/// A fully populated transaction.
///
/// Built once per successful fetch and never mutated afterwards; consumed by
/// a single analyzer call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub signature: String,
    pub slot: u64,
    /// Epoch seconds; nodes do not always know it.
    pub block_time: Option<i64>,
    /// Opaque error payload when the transaction failed on-chain.
    pub failure: Option<Value>,
    pub fee: Option<u64>,
    pub compute_units: Option<u64>,
    pub logs: Vec<String>,
    pub account_keys: Vec<String>,
    /// Lamports per account position, before execution.
    pub pre_balances: Vec<u64>,
    /// Lamports per account position, after execution.
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
    pub instructions: Vec<CompiledInstruction>,
}

impl TransactionRecord {
    /// A record with only the identifying fields set.
    pub fn new(signature: impl Into<String>, slot: u64) -> Self {
        Self {
            signature: signature.into(),
            slot,
            block_time: None,
            failure: None,
            fee: None,
            compute_units: None,
            logs: Vec::new(),
            account_keys: Vec::new(),
            pre_balances: Vec::new(),
            post_balances: Vec::new(),
            pre_token_balances: Vec::new(),
            post_token_balances: Vec::new(),
            instructions: Vec::new(),
        }
    }

    /// `true` when the transaction executed without error.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Address at `index`, if the key list covers it.
    pub fn account_key(&self, index: usize) -> Option<&str> {
        self.account_keys.get(index).map(String::as_str)
    }

    /// Program ids invoked by top-level instructions, in execution order,
    /// without duplicates.
    pub fn invoked_program_ids(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for ix in &self.instructions {
            if let Some(program) = self.account_key(ix.program_id_index) {
                if !seen.contains(&program) {
                    seen.push(program);
                }
            }
        }
        seen
    }
}
