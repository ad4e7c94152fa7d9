//! Balance deltas and program matching over a [`TransactionRecord`].

use std::collections::BTreeMap;

use serde::Serialize;

use crate::record::{TokenBalance, TransactionRecord};

/// Lamports per SOL.
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Token deltas at or below this magnitude are dust and not reported.
pub const DUST_THRESHOLD: f64 = 0.000_001;

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL
}

/// Native balance change of one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolChange {
    pub account_index: usize,
    pub account: Option<String>,
    pub pre: f64,
    pub post: f64,
    pub delta: f64,
}

/// Token balance change of one `(account, mint)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenChange {
    pub account_index: usize,
    pub mint: String,
    pub owner: Option<String>,
    pub pre: f64,
    pub post: f64,
    pub delta: f64,
}

/// Non-zero SOL deltas for every account present in both balance arrays.
pub fn sol_balance_changes(record: &TransactionRecord) -> Vec<SolChange> {
    record
        .pre_balances
        .iter()
        .zip(&record.post_balances)
        .enumerate()
        .filter(|(_, (pre, post))| pre != post)
        .map(|(index, (&pre, &post))| SolChange {
            account_index: index,
            account: record.account_key(index).map(str::to_string),
            pre: lamports_to_sol(pre),
            post: lamports_to_sol(post),
            delta: (post as f64 - pre as f64) / LAMPORTS_PER_SOL,
        })
        .collect()
}

/// Scale used to round deltas computed from ui amounts, which carry
/// binary-float noise far below any mint's precision.
const UI_DELTA_SCALE: f64 = 1e12;

/// Token deltas keyed by `(account_index, mint)`. A side with no entry
/// counts as zero; deltas within [`DUST_THRESHOLD`] are dropped.
pub fn token_balance_changes(record: &TransactionRecord) -> Vec<TokenChange> {
    type Sides<'a> = (Option<&'a TokenBalance>, Option<&'a TokenBalance>);
    let mut pairs: BTreeMap<(usize, &str), Sides<'_>> = BTreeMap::new();

    for balance in &record.pre_token_balances {
        pairs.entry((balance.account_index, balance.mint.as_str())).or_default().0 = Some(balance);
    }
    for balance in &record.post_token_balances {
        pairs.entry((balance.account_index, balance.mint.as_str())).or_default().1 = Some(balance);
    }

    pairs
        .into_iter()
        .map(|((account_index, mint), (pre, post))| TokenChange {
            account_index,
            mint: mint.to_string(),
            owner: pre.and_then(|b| b.owner.clone()).or_else(|| post.and_then(|b| b.owner.clone())),
            pre: pre.map_or(0.0, |b| b.ui_amount),
            post: post.map_or(0.0, |b| b.ui_amount),
            delta: token_delta(pre, post),
        })
        .filter(|change| change.delta.abs() > DUST_THRESHOLD)
        .collect()
}

/// Exact delta from base units when both sides (or the only side) carry
/// them; otherwise the ui difference rounded clear of float noise.
fn token_delta(pre: Option<&TokenBalance>, post: Option<&TokenBalance>) -> f64 {
    let raw = |side: Option<&TokenBalance>| match side {
        None => Some(0),
        Some(b) => b.raw_amount,
    };
    let decimals = pre.or(post).and_then(|b| b.decimals);

    if let (Some(pre_raw), Some(post_raw), Some(decimals)) = (raw(pre), raw(post), decimals) {
        let units = i128::from(post_raw) - i128::from(pre_raw);
        return units as f64 / 10f64.powi(i32::from(decimals));
    }

    let ui = |side: Option<&TokenBalance>| side.map_or(0.0, |b| b.ui_amount);
    ((ui(post) - ui(pre)) * UI_DELTA_SCALE).round() / UI_DELTA_SCALE
}

/// Configured program ids that the transaction invoked, or that appear in
/// its logs (inner invocations only show up there).
pub fn matched_programs<'a>(record: &TransactionRecord, program_ids: &'a [String]) -> Vec<&'a str> {
    let invoked = record.invoked_program_ids();
    program_ids
        .iter()
        .map(String::as_str)
        .filter(|id| invoked.contains(id) || record.logs.iter().any(|line| line.contains(id)))
        .collect()
}

/// Log lines worth showing an operator: instruction names, swaps, and pool
/// or liquidity actions.
pub fn highlight_logs(record: &TransactionRecord) -> Vec<&str> {
    record
        .logs
        .iter()
        .map(String::as_str)
        .filter(|line| {
            let lower = line.to_lowercase();
            line.contains("Instruction:")
                || lower.contains("swap")
                || lower.contains("pool")
                || lower.contains("liquidity")
        })
        .collect()
}

/// Everything the console shows for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionAnalysis {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub success: bool,
    pub fee_sol: Option<f64>,
    pub compute_units: Option<u64>,
    pub programs: Vec<String>,
    pub sol_changes: Vec<SolChange>,
    pub token_changes: Vec<TokenChange>,
    pub highlights: Vec<String>,
}

impl TransactionAnalysis {
    pub fn from_record(record: &TransactionRecord, program_ids: &[String]) -> Self {
        Self {
            signature: record.signature.clone(),
            slot: record.slot,
            block_time: record.block_time,
            success: record.is_success(),
            fee_sol: record.fee.map(lamports_to_sol),
            compute_units: record.compute_units,
            programs: matched_programs(record, program_ids)
                .into_iter()
                .map(str::to_string)
                .collect(),
            sol_changes: sol_balance_changes(record),
            token_changes: token_balance_changes(record),
            highlights: highlight_logs(record).into_iter().map(str::to_string).collect(),
        }
    }
}
