//! Operator console output.

use std::fmt::Write;

use chainwatch_core::analysis::TransactionAnalysis;
use chainwatch_core::handler::TransactionAnalyzer;
use chainwatch_core::record::TransactionRecord;

const RULE: &str = "──────────────────────────────────────────────────────────────";

/// Prints one block per enriched transaction to stdout.
pub struct ConsoleAnalyzer {
    program_ids: Vec<String>,
}

impl ConsoleAnalyzer {
    pub fn new(program_ids: Vec<String>) -> Self {
        Self { program_ids }
    }
}

impl TransactionAnalyzer for ConsoleAnalyzer {
    fn analyze(&self, record: TransactionRecord) {
        let analysis = TransactionAnalysis::from_record(&record, &self.program_ids);
        println!("{}", render(&analysis));
    }
}

fn render(a: &TransactionAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "  Signature:  {}", a.signature);
    let _ = writeln!(out, "  Slot:       {}", a.slot);
    let _ = writeln!(
        out,
        "  Block time: {}",
        a.block_time.map_or_else(|| "unknown".to_string(), |t| t.to_string())
    );
    let _ = writeln!(out, "  Status:     {}", if a.success { "success" } else { "failed" });
    if let Some(fee) = a.fee_sol {
        let _ = writeln!(out, "  Fee:        {fee:.9} SOL");
    }
    if let Some(units) = a.compute_units {
        let _ = writeln!(out, "  Compute:    {units} units");
    }

    if !a.programs.is_empty() {
        let _ = writeln!(out, "\n  Programs:");
        for program in &a.programs {
            let _ = writeln!(out, "    {program}");
        }
    }

    if !a.sol_changes.is_empty() {
        let _ = writeln!(out, "\n  SOL changes:");
        for c in &a.sol_changes {
            let account = c.account.as_deref().unwrap_or("?");
            let _ = writeln!(
                out,
                "    [{:>2}] {account}  {:.9} -> {:.9}  ({:+.9})",
                c.account_index, c.pre, c.post, c.delta
            );
        }
    }

    if !a.token_changes.is_empty() {
        let _ = writeln!(out, "\n  Token changes:");
        for c in &a.token_changes {
            let owner = c.owner.as_deref().unwrap_or("?");
            let _ = writeln!(
                out,
                "    [{:>2}] mint {}  owner {owner}  {} -> {}  ({:+})",
                c.account_index, c.mint, c.pre, c.post, c.delta
            );
        }
    }

    if !a.highlights.is_empty() {
        let _ = writeln!(out, "\n  Logs:");
        for line in &a.highlights {
            let _ = writeln!(out, "    {line}");
        }
    }

    out.push_str(RULE);
    out
}
