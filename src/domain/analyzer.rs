//! Transaction Analyzer
//!
//! Classifies a fetched transaction into a threat type with a risk level
//! and confidence. Classification works structurally over decoded
//! instruction types and program IDs, with log-message pattern matching
//! as a fallback signal when instruction parsing is unavailable.
//!
//! Transactions that failed on-chain (non-empty meta error) carry no
//! threat signal and yield no analysis at all.

use serde::{Deserialize, Serialize};

use super::known_programs::{is_known_dex_program, is_token_program};
use super::threat::{ThreatAnalysis, ThreatType};
use crate::ports::models::{ParsedInstruction, ParsedTransaction};

/// Default outflow threshold for large-sell detection, lamports (10 SOL)
pub const DEFAULT_LARGE_SELL_LAMPORTS: u64 = 10_000_000_000;

/// Confidence for a clean structural instruction match
const STRUCTURAL_CONFIDENCE: f64 = 0.85;
/// Confidence when log text corroborates the structural match
const CORROBORATED_CONFIDENCE: f64 = 0.95;
/// Confidence for a log-only fallback match
const LOG_ONLY_CONFIDENCE: f64 = 0.6;

/// Signed balance movement across a transaction's accounts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceChanges {
    /// Sum of signed deltas over all entries
    pub total_change: i128,
    /// Largest single decrease (non-positive)
    pub max_decrease: i128,
    /// Largest single increase (non-negative)
    pub max_increase: i128,
}

impl BalanceChanges {
    pub const ZERO: Self = Self {
        total_change: 0,
        max_decrease: 0,
        max_increase: 0,
    };
}

/// Compute per-account deltas over parallel pre/post balance sequences.
/// Entries beyond the shorter sequence are ignored; two absent
/// sequences yield the all-zero result.
pub fn balance_changes(pre: &[u64], post: &[u64]) -> BalanceChanges {
    let mut changes = BalanceChanges::ZERO;
    for (p, q) in pre.iter().zip(post.iter()) {
        let delta = *q as i128 - *p as i128;
        changes.total_change += delta;
        if delta < changes.max_decrease {
            changes.max_decrease = delta;
        }
        if delta > changes.max_increase {
            changes.max_increase = delta;
        }
    }
    changes
}

/// Tunables for the analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Swap outflow above this many lamports classifies as a large sell
    pub large_sell_lamports: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            large_sell_lamports: DEFAULT_LARGE_SELL_LAMPORTS,
        }
    }
}

/// Stateless transaction classifier
#[derive(Debug, Clone, Default)]
pub struct TransactionAnalyzer {
    config: AnalyzerConfig,
}

impl TransactionAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Classify one fetched transaction. Returns None when the
    /// transaction failed on-chain; malformed instructions degrade to
    /// Unknown rather than erroring.
    pub fn analyze_transaction(&self, tx: &ParsedTransaction) -> Option<ThreatAnalysis> {
        if tx.err.is_some() {
            return None;
        }

        let structural = tx
            .instructions
            .iter()
            .filter_map(|ix| self.classify_instruction(ix))
            .min_by_key(|t| precedence(*t));
        let from_logs = classify_logs(&tx.log_messages);

        let analysis = match (structural, from_logs) {
            (Some(threat), Some(logged)) if threat == logged => {
                ThreatAnalysis::from_type(threat, CORROBORATED_CONFIDENCE)
            }
            (Some(threat), _) => ThreatAnalysis::from_type(threat, STRUCTURAL_CONFIDENCE),
            (None, Some(logged)) => ThreatAnalysis::from_type(logged, LOG_ONLY_CONFIDENCE),
            (None, None) => ThreatAnalysis::unknown(),
        };

        // Balance movement corroborates a large sell: an actual outflow
        // above threshold nudges confidence up.
        let analysis = if analysis.threat_type == ThreatType::LargeSell {
            let changes = balance_changes(&tx.pre_balances, &tx.post_balances);
            if changes.max_decrease.unsigned_abs() > self.config.large_sell_lamports as u128 {
                ThreatAnalysis {
                    confidence: (analysis.confidence + 0.05).min(1.0),
                    ..analysis
                }
            } else {
                analysis
            }
        } else {
            analysis
        };

        Some(analysis.with_tokens(affected_tokens(tx)))
    }

    /// Structural classification of one instruction
    fn classify_instruction(&self, ix: &ParsedInstruction) -> Option<ThreatType> {
        let ix_type = ix.instruction_type.as_deref()?;
        let normalized = ix_type.to_ascii_lowercase().replace('_', "");

        if is_known_dex_program(&ix.program_id) {
            if matches!(
                normalized.as_str(),
                "removeliquidity" | "withdraw" | "withdrawliquidity" | "decreaseliquidity"
            ) {
                return Some(ThreatType::LiquidityRemoval);
            }
            if matches!(normalized.as_str(), "swap" | "swapbasein" | "swapbaseout" | "sell") {
                if self.swap_outflow(ix) > self.config.large_sell_lamports {
                    return Some(ThreatType::LargeSell);
                }
                return None;
            }
        }

        if is_token_program(&ix.program_id) {
            if normalized == "freezeaccount" {
                return Some(ThreatType::FreezeOperation);
            }
            if normalized == "setauthority" {
                // Only mint/freeze authority changes are threats; an
                // account-owner change is not
                return match ix.info.get("authorityType").and_then(|v| v.as_str()) {
                    Some("mintTokens") | Some("freezeAccount") | None => {
                        Some(ThreatType::AuthorityChange)
                    }
                    Some(_) => None,
                };
            }
        }

        None
    }

    /// Outflow amount of a swap instruction from its parsed args
    fn swap_outflow(&self, ix: &ParsedInstruction) -> u64 {
        for key in ["amountIn", "amount_in", "amount", "maxAmountIn"] {
            if let Some(v) = ix.info.get(key) {
                if let Some(n) = v.as_u64() {
                    return n;
                }
                // Some nodes render amounts as strings
                if let Some(n) = v.as_str().and_then(|s| s.parse::<u64>().ok()) {
                    return n;
                }
            }
        }
        0
    }
}

/// Precedence rank, lower wins (spec table order)
fn precedence(threat: ThreatType) -> u8 {
    match threat {
        ThreatType::LiquidityRemoval => 0,
        ThreatType::FreezeOperation => 1,
        ThreatType::AuthorityChange => 2,
        ThreatType::LargeSell => 3,
        ThreatType::Unknown => 4,
    }
}

/// Log-text fallback classification. Swap logs alone carry no size
/// information, so they never classify as a large sell here.
fn classify_logs(logs: &[String]) -> Option<ThreatType> {
    let mut found: Option<ThreatType> = None;
    for line in logs {
        let lower = line.to_ascii_lowercase();
        let hit = if lower.contains("removeliquidity")
            || lower.contains("remove_liquidity")
            || (lower.contains("withdraw") && lower.contains("liquidity"))
        {
            Some(ThreatType::LiquidityRemoval)
        } else if lower.contains("freezeaccount") || lower.contains("freeze_account") {
            Some(ThreatType::FreezeOperation)
        } else if lower.contains("setauthority") || lower.contains("set_authority") {
            Some(ThreatType::AuthorityChange)
        } else {
            None
        };
        if let Some(hit) = hit {
            found = match found {
                Some(prev) if precedence(prev) <= precedence(hit) => Some(prev),
                _ => Some(hit),
            };
        }
    }
    found
}

/// Token mints mentioned in parsed instruction arguments
fn affected_tokens(tx: &ParsedTransaction) -> Vec<String> {
    let mut tokens = Vec::new();
    for ix in &tx.instructions {
        for key in ["mint", "tokenMint", "baseMint", "quoteMint"] {
            if let Some(mint) = ix.info.get(key).and_then(|v| v.as_str()) {
                tokens.push(mint.to_string());
            }
        }
    }
    tokens
}
