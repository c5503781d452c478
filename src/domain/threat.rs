//! Threat Model
//!
//! Core types produced by the transaction analyzer and consumed by the
//! execution service: threat classification, risk levels, and the
//! threat-detected event that travels over the event bus.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Score at or above which a threat is CRITICAL
pub const CRITICAL_SCORE: u32 = 100;
/// Score at or above which a threat is HIGH
pub const HIGH_SCORE: u32 = 75;
/// Score at or above which a threat is MEDIUM
pub const MEDIUM_SCORE: u32 = 50;

/// Current Unix time in milliseconds
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Risk level attached to a threat or configured as a protection threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Band a numeric risk score into a level
    pub fn from_score(score: u32) -> Self {
        if score >= CRITICAL_SCORE {
            RiskLevel::Critical
        } else if score >= HIGH_SCORE {
            RiskLevel::High
        } else if score >= MEDIUM_SCORE {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Priority-fee multiplier applied when responding to a threat of this level
    pub fn fee_multiplier(&self) -> f64 {
        match self {
            RiskLevel::Critical => 3.0,
            RiskLevel::High => 2.0,
            RiskLevel::Medium => 1.5,
            RiskLevel::Low => 1.0,
        }
    }

    /// Human-readable label
    pub fn description(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "CRITICAL - immediate value destruction likely",
            RiskLevel::High => "HIGH - authority abuse in progress",
            RiskLevel::Medium => "MEDIUM - significant sell pressure",
            RiskLevel::Low => "LOW - no actionable threat",
        }
    }
}

/// Classification of a pending transaction's threat to protected holders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatType {
    /// Liquidity being pulled from a pool on a known DEX
    LiquidityRemoval,
    /// Mint or freeze authority being changed on the token program
    AuthorityChange,
    /// A swap whose outflow side exceeds the large-amount threshold
    LargeSell,
    /// A freeze-account instruction on the token program
    FreezeOperation,
    /// Structurally recognized but benign, or unrecognized
    Unknown,
}

impl ThreatType {
    /// Base risk score before corroborating signals
    pub fn base_score(&self) -> u32 {
        match self {
            ThreatType::LiquidityRemoval => 100,
            ThreatType::FreezeOperation => 90,
            ThreatType::AuthorityChange => 80,
            ThreatType::LargeSell => 60,
            ThreatType::Unknown => 10,
        }
    }

    /// Risk level assigned to a clean structural match of this pattern.
    /// Freeze operations are CRITICAL despite a sub-100 score: a freeze
    /// leaves holders unable to exit at all.
    pub fn base_level(&self) -> RiskLevel {
        match self {
            ThreatType::LiquidityRemoval | ThreatType::FreezeOperation => RiskLevel::Critical,
            ThreatType::AuthorityChange => RiskLevel::High,
            ThreatType::LargeSell => RiskLevel::Medium,
            ThreatType::Unknown => RiskLevel::Low,
        }
    }

    /// Every classified type except Unknown is dangerous
    pub fn is_dangerous(&self) -> bool {
        !matches!(self, ThreatType::Unknown)
    }
}

/// Result of classifying one fetched transaction. Produced once per
/// signature and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatAnalysis {
    /// Classified threat type
    pub threat_type: ThreatType,
    /// True for every type except Unknown
    pub is_dangerous: bool,
    /// Banded risk level from the score
    pub risk_level: RiskLevel,
    /// How cleanly the pattern matched, in [0, 1]
    pub confidence: f64,
    /// Token mints the transaction touches
    pub affected_tokens: HashSet<String>,
}

impl ThreatAnalysis {
    /// Analysis for a clean structural match: level comes from the
    /// pattern table, confidence clamped to [0, 1]
    pub fn from_type(threat_type: ThreatType, confidence: f64) -> Self {
        Self {
            threat_type,
            is_dangerous: threat_type.is_dangerous(),
            risk_level: threat_type.base_level(),
            confidence: confidence.clamp(0.0, 1.0),
            affected_tokens: HashSet::new(),
        }
    }

    /// Analysis with a corroboration-adjusted score, banded to a level.
    /// The banded level never drops below the pattern's table level.
    pub fn from_score(threat_type: ThreatType, score: u32, confidence: f64) -> Self {
        let banded = RiskLevel::from_score(score);
        Self {
            risk_level: banded.max(threat_type.base_level()),
            ..Self::from_type(threat_type, confidence)
        }
    }

    /// Benign/unrecognized result
    pub fn unknown() -> Self {
        Self::from_type(ThreatType::Unknown, 0.3)
    }

    pub fn with_tokens(mut self, tokens: impl IntoIterator<Item = String>) -> Self {
        self.affected_tokens.extend(tokens);
        self
    }
}

/// Published on the event bus when a dangerous transaction targets a
/// protected (wallet, token) pair. Immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatDetectedEvent {
    /// Signature of the threatening transaction
    pub signature: String,
    /// Protected token mint
    pub token_mint: String,
    /// Protected wallet
    pub wallet_address: String,
    /// Classification that triggered the event
    pub analysis: ThreatAnalysis,
    /// User-configured fee multiplier from the protected target
    pub priority_fee_multiplier: f64,
    /// Detection time, Unix milliseconds
    pub timestamp_ms: u64,
}

impl ThreatDetectedEvent {
    pub fn new(
        signature: String,
        token_mint: String,
        wallet_address: String,
        analysis: ThreatAnalysis,
        priority_fee_multiplier: f64,
    ) -> Self {
        Self {
            signature,
            token_mint,
            wallet_address,
            analysis,
            priority_fee_multiplier,
            timestamp_ms: now_ms(),
        }
    }

    /// Queue key for the execution service: one pending entry per pair
    pub fn queue_key(&self) -> String {
        format!("{}:{}", self.wallet_address, self.token_mint)
    }
}

/// Lightweight alert record persisted fire-and-forget by the monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatAlert {
    pub signature: String,
    pub token_mint: String,
    pub wallet_address: String,
    pub threat_type: ThreatType,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub detected_at_ms: u64,
}

impl ThreatAlert {
    pub fn from_event(event: &ThreatDetectedEvent) -> Self {
        Self {
            signature: event.signature.clone(),
            token_mint: event.token_mint.clone(),
            wallet_address: event.wallet_address.clone(),
            threat_type: event.analysis.threat_type,
            risk_level: event.analysis.risk_level,
            confidence: event.analysis.confidence,
            detected_at_ms: event.timestamp_ms,
        }
    }
}
