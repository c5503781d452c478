//! Shared data shapes for the collaborator ports
//!
//! The parsed-transaction model is the fetcher's output contract: enough
//! structure for the analyzer (instructions, program IDs, parsed args,
//! meta error, log messages, balances) without tying the core to any
//! particular RPC client.

use serde::{Deserialize, Serialize};

/// One decoded instruction of a fetched transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedInstruction {
    /// Program the instruction targets, base58
    pub program_id: String,
    /// Parsed instruction type when the RPC node could decode it,
    /// e.g. "removeLiquidity", "freezeAccount", "setAuthority", "swap"
    pub instruction_type: Option<String>,
    /// Parsed instruction arguments as loose JSON
    #[serde(default)]
    pub info: serde_json::Value,
}

impl ParsedInstruction {
    pub fn new(program_id: &str, instruction_type: Option<&str>) -> Self {
        Self {
            program_id: program_id.to_string(),
            instruction_type: instruction_type.map(str::to_string),
            info: serde_json::Value::Null,
        }
    }

    pub fn with_info(mut self, info: serde_json::Value) -> Self {
        self.info = info;
        self
    }
}

/// A fetched, fully parsed transaction as resolved from a signature
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub signature: String,
    /// On-chain execution error from the transaction meta; a non-None
    /// value means the transaction failed and carries no threat signal
    pub err: Option<String>,
    pub log_messages: Vec<String>,
    pub instructions: Vec<ParsedInstruction>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub account_keys: Vec<String>,
}

impl ParsedTransaction {
    pub fn new(signature: &str) -> Self {
        Self {
            signature: signature.to_string(),
            ..Default::default()
        }
    }

    pub fn with_err(mut self, err: &str) -> Self {
        self.err = Some(err.to_string());
        self
    }

    pub fn with_instruction(mut self, ix: ParsedInstruction) -> Self {
        self.instructions.push(ix);
        self
    }

    pub fn with_logs(mut self, logs: &[&str]) -> Self {
        self.log_messages = logs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_balances(mut self, pre: Vec<u64>, post: Vec<u64>) -> Self {
        self.pre_balances = pre;
        self.post_balances = post;
        self
    }
}
