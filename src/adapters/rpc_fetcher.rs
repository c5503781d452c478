//! JSON-RPC Transaction Fetcher
//!
//! `getTransaction` with jsonParsed encoding over plain HTTP. The
//! response is flattened into the analyzer's wire model; instructions
//! the RPC node could not parse keep their program id and degrade to an
//! untyped entry.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use crate::decoders::PoolAccount;
use crate::ports::{FetchError, ParsedInstruction, ParsedTransaction, TransactionFetcher};

/// Per-request timeout
const REQUEST_TIMEOUT_SECS: u64 = 5;

pub struct RpcTransactionFetcher {
    client: reqwest::Client,
    rpc_url: String,
    commitment: String,
}

impl RpcTransactionFetcher {
    pub fn new(rpc_url: impl Into<String>, commitment: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            rpc_url: rpc_url.into(),
            commitment: commitment.into(),
        }
    }

    /// Raw `getAccountInfo` fetch for pool inspection. Returns the
    /// account bytes, native balance, and owning program.
    pub async fn fetch_account(&self, address: &str) -> Result<(PoolAccount, String), FetchError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getAccountInfo",
            "params": [
                address,
                { "encoding": "base64", "commitment": self.commitment }
            ]
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Rpc(e.to_string())
                }
            })?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Rpc(e.to_string()))?;

        parse_account_response(address, &body)
    }
}

/// Flatten a getAccountInfo response into raw pool account bytes
fn parse_account_response(
    address: &str,
    body: &Value,
) -> Result<(PoolAccount, String), FetchError> {
    if let Some(error) = body.get("error") {
        return Err(FetchError::Rpc(error.to_string()));
    }
    let value = &body["result"]["value"];
    if value.is_null() {
        return Err(FetchError::NotFound(address.to_string()));
    }

    let encoded = value["data"][0].as_str().unwrap_or_default();
    let data = BASE64
        .decode(encoded)
        .map_err(|e| FetchError::Rpc(format!("Account data is not valid base64: {e}")))?;
    let lamports = value["lamports"].as_u64().unwrap_or(0);
    let owner = value["owner"].as_str().unwrap_or("unknown").to_string();

    Ok((PoolAccount::new(data, lamports), owner))
}

#[async_trait]
impl TransactionFetcher for RpcTransactionFetcher {
    async fn fetch_parsed(&self, signature: &str) -> Result<ParsedTransaction, FetchError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTransaction",
            "params": [
                signature,
                {
                    "encoding": "jsonParsed",
                    "commitment": self.commitment,
                    "maxSupportedTransactionVersion": 0
                }
            ]
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Rpc(e.to_string())
                }
            })?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Rpc(e.to_string()))?;

        debug!(signature, "Fetched transaction");
        parse_rpc_response(signature, &body)
    }
}

/// Flatten a getTransaction response into the analyzer's model
fn parse_rpc_response(signature: &str, body: &Value) -> Result<ParsedTransaction, FetchError> {
    if let Some(error) = body.get("error") {
        return Err(FetchError::Rpc(error.to_string()));
    }
    let result = match body.get("result") {
        Some(Value::Null) | None => {
            return Err(FetchError::NotFound(signature.to_string()));
        }
        Some(result) => result,
    };

    let meta = &result["meta"];
    let mut tx = ParsedTransaction::new(signature);

    if !meta["err"].is_null() {
        tx.err = Some(meta["err"].to_string());
    }
    tx.log_messages = string_array(&meta["logMessages"]);
    tx.pre_balances = u64_array(&meta["preBalances"]);
    tx.post_balances = u64_array(&meta["postBalances"]);

    let message = &result["transaction"]["message"];
    tx.account_keys = message["accountKeys"]
        .as_array()
        .map(|keys| {
            keys.iter()
                .filter_map(|k| k["pubkey"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if let Some(instructions) = message["instructions"].as_array() {
        for raw in instructions {
            let program_id = raw["programId"].as_str().unwrap_or("unknown");
            let mut instruction = ParsedInstruction::new(
                program_id,
                raw["parsed"]["type"].as_str(),
            );
            if let Some(info) = raw["parsed"].get("info") {
                instruction.info = info.clone();
            }
            tx.instructions.push(instruction);
        }
    }

    Ok(tx)
}

fn string_array(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn u64_array(value: &Value) -> Vec<u64> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_response() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "slot": 1000,
                "meta": {
                    "err": null,
                    "logMessages": ["Program log: Instruction: SetAuthority"],
                    "preBalances": [5_000_000_000u64, 1_000_000u64],
                    "postBalances": [4_999_000_000u64, 1_000_000u64]
                },
                "transaction": {
                    "message": {
                        "accountKeys": [
                            { "pubkey": "Wallet111", "signer": true },
                            { "pubkey": "Mint111", "signer": false }
                        ],
                        "instructions": [
                            {
                                "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                                "parsed": {
                                    "type": "setAuthority",
                                    "info": { "authorityType": "freezeAccount", "mint": "Mint111" }
                                }
                            }
                        ]
                    }
                }
            }
        });

        let tx = parse_rpc_response("Sig1", &body).unwrap();
        assert_eq!(tx.signature, "Sig1");
        assert!(tx.err.is_none());
        assert_eq!(tx.log_messages.len(), 1);
        assert_eq!(tx.account_keys, vec!["Wallet111", "Mint111"]);
        assert_eq!(tx.pre_balances, vec![5_000_000_000, 1_000_000]);
        assert_eq!(tx.instructions.len(), 1);
        assert_eq!(tx.instructions[0].instruction_type.as_deref(), Some("setAuthority"));
        assert_eq!(tx.instructions[0].info["authorityType"], "freezeAccount");
    }

    #[test]
    fn test_parse_unparsed_instruction_degrades() {
        let body = json!({
            "result": {
                "meta": { "err": null, "logMessages": [], "preBalances": [], "postBalances": [] },
                "transaction": {
                    "message": {
                        "accountKeys": [],
                        "instructions": [
                            { "programId": "Custom111", "accounts": [], "data": "3Bxs4" }
                        ]
                    }
                }
            }
        });

        let tx = parse_rpc_response("Sig1", &body).unwrap();
        assert_eq!(tx.instructions[0].program_id, "Custom111");
        assert!(tx.instructions[0].instruction_type.is_none());
    }

    #[test]
    fn test_parse_null_result_is_not_found() {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "result": null });
        assert!(matches!(
            parse_rpc_response("SigMissing", &body),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_rpc_error() {
        let body = json!({ "error": { "code": -32005, "message": "node is behind" } });
        assert!(matches!(
            parse_rpc_response("Sig1", &body),
            Err(FetchError::Rpc(_))
        ));
    }

    #[test]
    fn test_parse_account_response() {
        let data = BASE64.encode([1u8, 2, 3, 4]);
        let body = json!({
            "result": {
                "context": { "slot": 1000 },
                "value": {
                    "data": [data, "base64"],
                    "lamports": 5_000_000_000u64,
                    "owner": "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
                    "executable": false
                }
            }
        });

        let (account, owner) = parse_account_response("PoolX", &body).unwrap();
        assert_eq!(account.data, vec![1, 2, 3, 4]);
        assert_eq!(account.lamports, 5_000_000_000);
        assert_eq!(owner, "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
    }

    #[test]
    fn test_parse_missing_account_is_not_found() {
        let body = json!({ "result": { "context": { "slot": 1000 }, "value": null } });
        assert!(matches!(
            parse_account_response("PoolX", &body),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_transaction_keeps_err() {
        let body = json!({
            "result": {
                "meta": {
                    "err": { "InstructionError": [0, "Custom"] },
                    "logMessages": [],
                    "preBalances": [],
                    "postBalances": []
                },
                "transaction": { "message": { "accountKeys": [], "instructions": [] } }
            }
        });
        let tx = parse_rpc_response("Sig1", &body).unwrap();
        assert!(tx.err.is_some());
    }
}
