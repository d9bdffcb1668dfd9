//! # Transaction Lookup Interpretation
//!
//! Turns one shard's answer to a transaction lookup into "found", "missing"
//! or an error, and decides whether the receiver shard must be consulted.

use crate::domain::{DispatchResult, ProxyError, TransactionInfo};

/// Status of transactions that never reach their destination shard.
const INVALID_STATUS: &str = "invalid";

/// Outcome of asking one shard about a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxLookup {
    /// Shard knows the transaction
    Found(TransactionInfo),
    /// Shard does not know it
    Missing,
}

/// Observer path of a transaction lookup.
pub fn transaction_path(hash: &str, with_results: bool) -> String {
    if with_results {
        format!("/transaction/{}?withResults=true", hash)
    } else {
        format!("/transaction/{}", hash)
    }
}

/// Interpret a shard's answer.
///
/// 404 and a 2xx without a transaction both mean "not known here". Any other
/// non-2xx answer is a rejection of the request itself.
pub fn interpret_lookup(result: &DispatchResult) -> Result<TxLookup, ProxyError> {
    if result.status == 404 {
        return Ok(TxLookup::Missing);
    }

    if !result.is_success() {
        let reason = result
            .envelope()
            .map(|env| env.error)
            .ok()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("status {}", result.status));
        return Err(ProxyError::InvalidRequest(reason));
    }

    let envelope = result.envelope()?;
    match envelope.data.get("transaction") {
        None | Some(serde_json::Value::Null) => Ok(TxLookup::Missing),
        Some(_) => {
            let info = envelope
                .field::<TransactionInfo>("transaction")
                .map_err(|reason| ProxyError::MalformedResponse {
                    observer: result.observer.clone(),
                    reason,
                })?;
            Ok(TxLookup::Found(info))
        }
    }
}

/// Whether the receiver shard holds a more final status than the sender shard.
pub fn needs_receiver_lookup(info: &TransactionInfo) -> bool {
    info.is_cross_shard() && info.status != INVALID_STATUS
}
