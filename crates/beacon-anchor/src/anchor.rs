//! On-chain anchoring: hash data, sign the commitment, submit to
//! RustChain, and keep a local audit log of every attempt.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use beacon_core::canonical::{commitment_hash, commitment_hash_bytes, commitment_hash_str};
use beacon_core::time::now_s;
use beacon_crypto::Identity;
use beacon_storage::{Store, StorageResult};
use beacon_transport::ledger::{rtc_address_from_public_key_hex, AnchorSubmitPayload, AnchorSubmitResult};
use beacon_transport::{LedgerClient, TransportResult};

const ANCHOR_LOG: &str = "anchors.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorLogStatus {
    Ok,
    Duplicate,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorLogEntry {
    pub ts: i64,
    pub commitment: String,
    pub data_type: String,
    pub status: AnchorLogStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AnchorOutcome {
    Submitted(AnchorSubmitResult),
    Duplicate { commitment: String },
}

pub struct AnchorManager {
    store: Store,
    client: LedgerClient,
    identity: Identity,
}

impl AnchorManager {
    pub fn new(store: Store, client: LedgerClient, identity: Identity) -> Self {
        Self { store, client, identity }
    }

    /// Hash arbitrary data (dict, string, or bytes go through the same
    /// `commitment_hash` family `beacon_core::canonical` exposes), sign
    /// the commitment, and submit it.
    pub async fn anchor<T: Serialize>(&self, data: &T, data_type: &str, metadata: Option<&Value>) -> AnchorResult<AnchorOutcome> {
        let commitment = commitment_hash(data)?;
        self.submit(commitment, data_type, metadata).await
    }

    pub async fn anchor_str(&self, data: &str, data_type: &str, metadata: Option<&Value>) -> AnchorResult<AnchorOutcome> {
        let commitment = commitment_hash_str(data);
        self.submit(commitment, data_type, metadata).await
    }

    pub async fn anchor_bytes(&self, raw: &[u8], data_type: &str, metadata: Option<&Value>) -> AnchorResult<AnchorOutcome> {
        let commitment = commitment_hash_bytes(raw);
        self.submit(commitment, data_type, metadata).await
    }

    async fn submit(&self, commitment: String, data_type: &str, metadata: Option<&Value>) -> AnchorResult<AnchorOutcome> {
        let signature = self.identity.sign_hex(commitment.as_bytes());
        let metadata = metadata.map(|m| serde_json::to_string(m)).transpose()?.unwrap_or_default();
        let payload = AnchorSubmitPayload {
            commitment: commitment.clone(),
            data_type: data_type.to_string(),
            metadata,
            signature,
            public_key: self.identity.public_key_hex(),
        };

        match self.client.anchor_submit(&payload).await {
            Ok(Some(result)) => {
                self.log(AnchorLogEntry {
                    ts: now_s(),
                    commitment,
                    data_type: data_type.to_string(),
                    status: AnchorLogStatus::Ok,
                    anchor_id: result.anchor_id.clone(),
                    error: None,
                })?;
                Ok(AnchorOutcome::Submitted(result))
            }
            Ok(None) => {
                self.log(AnchorLogEntry {
                    ts: now_s(),
                    commitment: commitment.clone(),
                    data_type: data_type.to_string(),
                    status: AnchorLogStatus::Duplicate,
                    anchor_id: None,
                    error: None,
                })?;
                Ok(AnchorOutcome::Duplicate { commitment })
            }
            Err(e) => {
                self.log(AnchorLogEntry {
                    ts: now_s(),
                    commitment,
                    data_type: data_type.to_string(),
                    status: AnchorLogStatus::Error,
                    anchor_id: None,
                    error: Some(e.to_string()),
                })?;
                Err(AnchorError::Transport(e))
            }
        }
    }

    pub async fn verify(&self, commitment: &str) -> TransportResult<Option<Value>> {
        let result = self.client.anchor_verify(commitment).await?;
        Ok(if result.found { result.anchor } else { None })
    }

    pub async fn verify_data<T: Serialize>(&self, data: &T) -> AnchorResult<Option<Value>> {
        let commitment = commitment_hash(data)?;
        Ok(self.verify(&commitment).await?)
    }

    pub async fn my_anchors(&self, limit: usize) -> AnchorResult<Vec<Value>> {
        let submitter = rtc_address_from_public_key_hex(&self.identity.public_key_hex())?;
        let result = self.client.anchor_list(&submitter, limit).await?;
        Ok(result.anchors)
    }

    /// Local JSONL log of every anchor attempt, newest last (unlike
    /// `my_anchors`, which reflects only what the ledger accepted).
    pub fn history(&self, limit: usize) -> StorageResult<Vec<AnchorLogEntry>> {
        self.store.tail(ANCHOR_LOG, limit)
    }

    fn log(&self, entry: AnchorLogEntry) -> StorageResult<()> {
        self.store.append(ANCHOR_LOG, &entry)
    }
}


#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    #[error(transparent)]
    Transport(#[from] beacon_transport::TransportError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type AnchorResult<T> = Result<T, AnchorError>;

/// Anchor a completed executor action (an outbox drain result that
/// actually sent).
pub fn action_anchor_payload(action_id: &str, method: &str, ts: i64) -> Value {
    serde_json::json!({"action_id": action_id, "method": method, "ts": ts})
}

/// Anchor an epoch settlement summary.
pub fn epoch_anchor_payload(epoch: u64, settlement_count: usize, settlements: &Value) -> Value {
    serde_json::json!({"epoch": epoch, "settlement_count": settlement_count, "settlements": settlements})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_anchor_payload_shape() {
        let v = action_anchor_payload("abc123", "webhook", 42);
        assert_eq!(v["action_id"], "abc123");
        assert_eq!(v["ts"], 42);
    }
}
