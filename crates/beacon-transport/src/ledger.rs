//! RustChain ledger RPC client: anchor submission/verification and RTC
//! transfer signing.
//!
//! The upstream Python skill delegates this to a vendored
//! `transports/rustchain.py` that isn't part of this codebase's lineage,
//! so the wire shape here is reconstructed from `anchor.py`'s call sites
//! and the project's own RPC conventions (JSON POST bodies, bearer-free
//! signed payloads, 409 for a duplicate commitment) rather than ported
//! line-for-line.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use beacon_core::canonical::sha256_hex;
use beacon_crypto::Identity;

use crate::error::{TransportError, TransportResult};

const DEFAULT_TIMEOUT_S: u64 = 20;
const MAX_RETRIES: u32 = 3;

/// An RTC address is derived the same way an agent id is: hash the
/// public key, but with the chain's own prefix and a longer digest so
/// addresses don't collide with agent ids in logs.
pub fn rtc_address_from_public_key_hex(public_key_hex: &str) -> TransportResult<String> {
    let bytes = hex::decode(public_key_hex).map_err(|e| TransportError::InvalidAddress(e.to_string()))?;
    Ok(format!("RTC{}", &sha256_hex(&bytes)[..40]))
}

#[derive(Debug, Clone, Serialize)]
pub struct AnchorSubmitPayload {
    pub commitment: String,
    pub data_type: String,
    pub metadata: String,
    pub signature: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnchorSubmitResult {
    pub anchor_id: Option<String>,
    #[serde(flatten)]
    pub extra: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnchorVerifyResult {
    pub found: bool,
    pub anchor: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AnchorListResult {
    #[serde(default)]
    pub anchors: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignedTransfer {
    pub from_address: String,
    pub to_address: String,
    pub amount_rtc: f64,
    pub memo: Option<String>,
    pub nonce: u64,
    pub signature: String,
    pub public_key: String,
}

pub struct LedgerClient {
    base_url: String,
    http: reqwest::Client,
}

impl LedgerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(DEFAULT_TIMEOUT_S))
                .build()
                .expect("reqwest client builds"),
        }
    }

    /// Submit an anchor commitment. A 409 response is surfaced as
    /// `Ok(None)` (duplicate, not an error) rather than an `Err`; every
    /// other non-2xx status retries with exponential backoff up to
    /// `MAX_RETRIES` before giving up.
    pub async fn anchor_submit(&self, payload: &AnchorSubmitPayload) -> TransportResult<Option<AnchorSubmitResult>> {
        let mut attempt = 0;
        loop {
            let resp = self
                .http
                .post(format!("{}/anchor/submit", self.base_url))
                .json(payload)
                .send()
                .await;

            match resp {
                Ok(resp) if resp.status() == reqwest::StatusCode::CONFLICT => return Ok(None),
                Ok(resp) if resp.status().is_success() => {
                    return Ok(Some(resp.json().await?));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    if attempt >= MAX_RETRIES {
                        return Err(TransportError::Ledger(format!("anchor_submit failed ({status}): {body}")));
                    }
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(TransportError::Http(e));
                    }
                }
            }
            attempt += 1;
            tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt))).await;
        }
    }

    pub async fn anchor_verify(&self, commitment: &str) -> TransportResult<AnchorVerifyResult> {
        let resp = self
            .http
            .get(format!("{}/anchor/verify/{commitment}", self.base_url))
            .send()
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn anchor_list(&self, submitter: &str, limit: usize) -> TransportResult<AnchorListResult> {
        let resp = self
            .http
            .get(format!("{}/anchor/list", self.base_url))
            .query(&[("submitter", submitter), ("limit", &limit.to_string())])
            .send()
            .await?;
        Ok(resp.json().await?)
    }

    /// Sign and submit an RTC transfer. Nonces are monotonic per-sender;
    /// the caller supplies it since only it tracks the account cursor.
    pub async fn sign_transfer(
        &self,
        identity: &Identity,
        to_address: &str,
        amount_rtc: f64,
        memo: Option<String>,
        nonce: u64,
    ) -> TransportResult<SignedTransfer> {
        let from_address = rtc_address_from_public_key_hex(&identity.public_key_hex())?;
        let signable = format!("{from_address}|{to_address}|{amount_rtc}|{nonce}|{}", memo.as_deref().unwrap_or(""));
        let signature = identity.sign_hex(signable.as_bytes());
        let transfer = SignedTransfer {
            from_address,
            to_address: to_address.to_string(),
            amount_rtc,
            memo,
            nonce,
            signature,
            public_key: identity.public_key_hex(),
        };

        let resp = self
            .http
            .post(format!("{}/transfer", self.base_url))
            .json(&transfer)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Ledger(format!("transfer rejected ({status}): {body}")));
        }
        Ok(transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtc_address_has_prefix_and_fixed_length() {
        let identity = beacon_crypto::Identity::generate(false).unwrap();
        let addr = rtc_address_from_public_key_hex(&identity.public_key_hex()).unwrap();
        assert!(addr.starts_with("RTC"));
        assert_eq!(addr.len(), 3 + 40);
    }

    #[test]
    fn rtc_address_is_deterministic() {
        let identity = beacon_crypto::Identity::generate(false).unwrap();
        let a = rtc_address_from_public_key_hex(&identity.public_key_hex()).unwrap();
        let b = rtc_address_from_public_key_hex(&identity.public_key_hex()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_hex_rejected() {
        assert!(rtc_address_from_public_key_hex("not-hex").is_err());
    }
}
