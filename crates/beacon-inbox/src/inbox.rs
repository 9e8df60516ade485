//! Ingest envelopes from any transport, learn unfamiliar peers'
//! signing keys on first use, verify what can be verified, and persist
//! everything to `inbox.jsonl` for later filtered reads.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use beacon_codec::{verify_envelope, Envelope};
use beacon_core::ids::AgentId;
use beacon_core::time::now_s;
use beacon_storage::{StateSnapshot, Store, StorageResult};
use beacon_transport::IngestResult;

const INBOX_LOG: &str = "inbox.jsonl";
const KNOWN_KEYS_FILE: &str = "known_keys.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InboxRecord {
    platform: String,
    from: String,
    received_at: i64,
    text: String,
    envelopes: Vec<Envelope>,
}

/// A single ingested envelope, enriched with its verification result
/// and whether it's been marked read.
#[derive(Debug, Clone, Serialize)]
pub struct InboxEntry {
    pub platform: String,
    pub from: String,
    pub received_at: i64,
    pub envelope: Envelope,
    pub verified: Option<bool>,
    pub is_read: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReadFilter {
    pub kind: Option<String>,
    pub agent_id: Option<String>,
    pub since: Option<i64>,
    pub unread_only: bool,
    pub limit: Option<usize>,
}

pub struct Inbox {
    store: Store,
    known_keys: RwLock<HashMap<String, String>>,
}

/// Trust-on-first-use: if an envelope carries an embedded pubkey whose
/// derived agent id matches, and we don't already know that agent, learn it.
fn learn_key(env: &Envelope, known: &mut HashMap<String, String>) {
    let (Some(agent_id), Some(pubkey)) = (&env.agent_id, &env.pubkey) else {
        return;
    };
    if known.contains_key(agent_id) {
        return;
    }
    let Ok(bytes) = hex::decode(pubkey) else { return };
    let Ok(arr) = <[u8; 32]>::try_from(bytes.as_slice()) else { return };
    if AgentId::from_public_key(&arr).as_str() == agent_id {
        known.insert(agent_id.clone(), pubkey.clone());
    }
}

impl Inbox {
    pub fn open(store: Store) -> StorageResult<Self> {
        let known_keys = store.load_snapshot_or_default(KNOWN_KEYS_FILE)?;
        Ok(Self {
            store,
            known_keys: RwLock::new(known_keys),
        })
    }

    fn save_known_keys(&self) -> StorageResult<()> {
        self.store.snapshot(KNOWN_KEYS_FILE, &*self.known_keys.read())
    }

    pub fn known_keys(&self) -> HashMap<String, String> {
        self.known_keys.read().clone()
    }

    pub fn trust_key(&self, agent_id: impl Into<String>, pubkey_hex: impl Into<String>) -> StorageResult<()> {
        self.known_keys.write().insert(agent_id.into(), pubkey_hex.into());
        self.save_known_keys()
    }

    /// Ingest envelopes already decoded by the caller (webhook body,
    /// UDP datagram text, or a direct single-envelope submission).
    pub fn ingest_envelopes(&self, platform: &str, from: &str, text: &str, envelopes: Vec<Envelope>) -> StorageResult<Vec<IngestResult>> {
        let mut known = self.known_keys.write();
        let mut results = Vec::with_capacity(envelopes.len());
        let received_at = now_s();

        for env in envelopes {
            learn_key(&env, &mut known);
            let verified = verify_envelope(&env, &mut known);

            let record = InboxRecord {
                platform: platform.to_string(),
                from: from.to_string(),
                received_at,
                text: text.to_string(),
                envelopes: vec![env.clone()],
            };
            self.store.append(INBOX_LOG, &record)?;

            results.push(IngestResult {
                nonce: env.nonce,
                kind: env.kind,
                verified,
            });
        }
        drop(known);
        self.save_known_keys()?;
        Ok(results)
    }

    pub fn read(&self, filter: &ReadFilter) -> StorageResult<Vec<InboxEntry>> {
        let records: Vec<InboxRecord> = self.store.read_all(INBOX_LOG)?;
        let state = StateSnapshot::load(&self.store)?;
        let mut known = self.known_keys.write();

        let mut out = Vec::new();
        for record in records {
            for env in record.envelopes {
                learn_key(&env, &mut known);
                let verified = verify_envelope(&env, &mut known);
                let is_read = state.read_nonces.contains(&env.nonce);

                if let Some(kind) = &filter.kind {
                    if &env.kind != kind {
                        continue;
                    }
                }
                if let Some(agent_id) = &filter.agent_id {
                    if env.agent_id.as_deref() != Some(agent_id.as_str()) {
                        continue;
                    }
                }
                if let Some(since) = filter.since {
                    if record.received_at < since {
                        continue;
                    }
                }
                if filter.unread_only && is_read {
                    continue;
                }

                out.push(InboxEntry {
                    platform: record.platform.clone(),
                    from: record.from.clone(),
                    received_at: record.received_at,
                    envelope: env,
                    verified,
                    is_read,
                });
            }
        }
        drop(known);
        self.save_known_keys()?;

        if let Some(limit) = filter.limit {
            if out.len() > limit {
                out.drain(0..out.len() - limit);
            }
        }
        Ok(out)
    }

    pub fn count(&self, unread_only: bool) -> StorageResult<usize> {
        Ok(self
            .read(&ReadFilter {
                unread_only,
                ..Default::default()
            })?
            .len())
    }

    pub fn get_by_nonce(&self, nonce: &str) -> StorageResult<Option<InboxEntry>> {
        Ok(self
            .read(&ReadFilter::default())?
            .into_iter()
            .find(|e| e.envelope.nonce == nonce))
    }

    pub fn mark_read(&self, nonce: &str) -> StorageResult<()> {
        let mut state = StateSnapshot::load(&self.store)?;
        state.read_nonces.mark(nonce);
        state.save(&self.store)
    }
}

#[async_trait::async_trait]
impl beacon_transport::InboundSink for Inbox {
    async fn ingest(&self, platform: &str, from: &str, text: &str, envelopes: Vec<Envelope>) -> Vec<IngestResult> {
        self.ingest_envelopes(platform, from, text, envelopes).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_codec::framing;
    use beacon_crypto::Identity;

    fn open() -> (tempfile::TempDir, Inbox) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        (dir, Inbox::open(store).unwrap())
    }

    #[test]
    fn ingest_unsigned_envelope_reports_no_verification() {
        let (_dir, inbox) = open();
        let env = Envelope::new("hello", "n1").with_field("text", "hi");
        let results = inbox.ingest_envelopes("udp", "1.2.3.4", "raw", vec![env]).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].verified, None);
    }

    #[test]
    fn ingest_signed_envelope_learns_key_and_verifies() {
        let (_dir, inbox) = open();
        let identity = Identity::generate(false).unwrap();
        let env = Envelope::new("hello", "n2").with_field("text", "hi");
        let framed = framing::encode(env, 2, Some(&identity), true).unwrap();
        let decoded = framing::decode_envelopes(&framed);

        let results = inbox.ingest_envelopes("webhook", "peer", &framed, decoded).unwrap();
        assert_eq!(results[0].verified, Some(true));
        assert!(inbox.known_keys().contains_key(identity.agent_id().as_str()));
    }

    #[test]
    fn read_filters_by_kind_and_unread() {
        let (_dir, inbox) = open();
        inbox.ingest_envelopes("udp", "x", "", vec![Envelope::new("pulse", "n3")]).unwrap();
        inbox.ingest_envelopes("udp", "x", "", vec![Envelope::new("hello", "n4")]).unwrap();

        let pulses = inbox
            .read(&ReadFilter { kind: Some("pulse".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(pulses.len(), 1);

        inbox.mark_read("n3").unwrap();
        let unread = inbox.read(&ReadFilter { unread_only: true, ..Default::default() }).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].envelope.nonce, "n4");
    }

    #[test]
    fn get_by_nonce_finds_entry() {
        let (_dir, inbox) = open();
        inbox.ingest_envelopes("udp", "x", "", vec![Envelope::new("hello", "n5")]).unwrap();
        assert!(inbox.get_by_nonce("n5").unwrap().is_some());
        assert!(inbox.get_by_nonce("missing").unwrap().is_none());
    }
}
