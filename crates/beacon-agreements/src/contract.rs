//! Contracts: agent property rent/buy/lease-to-own lifecycle with RTC
//! escrow. A contract walks `listed -> offered -> accepted -> active ->
//! {renewed, expired, breached, terminated} -> settled`, with `settled`
//! terminal. Escrow is funded separately and released at settlement,
//! minus a penalty if any breach event occurred in the contract's
//! history.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use beacon_core::ids::ContractId;
use beacon_core::time::now_s;
use beacon_storage::{Store, StorageResult};
use beacon_trust::{Direction, Outcome, TrustStore};

use crate::error::{AgreementError, AgreementResult};

const CONTRACTS_FILE: &str = "contracts.json";
const ESCROW_FILE: &str = "escrow.json";
const CONTRACT_LOG: &str = "contract_log.jsonl";
const REVENUE_LOG: &str = "revenue.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractState {
    Listed,
    Offered,
    Accepted,
    Active,
    Renewed,
    Expired,
    Breached,
    Terminated,
    Settled,
}

impl ContractState {
    fn allowed_next(self) -> &'static [ContractState] {
        use ContractState::*;
        match self {
            Listed => &[Offered, Terminated],
            Offered => &[Accepted, Listed, Terminated],
            Accepted => &[Active, Terminated],
            Active => &[Renewed, Expired, Breached, Terminated, Settled],
            Renewed => &[Expired, Breached, Terminated, Settled],
            Expired => &[Settled],
            Breached => &[Settled, Terminated],
            Terminated => &[Settled],
            Settled => &[],
        }
    }

    fn can_transition_to(self, next: ContractState) -> bool {
        self.allowed_next().contains(&next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    Rent,
    Buy,
    LeaseToOwn,
}

/// Event-log tag: every `ContractState` the state machine can land on,
/// plus events that record something happening without the contract's
/// own state changing (ownership transfer can fire while `state` stays
/// `Active`, e.g. a lease-to-own buyout before the lease term ends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractEventKind {
    Listed,
    Offered,
    Accepted,
    Active,
    Renewed,
    Expired,
    Breached,
    Terminated,
    Settled,
    OwnershipTransferred,
}

impl From<ContractState> for ContractEventKind {
    fn from(state: ContractState) -> Self {
        match state {
            ContractState::Listed => Self::Listed,
            ContractState::Offered => Self::Offered,
            ContractState::Accepted => Self::Accepted,
            ContractState::Active => Self::Active,
            ContractState::Renewed => Self::Renewed,
            ContractState::Expired => Self::Expired,
            ContractState::Breached => Self::Breached,
            ContractState::Terminated => Self::Terminated,
            ContractState::Settled => Self::Settled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractEvent {
    pub ts: i64,
    #[serde(rename = "type")]
    pub kind: ContractEventKind,
    pub by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseToOwn {
    pub total_periods: u32,
    pub completed_periods: u32,
    pub buyout_price_rtc: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub state: ContractState,
    #[serde(rename = "type")]
    pub kind: ContractType,
    pub agent_id: String,
    pub seller_id: String,
    pub buyer_id: String,
    pub price_rtc: f64,
    pub offered_price_rtc: f64,
    pub duration_days: u32,
    pub capabilities: Vec<String>,
    pub terms: serde_json::Map<String, serde_json::Value>,
    pub penalty_pct: f64,
    pub listed_at: i64,
    pub offered_at: i64,
    pub accepted_at: i64,
    pub activated_at: i64,
    pub expires_at: i64,
    pub settled_at: i64,
    pub history_hash: String,
    pub events: Vec<ContractEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_to_own: Option<LeaseToOwn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escrow {
    pub contract_id: String,
    pub escrow_address: String,
    pub funded_by: String,
    pub amount_rtc: f64,
    pub funded_at: i64,
    pub tx_ref: String,
    pub released: bool,
    pub released_to: String,
    pub released_at: i64,
    pub penalty_deducted: f64,
}

fn history_hash(events: &[ContractEvent]) -> String {
    let bytes = beacon_core::canonical::to_canonical_bytes(events).unwrap_or_default();
    beacon_core::canonical::sha256_hex(&bytes)[..16].to_string()
}

pub struct ContractManager {
    store: Store,
    contracts: HashMap<String, Contract>,
    escrow: HashMap<String, Escrow>,
}

impl ContractManager {
    pub fn open(store: Store) -> StorageResult<Self> {
        let contracts = store.load_snapshot_or_default(CONTRACTS_FILE)?;
        let escrow = store.load_snapshot_or_default(ESCROW_FILE)?;
        Ok(Self { store, contracts, escrow })
    }

    fn save(&self) -> StorageResult<()> {
        self.store.snapshot(CONTRACTS_FILE, &self.contracts)?;
        self.store.snapshot(ESCROW_FILE, &self.escrow)
    }

    fn log(&self, entry: impl Serialize) -> StorageResult<()> {
        self.store.append(CONTRACT_LOG, &entry)
    }

    fn transition(&mut self, contract_id: &str, new_state: ContractState, by: &str, reason: Option<&str>) -> AgreementResult<()> {
        let contract = self
            .contracts
            .get_mut(contract_id)
            .ok_or_else(|| AgreementError::ContractNotFound(contract_id.to_string()))?;

        if !contract.state.can_transition_to(new_state) {
            return Err(AgreementError::InvalidContractTransition {
                from: format!("{:?}", contract.state).to_lowercase(),
                to: format!("{:?}", new_state).to_lowercase(),
            });
        }

        let from_state = format!("{:?}", contract.state).to_lowercase();
        let now = now_s();
        contract.state = new_state;
        contract.events.push(ContractEvent { ts: now, kind: new_state.into(), by: by.to_string(), reason: reason.map(str::to_string), evidence: None, to: None });
        contract.history_hash = history_hash(&contract.events);
        let transition_desc = format!("{} -> {:?}", from_state, new_state).to_lowercase();
        self.save()?;
        self.log(serde_json::json!({"contract_id": contract_id, "transition": transition_desc, "by": by, "reason": reason, "ts": now}))?;
        Ok(())
    }

    pub fn list_agent(
        &mut self,
        agent_id: &str,
        kind: ContractType,
        price_rtc: f64,
        duration_days: u32,
        capabilities: Vec<String>,
        terms: serde_json::Map<String, serde_json::Value>,
        penalty_pct: f64,
    ) -> AgreementResult<String> {
        if price_rtc <= 0.0 {
            return Err(AgreementError::InvalidPrice);
        }
        if kind == ContractType::Rent && duration_days == 0 {
            return Err(AgreementError::RentRequiresDuration);
        }

        let now = now_s();
        let id = ContractId::new().to_string();
        let lease_to_own = (kind == ContractType::LeaseToOwn).then(|| LeaseToOwn {
            total_periods: terms.get("total_periods").and_then(|v| v.as_u64()).unwrap_or(12) as u32,
            completed_periods: 0,
            buyout_price_rtc: terms.get("buyout_price_rtc").and_then(|v| v.as_f64()).unwrap_or(price_rtc * 12.0),
        });

        let mut contract = Contract {
            id: id.clone(),
            state: ContractState::Listed,
            kind,
            agent_id: agent_id.to_string(),
            seller_id: agent_id.to_string(),
            buyer_id: String::new(),
            price_rtc,
            offered_price_rtc: 0.0,
            duration_days,
            capabilities,
            terms,
            penalty_pct,
            listed_at: now,
            offered_at: 0,
            accepted_at: 0,
            activated_at: 0,
            expires_at: 0,
            settled_at: 0,
            history_hash: String::new(),
            events: vec![ContractEvent { ts: now, kind: ContractEventKind::Listed, by: agent_id.to_string(), reason: None, evidence: None, to: None }],
            lease_to_own,
        };
        contract.history_hash = history_hash(&contract.events);
        self.contracts.insert(id.clone(), contract);
        self.save()?;
        Ok(id)
    }

    pub fn make_offer(&mut self, contract_id: &str, buyer_id: &str, offered_price_rtc: Option<f64>) -> AgreementResult<f64> {
        let price = {
            let contract = self.contracts.get(contract_id).ok_or_else(|| AgreementError::ContractNotFound(contract_id.to_string()))?;
            if contract.state != ContractState::Listed {
                return Err(AgreementError::InvalidContractTransition {
                    from: format!("{:?}", contract.state).to_lowercase(),
                    to: "offered".to_string(),
                });
            }
            offered_price_rtc.unwrap_or(contract.price_rtc)
        };

        if let Some(contract) = self.contracts.get_mut(contract_id) {
            contract.buyer_id = buyer_id.to_string();
            contract.offered_price_rtc = price;
            contract.offered_at = now_s();
        }
        self.transition(contract_id, ContractState::Offered, buyer_id, Some("Offer submitted"))?;
        Ok(price)
    }

    pub fn accept_offer(&mut self, contract_id: &str) -> AgreementResult<()> {
        let seller = self
            .contracts
            .get(contract_id)
            .ok_or_else(|| AgreementError::ContractNotFound(contract_id.to_string()))?
            .seller_id
            .clone();
        self.transition(contract_id, ContractState::Accepted, &seller, Some("Offer accepted"))?;
        if let Some(contract) = self.contracts.get_mut(contract_id) {
            contract.accepted_at = now_s();
        }
        self.save()?;
        Ok(())
    }

    pub fn reject_offer(&mut self, contract_id: &str) -> AgreementResult<()> {
        let seller = self
            .contracts
            .get(contract_id)
            .ok_or_else(|| AgreementError::ContractNotFound(contract_id.to_string()))?
            .seller_id
            .clone();
        self.transition(contract_id, ContractState::Listed, &seller, Some("Offer rejected"))?;
        if let Some(contract) = self.contracts.get_mut(contract_id) {
            contract.buyer_id.clear();
            contract.offered_price_rtc = 0.0;
            contract.offered_at = 0;
        }
        self.save()?;
        Ok(())
    }

    pub fn fund_escrow(&mut self, contract_id: &str, from_address: &str, amount_rtc: f64, tx_ref: Option<&str>) -> AgreementResult<String> {
        let contract = self.contracts.get(contract_id).ok_or_else(|| AgreementError::ContractNotFound(contract_id.to_string()))?;
        if !matches!(contract.state, ContractState::Accepted | ContractState::Active | ContractState::Renewed) {
            return Err(AgreementError::InvalidContractTransition {
                from: format!("{:?}", contract.state).to_lowercase(),
                to: "escrow_funded".to_string(),
            });
        }

        let escrow_address = format!("RTC_escrow_{}", &contract_id[..contract_id.len().min(20)]);
        self.escrow.insert(
            contract_id.to_string(),
            Escrow {
                contract_id: contract_id.to_string(),
                escrow_address: escrow_address.clone(),
                funded_by: from_address.to_string(),
                amount_rtc,
                funded_at: now_s(),
                tx_ref: tx_ref.unwrap_or_default().to_string(),
                released: false,
                released_to: String::new(),
                released_at: 0,
                penalty_deducted: 0.0,
            },
        );
        self.save()?;
        Ok(escrow_address)
    }

    fn release_escrow(&mut self, contract_id: &str, to_address: &str) -> AgreementResult<(f64, f64)> {
        let penalty = {
            let contract = self.contracts.get(contract_id);
            let was_breached = contract.map(|c| c.events.iter().any(|e| e.kind == ContractEventKind::Breached)).unwrap_or(false);
            let escrow = self.escrow.get(contract_id).ok_or_else(|| AgreementError::NoEscrow(contract_id.to_string()))?;
            if escrow.released {
                return Err(AgreementError::EscrowAlreadyReleased);
            }
            if was_breached {
                escrow.amount_rtc * (contract.map(|c| c.penalty_pct).unwrap_or(0.0) / 100.0)
            } else {
                0.0
            }
        };

        let amount_rtc = {
            let escrow = self.escrow.get_mut(contract_id).unwrap();
            let release_amount = escrow.amount_rtc - penalty;
            escrow.released = true;
            escrow.released_to = to_address.to_string();
            escrow.released_at = now_s();
            escrow.penalty_deducted = penalty;
            release_amount
        };
        self.save()?;
        Ok((amount_rtc, penalty))
    }

    pub fn activate(&mut self, contract_id: &str) -> AgreementResult<i64> {
        let seller = self
            .contracts
            .get(contract_id)
            .ok_or_else(|| AgreementError::ContractNotFound(contract_id.to_string()))?
            .seller_id
            .clone();
        self.transition(contract_id, ContractState::Active, &seller, Some("Escrow funded, contract active"))?;
        let now = now_s();
        let expires_at = {
            let contract = self.contracts.get_mut(contract_id).unwrap();
            contract.activated_at = now;
            if contract.duration_days > 0 {
                contract.expires_at = now + contract.duration_days as i64 * 86_400;
            }
            contract.expires_at
        };
        self.save()?;
        Ok(expires_at)
    }

    pub fn renew(&mut self, contract_id: &str, additional_days: u32) -> AgreementResult<i64> {
        let (buyer, default_days) = {
            let contract = self.contracts.get(contract_id).ok_or_else(|| AgreementError::ContractNotFound(contract_id.to_string()))?;
            (contract.buyer_id.clone(), contract.duration_days)
        };
        let extra = if additional_days > 0 { additional_days } else { default_days };
        self.transition(contract_id, ContractState::Renewed, &buyer, Some(&format!("Renewed for {extra} days")))?;

        let now = now_s();
        let new_expires_at = {
            let contract = self.contracts.get_mut(contract_id).unwrap();
            let base = if contract.expires_at > now { contract.expires_at } else { now };
            contract.expires_at = base + extra as i64 * 86_400;
            if let Some(lto) = contract.lease_to_own.as_mut() {
                lto.completed_periods += 1;
            }
            contract.expires_at
        };
        self.save()?;
        Ok(new_expires_at)
    }

    pub fn expire(&mut self, contract_id: &str) -> AgreementResult<()> {
        self.transition(contract_id, ContractState::Expired, "", Some("Contract period ended"))
    }

    pub fn breach(&mut self, contract_id: &str, breacher_id: &str, reason: &str, evidence: Option<&str>) -> AgreementResult<()> {
        self.transition(contract_id, ContractState::Breached, breacher_id, Some(reason))?;
        if let Some(contract) = self.contracts.get_mut(contract_id) {
            if let Some(last) = contract.events.last_mut() {
                last.evidence = evidence.map(str::to_string);
            }
            contract.history_hash = history_hash(&contract.events);
        }
        self.save()?;
        Ok(())
    }

    pub fn terminate(&mut self, contract_id: &str, terminator_id: &str, reason: Option<&str>) -> AgreementResult<()> {
        self.transition(contract_id, ContractState::Terminated, terminator_id, Some(reason.unwrap_or("Contract terminated")))
    }

    /// Final settlement: transition to `settled`, then auto-release any
    /// unreleased escrow to the seller (minus penalty if breached).
    pub fn settle(&mut self, contract_id: &str) -> AgreementResult<Option<(f64, f64)>> {
        self.transition(contract_id, ContractState::Settled, "", Some("Final settlement"))?;
        let seller = self.contracts.get(contract_id).unwrap().seller_id.clone();
        if let Some(contract) = self.contracts.get_mut(contract_id) {
            contract.settled_at = now_s();
        }
        self.save()?;

        let needs_release = self.escrow.get(contract_id).map(|e| !e.released).unwrap_or(false);
        if needs_release {
            Ok(Some(self.release_escrow(contract_id, &seller)?))
        } else {
            Ok(None)
        }
    }

    /// Transfer ownership for `buy`/`lease_to_own` contracts. Requires
    /// lease-to-own to have completed all periods.
    pub fn transfer_ownership(&mut self, contract_id: &str) -> AgreementResult<()> {
        let contract = self.contracts.get(contract_id).ok_or_else(|| AgreementError::ContractNotFound(contract_id.to_string()))?;
        if !matches!(contract.kind, ContractType::Buy | ContractType::LeaseToOwn) {
            return Err(AgreementError::NotTransferable);
        }
        if !matches!(contract.state, ContractState::Active | ContractState::Settled) {
            return Err(AgreementError::InvalidContractTransition {
                from: format!("{:?}", contract.state).to_lowercase(),
                to: "ownership_transferred".to_string(),
            });
        }
        if let Some(lto) = &contract.lease_to_own {
            if lto.completed_periods < lto.total_periods {
                return Err(AgreementError::LeaseNotComplete { completed: lto.completed_periods, total: lto.total_periods });
            }
        }

        let (seller, buyer) = (contract.seller_id.clone(), contract.buyer_id.clone());
        let now = now_s();
        if let Some(contract) = self.contracts.get_mut(contract_id) {
            contract.events.push(ContractEvent {
                ts: now,
                kind: ContractEventKind::OwnershipTransferred,
                by: seller.clone(),
                reason: None,
                evidence: None,
                to: Some(buyer.clone()),
            });
            contract.history_hash = history_hash(&contract.events);
        }
        self.save()?;
        self.log(serde_json::json!({"contract_id": contract_id, "type": "ownership_transfer", "from": seller, "to": buyer, "ts": now}))?;
        Ok(())
    }

    pub fn record_revenue(&self, contract_id: &str, amount_rtc: f64, period_start: i64, period_end: i64) -> StorageResult<()> {
        let agent_id = self.contracts.get(contract_id).map(|c| c.agent_id.clone()).unwrap_or_else(|| "unknown".to_string());
        let now = now_s();
        self.store.append(
            REVENUE_LOG,
            &serde_json::json!({
                "contract_id": contract_id,
                "agent_id": agent_id,
                "amount_rtc": amount_rtc,
                "period_start": if period_start > 0 { period_start } else { now },
                "period_end": if period_end > 0 { period_end } else { now },
                "ts": now,
            }),
        )
    }

    pub fn get_contract(&self, contract_id: &str) -> Option<&Contract> {
        self.contracts.get(contract_id)
    }

    pub fn list_available(&self, kind: Option<ContractType>) -> Vec<&Contract> {
        self.contracts
            .values()
            .filter(|c| c.state == ContractState::Listed)
            .filter(|c| kind.map(|k| c.kind == k).unwrap_or(true))
            .collect()
    }

    pub fn my_contracts(&self, agent_id: &str) -> Vec<&Contract> {
        self.contracts.values().filter(|c| c.seller_id == agent_id || c.buyer_id == agent_id).collect()
    }

    pub fn active_contracts(&self) -> Vec<&Contract> {
        self.contracts.values().filter(|c| matches!(c.state, ContractState::Active | ContractState::Renewed)).collect()
    }

    pub fn contract_history(&self, contract_id: &str) -> Vec<ContractEvent> {
        self.contracts.get(contract_id).map(|c| c.events.clone()).unwrap_or_default()
    }

    pub fn record_fulfillment(&self, contract_id: &str, trust: &TrustStore) -> StorageResult<()> {
        let Some(contract) = self.contracts.get(contract_id) else { return Ok(()) };
        trust.record(contract.seller_id.clone(), Direction::Out, "contract_fulfilled", Outcome::Ok, Some(contract.price_rtc))?;
        trust.record(contract.buyer_id.clone(), Direction::In, "contract_fulfilled", Outcome::Ok, Some(contract.price_rtc))
    }

    pub fn record_breach_to_trust(&self, contract_id: &str, trust: &TrustStore) -> StorageResult<()> {
        let Some(contract) = self.contracts.get(contract_id) else { return Ok(()) };
        let breacher = contract.events.iter().rev().find(|e| e.kind == ContractEventKind::Breached).map(|e| e.by.clone());
        let Some(breacher) = breacher else { return Ok(()) };
        trust.record(breacher, Direction::Out, "contract_breach", Outcome::Scam, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, ContractManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        (dir, ContractManager::open(store).unwrap())
    }

    #[test]
    fn rent_lifecycle_with_escrow_release() {
        let (_dir, mut mgr) = open();
        let id = mgr.list_agent("bcn_seller", ContractType::Rent, 100.0, 30, vec![], serde_json::Map::new(), 10.0).unwrap();
        mgr.make_offer(&id, "bcn_buyer", None).unwrap();
        mgr.accept_offer(&id).unwrap();
        mgr.fund_escrow(&id, "bcn_buyer", 100.0, None).unwrap();
        let expires_at = mgr.activate(&id).unwrap();
        assert!(expires_at > 0);

        let (released, penalty) = mgr.settle(&id).unwrap().unwrap();
        assert_eq!(penalty, 0.0);
        assert_eq!(released, 100.0);
    }

    #[test]
    fn breach_deducts_penalty_from_escrow() {
        let (_dir, mut mgr) = open();
        let id = mgr.list_agent("bcn_seller", ContractType::Rent, 100.0, 30, vec![], serde_json::Map::new(), 20.0).unwrap();
        mgr.make_offer(&id, "bcn_buyer", None).unwrap();
        mgr.accept_offer(&id).unwrap();
        mgr.fund_escrow(&id, "bcn_buyer", 100.0, None).unwrap();
        mgr.activate(&id).unwrap();
        mgr.breach(&id, "bcn_seller", "failed to deliver", None).unwrap();

        let (released, penalty) = mgr.settle(&id).unwrap().unwrap();
        assert_eq!(penalty, 20.0);
        assert_eq!(released, 80.0);
    }

    #[test]
    fn lease_to_own_blocks_transfer_until_complete() {
        let (_dir, mut mgr) = open();
        let mut terms = serde_json::Map::new();
        terms.insert("total_periods".to_string(), serde_json::json!(2));
        let id = mgr.list_agent("bcn_seller", ContractType::LeaseToOwn, 50.0, 30, vec![], terms, 10.0).unwrap();
        mgr.make_offer(&id, "bcn_buyer", None).unwrap();
        mgr.accept_offer(&id).unwrap();
        mgr.fund_escrow(&id, "bcn_buyer", 50.0, None).unwrap();
        mgr.activate(&id).unwrap();

        assert!(mgr.transfer_ownership(&id).is_err());
        mgr.renew(&id, 30).unwrap();
        mgr.renew(&id, 30).unwrap();
        assert!(mgr.transfer_ownership(&id).is_ok());

        let contract = mgr.get_contract(&id).unwrap();
        assert_eq!(contract.state, ContractState::Active);
        assert_eq!(contract.events.last().unwrap().kind, ContractEventKind::OwnershipTransferred);
        assert!(!contract.events.iter().any(|e| e.kind == ContractEventKind::Settled));
    }

    #[test]
    fn invalid_type_or_price_is_rejected() {
        let (_dir, mut mgr) = open();
        assert!(mgr.list_agent("bcn_seller", ContractType::Rent, 0.0, 30, vec![], serde_json::Map::new(), 10.0).is_err());
        assert!(mgr.list_agent("bcn_seller", ContractType::Rent, 10.0, 0, vec![], serde_json::Map::new(), 10.0).is_err());
    }
}
