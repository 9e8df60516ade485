//! Cross-state-machine integration coverage: the bounty lifecycle, an
//! accord's pushback/acknowledgment chain, and a rental contract that
//! breaches mid-term, exercised end to end against a real `Store` on
//! disk rather than through each type's own inline unit tests.

use beacon_agreements::{AccordManager, ContractManager, ContractType, TaskManager, TaskState};
use beacon_codec::Envelope;
use beacon_crypto::Identity;
use beacon_storage::Store;

fn store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();
    (dir, store)
}

#[test]
fn bounty_lifecycle_reaches_paid_and_rejects_skipped_states() {
    let (_dir, store) = store();
    let tasks = TaskManager::open(store);

    let mut bounty = Envelope::new("bounty", "n1")
        .with_field("text", "fix the flaky test")
        .with_field("reward_rtc", 100.0);
    bounty.agent_id = Some("bcn_poster".to_string());
    let task_id = tasks.create(&bounty).unwrap();

    // Jumping straight to a non-adjacent state is rejected.
    assert!(tasks.transition(&task_id, TaskState::Delivered, None).is_err());

    let mut offer = Envelope::new("offer", "n2").with_field("task_id", task_id.clone());
    offer.agent_id = Some("bcn_worker".to_string());
    assert!(tasks.auto_transition_from_envelope(&offer).is_some());
    assert_eq!(tasks.get(&task_id).unwrap().unwrap().state, TaskState::Offered);

    let mut accept = Envelope::new("accept", "n3").with_field("task_id", task_id.clone());
    accept.agent_id = Some("bcn_poster".to_string());
    tasks.auto_transition_from_envelope(&accept).unwrap();

    let mut deliver = Envelope::new("deliver", "n4").with_field("task_id", task_id.clone());
    deliver.agent_id = Some("bcn_worker".to_string());
    tasks.auto_transition_from_envelope(&deliver).unwrap();

    let mut confirm = Envelope::new("confirm", "n5").with_field("task_id", task_id.clone());
    confirm.agent_id = Some("bcn_poster".to_string());
    tasks.auto_transition_from_envelope(&confirm).unwrap();

    let mut pay = Envelope::new("pay", "n6").with_field("task_id", task_id.clone());
    pay.agent_id = Some("bcn_poster".to_string());
    tasks.auto_transition_from_envelope(&pay).unwrap();

    let task = tasks.get(&task_id).unwrap().unwrap();
    assert_eq!(task.state, TaskState::Paid);
    assert!(tasks.my_tasks("bcn_worker").unwrap().iter().any(|t| t.task_id == task_id));
}

#[test]
fn accord_pushback_chain_advances_and_restores_history_integrity() {
    let (_dir, store) = store();
    let mut accords = AccordManager::open(store).unwrap();
    let alice = Identity::generate(false).unwrap();
    let bob = Identity::generate(false).unwrap();

    let proposal = accords
        .propose(
            &alice,
            bob.agent_id().as_str(),
            vec!["no deception".to_string()],
            vec!["respond within a day".to_string()],
            None,
            None,
        )
        .unwrap();
    let accord_id = proposal.field_str("accord_id").unwrap().to_string();

    let acceptance = accords
        .accept(&bob, &proposal, vec!["no surveillance".to_string()], vec!["weekly check-in".to_string()])
        .unwrap()
        .unwrap();
    accords.finalize_accepted(&acceptance).unwrap();
    assert_eq!(accords.get_accord(&accord_id).unwrap().state, beacon_agreements::AccordState::Active);

    accords
        .pushback(&alice, &accord_id, "you reneged on the weekly check-in", None, "warning")
        .unwrap();
    assert_eq!(accords.get_accord(&accord_id).unwrap().state, beacon_agreements::AccordState::Challenged);
    assert_eq!(accords.pushback_count(&accord_id).get(alice.agent_id().as_str()), Some(&1));

    accords
        .acknowledge(&bob, &accord_id, "understood, resuming check-ins", true)
        .unwrap();
    let accord = accords.get_accord(&accord_id).unwrap();
    assert_eq!(accord.state, beacon_agreements::AccordState::Active);

    assert!(accords.verify_history(&accord_id, &accord.history_hash));
    assert!(!accords.verify_history(&accord_id, "not-the-real-hash"));
}

#[test]
fn rental_contract_settles_with_breach_penalty_deducted_from_escrow() {
    let (_dir, store) = store();
    let mut contracts = ContractManager::open(store).unwrap();

    let contract_id = contracts
        .list_agent(
            "bcn_seller",
            ContractType::Rent,
            10.0,
            30,
            vec!["gpu".to_string()],
            serde_json::Map::new(),
            10.0,
        )
        .unwrap();

    contracts.make_offer(&contract_id, "bcn_buyer", None).unwrap();
    contracts.accept_offer(&contract_id).unwrap();
    contracts.fund_escrow(&contract_id, "RTC_buyer_wallet", 10.0, None).unwrap();
    let expires_at = contracts.activate(&contract_id).unwrap();
    let activated_at = contracts.get_contract(&contract_id).unwrap().activated_at;
    assert_eq!(expires_at, activated_at + 30 * 86_400);

    let hash_before_breach = contracts.get_contract(&contract_id).unwrap().history_hash.clone();
    contracts.breach(&contract_id, "bcn_buyer", "violated usage terms", Some("logs attached")).unwrap();
    assert_ne!(contracts.get_contract(&contract_id).unwrap().history_hash, hash_before_breach);

    let (released, penalty) = contracts.settle(&contract_id).unwrap().expect("escrow was funded");
    assert_eq!(penalty, 1.0); // 10.0 * 10% penalty_pct
    assert_eq!(released, 9.0);
    assert_eq!(contracts.get_contract(&contract_id).unwrap().state, beacon_agreements::ContractState::Settled);
}
