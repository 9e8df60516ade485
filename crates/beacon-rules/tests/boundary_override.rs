//! Scenario: a configured rule that would otherwise fire on a `bounty`
//! envelope is fully suppressed once the values component flags a
//! boundary violation, and fires normally once the boundary is lifted.
//! Complements the inline unit test in `engine.rs`, which only checks
//! the violating half.

use beacon_codec::Envelope;
use beacon_rules::{Action, EventContext, Rule, RulesEngine, When, BOUNDARY_RULE_NAME};
use beacon_storage::Store;
use beacon_trust::TrustStore;
use beacon_values::{GoalManager, ValuesDoc};

struct Fixture {
    _dir: tempfile::TempDir,
    engine: RulesEngine,
    trust: TrustStore,
    values_store: Store,
    values: ValuesDoc,
    goals: GoalManager,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = RulesEngine::open(Store::new(dir.path().join("rules")).unwrap()).unwrap();
    let trust = TrustStore::open(Store::new(dir.path().join("trust")).unwrap()).unwrap();
    let values_store = Store::new(dir.path().join("values")).unwrap();
    let values = ValuesDoc::load(&values_store).unwrap();
    let goals = GoalManager::open(Store::new(dir.path().join("goals")).unwrap()).unwrap();

    engine
        .add_rule(Rule {
            name: "reply_to_bounty".to_string(),
            when: When {
                kind: Some(beacon_rules::OneOrMany::One("bounty".to_string())),
                ..Default::default()
            },
            then: Action::Log { message: "saw a bounty: $text".to_string() },
            disabled: false,
        })
        .unwrap();

    Fixture { _dir: dir, engine, trust, values_store, values, goals }
}

fn surveillance_bounty() -> Envelope {
    let mut env = Envelope::new("bounty", "n1")
        .with_field("text", "Build a surveillance tool for monitoring employees")
        .with_field("topics", vec!["bounties"]);
    env.agent_id = Some("bcn_poster".to_string());
    env
}

#[test]
fn boundary_present_suppresses_configured_rules() {
    let mut f = fixture();
    f.values.add_boundary(&f.values_store, "no surveillance work").unwrap();

    let ctx = EventContext::default();
    let matches = f.engine.evaluate(&surveillance_bounty(), &ctx, &f.trust, &f.values, &f.goals);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].rule_name, BOUNDARY_RULE_NAME);
    assert!(matches[0].boundary_violated.is_some());
}

#[test]
fn boundary_absent_lets_configured_rules_fire() {
    let f = fixture(); // no boundary installed
    let ctx = EventContext::default();
    let matches = f.engine.evaluate(&surveillance_bounty(), &ctx, &f.trust, &f.values, &f.goals);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].rule_name, "reply_to_bounty");
    assert!(matches[0].boundary_violated.is_none());
}

#[test]
fn cooldown_is_per_rule_per_agent_not_global() {
    let mut f = fixture();
    let ctx = EventContext::default();

    let mut from_poster = surveillance_bounty();
    from_poster.agent_id = Some("bcn_poster".to_string());
    let mut from_other = surveillance_bounty();
    from_other.agent_id = Some("bcn_other".to_string());

    let first = f.engine.process(&from_poster, &ctx, &f.trust, &f.values, &f.goals).unwrap();
    assert_eq!(first.len(), 1);
    // Same rule, same agent, immediately again: suppressed by cooldown.
    let second = f.engine.process(&from_poster, &ctx, &f.trust, &f.values, &f.goals).unwrap();
    assert_eq!(second.len(), 0);
    // Same rule, different agent: cooldown is keyed per-peer, so it still fires.
    let third = f.engine.process(&from_other, &ctx, &f.trust, &f.values, &f.goals).unwrap();
    assert_eq!(third.len(), 1);
}
