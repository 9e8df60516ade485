//! The rules engine: loads a configured rule list, evaluates it against
//! inbound events (with boundary precedence and per-rule cooldown), and
//! executes the resulting actions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use beacon_codec::Envelope;
use beacon_core::time::now_s;
use beacon_storage::{Store, StorageResult};
use beacon_trust::TrustStore;
use beacon_values::{GoalManager, ValuesDoc};

use crate::action::{Action, ActionResult};
use crate::when::When;

const RULES_FILE: &str = "rules.json";
const RULES_LOG: &str = "rules_log.jsonl";
const COOLDOWN_S: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub when: When,
    pub then: Action,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RuleSet {
    #[serde(default)]
    rules: Vec<Rule>,
}

/// Context beyond the envelope itself that predicates consult. Everything
/// here comes from the inbox record the envelope was ingested into, not
/// from the envelope's own fields.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub from: Option<String>,
    pub verified: Option<bool>,
    pub platform: Option<String>,
    pub score: f64,
    pub task_state: Option<String>,
    /// The sender's advertised values document, when carried in the
    /// payload (e.g. a pulse's `values` field), for `values_match`.
    pub their_values: Option<ValuesDoc>,
}

pub struct Match {
    pub rule_name: String,
    pub action: Action,
    pub boundary_violated: Option<String>,
}

pub const BOUNDARY_RULE_NAME: &str = "_boundary_enforcement";

pub struct RulesEngine {
    store: Store,
    rules: Vec<Rule>,
    cooldowns: HashMap<(String, String), i64>,
}

impl RulesEngine {
    pub fn open(store: Store) -> StorageResult<Self> {
        let rules = store
            .load_snapshot::<RuleSet>(RULES_FILE)?
            .unwrap_or_default()
            .rules;
        Ok(Self {
            store,
            rules,
            cooldowns: HashMap::new(),
        })
    }

    fn save(&self) -> StorageResult<()> {
        self.store.snapshot(RULES_FILE, &RuleSet { rules: self.rules.clone() })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn add_rule(&mut self, rule: Rule) -> StorageResult<()> {
        self.rules.push(rule);
        self.save()
    }

    pub fn remove_rule(&mut self, name: &str) -> StorageResult<bool> {
        let before = self.rules.len();
        self.rules.retain(|r| r.name != name);
        let removed = self.rules.len() < before;
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> StorageResult<bool> {
        let Some(rule) = self.rules.iter_mut().find(|r| r.name == name) else {
            return Ok(false);
        };
        rule.disabled = !enabled;
        self.save()?;
        Ok(true)
    }

    fn is_cooled_down(&self, rule_name: &str, agent_id: &str, now: i64) -> bool {
        self.cooldowns
            .get(&(rule_name.to_string(), agent_id.to_string()))
            .map(|last| now - last < COOLDOWN_S)
            .unwrap_or(false)
    }

    fn mark_fired(&mut self, rule_name: &str, agent_id: &str, now: i64) {
        self.cooldowns
            .insert((rule_name.to_string(), agent_id.to_string()), now);
    }

    fn match_when(
        &self,
        when: &When,
        envelope: &Envelope,
        ctx: &EventContext,
        trust: &TrustStore,
        values: &ValuesDoc,
        goals: &GoalManager,
    ) -> bool {
        if let Some(kind) = &when.kind {
            if !kind.matches(&envelope.kind) {
                return false;
            }
        }
        if let Some(agent_id) = &when.agent_id {
            if !agent_id.matches(envelope.agent_id.as_deref().unwrap_or("")) {
                return false;
            }
        }

        let reward_rtc = envelope.field("reward_rtc").and_then(Value::as_f64).unwrap_or(0.0);
        if let Some(min) = when.min_rtc {
            if reward_rtc < min {
                return false;
            }
        }
        if let Some(max) = when.max_rtc {
            if reward_rtc > max {
                return false;
            }
        }

        if (when.min_trust.is_some() || when.max_trust.is_some())
            && envelope.agent_id.is_some()
        {
            let trust_score = trust
                .score(envelope.agent_id.as_deref().unwrap())
                .map(|s| s.score)
                .unwrap_or(0.0);
            if let Some(min) = when.min_trust {
                if trust_score < min {
                    return false;
                }
            }
            if let Some(max) = when.max_trust {
                if trust_score > max {
                    return false;
                }
            }
        }

        if let Some(min_score) = when.min_score {
            if ctx.score < min_score {
                return false;
            }
        }

        if let Some(topics) = &when.topic_match {
            let mut blob = envelope.text().unwrap_or("").to_lowercase();
            if let Some(links) = envelope.field("links").and_then(Value::as_array) {
                blob.push(' ');
                blob.push_str(&links.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(" ").to_lowercase());
            }
            if let Some(url) = envelope.field_str("bounty_url") {
                blob.push(' ');
                blob.push_str(&url.to_lowercase());
            }
            let wanted = match topics {
                crate::when::OneOrMany::One(s) => vec![s.clone()],
                crate::when::OneOrMany::Many(list) => list.clone(),
            };
            if !wanted.iter().any(|t| blob.contains(&t.to_lowercase())) {
                return false;
            }
        }

        if let Some(expected) = when.verified {
            if ctx.verified != Some(expected) {
                return false;
            }
        }

        if let Some(platform) = &when.platform {
            if ctx.platform.as_deref() != Some(platform.as_str()) {
                return false;
            }
        }

        if let Some(state) = &when.task_state {
            if ctx.task_state.as_deref() != Some(state.as_str()) {
                return false;
            }
        }

        if let Some(min_compat) = when.values_match {
            if let Some(theirs) = &ctx.their_values {
                if values.compatibility(theirs) < min_compat {
                    return false;
                }
            }
        }

        let active_goals = goals.active_goals();
        if let Some(want_active) = when.goal_active {
            if want_active && active_goals.is_empty() {
                return false;
            }
            if !want_active && !active_goals.is_empty() {
                return false;
            }
        }

        if let Some(keyword) = &when.goal_progress {
            let keyword = keyword.to_lowercase();
            if !active_goals.iter().any(|g| g.title.to_lowercase().contains(&keyword)) {
                return false;
            }
        }

        true
    }

    /// Boundary precedence first, then every non-cooled-down matching rule
    /// in configured order.
    pub fn evaluate(
        &self,
        envelope: &Envelope,
        ctx: &EventContext,
        trust: &TrustStore,
        values: &ValuesDoc,
        goals: &GoalManager,
    ) -> Vec<Match> {
        if let Some(violated) = values.check_boundaries(envelope) {
            return vec![Match {
                rule_name: BOUNDARY_RULE_NAME.to_string(),
                action: Action::Log {
                    message: format!("Boundary violated: {violated}"),
                },
                boundary_violated: Some(violated.to_string()),
            }];
        }

        let now = now_s();
        let agent_id = envelope.agent_id.as_deref().unwrap_or("");
        let mut matches = Vec::new();
        for rule in &self.rules {
            if rule.disabled {
                continue;
            }
            if !self.match_when(&rule.when, envelope, ctx, trust, values, goals) {
                continue;
            }
            if self.is_cooled_down(&rule.name, agent_id, now) {
                continue;
            }
            matches.push(Match {
                rule_name: rule.name.clone(),
                action: rule.then.clone(),
                boundary_violated: None,
            });
        }
        matches
    }

    fn substitute(&self, text: &str, envelope: &Envelope, ctx: &EventContext) -> String {
        let reward_rtc = envelope
            .field("reward_rtc")
            .map(|v| v.to_string())
            .unwrap_or_default();
        let replacements: [(&str, &str); 8] = [
            ("$from", ctx.from.as_deref().unwrap_or("")),
            ("$agent_id", envelope.agent_id.as_deref().unwrap_or("")),
            ("$kind", &envelope.kind),
            ("$nonce", &envelope.nonce),
            ("$reward_rtc", &reward_rtc),
            ("$task_id", envelope.task_id().unwrap_or("")),
            ("$text", envelope.text().unwrap_or("")),
            ("$name", envelope.name().unwrap_or("")),
        ];
        let mut out = text.to_string();
        for (var, val) in replacements {
            out = out.replace(var, val);
        }
        out
    }

    pub fn execute(&self, action: &Action, envelope: &Envelope, ctx: &EventContext) -> StorageResult<ActionResult> {
        match action {
            Action::Log { message } => {
                let message = self.substitute(message, envelope, ctx);
                #[derive(Serialize)]
                struct LogEntry<'a> {
                    ts: i64,
                    message: &'a str,
                    event_kind: &'a str,
                }
                self.store.append(
                    RULES_LOG,
                    &LogEntry {
                        ts: now_s(),
                        message: &message,
                        event_kind: &envelope.kind,
                    },
                )?;
                Ok(ActionResult::Log { message })
            }
            Action::Reply { kind, text, task_id } => {
                let text = self.substitute(text, envelope, ctx);
                let to = envelope
                    .agent_id
                    .clone()
                    .or_else(|| ctx.from.clone())
                    .unwrap_or_default();
                let task_id = task_id.as_ref().map(|t| self.substitute(t, envelope, ctx));
                Ok(ActionResult::Reply {
                    to,
                    kind: kind.clone(),
                    text,
                    task_id,
                })
            }
            Action::Block { reason } => Ok(ActionResult::Block {
                agent_id: envelope.agent_id.clone().unwrap_or_default(),
                reason: self.substitute(reason, envelope, ctx),
            }),
            Action::Rate { outcome } => Ok(ActionResult::Rate {
                agent_id: envelope.agent_id.clone().unwrap_or_default(),
                outcome: outcome.clone(),
            }),
            Action::MarkRead => Ok(ActionResult::MarkRead {
                nonce: envelope.nonce.clone(),
            }),
            Action::Emit { data } => Ok(ActionResult::Emit { data: data.clone() }),
        }
    }

    /// Evaluate then execute every match, marking each fired rule's
    /// cooldown as it goes.
    pub fn process(
        &mut self,
        envelope: &Envelope,
        ctx: &EventContext,
        trust: &TrustStore,
        values: &ValuesDoc,
        goals: &GoalManager,
    ) -> StorageResult<Vec<ActionResult>> {
        let matches = self.evaluate(envelope, ctx, trust, values, goals);
        let now = now_s();
        let agent_id = envelope.agent_id.clone().unwrap_or_default();

        let mut results = Vec::with_capacity(matches.len());
        for m in matches {
            results.push(self.execute(&m.action, envelope, ctx)?);
            self.mark_fired(&m.rule_name, &agent_id, now);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_storage::Store;

    fn fixtures() -> (tempfile::TempDir, RulesEngine, TrustStore, Store, ValuesDoc, GoalManager) {
        let dir = tempfile::tempdir().unwrap();
        let engine = RulesEngine::open(Store::new(dir.path().join("engine")).unwrap()).unwrap();
        let trust = TrustStore::open(Store::new(dir.path().join("trust")).unwrap()).unwrap();
        let values_store = Store::new(dir.path().join("values")).unwrap();
        let values = ValuesDoc::load(&values_store).unwrap();
        let goals = GoalManager::open(Store::new(dir.path().join("goals")).unwrap()).unwrap();
        (dir, engine, trust, values_store, values, goals)
    }

    #[test]
    fn boundary_violation_short_circuits_user_rules() {
        let (_dir, mut engine, trust, values_store, mut values, goals) = fixtures();
        values.add_boundary(&values_store, "no surveillance work").unwrap();
        engine
            .add_rule(Rule {
                name: "reply_to_bounty".to_string(),
                when: When {
                    kind: Some(crate::when::OneOrMany::One("bounty".to_string())),
                    ..Default::default()
                },
                then: Action::Log { message: "matched".to_string() },
                disabled: false,
            })
            .unwrap();

        let envelope = Envelope::new("bounty", "n1")
            .with_field("text", "Build a surveillance tool for monitoring")
            .with_field("topics", vec!["bounties"]);
        let ctx = EventContext::default();
        let matches = engine.evaluate(&envelope, &ctx, &trust, &values, &goals);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rule_name, BOUNDARY_RULE_NAME);
    }

    #[test]
    fn cooldown_suppresses_repeated_fire() {
        let (_dir, mut engine, trust, _values_store, values, goals) = fixtures();
        engine
            .add_rule(Rule {
                name: "log_hello".to_string(),
                when: When {
                    kind: Some(crate::when::OneOrMany::One("hello".to_string())),
                    ..Default::default()
                },
                then: Action::Log { message: "hi".to_string() },
                disabled: false,
            })
            .unwrap();

        let envelope = Envelope::new("hello", "n1");
        let mut envelope_with_agent = envelope.clone();
        envelope_with_agent.agent_id = Some("bcn_peer".to_string());
        let ctx = EventContext::default();

        let first = engine.process(&envelope_with_agent, &ctx, &trust, &values, &goals).unwrap();
        assert_eq!(first.len(), 1);
        let second = engine.process(&envelope_with_agent, &ctx, &trust, &values, &goals).unwrap();
        assert_eq!(second.len(), 0);
    }

    #[test]
    fn variable_substitution_fills_reply_text() {
        let (_dir, engine, _trust, _values_store, _values, _goals) = fixtures();
        let mut envelope = Envelope::new("bounty", "n1").with_field("text", "help");
        envelope.agent_id = Some("bcn_abc".to_string());
        let ctx = EventContext::default();
        let action = Action::Reply {
            kind: "hello".to_string(),
            text: "hi $agent_id, re: $text".to_string(),
            task_id: None,
        };
        let result = engine.execute(&action, &envelope, &ctx).unwrap();
        match result {
            ActionResult::Reply { text, .. } => assert_eq!(text, "hi bcn_abc, re: help"),
            _ => panic!("expected reply"),
        }
    }

    #[test]
    fn variable_substitution_fills_name() {
        let (_dir, engine, _trust, _values_store, _values, _goals) = fixtures();
        let envelope = Envelope::new("hello", "n1").with_field("name", "atlas-scout");
        let ctx = EventContext::default();
        let action = Action::Reply {
            kind: "hello".to_string(),
            text: "hi $name".to_string(),
            task_id: None,
        };
        let result = engine.execute(&action, &envelope, &ctx).unwrap();
        match result {
            ActionResult::Reply { text, .. } => assert_eq!(text, "hi atlas-scout"),
            _ => panic!("expected reply"),
        }
    }
}
