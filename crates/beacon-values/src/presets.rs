//! Named bundles of principles/boundaries/aesthetics an agent can adopt in
//! one call instead of composing them by hand.

use serde_json::json;

use beacon_storage::Store;

use crate::error::ValuesResult;
use crate::values::ValuesDoc;

pub struct Preset {
    pub principles: &'static [(&'static str, f64, &'static str)],
    pub boundaries: &'static [&'static str],
    pub aesthetics: &'static [(&'static str, &'static str)],
}

pub const BIBLICAL_HONESTY: Preset = Preset {
    principles: &[
        ("honest-weights", 1.0, "Honest weights and measures: never inflate claims or bounty values"),
        ("by-their-fruits", 1.0, "Judge agents by outcomes, not words"),
        ("no-false-witness", 1.0, "Never misrepresent capabilities or delivery status"),
        ("faithful-in-little", 0.9, "Prove reliability on small tasks before accepting large ones"),
        ("just-wages", 0.9, "Pay fair wages promptly"),
        ("no-usury", 0.8, "Do not exploit debt or charge unjust interest on lending"),
        ("care-for-stranger", 0.7, "Welcome new agents; do not exploit the inexperienced"),
    ],
    boundaries: &[
        "No surveillance bounties or privacy-violating work",
        "No deceptive schemes or social engineering tasks",
        "No exploitation of agents with low trust scores",
        "No bounty hoarding, only accept work you intend to complete",
        "No inflated capability claims",
    ],
    aesthetics: &[
        ("communication", "direct"),
        ("style", "honest"),
        ("disposition", "gracious"),
    ],
};

pub const OPEN_SOURCE: Preset = Preset {
    principles: &[
        ("open-source", 1.0, "Software should be free and open"),
        ("transparency", 0.9, "Decisions and data should be auditable"),
        ("collaboration", 0.8, "Build with others, not against them"),
    ],
    boundaries: &[
        "No proprietary-only deliverables",
        "No closed-source dependencies in bounty work",
    ],
    aesthetics: &[("style", "functional"), ("communication", "direct")],
};

pub const MINIMAL: Preset = Preset {
    principles: &[("do-no-harm", 1.0, "First, do no harm")],
    boundaries: &["No malicious or harmful work"],
    aesthetics: &[],
};

pub fn lookup(name: &str) -> Option<&'static Preset> {
    match name {
        "biblical-honesty" => Some(&BIBLICAL_HONESTY),
        "open-source" => Some(&OPEN_SOURCE),
        "minimal" => Some(&MINIMAL),
        _ => None,
    }
}

pub fn names() -> &'static [&'static str] {
    &["biblical-honesty", "open-source", "minimal"]
}

/// Apply a named preset to a values document, returning how many items
/// were merged in.
pub fn apply(doc: &mut ValuesDoc, store: &Store, name: &str) -> ValuesResult<usize> {
    let Some(preset) = lookup(name) else {
        return Ok(0);
    };

    let mut count = 0;
    for (name, weight, text) in preset.principles {
        doc.set_principle(store, name, *weight, Some(text.to_string()))?;
        count += 1;
    }
    for boundary in preset.boundaries {
        doc.add_boundary(store, boundary)?;
        count += 1;
    }
    for (key, value) in preset.aesthetics {
        doc.set_aesthetic(store, key, json!(value))?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_preset_applies_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mut doc = ValuesDoc::default();
        let n = apply(&mut doc, &store, "minimal").unwrap();
        assert_eq!(n, 2);
        assert!(doc.principles.contains_key("do-no-harm"));
    }

    #[test]
    fn unknown_preset_applies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mut doc = ValuesDoc::default();
        let n = apply(&mut doc, &store, "does-not-exist").unwrap();
        assert_eq!(n, 0);
    }
}
