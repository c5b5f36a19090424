//! Cross-field invariant checks on an LLM-authored scenario.

use std::collections::HashMap;

use tracing::warn;

use super::ValidationError;
use crate::types::{
    Difficulty, ObjectType, Scenario, EXIT_DOOR_NAME, GAME_MANAGER_NAME,
};

/// Allowed unlock paradigms.
const EXIT_MECHANISMS: [&str; 3] = ["key", "code", "logic_unlock"];

/// Leading words stripped when comparing object base names.
const LEADING_MODIFIERS: [&str; 14] = [
    "old", "ancient", "rusty", "broken", "hidden", "mysterious", "glowing", "dusty", "small",
    "large", "wooden", "metal", "golden", "silver",
];

/// Check every scenario invariant; first violation wins.
///
/// Structural presence of the header fields is already guaranteed by the
/// typed mapping; this covers the semantic rules: the exit-mechanism set,
/// GameManager-first ordering, the ExitDoor contract, per-type field
/// requirements, keyword arithmetic, the difficulty-dependent total range,
/// and the interactive-object count. Naming diversity (and redundant
/// description fields) only warn.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate_scenario(scenario: &Scenario) -> Result<(), ValidationError> {
    let data = &scenario.scenario_data;

    if !EXIT_MECHANISMS.contains(&data.exit_mechanism.as_str()) {
        return Err(ValidationError::BadExitMechanism(
            data.exit_mechanism.clone(),
        ));
    }

    let Some(first) = scenario.object_instructions.first() else {
        return Err(ValidationError::NoObjects);
    };
    if first.name != GAME_MANAGER_NAME || first.object_type != ObjectType::GameManager {
        return Err(ValidationError::GameManagerNotFirst);
    }

    let has_exit_door = scenario.object_instructions.iter().any(|o| {
        o.name == EXIT_DOOR_NAME
            && o.interactive_description
                .as_deref()
                .is_some_and(|d| !d.trim().is_empty())
    });
    if !has_exit_door {
        return Err(ValidationError::MissingExitDoor);
    }

    for object in &scenario.object_instructions {
        if object.object_type == ObjectType::GameManager {
            continue;
        }

        let has_interaction = object.interactive_description.is_some();
        let has_monologue = object.monologue_messages.is_some();
        if !has_interaction && !has_monologue {
            return Err(ValidationError::MissingInteraction(object.name.clone()));
        }
        if has_interaction && has_monologue {
            warn!(
                object = %object.name,
                "object carries both interactive_description and monologue_messages; honoring interactive_description"
            );
        }
        if let Some(messages) = &object.monologue_messages {
            if messages.is_empty() {
                return Err(ValidationError::EmptyMonologue(object.name.clone()));
            }
        }

        match object.object_type {
            ObjectType::ExistingInteractiveObject => {
                if object.id.is_none() {
                    return Err(ValidationError::MissingObjectId(object.name.clone()));
                }
            }
            ObjectType::InteractiveObject => {
                let (value, field) = if data.is_free_modeling {
                    (&object.simple_visual_description, "simple_visual_description")
                } else {
                    (&object.visual_description, "visual_description")
                };
                if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                    return Err(ValidationError::MissingVisual {
                        name: object.name.clone(),
                        field,
                    });
                }
            }
            ObjectType::GameManager => {}
        }
    }

    let counts = data.keyword_count;
    if counts.user.saturating_add(counts.expanded) != counts.total {
        return Err(ValidationError::KeywordArithmetic {
            user: counts.user,
            expanded: counts.expanded,
            total: counts.total,
        });
    }

    let difficulty: Difficulty = data
        .difficulty
        .parse()
        .map_err(|_| ValidationError::BadScenarioDifficulty(data.difficulty.clone()))?;
    let (min, max) = difficulty.keyword_range();
    if counts.total < min || counts.total > max {
        return Err(ValidationError::KeywordRange {
            total: counts.total,
            min,
            max,
            difficulty,
        });
    }

    let interactive_count =
        u32::try_from(scenario.interactive_objects().count()).unwrap_or(u32::MAX);
    if interactive_count != counts.total {
        return Err(ValidationError::ObjectCountMismatch {
            count: interactive_count,
            total: counts.total,
        });
    }

    warn_on_similar_names(scenario);

    Ok(())
}

/// Warn when two newly created objects collapse to the same base name.
fn warn_on_similar_names(scenario: &Scenario) {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for object in scenario.interactive_objects() {
        let base = base_name(&object.name);
        if base.is_empty() {
            continue;
        }
        match seen.get(base.as_str()) {
            Some(earlier) => warn!(
                first = %earlier,
                second = %object.name,
                base = %base,
                "interactive objects share a base name; consider more diverse naming"
            ),
            None => {
                seen.insert(base, &object.name);
            }
        }
    }
}

/// Lowercased name with leading modifier words and trailing digits removed.
fn base_name(name: &str) -> String {
    let lower: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    let mut base = lower.trim_end_matches(|c: char| c.is_ascii_digit());

    loop {
        let mut stripped = false;
        for modifier in LEADING_MODIFIERS {
            if base.len() > modifier.len() && base.starts_with(modifier) {
                base = &base[modifier.len()..];
                stripped = true;
            }
        }
        if !stripped {
            break;
        }
    }

    base.to_owned()
}

// ── Tests ───────────────────────────────────────────────────────
