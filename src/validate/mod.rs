//! Request and scenario validation.
//!
//! Validators are pure functions returning `Ok(())` or the first violation;
//! non-fatal findings (naming diversity, redundant description fields) are
//! logged as warnings and never fail a job. Both validators run inside the
//! pipeline, so a violation lands the job in FAILED with the violation text
//! as the error document's message.

use thiserror::Error;

use crate::types::Difficulty;

mod request;
mod scenario;

pub use request::validate_request;
pub use scenario::validate_scenario;

/// First violation found by a validator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// `uuid` is blank.
    #[error("uuid must not be empty")]
    EmptyUserId,
    /// `theme` is blank.
    #[error("theme must not be empty")]
    EmptyTheme,
    /// `keywords` is empty.
    #[error("keywords must contain at least one entry")]
    NoKeywords,
    /// Some keyword is blank.
    #[error("keywords must not contain blank entries")]
    BlankKeyword,
    /// `roomPrefab` does not parse as a URL.
    #[error("roomPrefab is not a valid URL: {0}")]
    BadPrefabUrl(String),
    /// `roomPrefab` parses but is not https.
    #[error("roomPrefab URL must start with https://: {0}")]
    InsecurePrefabUrl(String),
    /// `difficulty` is present but outside the allowed set.
    #[error("difficulty must be one of easy, normal, hard: {0}")]
    BadDifficulty(String),

    /// `exit_mechanism` is outside the allowed set.
    #[error("exit_mechanism must be one of key, code, logic_unlock: {0}")]
    BadExitMechanism(String),
    /// `object_instructions` is empty.
    #[error("object_instructions must not be empty")]
    NoObjects,
    /// The first object is not the GameManager.
    #[error("object_instructions[0] must be GameManager with type game_manager")]
    GameManagerNotFirst,
    /// No ExitDoor object carrying an interactive description.
    #[error("scenario has no ExitDoor object with an interactive_description")]
    MissingExitDoor,
    /// A non-manager object has neither description kind.
    #[error("object {0} must carry interactive_description or monologue_messages")]
    MissingInteraction(String),
    /// `monologue_messages` is present but empty.
    #[error("object {0} has an empty monologue_messages array")]
    EmptyMonologue(String),
    /// An existing interactive object has no prefab id.
    #[error("existing interactive object {0} is missing id")]
    MissingObjectId(String),
    /// An interactive object lacks the visual field its modeling mode needs.
    #[error("interactive object {name} is missing {field}")]
    MissingVisual {
        /// Object name.
        name: String,
        /// Required field for the scenario's modeling mode.
        field: &'static str,
    },
    /// `scenario_data.difficulty` is outside the allowed set.
    #[error("scenario difficulty must be one of easy, normal, hard: {0}")]
    BadScenarioDifficulty(String),
    /// `user + expanded` does not equal `total`.
    #[error("keyword_count mismatch: user {user} + expanded {expanded} != total {total}")]
    KeywordArithmetic {
        /// Declared user keyword count.
        user: u32,
        /// Declared expanded keyword count.
        expanded: u32,
        /// Declared total.
        total: u32,
    },
    /// `total` lies outside the difficulty-dependent interval.
    #[error("keyword_count.total {total} outside allowed range {min}..={max} for difficulty {difficulty}")]
    KeywordRange {
        /// Declared total.
        total: u32,
        /// Lower bound for the difficulty.
        min: u32,
        /// Upper bound for the difficulty.
        max: u32,
        /// Scenario difficulty.
        difficulty: Difficulty,
    },
    /// Interactive-object count disagrees with the declared total.
    #[error("{count} interactive_object entries but keyword_count.total is {total}")]
    ObjectCountMismatch {
        /// Number of `interactive_object` entries.
        count: u32,
        /// Declared total.
        total: u32,
    },
}
