//! Core wire and domain types for the escape-room generation service.
//!
//! Everything that crosses the HTTP boundary or the LLM boundary lives here:
//! the inbound [`CreationRequest`], the job lifecycle types ([`JobStatus`],
//! [`JobState`]), and the typed form of the LLM-authored [`Scenario`].
//! The scenario types keep unknown fields in flattened extras so the
//! validated JSON embedded in result documents round-trips losslessly.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Name the first object instruction must carry.
pub const GAME_MANAGER_NAME: &str = "GameManager";

/// Name of the mandatory exit-door object.
pub const EXIT_DOOR_NAME: &str = "ExitDoor";

// ── Request ─────────────────────────────────────────────────────

/// Difficulty of a requested room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Short rooms, few keywords.
    Easy,
    /// Default difficulty.
    Normal,
    /// Long rooms, many keywords.
    Hard,
}

impl Difficulty {
    /// Inclusive range the scenario's `keyword_count.total` must fall in.
    pub fn keyword_range(self) -> (u32, u32) {
        match self {
            Self::Easy => (3, 5),
            Self::Normal => (6, 7),
            Self::Hard => (8, 9),
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Easy => f.write_str("easy"),
            Self::Normal => f.write_str("normal"),
            Self::Hard => f.write_str("hard"),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "normal" => Ok(Self::Normal),
            "hard" => Ok(Self::Hard),
            other => Err(anyhow::anyhow!("unknown difficulty: {other}")),
        }
    }
}

/// An object already placed in the room prefab, referenced by the scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingObject {
    /// Object name as known to the client.
    pub name: String,
    /// Client-side identifier; opaque to the server.
    pub id: serde_json::Value,
}

/// Inbound room-creation request (wire form).
///
/// Required fields are enforced by deserialization: a body missing `uuid`,
/// `theme`, `keywords`, or `roomPrefab` is rejected at the HTTP surface.
/// Semantic checks (blank strings, URL scheme, difficulty set) belong to
/// [`crate::validate::validate_request`] and run inside the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationRequest {
    /// Submitting user's identifier.
    #[serde(rename = "uuid")]
    pub user_id: String,
    /// Room theme, e.g. "pirate cove".
    pub theme: String,
    /// User-chosen keywords seeding the scenario.
    pub keywords: Vec<String>,
    /// Requested difficulty; absent means normal.
    #[serde(default)]
    pub difficulty: Option<String>,
    /// URL of the room prefab the client will load; must be https.
    #[serde(rename = "roomPrefab")]
    pub room_prefab: String,
    /// Objects already present in the prefab; null means none.
    #[serde(rename = "existingObjects", default)]
    pub existing_objects: Option<Vec<ExistingObject>>,
    /// Whether simplified visual descriptions should drive modeling.
    #[serde(rename = "isFreeModeling", default)]
    pub is_free_modeling: bool,
}

impl CreationRequest {
    /// Difficulty with the absent-means-normal default applied.
    ///
    /// An unparseable value also maps to normal; the request validator has
    /// already rejected such requests by the time this is consulted.
    pub fn resolved_difficulty(&self) -> Difficulty {
        self.difficulty
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Difficulty::Normal)
    }

    /// Existing objects with the null-means-empty default applied.
    pub fn existing(&self) -> &[ExistingObject] {
        self.existing_objects.as_deref().unwrap_or(&[])
    }
}

// ── Job lifecycle ───────────────────────────────────────────────

/// Lifecycle status of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Registered, waiting for a worker.
    Queued,
    /// A worker is running the pipeline.
    Processing,
    /// Terminal: result document available.
    Completed,
    /// Terminal: failure document available.
    Failed,
}

impl JobStatus {
    /// Whether this status ends the job's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a transition to `next` is legal.
    ///
    /// Transitions only move forward: QUEUED → PROCESSING → terminal. A
    /// queued job may also jump straight to a terminal state (shutdown
    /// sweep); terminal states accept nothing.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            Self::Queued => next != Self::Queued,
            Self::Processing => next.is_terminal(),
            Self::Completed | Self::Failed => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => f.write_str("QUEUED"),
            Self::Processing => f.write_str("PROCESSING"),
            Self::Completed => f.write_str("COMPLETED"),
            Self::Failed => f.write_str("FAILED"),
        }
    }
}

/// Snapshot of one job held by the result store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Result document; present only on terminal states.
    pub result: Option<serde_json::Value>,
}

/// Generate a fresh job identifier ("ruid").
///
/// Epoch-millisecond prefix plus a 16-hex-char random suffix; unique for
/// the process lifetime and never reused.
pub fn new_ruid() -> String {
    let suffix: u64 = rand::random();
    format!("{}-{suffix:016x}", Utc::now().timestamp_millis())
}

// ── Scenario (LLM output, typed form) ───────────────────────────

/// Keyword accounting the LLM must report.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct KeywordCount {
    /// Keywords taken verbatim from the request.
    pub user: u32,
    /// Keywords the LLM added.
    pub expanded: u32,
    /// Declared total; must equal `user + expanded`.
    pub total: u32,
}

/// Classification of an object instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    /// The singleton orchestrating object; always first.
    GameManager,
    /// Interaction added to an object already in the prefab.
    ExistingInteractiveObject,
    /// Newly created object that gets a 3D model.
    InteractiveObject,
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GameManager => f.write_str("game_manager"),
            Self::ExistingInteractiveObject => f.write_str("existing_interactive_object"),
            Self::InteractiveObject => f.write_str("interactive_object"),
        }
    }
}

/// One object the scenario instructs the client to realize.
///
/// Unknown LLM-emitted fields are preserved in `extra` so the scenario
/// embedded in the result document loses nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectInstruction {
    /// Object name; unique within the scenario by convention.
    pub name: String,
    /// Object classification.
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    /// Prefab identifier; required for existing interactive objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// Player-facing interaction text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive_description: Option<String>,
    /// Narration lines; alternative to `interactive_description`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monologue_messages: Option<Vec<String>>,
    /// Mesh prompt for standard modeling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_description: Option<String>,
    /// Mesh prompt for free modeling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple_visual_description: Option<String>,
    /// Fields the LLM emitted that the server does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Scenario header block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioData {
    /// Theme echoed (and possibly embellished) by the LLM.
    pub theme: String,
    /// Room description shown to players.
    pub description: String,
    /// What the player must achieve to escape.
    pub escape_condition: String,
    /// Puzzle ordering; free-form (string or structured).
    pub puzzle_flow: serde_json::Value,
    /// Unlock paradigm; one of key, code, logic_unlock.
    pub exit_mechanism: String,
    /// Keyword accounting.
    pub keyword_count: KeywordCount,
    /// Difficulty the LLM generated for.
    pub difficulty: String,
    /// Whether simplified visual descriptions drive modeling.
    #[serde(default)]
    pub is_free_modeling: bool,
    /// Uninterpreted LLM extras.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Validated structured output of the scenario LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Header block.
    pub scenario_data: ScenarioData,
    /// Ordered object instructions; `GameManager` first.
    pub object_instructions: Vec<ObjectInstruction>,
    /// Uninterpreted LLM extras.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Scenario {
    /// Objects that require a 3D model, in scenario order.
    pub fn interactive_objects(&self) -> impl Iterator<Item = &ObjectInstruction> {
        self.object_instructions
            .iter()
            .filter(|o| o.object_type == ObjectType::InteractiveObject)
    }
}

// ── Result building blocks ──────────────────────────────────────

/// Mapping from script name to Base64-encoded source payload.
pub type ScriptBundle = BTreeMap<String, String>;

/// Handle for one submitted 3D model generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelHandle {
    /// Scenario object the model belongs to.
    #[serde(rename = "objectName")]
    pub object_name: String,
    /// Provider-opaque tracking id, or an `error-<kind>-<uuid>` sentinel.
    #[serde(rename = "trackingId")]
    pub tracking_id: String,
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_from_str() {
        assert_eq!("easy".parse::<Difficulty>().expect("ok"), Difficulty::Easy);
        assert_eq!(
            "Normal".parse::<Difficulty>().expect("ok"),
            Difficulty::Normal
        );
        assert_eq!("HARD".parse::<Difficulty>().expect("ok"), Difficulty::Hard);
        assert!("brutal".parse::<Difficulty>().is_err());
        assert!("".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_difficulty_keyword_ranges() {
        assert_eq!(Difficulty::Easy.keyword_range(), (3, 5));
        assert_eq!(Difficulty::Normal.keyword_range(), (6, 7));
        assert_eq!(Difficulty::Hard.keyword_range(), (8, 9));
    }

    #[test]
    fn test_job_status_wire_form() {
        let json = serde_json::to_string(&JobStatus::Queued).expect("serialize");
        assert_eq!(json, "\"QUEUED\"");
        let back: JobStatus = serde_json::from_str("\"PROCESSING\"").expect("deserialize");
        assert_eq!(back, JobStatus::Processing);
        assert_eq!(JobStatus::Failed.to_string(), "FAILED");
    }

    #[test]
    fn test_job_status_transitions() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Queued.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Queued));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn test_creation_request_defaults() {
        let body = serde_json::json!({
            "uuid": "u1",
            "theme": "pirate cove",
            "keywords": ["chest", "map"],
            "roomPrefab": "https://ex/r.txt",
            "existingObjects": null,
        });
        let req: CreationRequest = serde_json::from_value(body).expect("deserialize");
        assert_eq!(req.user_id, "u1");
        assert!(req.existing().is_empty());
        assert!(!req.is_free_modeling);
        assert_eq!(req.resolved_difficulty(), Difficulty::Normal);
    }

    #[test]
    fn test_creation_request_missing_uuid_names_field() {
        let body = serde_json::json!({
            "theme": "x",
            "keywords": ["k"],
            "roomPrefab": "https://u",
        });
        let err = serde_json::from_value::<CreationRequest>(body)
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("uuid"), "error was: {err}");
    }

    #[test]
    fn test_scenario_round_trip_preserves_extras() {
        let raw = serde_json::json!({
            "scenario_data": {
                "theme": "pirate cove",
                "description": "a cove",
                "escape_condition": "open the door",
                "puzzle_flow": "chest -> map -> door",
                "exit_mechanism": "key",
                "keyword_count": {"user": 2, "expanded": 4, "total": 6},
                "difficulty": "normal",
                "is_free_modeling": false,
                "mood": "stormy",
            },
            "object_instructions": [
                {"name": "GameManager", "type": "game_manager"},
                {
                    "name": "ExitDoor",
                    "type": "interactive_object",
                    "interactive_description": "a heavy door",
                    "visual_description": "oak door with iron bands",
                    "hint": "look closer",
                },
            ],
        });
        let scenario: Scenario = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(
            scenario.scenario_data.extra.get("mood"),
            Some(&serde_json::json!("stormy"))
        );
        let back = serde_json::to_value(&scenario).expect("serialize");
        assert_eq!(back["scenario_data"]["mood"], "stormy");
        assert_eq!(back["object_instructions"][1]["hint"], "look closer");
        assert_eq!(scenario.interactive_objects().count(), 1);
    }

    #[test]
    fn test_ruid_shape() {
        let a = new_ruid();
        let b = new_ruid();
        assert_ne!(a, b);
        let suffix = a.rsplit('-').next().expect("suffix");
        assert_eq!(suffix.len(), 16);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_model_handle_wire_names() {
        let handle = ModelHandle {
            object_name: "Chest".to_owned(),
            tracking_id: "tr-1".to_owned(),
        };
        let json = serde_json::to_value(&handle).expect("serialize");
        assert_eq!(json["objectName"], "Chest");
        assert_eq!(json["trackingId"], "tr-1");
    }
}
