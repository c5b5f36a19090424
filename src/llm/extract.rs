//! Extraction of structured artifacts from free-form LLM output.
//!
//! Two consumers: scenario generation wants the first JSON fenced block
//! (or the whole response), script generation wants every fenced block
//! that declares a class. Both operate on plain text; nothing here does
//! I/O.

use base64::Engine;
use regex::Regex;

use super::LlmError;
use crate::types::ScriptBundle;

/// A region between triple-backtick fences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// Language tag after the opening fence; empty when untagged.
    pub tag: String,
    /// Inner body, exactly as it appeared between the fences.
    pub body: String,
}

/// Scan `text` for fenced blocks, in document order.
///
/// The opening fence need not sit at a line start; the tag is whatever
/// follows it up to the end of that line. Unterminated fences are ignored.
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let Ok(re) = Regex::new(r"(?s)```([^\n]*)\n(.*?)```") else {
        return Vec::new();
    };
    re.captures_iter(text)
        .map(|caps| FencedBlock {
            tag: caps.get(1).map(|m| m.as_str().trim().to_owned()).unwrap_or_default(),
            body: caps.get(2).map(|m| m.as_str().to_owned()).unwrap_or_default(),
        })
        .collect()
}

/// Extract the scenario JSON object from a response.
///
/// Takes the first fenced block whose tag is empty or `json`
/// (case-insensitive); with no such block, the entire response is the
/// candidate. The candidate must parse as a JSON object.
///
/// # Errors
///
/// Returns [`LlmError::ScenarioJson`] when the candidate is not a JSON
/// object.
pub fn scenario_json(text: &str) -> Result<serde_json::Value, LlmError> {
    let candidate = fenced_blocks(text)
        .into_iter()
        .find(|b| b.tag.is_empty() || b.tag.eq_ignore_ascii_case("json"))
        .map(|b| b.body)
        .unwrap_or_else(|| text.to_owned());

    let value: serde_json::Value = serde_json::from_str(candidate.trim())
        .map_err(|e| LlmError::ScenarioJson(e.to_string()))?;
    if !value.is_object() {
        return Err(LlmError::ScenarioJson("top level is not an object".to_owned()));
    }
    Ok(value)
}

/// Build the script bundle from a response.
///
/// Every non-empty fenced block is inspected for its first
/// `public [partial] class NAME` declaration; blocks without one are
/// dropped with a warning. Names ending in `C` (other than `C` itself)
/// lose the suffix; collisions get `_1`, `_2`, … appended. Values are the
/// Base64-encoded UTF-8 bytes of the original block body.
///
/// # Errors
///
/// Returns [`LlmError::EmptyScriptBundle`] when nothing usable remains.
pub fn script_bundle(text: &str) -> Result<ScriptBundle, LlmError> {
    let mut bundle = ScriptBundle::new();
    for block in fenced_blocks(text) {
        if block.body.trim().is_empty() {
            continue;
        }
        let Some(declared) = class_name(&block.body) else {
            tracing::warn!(tag = %block.tag, "dropping fenced block without a class declaration");
            continue;
        };
        let name = strip_class_suffix(&declared).to_owned();
        let resolved = resolve_collision(&bundle, &name);
        bundle.insert(resolved, base64_encode(&block.body));
    }

    if bundle.is_empty() {
        return Err(LlmError::EmptyScriptBundle);
    }
    Ok(bundle)
}

/// First `public [partial] class NAME` declaration in a block body.
fn class_name(body: &str) -> Option<String> {
    let re = Regex::new(r"public\s+(?:partial\s+)?class\s+([A-Za-z_][A-Za-z0-9_]*)\s*[:{]").ok()?;
    Some(re.captures(body)?.get(1)?.as_str().to_owned())
}

/// Strip the trailing `C` naming convention, leaving `C` itself alone.
fn strip_class_suffix(name: &str) -> &str {
    if name.len() > 1 && name.ends_with('C') {
        &name[..name.len().saturating_sub(1)]
    } else {
        name
    }
}

/// Append `_1`, `_2`, … until `name` is unique within the bundle.
fn resolve_collision(bundle: &ScriptBundle, name: &str) -> String {
    if !bundle.contains_key(name) {
        return name.to_owned();
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{name}_{n}");
        if !bundle.contains_key(&candidate) {
            return candidate;
        }
        n = n.saturating_add(1);
    }
}

/// Encode a string as standard base64.
fn base64_encode(input: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(input)
}

// ── Tests ───────────────────────────────────────────────────────
