//! Semantic checks on an inbound creation request.

use url::Url;

use super::ValidationError;
use crate::types::{CreationRequest, Difficulty};

/// Check a creation request beyond its wire shape.
///
/// Body-shape problems (missing fields, wrong types) never reach here;
/// deserialization rejects them at the HTTP surface. This covers blank
/// strings, the prefab URL scheme, and the difficulty set.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate_request(req: &CreationRequest) -> Result<(), ValidationError> {
    if req.user_id.trim().is_empty() {
        return Err(ValidationError::EmptyUserId);
    }
    if req.theme.trim().is_empty() {
        return Err(ValidationError::EmptyTheme);
    }
    if req.keywords.is_empty() {
        return Err(ValidationError::NoKeywords);
    }
    if req.keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ValidationError::BlankKeyword);
    }

    let prefab = req.room_prefab.trim();
    let url = Url::parse(prefab)
        .map_err(|e| ValidationError::BadPrefabUrl(format!("{prefab}: {e}")))?;
    if url.scheme() != "https" {
        return Err(ValidationError::InsecurePrefabUrl(prefab.to_owned()));
    }

    if let Some(difficulty) = req.difficulty.as_deref() {
        difficulty
            .parse::<Difficulty>()
            .map_err(|_| ValidationError::BadDifficulty(difficulty.to_owned()))?;
    }

    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CreationRequest {
        CreationRequest {
            user_id: "u1".to_owned(),
            theme: "pirate cove".to_owned(),
            keywords: vec!["chest".to_owned(), "map".to_owned()],
            difficulty: Some("normal".to_owned()),
            room_prefab: "https://ex/r.txt".to_owned(),
            existing_objects: None,
            is_free_modeling: false,
        }
    }

    #[test]
    fn test_valid_request_passes() {
        validate_request(&valid_request()).expect("valid");
    }

    #[test]
    fn test_blank_user_id() {
        let mut req = valid_request();
        req.user_id = "  ".to_owned();
        assert_eq!(
            validate_request(&req),
            Err(ValidationError::EmptyUserId)
        );
    }

    #[test]
    fn test_blank_theme() {
        let mut req = valid_request();
        req.theme = String::new();
        assert_eq!(validate_request(&req), Err(ValidationError::EmptyTheme));
    }

    #[test]
    fn test_empty_keywords() {
        let mut req = valid_request();
        req.keywords.clear();
        assert_eq!(validate_request(&req), Err(ValidationError::NoKeywords));
    }

    #[test]
    fn test_blank_keyword_entry() {
        let mut req = valid_request();
        req.keywords.push(" ".to_owned());
        assert_eq!(validate_request(&req), Err(ValidationError::BlankKeyword));
    }

    #[test]
    fn test_http_prefab_rejected() {
        let mut req = valid_request();
        req.room_prefab = "http://insecure".to_owned();
        let err = validate_request(&req).err().expect("should fail");
        assert!(matches!(err, ValidationError::InsecurePrefabUrl(_)));
        assert!(err.to_string().contains("URL"), "error was: {err}");
    }

    #[test]
    fn test_garbage_prefab_rejected() {
        let mut req = valid_request();
        req.room_prefab = "not a url at all".to_owned();
        assert!(matches!(
            validate_request(&req),
            Err(ValidationError::BadPrefabUrl(_))
        ));
    }

    #[test]
    fn test_unknown_difficulty_rejected() {
        let mut req = valid_request();
        req.difficulty = Some("brutal".to_owned());
        assert_eq!(
            validate_request(&req),
            Err(ValidationError::BadDifficulty("brutal".to_owned()))
        );
    }

    #[test]
    fn test_absent_difficulty_allowed() {
        let mut req = valid_request();
        req.difficulty = None;
        validate_request(&req).expect("absent difficulty defaults to normal");
    }
}
