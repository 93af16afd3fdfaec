use uuid::Uuid;

use crate::error::ApiError;

/// Maximum text length for speak requests
const MAX_TEXT_LENGTH: usize = 5000;
/// Maximum voice id length
const MAX_VOICE_ID_LENGTH: usize = 64;

/// Validate a speak request
pub fn validate_speak_request(text: &str, voice_id: Option<&str>) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }

    if let Some(voice_id) = voice_id {
        validate_voice_id(voice_id)?;
    }

    Ok(())
}

/// Validate voice id format (1-64 characters of [A-Za-z0-9_-])
pub fn validate_voice_id(voice_id: &str) -> Result<(), ApiError> {
    if voice_id.is_empty() || voice_id.len() > MAX_VOICE_ID_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Voice id must be 1-{} characters",
            MAX_VOICE_ID_LENGTH
        )));
    }
    if !voice_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::InvalidInput(format!(
            "Invalid voice id format: {}. Use letters, digits, '-' and '_'",
            voice_id
        )));
    }
    Ok(())
}

/// Validate and parse a session id
pub fn validate_session_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id.trim())
        .map_err(|_| ApiError::InvalidInput(format!("Invalid session id: {}", id)))
}
