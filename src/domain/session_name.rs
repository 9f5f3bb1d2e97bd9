// Session names are typed by humans; keep the rule in one place.

use super::errors::SessionError;

pub const MIN_SESSION_NAME_LEN: usize = 4;

/// Trims surrounding whitespace and enforces the minimum length (in characters).
pub fn validate_session_name(raw: &str) -> Result<String, SessionError> {
    let name = raw.trim();
    if name.chars().count() < MIN_SESSION_NAME_LEN {
        return Err(SessionError::InvalidSessionName);
    }
    Ok(name.to_string())
}
