//! Display mask rules.
//!
//! A mask is the name other members see. Sessions start with a synthetic
//! default mask (`guest-<id>`); a user-chosen mask must pass
//! [`validate_mask`] before any channel will accept it.

use crate::{MaskError, SessionId};

/// Longest accepted mask, in bytes.
pub const MAX_MASK_LEN: usize = 32;

/// Prefix reserved for default masks. User-chosen masks may not start with
/// it, so a default can never collide with a chosen name.
pub const DEFAULT_MASK_PREFIX: &str = "guest-";

/// The synthetic mask every session starts with.
pub fn default_mask(session: SessionId) -> String {
    format!("{DEFAULT_MASK_PREFIX}{}", session.0)
}

/// Checks a user-requested mask against the structural rules.
///
/// Channel-level uniqueness is checked separately by the channel that owns
/// the member list.
pub fn validate_mask(name: &str) -> Result<(), MaskError> {
    if name.is_empty() {
        return Err(MaskError::Empty);
    }
    if name.len() > MAX_MASK_LEN {
        return Err(MaskError::TooLong {
            len: name.len(),
            max: MAX_MASK_LEN,
        });
    }
    if name.chars().any(char::is_control) {
        return Err(MaskError::InvalidCharacter);
    }
    if name.starts_with(DEFAULT_MASK_PREFIX) {
        return Err(MaskError::Reserved);
    }
    Ok(())
}
