//! Console registration check.
//!
//! VoUDP does not decide who may administer a deployment; it asks a
//! [`ConsoleAuthenticator`]. The stock [`SharedSecret`] compares against a
//! secret configured at deployment time, and [`DenyConsoles`] refuses every
//! registration when no secret was configured.
//!
//! # Why a trait?
//!
//! A trait defines WHAT can be done without fixing HOW. Production can
//! check a secret store, tests can accept everything, and none of the
//! engine code changes.

use crate::SessionError;

/// Decides whether a `ConsoleRegister{secret}` may turn a session into a
/// console.
///
/// # Example
///
/// ```rust
/// use voudp_session::{ConsoleAuthenticator, SessionError};
///
/// /// Accepts any non-empty secret. Development only!
/// struct AnySecret;
///
/// impl ConsoleAuthenticator for AnySecret {
///     async fn authenticate(&self, secret: &str) -> Result<(), SessionError> {
///         if secret.is_empty() {
///             return Err(SessionError::ConsoleAuthFailed);
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ConsoleAuthenticator: Send + Sync + 'static {
    /// Returns `Ok(())` when `secret` grants console access.
    fn authenticate(
        &self,
        secret: &str,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send;
}

/// Accepts exactly one configured secret.
#[derive(Clone)]
pub struct SharedSecret {
    secret: String,
}

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

impl ConsoleAuthenticator for SharedSecret {
    async fn authenticate(&self, secret: &str) -> Result<(), SessionError> {
        if constant_time_eq(self.secret.as_bytes(), secret.as_bytes()) {
            Ok(())
        } else {
            Err(SessionError::ConsoleAuthFailed)
        }
    }
}

/// Refuses every console registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyConsoles;

impl ConsoleAuthenticator for DenyConsoles {
    async fn authenticate(&self, _secret: &str) -> Result<(), SessionError> {
        Err(SessionError::ConsoleAuthFailed)
    }
}

/// Compares without an early exit on the first differing byte, so the
/// response time does not reveal how much of a guess was right.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shared_secret_correct_secret_accepted() {
        let auth = SharedSecret::new("hunter2");
        assert_eq!(auth.authenticate("hunter2").await, Ok(()));
    }

    #[tokio::test]
    async fn test_shared_secret_wrong_secret_rejected() {
        let auth = SharedSecret::new("hunter2");
        assert_eq!(
            auth.authenticate("hunter3").await,
            Err(SessionError::ConsoleAuthFailed)
        );
        assert_eq!(
            auth.authenticate("hunter").await,
            Err(SessionError::ConsoleAuthFailed)
        );
        assert_eq!(
            auth.authenticate("").await,
            Err(SessionError::ConsoleAuthFailed)
        );
    }

    #[tokio::test]
    async fn test_deny_consoles_rejects_everything() {
        assert_eq!(
            DenyConsoles.authenticate("anything").await,
            Err(SessionError::ConsoleAuthFailed)
        );
    }

    #[test]
    fn test_shared_secret_debug_hides_secret() {
        assert_eq!(format!("{:?}", SharedSecret::new("x")), "SharedSecret(..)");
    }
}
