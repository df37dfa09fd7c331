//! Credential lookup seam.
//!
//! The supervisor pulls a fresh token at the top of every connection attempt,
//! so rotation or expiry during a long session is transparent. Login and
//! refresh logic belong to the surrounding application, not here.

/// Supplies the current authentication token on demand.
///
/// Returning `None` means no credential is currently available; the
/// supervisor settles in the `Error` state without opening a transport.
pub trait CredentialProvider: Send + Sync {
    /// The current token, or `None` if the session is unauthenticated.
    fn token(&self) -> Option<String>;
}

/// Fixed token, mainly for tests and service accounts.
#[derive(Clone, Debug)]
pub struct StaticToken(pub String);

impl CredentialProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Any `Fn() -> Option<String>` closure is a provider.
impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}
