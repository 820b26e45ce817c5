use super::conversation::Conversation;

pub use pam_sys::PamReturnCode;

/// Entry point into the platform authentication service.
pub trait AuthBackend: Send + Sync {
    type Session: AuthSession;

    /// Opens a session for `username` under `service`. The session owns
    /// `conversation` until it is ended.
    fn start(
        &self,
        service: &str,
        username: &str,
        conversation: Conversation,
    ) -> Result<Self::Session, PamReturnCode>;
}

/// One authentication attempt against the platform service.
///
/// `end` is called exactly once by [`SessionGuard`](super::checker::SessionGuard);
/// implementations may release the handle on drop if it was never ended.
pub trait AuthSession {
    fn authenticate(&mut self) -> PamReturnCode;

    fn refresh_credentials(&mut self) -> PamReturnCode;

    fn end(&mut self, status: PamReturnCode) -> PamReturnCode;
}

pub(crate) fn succeeded(code: PamReturnCode) -> bool {
    code == PamReturnCode::SUCCESS
}
