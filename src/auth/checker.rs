use super::backend::{succeeded, AuthBackend, AuthSession, PamReturnCode};
use super::conversation::Conversation;
use super::identity::{IdentityError, IdentityResolver};
use super::{AuthResult, Authenticator, SERVICE_NAME};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};
use zeroize::Zeroizing;

/// When to call `pam_setcred(PAM_REFRESH_CRED)` after authenticating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RefreshPolicy {
    #[serde(rename = "on_success")]
    #[default]
    OnSuccess,
    #[serde(rename = "always")]
    Always,
    #[serde(rename = "never")]
    Never,
}

impl RefreshPolicy {
    fn applies_to(self, auth_status: PamReturnCode) -> bool {
        match self {
            RefreshPolicy::OnSuccess => succeeded(auth_status),
            RefreshPolicy::Always => true,
            RefreshPolicy::Never => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("cannot resolve current user: {0}")]
    Identity(#[from] IdentityError),
    #[error("pam_start failed: {0:?}")]
    SessionStart(PamReturnCode),
}

/// Ends the wrapped session exactly once, with the last recorded status,
/// on every exit path.
pub struct SessionGuard<S: AuthSession> {
    session: S,
    status: PamReturnCode,
    ended: bool,
}

impl<S: AuthSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            status: PamReturnCode::SUCCESS,
            ended: false,
        }
    }

    pub fn authenticate(&mut self) -> PamReturnCode {
        self.status = self.session.authenticate();
        self.status
    }

    /// Best effort; the result never replaces the status passed to `end`.
    pub fn refresh_credentials(&mut self) -> PamReturnCode {
        let code = self.session.refresh_credentials();
        if !succeeded(code) {
            warn!("pam_setcred failed: {:?}", code);
        }
        code
    }

    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        let code = self.session.end(self.status);
        if !succeeded(code) {
            error!("pam_end failed: {:?}", code);
        }
    }
}

impl<S: AuthSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.finish();
    }
}

struct Inner<B, I> {
    backend: B,
    identity: I,
    refresh: RefreshPolicy,
}

/// Verifies a candidate password for the account running this process.
///
/// Cloning is cheap; every check opens its own session and owns its own copy
/// of the candidate, so clones may be used from several threads at once.
pub struct PasswordChecker<B, I> {
    inner: Arc<Inner<B, I>>,
}

impl<B, I> Clone for PasswordChecker<B, I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B, I> PasswordChecker<B, I>
where
    B: AuthBackend,
    I: IdentityResolver,
{
    pub fn new(backend: B, identity: I) -> Self {
        Self::with_policy(backend, identity, RefreshPolicy::default())
    }

    pub fn with_policy(backend: B, identity: I, refresh: RefreshPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                identity,
                refresh,
            }),
        }
    }

    pub fn check_password(&self, password: &str) -> AuthResult {
        match self.run(password) {
            Ok(code) if succeeded(code) => AuthResult::AuthSucceeded,
            Ok(code) => {
                debug!("Authentication failed: {:?}", code);
                AuthResult::AuthFailed
            }
            Err(e) => {
                error!("Password check could not run: {}", e);
                AuthResult::InternalError
            }
        }
    }

    /// Returns the `pam_authenticate` status once a session was started.
    fn run(&self, password: &str) -> Result<PamReturnCode, CheckError> {
        let inner = &*self.inner;
        let username = inner.identity.current_username()?;

        let conversation = Conversation::new(password);
        let session = inner
            .backend
            .start(SERVICE_NAME, &username, conversation)
            .map_err(CheckError::SessionStart)?;
        let mut session = SessionGuard::new(session);

        let auth_status = session.authenticate();
        if inner.refresh.applies_to(auth_status) {
            session.refresh_credentials();
        }
        session.end();

        Ok(auth_status)
    }
}

#[async_trait]
impl<B, I> Authenticator for PasswordChecker<B, I>
where
    B: AuthBackend + 'static,
    I: IdentityResolver + 'static,
{
    async fn check_password(&self, password: &str) -> AuthResult {
        let checker = self.clone();
        let password = Zeroizing::new(password.to_owned());

        let result =
            tokio::task::spawn_blocking(move || PasswordChecker::check_password(&checker, &password))
                .await;

        match result {
            Ok(verdict) => verdict,
            Err(join_err) => {
                error!("PAM task panicked: {}", join_err);
                AuthResult::InternalError
            }
        }
    }
}
