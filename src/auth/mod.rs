use async_trait::async_trait;
use std::fmt;

pub mod backend;
pub mod checker;
pub mod conversation;
pub mod identity;
#[cfg(feature = "pam-auth")]
pub mod pam;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::{AuthBackend, AuthSession, PamReturnCode};
pub use checker::{CheckError, PasswordChecker, RefreshPolicy, SessionGuard};
pub use conversation::{Conversation, ConversationError, Prompt, PromptStyle, Responses};
pub use identity::{IdentityError, IdentityResolver, RealUser};

/// PAM service name; selects `/etc/pam.d/swaysettings-locker`.
pub const SERVICE_NAME: &str = "swaysettings-locker";

/// Outcome of a password check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthResult {
    /// The check could not be carried out; says nothing about the password.
    InternalError,
    AuthFailed,
    AuthSucceeded,
}

impl AuthResult {
    pub fn exit_code(self) -> i32 {
        match self {
            AuthResult::AuthSucceeded => 0,
            AuthResult::AuthFailed => 1,
            AuthResult::InternalError => 2,
        }
    }
}

impl fmt::Display for AuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AuthResult::InternalError => "internal error",
            AuthResult::AuthFailed => "authentication failed",
            AuthResult::AuthSucceeded => "authentication succeeded",
        };
        f.write_str(text)
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Check a password for the user running this process.
    /// Never fails: operational problems are reported as `InternalError`.
    async fn check_password(&self, password: &str) -> AuthResult;
}
