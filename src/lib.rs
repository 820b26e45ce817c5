pub mod auth;
pub mod config;

pub use auth::{AuthResult, Authenticator, PasswordChecker};
pub use config::Config;
