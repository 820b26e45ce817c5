use nix::errno::Errno;
use nix::unistd::{getuid, Uid, User};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no passwd entry for uid {0}")]
    NoAccount(u32),
    #[error("getpwuid_r failed for uid {uid}: {source}")]
    Lookup {
        uid: u32,
        #[source]
        source: Errno,
    },
}

/// Maps the running process to the account name PAM should authenticate.
pub trait IdentityResolver: Send + Sync {
    fn current_username(&self) -> Result<String, IdentityError>;
}

/// Resolves the real uid of the process through the passwd database.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealUser;

impl RealUser {
    pub fn username_for(uid: Uid) -> Result<String, IdentityError> {
        match User::from_uid(uid) {
            Ok(Some(user)) => Ok(user.name),
            Ok(None) => Err(IdentityError::NoAccount(uid.as_raw())),
            Err(source) => Err(IdentityError::Lookup {
                uid: uid.as_raw(),
                source,
            }),
        }
    }
}

impl IdentityResolver for RealUser {
    fn current_username(&self) -> Result<String, IdentityError> {
        Self::username_for(getuid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_resolves() {
        assert_eq!(RealUser::username_for(Uid::from_raw(0)).unwrap(), "root");
    }

    #[test]
    fn test_missing_uid_is_no_account() {
        let uid = Uid::from_raw(4_000_000_000);
        match RealUser::username_for(uid) {
            Err(IdentityError::NoAccount(raw)) => assert_eq!(raw, 4_000_000_000),
            other => panic!("unexpected lookup result: {:?}", other),
        }
    }
}
