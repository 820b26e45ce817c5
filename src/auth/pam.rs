//! [`AuthBackend`] backed by the system Linux-PAM library.
//!
//! The only untyped pointer in the exchange is the `data_ptr` PAM hands back
//! to [`converse`]; it always points at the [`Conversation`] owned by the
//! [`PamSession`] that registered it.

use super::backend::{succeeded, AuthBackend, AuthSession, PamReturnCode};
use super::checker::PasswordChecker;
use super::conversation::{Conversation, ConversationError, Prompt, PromptStyle};
use super::identity::RealUser;
use super::RefreshPolicy;
use libc::{c_int, c_void};
use pam_sys::{PamConversation, PamFlag, PamHandle, PamMessage, PamResponse};
use std::borrow::Cow;
use std::ffi::CStr;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use tracing::{debug, error};
use zeroize::Zeroize;

/// Builds the production checker: Linux-PAM for the real uid of the process.
pub fn system_checker(refresh: RefreshPolicy) -> PasswordChecker<LinuxPam, RealUser> {
    PasswordChecker::with_policy(LinuxPam, RealUser, refresh)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxPam;

impl AuthBackend for LinuxPam {
    type Session = PamSession;

    fn start(
        &self,
        service: &str,
        username: &str,
        conversation: Conversation,
    ) -> Result<PamSession, PamReturnCode> {
        if service.contains('\0') || username.contains('\0') {
            error!("pam_start refused: service or user name contains a NUL byte");
            return Err(PamReturnCode::SYSTEM_ERR);
        }

        // Both boxes stay at a fixed address until pam_end has run.
        let mut conversation = Box::new(conversation);
        let conv = Box::new(PamConversation {
            conv: Some(converse),
            data_ptr: &mut *conversation as *mut Conversation as *mut c_void,
        });

        let mut handle: *mut PamHandle = ptr::null_mut();
        let code = pam_sys::start(service, Some(username), &conv, &mut handle);
        if !succeeded(code) {
            error!("pam_start failed: {:?}", code);
            if !handle.is_null() {
                unsafe { pam_sys::end(&mut *handle, code) };
            }
            return Err(code);
        }
        debug!("PAM session started for service {}", service);

        Ok(PamSession {
            handle,
            _conv: conv,
            _conversation: conversation,
        })
    }
}

pub struct PamSession {
    handle: *mut PamHandle,
    _conv: Box<PamConversation>,
    _conversation: Box<Conversation>,
}

impl AuthSession for PamSession {
    fn authenticate(&mut self) -> PamReturnCode {
        if self.handle.is_null() {
            return PamReturnCode::SYSTEM_ERR;
        }
        unsafe { pam_sys::authenticate(&mut *self.handle, PamFlag::NONE) }
    }

    fn refresh_credentials(&mut self) -> PamReturnCode {
        if self.handle.is_null() {
            return PamReturnCode::SYSTEM_ERR;
        }
        unsafe { pam_sys::setcred(&mut *self.handle, PamFlag::REFRESH_CRED) }
    }

    fn end(&mut self, status: PamReturnCode) -> PamReturnCode {
        if self.handle.is_null() {
            return PamReturnCode::SUCCESS;
        }
        let code = unsafe { pam_sys::end(&mut *self.handle, status) };
        self.handle = ptr::null_mut();
        code
    }
}

impl Drop for PamSession {
    fn drop(&mut self) {
        // Runs before the boxed conversation is freed.
        if !self.handle.is_null() {
            let code = self.end(PamReturnCode::ABORT);
            if !succeeded(code) {
                error!("pam_end failed: {:?}", code);
            }
        }
    }
}

/// Conversation callback registered with `pam_start`.
extern "C" fn converse(
    num_msg: c_int,
    msg: *mut *mut PamMessage,
    resp: *mut *mut PamResponse,
    appdata_ptr: *mut c_void,
) -> c_int {
    if resp.is_null() {
        return PamReturnCode::CONV_ERR as c_int;
    }
    unsafe { *resp = ptr::null_mut() };
    if num_msg <= 0 || msg.is_null() || appdata_ptr.is_null() {
        return PamReturnCode::CONV_ERR as c_int;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        let conversation = &*(appdata_ptr as *const Conversation);
        answer(conversation, num_msg as usize, msg)
    }));

    match outcome {
        Ok(Ok(array)) => {
            unsafe { *resp = array };
            PamReturnCode::SUCCESS as c_int
        }
        Ok(Err(e)) => {
            error!("PAM conversation aborted: {}", e);
            PamReturnCode::ABORT as c_int
        }
        Err(_) => {
            error!("PAM conversation panicked");
            PamReturnCode::ABORT as c_int
        }
    }
}

/// Answers `count` messages and returns a `calloc`ed response array whose
/// ownership passes to PAM.
unsafe fn answer(
    conversation: &Conversation,
    count: usize,
    msg: *mut *mut PamMessage,
) -> Result<*mut PamResponse, ConversationError> {
    let prompts: Vec<Prompt<'_>> = (0..count)
        .map(|i| {
            let message = *msg.add(i);
            if message.is_null() {
                return Prompt::new(PromptStyle::Unknown(-1), "");
            }
            let text = if (*message).msg.is_null() {
                Cow::Borrowed("")
            } else {
                CStr::from_ptr((*message).msg).to_string_lossy()
            };
            Prompt::new(PromptStyle::from_raw((*message).msg_style), text)
        })
        .collect();

    let responses = conversation.respond(&prompts)?;

    let array = libc::calloc(count, std::mem::size_of::<PamResponse>()) as *mut PamResponse;
    if array.is_null() {
        error!("Could not allocate pam_response");
        return Err(ConversationError::Allocation);
    }

    for (i, response) in responses.iter().enumerate() {
        if let Some(secret) = response {
            let copy = libc::strdup(secret.as_ptr());
            if copy.is_null() {
                error!("Could not duplicate string");
                release(array, count);
                return Err(ConversationError::Allocation);
            }
            (*array.add(i)).resp = copy;
        }
    }

    Ok(array)
}

/// Wipes and frees a response array that was never handed to PAM.
unsafe fn release(array: *mut PamResponse, count: usize) {
    for i in 0..count {
        let resp = (*array.add(i)).resp;
        if !resp.is_null() {
            std::slice::from_raw_parts_mut(resp as *mut u8, libc::strlen(resp)).zeroize();
            libc::free(resp as *mut c_void);
        }
    }
    libc::free(array as *mut c_void);
}
