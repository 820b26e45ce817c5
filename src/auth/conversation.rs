//! Answers the prompts PAM issues while authenticating.
//!
//! The conversation owns the candidate password for the lifetime of the
//! session and hands out one independent copy per input prompt. Notices are
//! only logged.

use pam_sys::PamMessageStyle;
use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::c_int;
use thiserror::Error;
use tracing::{error, info};
use zeroize::{Zeroize, Zeroizing};

/// Style of a single PAM message, as found in `pam_message::msg_style`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// `PAM_PROMPT_ECHO_OFF`
    SecretPrompt,
    /// `PAM_PROMPT_ECHO_ON`
    EchoedPrompt,
    /// `PAM_ERROR_MSG`
    ErrorNotice,
    /// `PAM_TEXT_INFO`
    InfoNotice,
    Unknown(i32),
}

impl PromptStyle {
    pub fn from_raw(style: c_int) -> Self {
        match style {
            s if s == PamMessageStyle::PROMPT_ECHO_OFF as c_int => PromptStyle::SecretPrompt,
            s if s == PamMessageStyle::PROMPT_ECHO_ON as c_int => PromptStyle::EchoedPrompt,
            s if s == PamMessageStyle::ERROR_MSG as c_int => PromptStyle::ErrorNotice,
            s if s == PamMessageStyle::TEXT_INFO as c_int => PromptStyle::InfoNotice,
            other => PromptStyle::Unknown(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Prompt<'a> {
    pub style: PromptStyle,
    pub text: Cow<'a, str>,
}

impl<'a> Prompt<'a> {
    pub fn new(style: PromptStyle, text: impl Into<Cow<'a, str>>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("password contains an interior NUL byte and cannot be passed to PAM")]
    InteriorNul,
    #[error("could not allocate PAM response")]
    Allocation,
}

/// Responses to one batch of prompts, positionally aligned with the prompts.
///
/// Slots for notices are `None`. The length is fixed at construction.
#[derive(Debug)]
pub struct Responses {
    slots: Vec<Option<CString>>,
}

impl Responses {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CStr> {
        self.slots.get(index).and_then(|slot| slot.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&CStr>> {
        self.slots.iter().map(|slot| slot.as_deref())
    }
}

impl Drop for Responses {
    fn drop(&mut self) {
        for copy in self.slots.drain(..).flatten() {
            copy.into_bytes_with_nul().zeroize();
        }
    }
}

pub struct Conversation {
    password: Zeroizing<String>,
}

impl Conversation {
    pub fn new(password: &str) -> Self {
        Self {
            password: Zeroizing::new(password.to_owned()),
        }
    }

    /// Produces exactly one response per prompt, in prompt order.
    ///
    /// Fails as a whole if any input prompt cannot be answered; no partial
    /// response set is ever returned.
    pub fn respond(&self, prompts: &[Prompt<'_>]) -> Result<Responses, ConversationError> {
        let mut slots = Vec::with_capacity(prompts.len());

        for prompt in prompts {
            let slot = match prompt.style {
                PromptStyle::SecretPrompt | PromptStyle::EchoedPrompt => {
                    let copy = CString::new(self.password.as_bytes()).map_err(|_| {
                        error!("Cannot answer PAM prompt: password contains a NUL byte");
                        ConversationError::InteriorNul
                    })?;
                    Some(copy)
                }
                PromptStyle::ErrorNotice => {
                    error!("PAM error message: {}", prompt.text);
                    None
                }
                PromptStyle::InfoNotice => {
                    info!("PAM info message: {}", prompt.text);
                    None
                }
                PromptStyle::Unknown(style) => {
                    error!("PAM conv: unhandled message style: {}", style);
                    None
                }
            };
            slots.push(slot);
        }

        debug_assert_eq!(slots.len(), prompts.len());
        Ok(Responses { slots })
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("password", &"<redacted>")
            .finish()
    }
}
