//! In-memory stand-ins for PAM and the passwd database.

use super::backend::{succeeded, AuthBackend, AuthSession, PamReturnCode};
use super::conversation::{Conversation, Prompt, PromptStyle};
use super::identity::{IdentityError, IdentityResolver};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct CallLog {
    pub started_for: Vec<(String, String)>,
    pub authenticates: usize,
    pub refreshes: usize,
    pub ended_with: Vec<PamReturnCode>,
    pub response_counts: Vec<usize>,
}

/// Accepts exactly one password, asking for it with a configurable prompt
/// script.
pub struct ScriptedBackend {
    account_password: String,
    prompts: Vec<(PromptStyle, &'static str)>,
    start_code: PamReturnCode,
    refresh_code: PamReturnCode,
    end_code: PamReturnCode,
    calls: Arc<Mutex<CallLog>>,
}

impl ScriptedBackend {
    pub fn new(account_password: &str) -> Self {
        Self {
            account_password: account_password.to_string(),
            prompts: vec![(PromptStyle::SecretPrompt, "Password: ")],
            start_code: PamReturnCode::SUCCESS,
            refresh_code: PamReturnCode::SUCCESS,
            end_code: PamReturnCode::SUCCESS,
            calls: Arc::new(Mutex::new(CallLog::default())),
        }
    }

    pub fn with_prompts(mut self, prompts: Vec<(PromptStyle, &'static str)>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn failing_start(mut self, code: PamReturnCode) -> Self {
        self.start_code = code;
        self
    }

    pub fn failing_refresh(mut self, code: PamReturnCode) -> Self {
        self.refresh_code = code;
        self
    }

    pub fn failing_end(mut self, code: PamReturnCode) -> Self {
        self.end_code = code;
        self
    }

    pub fn calls(&self) -> Arc<Mutex<CallLog>> {
        Arc::clone(&self.calls)
    }
}

impl AuthBackend for ScriptedBackend {
    type Session = ScriptedSession;

    fn start(
        &self,
        service: &str,
        username: &str,
        conversation: Conversation,
    ) -> Result<ScriptedSession, PamReturnCode> {
        if !succeeded(self.start_code) {
            return Err(self.start_code);
        }
        self.calls
            .lock()
            .unwrap()
            .started_for
            .push((service.to_string(), username.to_string()));

        Ok(ScriptedSession {
            conversation,
            account_password: self.account_password.clone(),
            prompts: self.prompts.clone(),
            refresh_code: self.refresh_code,
            end_code: self.end_code,
            calls: Arc::clone(&self.calls),
        })
    }
}

pub struct ScriptedSession {
    conversation: Conversation,
    account_password: String,
    prompts: Vec<(PromptStyle, &'static str)>,
    refresh_code: PamReturnCode,
    end_code: PamReturnCode,
    calls: Arc<Mutex<CallLog>>,
}

impl AuthSession for ScriptedSession {
    fn authenticate(&mut self) -> PamReturnCode {
        self.calls.lock().unwrap().authenticates += 1;

        let prompts: Vec<Prompt<'_>> = self
            .prompts
            .iter()
            .map(|(style, text)| Prompt::new(*style, *text))
            .collect();
        let responses = match self.conversation.respond(&prompts) {
            Ok(responses) => responses,
            Err(_) => return PamReturnCode::ABORT,
        };
        self.calls.lock().unwrap().response_counts.push(responses.len());

        let supplied = responses.iter().flatten().next();
        match supplied {
            Some(answer) if answer.to_bytes() == self.account_password.as_bytes() => {
                PamReturnCode::SUCCESS
            }
            _ => PamReturnCode::AUTH_ERR,
        }
    }

    fn refresh_credentials(&mut self) -> PamReturnCode {
        self.calls.lock().unwrap().refreshes += 1;
        self.refresh_code
    }

    fn end(&mut self, status: PamReturnCode) -> PamReturnCode {
        self.calls.lock().unwrap().ended_with.push(status);
        self.end_code
    }
}

pub struct FixedUser(Option<String>, u32);

impl FixedUser {
    pub fn named(name: &str) -> Self {
        FixedUser(Some(name.to_string()), 1000)
    }

    pub fn missing(uid: u32) -> Self {
        FixedUser(None, uid)
    }
}

impl IdentityResolver for FixedUser {
    fn current_username(&self) -> Result<String, IdentityError> {
        self.0.clone().ok_or(IdentityError::NoAccount(self.1))
    }
}
