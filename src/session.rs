//! Logged-in / logged-out state machine.
//!
//! The controller owns the token store and the last successful search
//! keyword. Every login starts a new generation; an auth failure only ends
//! the session whose ticket the failing request carried, so a late 401 from
//! an old token cannot log out a fresh login, and N concurrent 401s collapse
//! into one transition.

use crate::token_store::TokenStore;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoggedOut => "logged out",
            Self::LoggedIn => "logged in",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    #[error("enter the admin token")]
    BlankCredential,
}

/// Snapshot of the credential taken when a request is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub token: String,
    pub generation: u64,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    generation: u64,
    last_query: Option<String>,
}

#[derive(Debug)]
pub struct SessionController {
    tokens: TokenStore,
    inner: Mutex<Inner>,
}

impl SessionController {
    /// Start logged in when the store already holds a token.
    pub fn new(tokens: TokenStore) -> Self {
        let state = if tokens.get().is_some() {
            SessionState::LoggedIn
        } else {
            SessionState::LoggedOut
        };
        Self {
            tokens,
            inner: Mutex::new(Inner {
                state,
                generation: 0,
                last_query: None,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_logged_in(&self) -> bool {
        self.state() == SessionState::LoggedIn
    }

    /// Current credential, or `None` when logged out.
    pub fn ticket(&self) -> Option<Ticket> {
        let inner = self.lock();
        if inner.state != SessionState::LoggedIn {
            return None;
        }
        self.tokens.get().map(|token| Ticket {
            token,
            generation: inner.generation,
        })
    }

    /// Store a non-blank credential and enter `LoggedIn`.
    ///
    /// A repeated login replaces the credential and starts a new generation.
    pub fn login(&self, credential: &str) -> Result<(), LoginError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(LoginError::BlankCredential);
        }

        let mut inner = self.lock();
        self.tokens.set(credential.to_string());
        inner.state = SessionState::LoggedIn;
        inner.generation += 1;
        inner.last_query = None;
        info!(generation = inner.generation, "session started");
        Ok(())
    }

    /// Explicit logout. Returns false if already logged out.
    pub fn logout(&self) -> bool {
        let mut inner = self.lock();
        self.end(&mut inner)
    }

    /// Forced logout after the backend rejected `ticket`.
    ///
    /// Returns true only for the call that performed the transition.
    pub fn auth_failure(&self, ticket: &Ticket) -> bool {
        let mut inner = self.lock();
        if inner.generation != ticket.generation {
            debug!(
                stale = ticket.generation,
                current = inner.generation,
                "ignoring auth failure from an earlier session"
            );
            return false;
        }
        let ended = self.end(&mut inner);
        if ended {
            info!("session ended: token rejected by server");
        }
        ended
    }

    pub fn last_query(&self) -> Option<String> {
        self.lock().last_query.clone()
    }

    /// Remember the keyword of a successful search for `/refresh`.
    pub fn record_query(&self, keyword: &str) {
        let mut inner = self.lock();
        if inner.state == SessionState::LoggedIn {
            inner.last_query = Some(keyword.to_string());
        }
    }

    fn end(&self, inner: &mut Inner) -> bool {
        if inner.state == SessionState::LoggedOut {
            return false;
        }
        self.tokens.clear();
        inner.state = SessionState::LoggedOut;
        inner.last_query = None;
        true
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
