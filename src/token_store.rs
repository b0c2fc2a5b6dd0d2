//! In-memory holder for the admin panel token.
//!
//! The token lives only as long as the process and is never written to disk.

use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct TokenStore {
    token: Mutex<Option<String>>,
}

impl TokenStore {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            token: Mutex::new(initial),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.slot().clone()
    }

    pub fn set(&self, token: String) {
        *self.slot() = Some(token);
    }

    pub fn clear(&self) {
        *self.slot() = None;
    }

    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }
}
