//! Local authentication gate.
//!
//! "Authenticated" means nothing more than an auth token being present in
//! the key-value store. The gate never validates or refreshes the token.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::storage::{KeyValueStore, keys};

/// Observable gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No token and no pending prompt.
    Anonymous,
    /// A gated action was refused; the sign-up/sign-in prompt is showing.
    PromptingAuth,
    /// A token is present.
    Authenticated,
}

/// Outcome of a gated action.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Gated<T> {
    /// The user was authenticated and the action ran.
    Proceeded(T),
    /// The user was anonymous; the action did not run and the caller should
    /// show the sign-up/sign-in prompt.
    PromptAuth,
}

impl<T> Gated<T> {
    /// Returns `true` if the action was refused.
    pub const fn is_prompt(&self) -> bool {
        matches!(self, Self::PromptAuth)
    }

    /// Returns the action's output, if it ran.
    pub fn proceeded(self) -> Option<T> {
        match self {
            Self::Proceeded(value) => Some(value),
            Self::PromptAuth => None,
        }
    }

}

impl<T, E> Gated<std::result::Result<T, E>> {
    /// Turns a gated fallible action into a fallible gated outcome.
    pub fn transpose(self) -> std::result::Result<Gated<T>, E> {
        match self {
            Self::Proceeded(Ok(value)) => Ok(Gated::Proceeded(value)),
            Self::Proceeded(Err(e)) => Err(e),
            Self::PromptAuth => Ok(Gated::PromptAuth),
        }
    }
}

/// Gate over the persisted auth token.
#[derive(Debug)]
pub struct AuthGate<S> {
    store: S,
    prompting: AtomicBool,
}

impl<S: KeyValueStore> AuthGate<S> {
    /// Creates a gate reading the token from `store`.
    pub const fn new(store: S) -> Self {
        Self {
            store,
            prompting: AtomicBool::new(false),
        }
    }

    /// Returns the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns `true` if a token is stored. Pure, no network.
    pub fn is_authenticated(&self) -> bool {
        self.store.get(keys::TOKEN).is_some()
    }

    /// Returns the stored token.
    pub fn token(&self) -> Option<String> {
        self.store.get(keys::TOKEN)
    }

    /// Returns the current gate state.
    pub fn state(&self) -> AuthState {
        if self.is_authenticated() {
            AuthState::Authenticated
        } else if self.prompting.load(Ordering::Relaxed) {
            AuthState::PromptingAuth
        } else {
            AuthState::Anonymous
        }
    }

    /// Runs `action` if authenticated; otherwise raises the prompt.
    pub fn require<T>(&self, action: impl FnOnce() -> T) -> Gated<T> {
        if self.is_authenticated() {
            Gated::Proceeded(action())
        } else {
            self.raise_prompt();
            Gated::PromptAuth
        }
    }

    /// Async form of [`require`](Self::require). The future is only created
    /// when authenticated.
    pub async fn require_async<F, Fut>(&self, action: F) -> Gated<Fut::Output>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        if self.is_authenticated() {
            Gated::Proceeded(action().await)
        } else {
            self.raise_prompt();
            Gated::PromptAuth
        }
    }

    fn raise_prompt(&self) {
        log::info!("Sign in required");
        self.prompting.store(true, Ordering::Relaxed);
    }

    /// Dismisses a pending prompt without signing in.
    pub fn dismiss_prompt(&self) {
        self.prompting.store(false, Ordering::Relaxed);
    }

    /// Stores `token`, ending any pending prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn sign_in(&self, token: &str) -> Result<()> {
        self.store.set(keys::TOKEN, token)?;
        self.prompting.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Removes the stored token.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn sign_out(&self) -> Result<()> {
        self.store.remove(keys::TOKEN)
    }
}
