//! Sign-in, sign-up and the upload gate.

use serde::{Deserialize, Serialize};

use crate::auth::AuthGate;
use crate::catalog::HttpCatalog;
use crate::error::{Error, Result};
use crate::storage::{KeyValueStore, keys};

/// Minimum accepted password length for new accounts.
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenBody {
    token: String,
}

/// Registration form.
#[derive(Debug, Clone, Serialize)]
pub struct SignUpForm {
    /// Display name.
    pub name: String,
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl SignUpForm {
    /// Creates a form from its three fields.
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Checks the form locally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty name, a malformed email or
    /// a password shorter than [`MIN_PASSWORD_LEN`].
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "Name is required."));
        }
        validate_email(&self.email)?;
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::validation(
                "password",
                "Password must be at least 8 characters long.",
            ));
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(Error::validation("email", "Email is required."));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(Error::validation("email", "Enter a valid email address.")),
    }
}

/// Logs in and stores the returned token, ending any pending auth prompt.
///
/// # Errors
///
/// Returns [`Error::Rejected`] with the backend's message for bad
/// credentials, or a transport/decode error.
pub async fn sign_in<S: KeyValueStore>(
    api: &HttpCatalog,
    gate: &AuthGate<S>,
    email: &str,
    password: &str,
) -> Result<()> {
    validate_email(email)?;
    let url = api.endpoint(&["users", "login"])?;
    let TokenBody { token } = api
        .post_json(url, &Credentials { email, password }, "Invalid credentials.")
        .await?;
    gate.sign_in(&token)?;
    log::info!("Signed in as {email}");
    Ok(())
}

/// Registers a new account. Nothing is sent if the form is invalid.
///
/// Registration does not sign the user in.
///
/// # Errors
///
/// Returns [`Error::Validation`] before any request, or
/// [`Error::Rejected`] if the backend refuses.
pub async fn sign_up(api: &HttpCatalog, form: &SignUpForm) -> Result<()> {
    form.validate()?;
    let url = api.endpoint(&["users", "register"])?;
    let _: serde_json::Value = api
        .post_json(url, form, "Something went wrong. Please try again.")
        .await?;
    log::info!("Registered {}", form.email);
    Ok(())
}

/// Removes the stored token.
///
/// # Errors
///
/// Returns an error if the store write fails.
pub fn sign_out<S: KeyValueStore>(gate: &AuthGate<S>) -> Result<()> {
    gate.sign_out()?;
    log::info!("Signed out");
    Ok(())
}

/// Returns `true` if the stored upload password matches `configured`.
///
/// With no configured password the gate is open. This is a plaintext
/// convenience check, not access control.
pub fn upload_unlocked<S: KeyValueStore + ?Sized>(store: &S, configured: Option<&str>) -> bool {
    configured.is_none_or(|expected| store.get(keys::UPLOAD_PASSWORD).as_deref() == Some(expected))
}

/// Stores `entered` as the upload password if it matches `configured`.
///
/// # Errors
///
/// Returns [`Error::Validation`] on a mismatch, or a store error.
pub fn unlock_upload<S: KeyValueStore + ?Sized>(
    store: &S,
    entered: &str,
    configured: Option<&str>,
) -> Result<()> {
    match configured {
        Some(expected) if expected != entered => {
            Err(Error::validation("password", "Incorrect upload password."))
        }
        _ => store.set(keys::UPLOAD_PASSWORD, entered),
    }
}
