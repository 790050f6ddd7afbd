//! Local accounts and the authenticated session
//!
//! Credentials and the current session are kept in the local key-value
//! store. There is no hashing, expiry or server-side validation: this is a
//! convenience identity for scoping watchlists, not a security boundary.

use crate::storage::{KeyValueStore, SESSION_KEY, StorageError, USERS_KEY, load_json, store_json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by login and signup
///
/// The display text of the validation variants is meant to be shown to the
/// user as-is.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No stored record matches the given email and password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// A record with this email already exists
    #[error("A user with this email already exists")]
    UserExists,

    /// A required form field was left empty
    #[error("Please fill in the {0} field")]
    MissingField(&'static str),

    /// The updated registry or session could not be persisted
    #[error("Failed to persist account data: {0}")]
    Storage(#[from] StorageError),
}

/// A stored account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub name: String,
    /// Unique key of the registry
    pub email: String,
    /// Stored as entered
    pub password: String,
}

/// The currently authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub email: String,
    pub name: String,
}

impl From<&CredentialRecord> for Session {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            email: record.email.clone(),
            name: record.name.clone(),
        }
    }
}

/// Checks the login form fields before calling [`SessionManager::login`]
pub fn validate_login_form(email: &str, password: &str) -> Result<(), AuthError> {
    require("email", email)?;
    require("password", password)
}

/// Checks the signup form fields before calling [`SessionManager::signup`]
pub fn validate_signup_form(name: &str, email: &str, password: &str) -> Result<(), AuthError> {
    require("name", name)?;
    validate_login_form(email, password)
}

fn require(field: &'static str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        Err(AuthError::MissingField(field))
    } else {
        Ok(())
    }
}

/// The registry of all known accounts
pub(crate) struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Reads the full registry
    ///
    /// A missing or corrupt registry reads as empty. A registry that cannot
    /// be read at all is an error, so it is never replaced by a fresh one.
    pub fn load_all(&self) -> Result<Vec<CredentialRecord>, StorageError> {
        Ok(load_json(self.store.as_ref(), USERS_KEY)?.unwrap_or_default())
    }

    /// Finds the record matching both email and password exactly
    pub fn find(&self, email: &str, password: &str) -> Result<Option<CredentialRecord>, StorageError> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|u| u.email == email && u.password == password))
    }

    /// Appends a record unless its email is already registered
    ///
    /// Returns the stored record on success.
    pub fn register(&self, record: CredentialRecord) -> Result<CredentialRecord, AuthError> {
        let mut users = self.load_all()?;

        if users.iter().any(|u| u.email == record.email) {
            return Err(AuthError::UserExists);
        }

        users.push(record.clone());
        store_json(self.store.as_ref(), USERS_KEY, &users)?;

        Ok(record)
    }
}

/// Login, signup and logout over the credential registry
///
/// The session lives in memory and is mirrored to storage on every change.
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    credentials: CredentialStore,
    current: Option<Session>,
}

impl SessionManager {
    /// Creates a manager, rehydrating the session persisted by a previous run
    ///
    /// A stored session that fails to deserialize is purged and treated as
    /// absent.
    pub fn restore(store: Arc<dyn KeyValueStore>) -> Self {
        let current: Option<Session> = load_json(store.as_ref(), SESSION_KEY).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read stored session");
            None
        });

        match &current {
            Some(session) => tracing::debug!(email = %session.email, "Restored session"),
            None => tracing::debug!("No stored session"),
        }

        Self {
            credentials: CredentialStore::new(Arc::clone(&store)),
            store,
            current,
        }
    }

    /// Returns the authenticated session, if any
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Authenticates against the registry
    ///
    /// Email and password are compared exactly; on failure the current
    /// session is left untouched.
    pub fn login(&mut self, email: &str, password: &str) -> Result<Session, AuthError> {
        let record = self
            .credentials
            .find(email, password)?
            .ok_or(AuthError::InvalidCredentials)?;

        let session = Session::from(&record);
        self.activate(session.clone())?;

        tracing::info!(email = %session.email, "Logged in");
        Ok(session)
    }

    /// Registers a new account and signs it in
    pub fn signup(&mut self, name: &str, email: &str, password: &str) -> Result<Session, AuthError> {
        let record = self.credentials.register(CredentialRecord {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        })?;

        let session = Session::from(&record);
        self.activate(session.clone())?;

        tracing::info!(email = %session.email, "Signed up");
        Ok(session)
    }

    /// Ends the current session. Safe to call without one.
    pub fn logout(&mut self) {
        if let Some(session) = self.current.take() {
            tracing::info!(email = %session.email, "Logged out");
        }

        if let Err(e) = self.store.remove(SESSION_KEY) {
            tracing::warn!(error = %e, "Failed to clear stored session");
        }
    }

    fn activate(&mut self, session: Session) -> Result<(), AuthError> {
        store_json(self.store.as_ref(), SESSION_KEY, &session)?;
        self.current = Some(session);
        Ok(())
    }
}
