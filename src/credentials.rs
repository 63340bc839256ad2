//! Guru credential holder
//!
//! Guru authenticates every request with HTTP basic auth built from the
//! user identifier (email) and a user token.

use std::collections::HashMap;
use std::fmt;

use crate::error::{IngestionError, Result};

/// Credential map key for the user identifier
pub const GURU_USER_KEY: &str = "guru_user";
/// Credential map key for the user token
pub const GURU_USER_TOKEN_KEY: &str = "guru_user_token";

/// Name reported in missing-credential errors
pub const SOURCE_NAME: &str = "Guru";

#[derive(Clone, PartialEq, Eq)]
pub struct GuruCredentials {
    user: String,
    user_token: String,
}

impl GuruCredentials {
    pub fn new(user: impl Into<String>, user_token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            user_token: user_token.into(),
        }
    }

    /// Reads both required keys from a credential mapping
    pub fn from_map(credentials: &HashMap<String, String>) -> Result<Self> {
        let user = credentials.get(GURU_USER_KEY);
        let token = credentials.get(GURU_USER_TOKEN_KEY);

        match (user, token) {
            (Some(user), Some(token)) => {
                let creds = Self::new(user.clone(), token.clone());
                creds.ensure_present()?;
                Ok(creds)
            }
            _ => Err(IngestionError::MissingCredential(SOURCE_NAME.to_string())),
        }
    }

    /// Builds credentials from optional parts, as found in environment config
    pub fn from_parts(user: Option<&str>, user_token: Option<&str>) -> Option<Self> {
        match (user, user_token) {
            (Some(user), Some(token)) if !user.is_empty() && !token.is_empty() => {
                Some(Self::new(user, token))
            }
            _ => None,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn user_token(&self) -> &str {
        &self.user_token
    }

    fn ensure_present(&self) -> Result<()> {
        if self.user.is_empty() || self.user_token.is_empty() {
            return Err(IngestionError::MissingCredential(SOURCE_NAME.to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for GuruCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuruCredentials")
            .field("user", &self.user)
            .field("user_token", &"<redacted>")
            .finish()
    }
}

/// Returns the credentials or the configuration error raised before any I/O
pub fn require(credentials: Option<&GuruCredentials>) -> Result<&GuruCredentials> {
    match credentials {
        Some(creds) => {
            creds.ensure_present()?;
            Ok(creds)
        }
        None => Err(IngestionError::MissingCredential(SOURCE_NAME.to_string())),
    }
}
