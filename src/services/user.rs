//! User service
//!
//! Session-based authentication for the admin account:
//! - login and logout
//! - resolving a session token to its user
//! - provisioning and removing accounts (startup seeding and the `admin` CLI)

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User, UserRole};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use chrono::Duration;
use std::sync::Arc;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Unknown user or wrong password
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing accounts and sessions
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    /// Create a user service with a custom session lifetime
    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Verify credentials and open a new session.
    ///
    /// An unknown username and a wrong password fail with the same
    /// `AuthenticationError` message.
    pub async fn login(&self, username: &str, password: &str) -> Result<(User, Session), UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(username.trim())
            .await
            .context("Failed to get user by username")?
            .ok_or_else(|| UserServiceError::AuthenticationError(INVALID_CREDENTIALS.to_string()))?;

        let password_valid =
            verify_password(password, &user.password_hash).context("Failed to verify password")?;
        if !password_valid {
            return Err(UserServiceError::AuthenticationError(INVALID_CREDENTIALS.to_string()));
        }

        let session = Session::start(user.id, Duration::days(self.session_expiration_days));
        let session = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        tracing::info!("User '{}' logged in", user.username);
        Ok((user, session))
    }

    /// Delete a session. Unknown tokens are not an error.
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Unknown and expired tokens yield `None`; an expired session is
    /// deleted on the way out.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    /// Create the admin account, or reset its password and role if the
    /// username already exists.
    pub async fn ensure_admin(&self, username: &str, password: &str) -> Result<User, UserServiceError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(UserServiceError::ValidationError("Username cannot be empty".to_string()));
        }
        if password.is_empty() {
            return Err(UserServiceError::ValidationError("Password cannot be empty".to_string()));
        }

        let password_hash = hash_password(password).context("Failed to hash password")?;

        let existing = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?;

        match existing {
            Some(user) => {
                self.user_repo
                    .update_credentials(user.id, &password_hash, UserRole::Admin)
                    .await
                    .context("Failed to update user")?;
                // Old sessions were issued against the old password
                self.session_repo
                    .delete_by_user(user.id)
                    .await
                    .context("Failed to delete user sessions")?;
                tracing::info!("Reset credentials for admin '{}'", username);
                Ok(User {
                    password_hash,
                    role: UserRole::Admin,
                    ..user
                })
            }
            None => {
                let user = User::new(username.to_string(), password_hash, UserRole::Admin);
                let created = self
                    .user_repo
                    .create(&user)
                    .await
                    .context("Failed to create user")?;
                tracing::info!("Created admin '{}'", username);
                Ok(created)
            }
        }
    }

    /// Remove an account and, by cascade, its sessions
    pub async fn remove_user(&self, username: &str) -> Result<(), UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(username.trim())
            .await
            .context("Failed to get user by username")?
            .ok_or_else(|| UserServiceError::NotFound(username.to_string()))?;

        self.user_repo
            .delete(user.id)
            .await
            .context("Failed to delete user")?;

        tracing::info!("Removed user '{}'", user.username);
        Ok(())
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?;
        Ok(user)
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }
}
