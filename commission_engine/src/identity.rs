//! User identity and sessions.
//!
//! [`IdentityProvider`] covers what the rest of the service needs from
//! an identity backend: resolving a bearer token to a user, ending a
//! session and finding a user by email.  [`MemoryIdentity`] is the
//! in-process implementation.  Passwords are stored as argon2 PHC
//! strings and sessions expire after a fixed lifetime.

use std::collections::HashMap;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Session, User};

pub const TOKEN_PREFIX: &str = "cs_";
pub const MIN_PASSWORD_LEN: usize = 8;
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn register(&self, email: &str, display_name: &str, password: &str) -> AppResult<User>;
    /// Unknown emails and wrong passwords are both `Unauthorized`.
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session>;
    async fn current_user(&self, token: &str) -> AppResult<User>;
    /// Ending an unknown session is not an error.
    async fn sign_out(&self, token: &str) -> AppResult<()>;
    async fn lookup_by_email(&self, email: &str) -> AppResult<Option<User>>;
}

struct Account {
    user: User,
    password_hash: String,
}

struct SessionEntry {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Directory {
    accounts: HashMap<Uuid, Account>,
    by_email: HashMap<String, Uuid>,
    sessions: HashMap<String, SessionEntry>,
}

impl Directory {
    fn user(&self, id: &Uuid) -> Option<&User> {
        self.accounts.get(id).map(|account| &account.user)
    }
}

pub struct MemoryIdentity {
    inner: RwLock<Directory>,
    session_ttl: Duration,
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::with_session_ttl(Duration::hours(DEFAULT_SESSION_TTL_HOURS))
    }
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_ttl(session_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Directory::default()),
            session_ttl,
        }
    }
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Storage(format!("password hashing failed: {e}")))
}

pub fn verify_password(stored_hash: &str, candidate: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::Storage(format!("invalid stored password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok())
}

/// Trims and lower-cases an email, rejecting obviously malformed ones.
pub fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AppError::InvalidInput(format!("invalid email `{email}`"))),
    }
}

fn issue_token() -> String {
    format!("{TOKEN_PREFIX}{}", Uuid::new_v4().simple())
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn register(&self, email: &str, display_name: &str, password: &str) -> AppResult<User> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let password_hash = hash_password(password)?;
        let mut dir = self.inner.write().await;
        if dir.by_email.contains_key(&email) {
            return Err(AppError::Conflict(format!("{email} is already registered")));
        }
        let display_name = match display_name.trim() {
            "" => email.clone(),
            name => name.to_string(),
        };
        let user = User {
            id: Uuid::new_v4(),
            email: email.clone(),
            display_name,
        };
        dir.by_email.insert(email, user.id);
        dir.accounts.insert(
            user.id,
            Account {
                user: user.clone(),
                password_hash,
            },
        );
        tracing::info!(user_id = %user.id, "registered user");
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        let email = normalize_email(email).map_err(|_| AppError::Unauthorized)?;
        if password.is_empty() {
            return Err(AppError::Unauthorized);
        }
        let (user, password_hash) = {
            let dir = self.inner.read().await;
            let account = dir
                .by_email
                .get(&email)
                .and_then(|id| dir.accounts.get(id))
                .ok_or(AppError::Unauthorized)?;
            (account.user.clone(), account.password_hash.clone())
        };
        if !verify_password(&password_hash, password)? {
            tracing::warn!(user_id = %user.id, "rejected sign-in with wrong password");
            return Err(AppError::Unauthorized);
        }

        let now = Utc::now();
        let token = issue_token();
        let mut dir = self.inner.write().await;
        dir.sessions.retain(|_, session| session.expires_at > now);
        dir.sessions.insert(
            token.clone(),
            SessionEntry {
                user_id: user.id,
                expires_at: now + self.session_ttl,
            },
        );
        Ok(Session { token, user })
    }

    async fn current_user(&self, token: &str) -> AppResult<User> {
        let now = Utc::now();
        {
            let dir = self.inner.read().await;
            match dir.sessions.get(token) {
                None => return Err(AppError::Unauthorized),
                Some(session) if session.expires_at > now => {
                    return dir
                        .user(&session.user_id)
                        .cloned()
                        .ok_or(AppError::Unauthorized);
                }
                Some(_) => {}
            }
        }
        self.inner.write().await.sessions.remove(token);
        tracing::debug!("dropped expired session");
        Err(AppError::Unauthorized)
    }

    async fn sign_out(&self, token: &str) -> AppResult<()> {
        self.inner.write().await.sessions.remove(token);
        Ok(())
    }

    async fn lookup_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = normalize_email(email)?;
        let dir = self.inner.read().await;
        Ok(dir
            .by_email
            .get(&email)
            .and_then(|id| dir.user(id))
            .cloned())
    }
}
