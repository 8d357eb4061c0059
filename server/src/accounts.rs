//! User registration and login.
//!
//! Passwords are stored as bcrypt hashes. A successful login returns a
//! signed token whose `user_id` claim is the numeric user id, which is also
//! the ledger's user key.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument, warn};

use wallet_common::{UserKey, WalletError};
use wallet_ledger::map_sqlx_error;

use crate::auth::TokenIssuer;
use crate::errors::ApiError;

/// DDL for the users table.
pub const USERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            BIGSERIAL   PRIMARY KEY,
    username      TEXT        NOT NULL UNIQUE,
    email         TEXT        NOT NULL UNIQUE,
    password_hash TEXT        NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

/// A stored user.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

/// Account failures.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("username or email already exists")]
    Duplicate,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Duplicate => ApiError::Conflict("username or email already exists"),
            AccountError::InvalidCredentials => {
                ApiError::Unauthorized("invalid username or password")
            }
            AccountError::Wallet(err) => ApiError::Wallet(err),
        }
    }
}

/// Storage of user credentials.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Get store name for logging.
    fn name(&self) -> &str;

    /// Insert a user and return its id, or `None` if the username or email
    /// is taken.
    async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<i64>, WalletError>;

    /// Look a user up by username.
    async fn find(&self, username: &str) -> Result<Option<UserRecord>, WalletError>;
}

/// Users in the `users` table.
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the users table if it does not exist.
    pub async fn init_schema(&self) -> Result<(), WalletError> {
        sqlx::query(USERS_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        info!("Users schema ready");
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<i64>, WalletError> {
        // Either unique constraint turns the insert into a no-op.
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) \
             ON CONFLICT DO NOTHING RETURNING id",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn find(&self, username: &str) -> Result<Option<UserRecord>, WalletError> {
        let row: Option<(i64, String, String)> = sqlx::query_as(
            "SELECT id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|(id, username, password_hash)| UserRecord {
            id,
            username,
            password_hash,
        }))
    }
}

#[derive(Default)]
struct MemoryUsers {
    by_name: HashMap<String, UserRecord>,
    emails: HashSet<String>,
    next_id: i64,
}

/// In-process user store.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<MemoryUsers>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<i64>, WalletError> {
        let mut users = self.users.lock();
        if users.by_name.contains_key(username) || users.emails.contains(email) {
            return Ok(None);
        }

        users.next_id += 1;
        let id = users.next_id;
        users.emails.insert(email.to_string());
        users.by_name.insert(
            username.to_string(),
            UserRecord {
                id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(Some(id))
    }

    async fn find(&self, username: &str) -> Result<Option<UserRecord>, WalletError> {
        Ok(self.users.lock().by_name.get(username).cloned())
    }
}

/// Registration and login on top of a [`UserStore`].
pub struct AccountService {
    users: Arc<dyn UserStore>,
    issuer: TokenIssuer,
    hash_cost: u32,
}

impl AccountService {
    /// Create a service hashing with bcrypt's default cost.
    pub fn new(users: Arc<dyn UserStore>, issuer: TokenIssuer) -> Self {
        Self {
            users,
            issuer,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Set the bcrypt cost.
    pub fn with_hash_cost(mut self, hash_cost: u32) -> Self {
        self.hash_cost = hash_cost;
        self
    }

    /// Register a user and return its id.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<i64, AccountError> {
        let username = username.trim();
        let email = email.trim();
        validate_registration(username, password, email)?;

        let password = password.to_string();
        let cost = self.hash_cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| WalletError::infrastructure(format!("hashing task failed: {e}")))?
            .map_err(|e| WalletError::infrastructure(format!("password hashing failed: {e}")))?;

        match self.users.create(username, email, &hash).await? {
            Some(id) => {
                info!(username, user_id = id, store = self.users.name(), "User registered");
                Ok(id)
            }
            None => {
                info!(username, "Registration rejected: username or email taken");
                Err(AccountError::Duplicate)
            }
        }
    }

    /// Check credentials and return a signed token.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AccountError> {
        let Some(user) = self.users.find(username.trim()).await? else {
            info!(username, "Login rejected: unknown user");
            return Err(AccountError::InvalidCredentials);
        };

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| WalletError::infrastructure(format!("hashing task failed: {e}")))?;

        match verified {
            Ok(true) => {}
            Ok(false) => {
                info!(username, "Login rejected: wrong password");
                return Err(AccountError::InvalidCredentials);
            }
            Err(e) => {
                warn!(username, error = %e, "Stored password hash is unreadable");
                return Err(AccountError::InvalidCredentials);
            }
        }

        let token = self.issuer.issue(&UserKey::from(user.id))?;
        info!(username = %user.username, user_id = user.id, "Login succeeded");
        Ok(token)
    }
}

fn validate_registration(username: &str, password: &str, email: &str) -> Result<(), WalletError> {
    if username.is_empty() {
        return Err(WalletError::validation("username must not be empty", "username"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(WalletError::validation(
            format!("password must have at least {MIN_PASSWORD_LEN} characters"),
            "password",
        ));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(WalletError::validation("email is not valid", "email")),
    }
}
