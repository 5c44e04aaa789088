//! Credential store

use base64::prelude::*;
use color_eyre::eyre::{Result, bail};
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use sqlx::prelude::Type;
use thiserror::Error;
use uuid::Uuid;

use crate::model::session::Session;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error("Invalid user id format")]
    InvalidUserId,
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("User not found")]
    NotFound,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("{0}")]
    Validation(&'static str),
    #[error("Password hash malformed in the database")]
    InvalidHashStored,
}

/// Secret mixed into every password hash. For now it is a constant, but it should be fed from
/// the environment during the build.
const PASSWORD_APP_SECRET: &str = "DeskAppPasswordSecret";

const MAX_USERNAME_LEN: usize = 64;
const MAX_PASSWORD_LEN: usize = 256;

/// Newtype for user id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct UserId(i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.parse().map_err(|_| Error::InvalidUserId)?;
        Ok(Self(id))
    }
}

impl UserId {
    /// Fetches `User` with this id from database
    pub async fn fetch(
        self,
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    ) -> Result<Option<User>> {
        User::fetch(db, self).await
    }

    /// Creates a session for this user
    pub async fn create_session(
        self,
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        ttl: std::time::Duration,
    ) -> Result<Session> {
        Session::create(db, self, ttl).await
    }
}

/// User queryable data
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

impl User {
    /// Fetches user from the database
    pub async fn fetch(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        user_id: UserId,
    ) -> Result<Option<Self>> {
        let row: Option<(String,)> = sqlx::query_as("select username from users where id = ?")
            .bind(user_id)
            .fetch_optional(db)
            .await?;

        Ok(row.map(|(username,)| Self {
            id: user_id,
            username,
        }))
    }
}

/// Username and password pair as sent by the client
///
/// The password never shows up in `Debug` output, so the credentials can be safely traced.
#[derive(Clone, Deserialize, Derivative)]
#[derivative(Debug)]
pub struct Credentials {
    pub username: String,
    #[derivative(Debug = "ignore")]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Checks signup constraints, returning the normalized username
    fn validate(&self) -> Result<&str, Error> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(Error::Validation("Username cannot be empty"));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(Error::Validation("Username is too long"));
        }
        if username.chars().any(char::is_control) {
            return Err(Error::Validation("Username contains invalid characters"));
        }
        if self.password.is_empty() {
            return Err(Error::Validation("Password cannot be empty"));
        }
        if self.password.chars().count() > MAX_PASSWORD_LEN {
            return Err(Error::Validation("Password is too long"));
        }
        Ok(username)
    }

    /// Creates a new user with these credentials, returning created user id
    ///
    /// Username uniqueness is enforced by the database index, so two concurrent signups for the
    /// same name cannot both succeed.
    pub async fn create_user(
        &self,
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    ) -> Result<UserId> {
        let username = self.validate()?;
        let hash = PasswordHash::generate(&self.password);

        let insertion = sqlx::query(
            "insert into users (username, password_salt, password_hash) values (?, ?, ?)",
        )
        .bind(username)
        .bind(hash.salt)
        .bind(hash.hash.as_slice())
        .execute(db)
        .await;

        match insertion {
            Ok(result) => Ok(UserId(result.last_insert_rowid())),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                bail!(Error::DuplicateUsername)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Verifies credentials, returning the authenticated user id
    pub async fn verify(
        &self,
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    ) -> Result<UserId> {
        let row: Option<(UserId, Uuid, Vec<u8>)> = sqlx::query_as(
            "select id, password_salt, password_hash from users where username = ?",
        )
        .bind(self.username.trim())
        .fetch_optional(db)
        .await?;

        let Some((user_id, salt, hash)) = row else {
            bail!(Error::NotFound);
        };

        let hash: [u8; 32] = hash.try_into().map_err(|_| Error::InvalidHashStored)?;
        let stored = PasswordHash { salt, hash };
        if !stored.matches(&self.password) {
            bail!(Error::InvalidPassword);
        }

        Ok(user_id)
    }
}

/// Salted password hash
///
/// Hashed data is formatted as `{APP_SECRET}.{salt}.{password}`, where the salt is a random
/// Uuid generated per user and compressed with Base64. The stored hash therefore depends on
/// the user provided password, the database state and the application builtin secret.
#[derive(Debug, Clone)]
struct PasswordHash {
    /// Per-user random salt
    salt: Uuid,
    /// SHA3-256 of the salted password
    hash: [u8; 32],
}

impl PasswordHash {
    fn generate(password: &str) -> Self {
        let salt = Uuid::new_v4();
        let hash = Self::digest(salt, password);
        Self { salt, hash }
    }

    fn digest(salt: Uuid, password: &str) -> [u8; 32] {
        let salt = BASE64_STANDARD.encode(salt.as_bytes());
        let data = format!("{PASSWORD_APP_SECRET}.{salt}.{password}");

        let mut hasher = Sha3_256::new();
        hasher.update(data.as_bytes());
        hasher.finalize().into()
    }

    fn matches(&self, password: &str) -> bool {
        Self::digest(self.salt, password) == self.hash
    }
}
