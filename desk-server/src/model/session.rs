//! Login sessions

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, bail, ensure};
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::footer::Footer;
use pasetors::keys::{AsymmetricKeyPair, AsymmetricPublicKey, Generate};
use pasetors::paserk::{self, FormatAsPaserk};
use pasetors::token::UntrustedToken;
use pasetors::version4::V4;
use pasetors::{Public, public};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::users::UserId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing user id on a token")]
    MissingUserId,
    #[error("Missing token id on a token")]
    MissingTokenId,
    #[error("Missing session data")]
    MissingClaims,
    #[error("Invalid session claim {0}")]
    InvalidSessionClaim(&'static str),
    #[error("Session doesn't exist or expired")]
    Unauthorized,
    #[error("Invalid authorization format")]
    InvalidAuthorization,
    #[error("Invalid authorization scheme")]
    InvalidAuthorizationScheme,
}

/// PASETO implicit assertion for session tokens
const SESSION_APP_SECRET: &[u8] = b"DeskAppSessionTokenSecret";

/// Session token passed in the `Authorization` HTTP header as `Session [token]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionToken {
    type Err = Error;

    /// Parses the `Authorization` header value
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, token) = s.split_once(' ').ok_or(Error::InvalidAuthorization)?;

        match scheme {
            "Session" | "Bearer" => Ok(Self(token.trim().to_owned())),
            _ => Err(Error::InvalidAuthorizationScheme),
        }
    }
}

impl SessionToken {
    /// Wraps a raw token, as found in a cookie
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Authenticates a token returning session
    pub async fn authenticate(
        self,
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    ) -> Result<Session> {
        Session::authenticate(db, self).await
    }

    /// Extracts the session id (the signing key id) from the token footer
    ///
    /// The footer is not verified at this point - the id is only used to look the signing key
    /// up.
    fn session_id(&self) -> Result<SessionId> {
        let token = UntrustedToken::<Public, V4>::try_from(&self.0)?;
        let mut footer = Footer::new();
        footer.parse_bytes(token.untrusted_footer())?;

        let key_id = footer
            .get_claim("kid")
            .ok_or_eyre(Error::MissingTokenId)?
            .as_str()
            .ok_or_eyre(Error::MissingTokenId)?;

        Ok(SessionId(key_id.to_owned()))
    }
}

/// Session identifier, the PASERK id of the session signing key
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct SessionId(String);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Active session
///
/// Session token is what actually gives access to any priviledges - the credentials are there
/// only to obtain the session token. Each session is signed by its own key pair, and only the
/// public key is stored. Removing the key from the database destroys the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Session identifier
    pub id: SessionId,
    /// User ID for this session
    pub user_id: UserId,
    /// Session token
    pub token: SessionToken,
    /// Session expiration time
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new session for given user storing it in DB
    pub async fn create(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        user_id: UserId,
        ttl: Duration,
    ) -> Result<Self> {
        let (session, pk) = Self::new(user_id, ttl)?;

        sqlx::query(
            "insert into sessions (id, user_id, public_key, expires_at) values (?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(user_id)
        .bind(pk)
        .bind(session.expires_at)
        .execute(db)
        .await?;

        Ok(session)
    }

    /// Verifies a session token, returning the session on success
    ///
    /// Fails for malformed tokens, for tokens which keys are not stored anymore, and for expired
    /// tokens.
    pub async fn authenticate(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        session_token: SessionToken,
    ) -> Result<Self> {
        let id = session_token.session_id()?;
        let token = UntrustedToken::<Public, V4>::try_from(&session_token.0)?;

        let (key, user_id): (String, UserId) = sqlx::query_as(
            "select public_key, user_id from sessions where id = ? and expires_at > ?",
        )
        .bind(&id)
        .bind(Utc::now())
        .fetch_optional(db)
        .await?
        .ok_or_eyre(Error::Unauthorized)?;

        let key = AsymmetricPublicKey::<V4>::try_from(key.as_str())?;

        let rules = ClaimsValidationRules::new();
        let token = public::verify(&key, &token, &rules, None, Some(SESSION_APP_SECRET))?;

        let claims = token.payload_claims().ok_or_eyre(Error::MissingClaims)?;
        let claimed_user = claimed_user(claims)?;
        ensure!(claimed_user == user_id, Error::Unauthorized);

        Ok(Self {
            id,
            user_id,
            token: session_token,
            expires_at: expires_at(claims)?,
        })
    }

    /// Destroys the session removing its entry in database
    ///
    /// Destroying already destroyed session is a no-op.
    pub async fn destroy(&self, db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>) -> Result<()> {
        sqlx::query("delete from sessions where id = ?")
            .bind(&self.id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Cleans expired sessions from database, returning number of removed sessions.
    pub async fn cleanup(db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>) -> Result<u64> {
        let now = Utc::now();
        let result = sqlx::query("delete from sessions where expires_at <= ?")
            .bind(now)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Creates new session for an user.
    ///
    /// The session data are not stored in the database. The `(session, public_key)` pair is
    /// returned instead for the purpose of storing the session.
    fn new(user_id: UserId, ttl: Duration) -> Result<(Self, String)> {
        if ttl.is_zero() {
            bail!(Error::InvalidSessionClaim("exp"));
        }

        let key_pair = AsymmetricKeyPair::<V4>::generate()?;
        let key_id = paserk::Id::from(&key_pair.public);

        let mut claims = Claims::new_expires_in(&ttl)?;
        claims.issuer(&user_id.to_string())?;
        let expires_at = expires_at(&claims)?;

        // Key id collisions are ignored - they are extremely unlikely, and the insertion would
        // fail on the primary key anyway.
        let mut kid = String::new();
        key_id.fmt(&mut kid)?;

        let mut pk = String::new();
        key_pair.public.fmt(&mut pk)?;

        let mut footer = Footer::new();
        footer.key_id(&key_id);

        let token = public::sign(
            &key_pair.secret,
            &claims,
            Some(&footer),
            Some(SESSION_APP_SECRET),
        )?;

        let session = Self {
            id: SessionId(kid),
            user_id,
            token: SessionToken(token),
            expires_at,
        };

        Ok((session, pk))
    }
}

/// Retrieves the user id from the session claims.
fn claimed_user(claims: &Claims) -> Result<UserId> {
    let user_id = claims
        .get_claim("iss")
        .and_then(|issuer| issuer.as_str())
        .ok_or(Error::MissingUserId)?;
    user_id.parse().map_err(Into::into)
}

/// Retrieves `expires_at` from the session claims.
fn expires_at(claims: &Claims) -> Result<DateTime<Utc>> {
    let expires_at = claims
        .get_claim("exp")
        .and_then(|expires_at| expires_at.as_str())
        .ok_or(Error::InvalidSessionClaim("exp"))?;
    expires_at.parse().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::users::Credentials;
    use sqlx::SqlitePool;

    const TTL: Duration = Duration::from_secs(3600);

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("model/migrations").run(&pool).await.unwrap();
        pool
    }

    async fn create_user(pool: &SqlitePool, name: &str) -> UserId {
        Credentials::new(name, "pw").create_user(pool).await.unwrap()
    }

    #[tokio::test]
    async fn verify_with_generated_token() {
        let pool = setup_pool().await;

        let user1 = create_user(&pool, "user1").await;
        let token1 = user1.create_session(&pool, TTL).await.unwrap().token;

        let session = token1.clone().authenticate(&pool).await.unwrap();
        assert_eq!(user1, session.user_id);

        let user2 = create_user(&pool, "user2").await;
        let token2 = user2.create_session(&pool, TTL).await.unwrap().token;

        // Also multiple sessions for single user
        let token3 = user2.create_session(&pool, TTL).await.unwrap().token;
        assert_ne!(token2, token3);

        let session = token1.authenticate(&pool).await.unwrap();
        assert_eq!(user1, session.user_id);

        let session = token2.authenticate(&pool).await.unwrap();
        assert_eq!(user2, session.user_id);

        let session = token3.authenticate(&pool).await.unwrap();
        assert_eq!(user2, session.user_id);
    }

    #[tokio::test]
    async fn authenticated_session_matches_created() {
        let pool = setup_pool().await;

        let user = create_user(&pool, "user1").await;
        let session = user.create_session(&pool, TTL).await.unwrap();
        let authenticated = session.token.clone().authenticate(&pool).await.unwrap();

        assert_eq!(session, authenticated);
    }

    #[tokio::test]
    async fn verify_with_random_data_fails() {
        let pool = setup_pool().await;
        let _ = SessionToken("fake_token".into())
            .authenticate(&pool)
            .await
            .unwrap_err();
    }

    #[tokio::test]
    async fn verify_with_destroyed_session_fails() {
        let pool = setup_pool().await;

        let user_id = create_user(&pool, "user1").await;
        let session = user_id.create_session(&pool, TTL).await.unwrap();
        let token = session.token.clone();

        session.destroy(&pool).await.unwrap();

        let err = token.authenticate(&pool).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Unauthorized)));

        // Destroying twice is fine
        session.destroy(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn destroying_one_session_keeps_others() {
        let pool = setup_pool().await;

        let user_id = create_user(&pool, "user1").await;
        let session1 = user_id.create_session(&pool, TTL).await.unwrap();
        let session2 = user_id.create_session(&pool, TTL).await.unwrap();

        session1.destroy(&pool).await.unwrap();

        let authenticated = session2.token.clone().authenticate(&pool).await.unwrap();
        assert_eq!(session2, authenticated);
    }

    #[tokio::test]
    async fn cleanup_removes_expired_sessions() {
        let pool = setup_pool().await;

        let user_id = create_user(&pool, "user1").await;
        let expired = user_id.create_session(&pool, TTL).await.unwrap();
        let active = user_id.create_session(&pool, TTL).await.unwrap();

        sqlx::query("update sessions set expires_at = ? where id = ?")
            .bind(Utc::now() - chrono::Duration::hours(1))
            .bind(&expired.id)
            .execute(&pool)
            .await
            .unwrap();

        let _ = expired.token.clone().authenticate(&pool).await.unwrap_err();

        let removed = Session::cleanup(&pool).await.unwrap();
        assert_eq!(removed, 1);

        let (count,): (i64,) = sqlx::query_as("select count(*) from sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        active.token.clone().authenticate(&pool).await.unwrap();
    }

    #[test]
    fn parsing_authorization_header() {
        let token: SessionToken = "Session abc.def".parse().unwrap();
        assert_eq!(token.as_str(), "abc.def");

        let token: SessionToken = "Bearer abc.def".parse().unwrap();
        assert_eq!(token.as_str(), "abc.def");

        assert!(matches!(
            "Basic abc".parse::<SessionToken>(),
            Err(Error::InvalidAuthorizationScheme)
        ));
        assert!(matches!(
            "abc".parse::<SessionToken>(),
            Err(Error::InvalidAuthorization)
        ));
    }
}
