//! Password hashing, credential checks and session identity.
//!
//! The browser holds a random token in a signed cookie. Only the SHA-256 of
//! that token is persisted, next to the user id and an expiry.

use std::sync::LazyLock;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Key, SignedCookieJar};
use rand_core::{OsRng, RngCore};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    AppState,
    db::{next_stamp, now_ms},
    entities::{session, user},
    error::AppError,
    models::{Profile, ProfileUpdate, RegisterRequest},
};

pub const SESSION_COOKIE: &str = "cinelog_session";

const MAX_USERNAME_LEN: usize = 16;
const MAX_EMAIL_LEN: usize = 120;
const MAX_PREFECTURE_LEN: usize = 50;
const MIN_PASSWORD_LEN: usize = 8;
const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("login required")]
    Unauthenticated,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("storage error: {0}")]
    Storage(#[from] DbErr),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct UserIdentity {
    pub user_id: i32,
    pub username: String,
}

/// Who is making a request. Missing, expired or unknown sessions are
/// anonymous rather than an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Identity {
    Anonymous,
    User(UserIdentity),
}

impl Identity {
    pub fn user_id(&self) -> Option<i32> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user.user_id),
        }
    }

    pub fn require(self) -> Result<UserIdentity, AuthError> {
        match self {
            Identity::Anonymous => Err(AuthError::Unauthenticated),
            Identity::User(user) => Ok(user),
        }
    }
}

/// Credential capability of an account record.
pub trait Authenticatable {
    fn verify_credentials(&self, password: &str) -> bool;
    fn identity(&self) -> UserIdentity;
}

impl Authenticatable for user::Model {
    fn verify_credentials(&self, password: &str) -> bool {
        verify_password(password, &self.password_hash)
    }

    fn identity(&self) -> UserIdentity {
        UserIdentity { user_id: self.id, username: self.username.clone() }
    }
}

pub fn hash_password(plain: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(plain: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok()
}

/// Verified against when the username does not exist, so both failure paths
/// cost one argon2 verification.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("cinelog-unknown-user").ok());

pub async fn authenticate<C: ConnectionTrait>(
    conn: &C,
    username: &str,
    password: &str,
) -> Result<UserIdentity, AuthError> {
    let found = user::Entity::find()
        .filter(user::Column::Username.eq(username.trim()))
        .one(conn)
        .await?;

    match found {
        Some(account) if account.verify_credentials(password) => Ok(account.identity()),
        Some(_) => Err(AuthError::InvalidCredentials),
        None => {
            if let Some(hash) = DUMMY_HASH.as_deref() {
                verify_password(password, hash);
            }
            Err(AuthError::InvalidCredentials)
        },
    }
}

pub async fn register<C: ConnectionTrait>(
    conn: &C,
    req: RegisterRequest,
) -> Result<user::Model, AuthError> {
    let username = req.username.trim().to_string();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(AuthError::Validation(format!(
            "username must be 1 to {MAX_USERNAME_LEN} characters"
        )));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(AuthError::Validation("username must not contain whitespace".into()));
    }
    let email = normalize_email(&req.email)?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let prefecture = normalize_prefecture(req.prefecture.as_deref())?;

    if user::Entity::find()
        .filter(user::Column::Username.eq(username.as_str()))
        .one(conn)
        .await?
        .is_some()
    {
        return Err(AuthError::Conflict("username is already taken".into()));
    }
    ensure_email_free(conn, &email, None).await?;

    let now = now_ms();
    let account = user::ActiveModel {
        username: Set(username),
        email: Set(email),
        password_hash: Set(hash_password(&req.password)?),
        prefecture: Set(prefecture),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(unique_conflict)?;

    info!(user_id = account.id, username = %account.username, "registered user");
    Ok(account)
}

pub async fn profile<C: ConnectionTrait>(conn: &C, user_id: i32) -> Result<Profile, AuthError> {
    let account =
        user::Entity::find_by_id(user_id).one(conn).await?.ok_or(AuthError::Unauthenticated)?;
    Ok(to_profile(account))
}

pub async fn update_profile<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    update: ProfileUpdate,
) -> Result<Profile, AuthError> {
    let account =
        user::Entity::find_by_id(user_id).one(conn).await?.ok_or(AuthError::Unauthenticated)?;

    let email = update.email.as_deref().map(normalize_email).transpose()?;
    if let Some(email) = &email {
        ensure_email_free(conn, email, Some(user_id)).await?;
    }
    let prefecture = match update.prefecture.as_deref() {
        Some(raw) => Some(normalize_prefecture(Some(raw))?),
        None => None,
    };

    let stamp = next_stamp(account.updated_at);
    let mut row: user::ActiveModel = account.into();
    if let Some(email) = email {
        row.email = Set(email);
    }
    if let Some(prefecture) = prefecture {
        row.prefecture = Set(prefecture);
    }
    row.updated_at = Set(stamp);
    let account = row.update(conn).await.map_err(unique_conflict)?;

    debug!(user_id = account.id, "profile updated");
    Ok(to_profile(account))
}

fn to_profile(account: user::Model) -> Profile {
    Profile {
        user_id: account.id,
        username: account.username,
        email: account.email,
        prefecture: account.prefecture,
    }
}

fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let email = raw.trim().to_string();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid || email.chars().count() > MAX_EMAIL_LEN {
        return Err(AuthError::Validation("email must be a valid address".into()));
    }
    Ok(email)
}

fn normalize_prefecture(raw: Option<&str>) -> Result<Option<String>, AuthError> {
    let prefecture = raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    if prefecture.as_ref().is_some_and(|p| p.chars().count() > MAX_PREFECTURE_LEN) {
        return Err(AuthError::Validation(format!(
            "prefecture must be at most {MAX_PREFECTURE_LEN} characters"
        )));
    }
    Ok(prefecture)
}

async fn ensure_email_free<C: ConnectionTrait>(
    conn: &C,
    email: &str,
    owner: Option<i32>,
) -> Result<(), AuthError> {
    let taken = user::Entity::find().filter(user::Column::Email.eq(email)).one(conn).await?;
    match taken {
        Some(other) if Some(other.id) != owner => {
            Err(AuthError::Conflict("email is already registered".into()))
        },
        _ => Ok(()),
    }
}

fn unique_conflict(err: DbErr) -> AuthError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AuthError::Conflict("username or email is already registered".into())
        },
        _ => AuthError::Storage(err),
    }
}

fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Persist a new session for `user_id` and return the raw token for the cookie.
pub async fn create_session<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    ttl_days: i64,
) -> Result<String, DbErr> {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let token = hex::encode(bytes);

    let now = now_ms();
    let row = session::ActiveModel {
        token_hash: Set(token_hash(&token)),
        user_id: Set(user_id),
        created_at: Set(now),
        expires_at: Set(now.saturating_add(ttl_days.max(1).saturating_mul(DAY_MS))),
    };
    session::Entity::insert(row).exec_without_returning(conn).await?;
    Ok(token)
}

pub async fn resolve_session<C: ConnectionTrait>(conn: &C, token: &str) -> Result<Identity, DbErr> {
    let found = session::Entity::find_by_id(token_hash(token))
        .find_also_related(user::Entity)
        .one(conn)
        .await?;

    match found {
        Some((session, Some(account))) if session.expires_at > now_ms() => {
            Ok(Identity::User(account.identity()))
        },
        Some((session, _)) => {
            debug!(user_id = session.user_id, "dropping expired session");
            session::Entity::delete_by_id(session.token_hash).exec(conn).await?;
            Ok(Identity::Anonymous)
        },
        None => Ok(Identity::Anonymous),
    }
}

pub async fn revoke_session<C: ConnectionTrait>(conn: &C, token: &str) -> Result<(), DbErr> {
    session::Entity::delete_by_id(token_hash(token)).exec(conn).await?;
    Ok(())
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = match SignedCookieJar::<Key>::from_request_parts(parts, state).await {
            Ok(jar) => jar,
            Err(never) => match never {},
        };
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(Identity::Anonymous);
        };
        Ok(resolve_session(&state.db, cookie.value()).await?)
    }
}
