use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::debug;

use super::context::QueryCtx;
use super::errors::{ModelError, ModelResult};
use super::password::Password;
use super::validator::{is_valid_email, ValidationErrors};

pub const MAX_NAME_BYTES: usize = 500;

const USER_COLUMNS: &str = "id, created_at, name, email, password_hash, activated, version";

/// Row in the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub created_at: OffsetDateTime,
    pub name: String,
    pub email: String,
    pub password_hash: Vec<u8>,
    pub activated: bool,
    pub version: i32,
}

/// An account owning catalog records. The password hash is never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    id: i64,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    version: i32,
}

impl User {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        validate_user(&self.name, &self.email, &self.password)
    }
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            created_at: r.created_at,
            name: r.name,
            email: r.email,
            password: Password::from_hash(r.password_hash),
            activated: r.activated,
            version: r.version,
        }
    }
}

/// Fields needed to register a user. New users start deactivated.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: Password,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        validate_user(&self.name, &self.email, &self.password)
    }
}

/// Emails compare case-insensitively; they are stored in this form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_user(name: &str, email: &str, password: &Password) -> Result<(), ValidationErrors> {
    let mut v = ValidationErrors::new();

    v.check(!name.trim().is_empty(), "name", "must be provided");
    v.check(
        name.len() <= MAX_NAME_BYTES,
        "name",
        "must not be more than 500 bytes long",
    );

    let email = email.trim();
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(is_valid_email(email), "email", "must be a valid email address");

    password.validate(&mut v);
    v.finish()
}

/// Account store.
#[async_trait]
pub trait Users: Send + Sync {
    /// Fails with `DuplicateEmail` when the normalized email is taken.
    async fn insert(&self, ctx: &QueryCtx, user: NewUser) -> ModelResult<User>;

    async fn get_by_email(&self, ctx: &QueryCtx, email: &str) -> ModelResult<User>;

    /// Same version contract as `Movies::update`; may also fail with
    /// `DuplicateEmail` when the email changes to a taken one.
    async fn update(&self, ctx: &QueryCtx, user: &mut User) -> ModelResult<()>;
}

/// PostgreSQL-backed [`Users`].
#[derive(Clone)]
pub struct UserModel {
    pool: PgPool,
}

impl UserModel {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Users for UserModel {
    async fn insert(&self, ctx: &QueryCtx, user: NewUser) -> ModelResult<User> {
        user.validate()?;
        let email = normalize_email(&user.email);

        let sql = format!(
            "INSERT INTO users (name, email, password_hash, activated) \
             VALUES ($1, $2, $3, FALSE) \
             RETURNING {USER_COLUMNS}"
        );
        let row = ctx
            .run(
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(&user.name)
                    .bind(&email)
                    .bind(user.password.hash())
                    .fetch_one(&self.pool),
            )
            .await?;

        debug!(user_id = row.id, "user inserted");
        Ok(row.into())
    }

    async fn get_by_email(&self, ctx: &QueryCtx, email: &str) -> ModelResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = $1");
        let row = ctx
            .run(
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(normalize_email(email))
                    .fetch_optional(&self.pool),
            )
            .await?;

        row.map(User::from).ok_or(ModelError::NotFound)
    }

    async fn update(&self, ctx: &QueryCtx, user: &mut User) -> ModelResult<()> {
        user.validate()?;
        let email = normalize_email(&user.email);

        let sql = format!(
            "UPDATE users \
             SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1 \
             WHERE id = $5 AND version = $6 \
             RETURNING {USER_COLUMNS}"
        );
        let row = ctx
            .run(
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(&user.name)
                    .bind(&email)
                    .bind(user.password.hash())
                    .bind(user.activated)
                    .bind(user.id)
                    .bind(user.version)
                    .fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => {
                debug!(user_id = row.id, version = row.version, "user updated");
                *user = row.into();
                Ok(())
            }
            None => Err(ModelError::EditConflict),
        }
    }
}
