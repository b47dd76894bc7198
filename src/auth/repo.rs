use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::password::verify_password_or_dummy;
use super::repo_types::{AuthRecord, NewUser, User};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, display_name, \
     gender, avatar, birthday, role, status, created_at, updated_at";

/// Lower-cases and trims an email the same way for lookups and inserts.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Returned by [`UserStore::create`] when the email is already taken.
#[derive(Debug, thiserror::Error)]
#[error("email already registered")]
pub struct DuplicateEmail;

/// Credential store behind the auth endpoints.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    /// Loads only what token refresh needs.
    async fn find_auth_record(&self, id: Uuid) -> anyhow::Result<Option<AuthRecord>>;

    async fn create(&self, user: NewUser) -> anyhow::Result<User>;

    /// `None` for an unknown email and for a wrong password alike. Both pay
    /// for one argon2 verify.
    async fn find_by_credentials(&self, email: &str, password: &str) -> anyhow::Result<Option<User>> {
        let user = self.find_by_email(&normalize_email(email)).await?;
        let stored = user.as_ref().map(|u| u.password_hash.as_str());
        if verify_password_or_dummy(password, stored)? {
            Ok(user)
        } else {
            Ok(None)
        }
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_auth_record(&self, id: Uuid) -> anyhow::Result<Option<AuthRecord>> {
        let record = sqlx::query_as::<_, AuthRecord>(
            r#"
            SELECT id, password_hash, status
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(record)
    }

    async fn create(&self, user: NewUser) -> anyhow::Result<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users
                (email, password_hash, first_name, last_name, display_name, gender, role, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.display_name)
        .bind(user.gender.as_str())
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                anyhow::Error::new(DuplicateEmail)
            }
            other => other.into(),
        })?;
        Ok(created)
    }
}
