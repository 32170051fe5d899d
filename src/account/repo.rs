use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use time::OffsetDateTime;

use crate::account::repo_types::{Authority, NewUser, PasswordReset, User, UserRow};

/// Unique index on `lower(login)`.
pub const LOGIN_CONSTRAINT: &str = "ux_users_login_lower";
/// Unique index on `lower(email)`.
pub const EMAIL_CONSTRAINT: &str = "ux_users_email_lower";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("login already in use")]
    LoginTaken,
    #[error("email already in use")]
    EmailTaken,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                match db.constraint() {
                    Some(LOGIN_CONSTRAINT) => return StoreError::LoginTaken,
                    Some(EMAIL_CONSTRAINT) => return StoreError::EmailTaken,
                    _ => {}
                }
            }
        }
        StoreError::Backend(e.into())
    }
}

/// Profile columns a user may change on their own account.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub lang_key: Option<String>,
    pub image_url: Option<String>,
}

/// Persistence of user records.
///
/// Lookups by login and email are case-insensitive. Writes are the only place
/// uniqueness conflicts are detected: `insert` and `update_profile` fail with
/// [`StoreError::LoginTaken`] or [`StoreError::EmailTaken`] atomically.
///
/// Every write touches only its own columns and is addressed by id or by key
/// in a single statement, so concurrent writers never restore stale state.
/// Writes return the updated record, or `None` when nothing matched.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_by_login(&self, login: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Activates the pending account holding `key` and clears the key.
    async fn activate(&self, key: &str) -> Result<Option<User>, StoreError>;

    /// Stores a reset key on an active account, replacing any earlier one.
    async fn set_reset(&self, id: i64, reset: &PasswordReset) -> Result<Option<User>, StoreError>;

    /// Replaces the password of the account holding reset `key` issued after
    /// `issued_after`, clearing the key.
    async fn consume_reset_key(
        &self,
        key: &str,
        issued_after: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<Option<User>, StoreError>;

    async fn update_profile(&self, id: i64, profile: &ProfileUpdate) -> Result<Option<User>, StoreError>;
}

const USER_COLUMNS: &str = "id, login, email, password_hash, first_name, last_name, lang_key, \
     image_url, authorities, activated, activation_key, reset_key, reset_date, created_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one_where(&self, predicate: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        into_user(row)
    }
}

fn into_user(row: Option<UserRow>) -> Result<Option<User>, StoreError> {
    row.map(User::try_from).transpose().map_err(StoreError::Backend)
}

fn authority_names(authorities: &[Authority]) -> Vec<String> {
    authorities.iter().map(|a| a.as_str().to_string()).collect()
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let (activated, activation_key, reset_key, reset_date) = user.state.to_columns();
        let sql = format!(
            r#"
            INSERT INTO users (login, email, password_hash, first_name, last_name, lang_key,
                               image_url, authorities, activated, activation_key, reset_key, reset_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.login)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.lang_key)
            .bind(&user.image_url)
            .bind(authority_names(&user.authorities))
            .bind(activated)
            .bind(activation_key)
            .bind(reset_key)
            .bind(reset_date)
            .fetch_one(&self.db)
            .await?;
        User::try_from(row).map_err(StoreError::Backend)
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        self.find_one_where("lower(login) = lower($1)", login).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one_where("lower(email) = lower($1)", email).await
    }

    async fn activate(&self, key: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "UPDATE users SET activated = TRUE, activation_key = NULL \
             WHERE activation_key = $1 AND NOT activated RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(key)
            .fetch_optional(&self.db)
            .await?;
        into_user(row)
    }

    async fn set_reset(&self, id: i64, reset: &PasswordReset) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "UPDATE users SET reset_key = $2, reset_date = $3 \
             WHERE id = $1 AND activated RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(&reset.key)
            .bind(reset.issued_at)
            .fetch_optional(&self.db)
            .await?;
        into_user(row)
    }

    async fn consume_reset_key(
        &self,
        key: &str,
        issued_after: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "UPDATE users SET password_hash = $3, reset_key = NULL, reset_date = NULL \
             WHERE reset_key = $1 AND reset_date > $2 AND activated RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(key)
            .bind(issued_after)
            .bind(password_hash)
            .fetch_optional(&self.db)
            .await?;
        into_user(row)
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "UPDATE users SET password_hash = $2 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(password_hash)
            .fetch_optional(&self.db)
            .await?;
        into_user(row)
    }

    async fn update_profile(&self, id: i64, profile: &ProfileUpdate) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "UPDATE users SET email = $2, first_name = $3, last_name = $4, lang_key = $5, \
             image_url = $6 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(&profile.email)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.lang_key)
            .bind(&profile.image_url)
            .fetch_optional(&self.db)
            .await?;
        into_user(row)
    }
}
