use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Granted authority of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Authority {
    #[serde(rename = "ROLE_USER")]
    User,
    #[serde(rename = "ROLE_STUDENT")]
    Student,
    #[serde(rename = "ROLE_PROFESOR")]
    Profesor,
    #[serde(rename = "ROLE_ADMIN")]
    Admin,
}

impl Authority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Authority::User => "ROLE_USER",
            Authority::Student => "ROLE_STUDENT",
            Authority::Profesor => "ROLE_PROFESOR",
            Authority::Admin => "ROLE_ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ROLE_USER" => Some(Authority::User),
            "ROLE_STUDENT" => Some(Authority::Student),
            "ROLE_PROFESOR" => Some(Authority::Profesor),
            "ROLE_ADMIN" => Some(Authority::Admin),
            _ => None,
        }
    }
}

/// Outstanding password reset on an active account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordReset {
    pub key: String,
    pub issued_at: OffsetDateTime,
}

/// Lifecycle state of a registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    PendingActivation { activation_key: String },
    Active { reset: Option<PasswordReset> },
}

impl AccountState {
    pub fn is_active(&self) -> bool {
        matches!(self, AccountState::Active { .. })
    }

    pub fn activation_key(&self) -> Option<&str> {
        match self {
            AccountState::PendingActivation { activation_key } => Some(activation_key),
            AccountState::Active { .. } => None,
        }
    }

    pub fn reset(&self) -> Option<&PasswordReset> {
        match self {
            AccountState::Active { reset } => reset.as_ref(),
            AccountState::PendingActivation { .. } => None,
        }
    }
}

/// A user record as the account workflow sees it.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub lang_key: Option<String>,
    pub image_url: Option<String>,
    pub authorities: Vec<Authority>,
    pub state: AccountState,
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn has_any_authority(&self, wanted: &[Authority]) -> bool {
        self.authorities.iter().any(|a| wanted.contains(a))
    }
}

/// A user not yet persisted; the store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub lang_key: Option<String>,
    pub image_url: Option<String>,
    pub authorities: Vec<Authority>,
    pub state: AccountState,
}

impl NewUser {
    pub(crate) fn into_user(self, id: i64, created_at: OffsetDateTime) -> User {
        User {
            id,
            login: self.login,
            email: self.email,
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            lang_key: self.lang_key,
            image_url: self.image_url,
            authorities: self.authorities,
            state: self.state,
            created_at,
        }
    }
}

/// Row of the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub lang_key: Option<String>,
    pub image_url: Option<String>,
    pub authorities: Vec<String>,
    pub activated: bool,
    pub activation_key: Option<String>,
    pub reset_key: Option<String>,
    pub reset_date: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// State columns as stored: `(activated, activation_key, reset_key, reset_date)`.
pub type StateColumns = (bool, Option<String>, Option<String>, Option<OffsetDateTime>);

impl AccountState {
    pub fn to_columns(&self) -> StateColumns {
        match self {
            AccountState::PendingActivation { activation_key } => {
                (false, Some(activation_key.clone()), None, None)
            }
            AccountState::Active { reset: None } => (true, None, None, None),
            AccountState::Active { reset: Some(r) } => {
                (true, None, Some(r.key.clone()), Some(r.issued_at))
            }
        }
    }

    pub fn from_columns(columns: StateColumns) -> anyhow::Result<Self> {
        match columns {
            (false, Some(activation_key), None, None) => {
                Ok(AccountState::PendingActivation { activation_key })
            }
            (true, None, None, None) => Ok(AccountState::Active { reset: None }),
            (true, None, Some(key), Some(issued_at)) => Ok(AccountState::Active {
                reset: Some(PasswordReset { key, issued_at }),
            }),
            (activated, activation_key, reset_key, reset_date) => anyhow::bail!(
                "inconsistent account state: activated={} activation_key={} reset_key={} reset_date={}",
                activated,
                activation_key.is_some(),
                reset_key.is_some(),
                reset_date.is_some()
            ),
        }
    }
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let state = AccountState::from_columns((
            r.activated,
            r.activation_key,
            r.reset_key,
            r.reset_date,
        ))?;
        let authorities = r
            .authorities
            .iter()
            .filter_map(|a| Authority::parse(a))
            .collect();
        Ok(User {
            id: r.id,
            login: r.login,
            email: r.email,
            password_hash: r.password_hash,
            first_name: r.first_name,
            last_name: r.last_name,
            lang_key: r.lang_key,
            image_url: r.image_url,
            authorities,
            state,
            created_at: r.created_at,
        })
    }
}
