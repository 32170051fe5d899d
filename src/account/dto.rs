use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::account::repo_types::{Authority, User};

/// Request body for user registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub login: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub lang_key: Option<String>,
    pub image_url: Option<String>,
}

/// Editable profile fields of the current account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub lang_key: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAndPasswordRequest {
    pub key: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivateQuery {
    pub key: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id_token: String,
}

/// Account projection returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub lang_key: Option<String>,
    pub image_url: Option<String>,
    pub activated: bool,
    pub authorities: Vec<Authority>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
}

impl From<User> for AccountResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            activated: u.state.is_active(),
            login: u.login,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            lang_key: u.lang_key,
            image_url: u.image_url,
            authorities: u.authorities,
            created_date: u.created_at,
        }
    }
}
