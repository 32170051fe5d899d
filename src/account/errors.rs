use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::account::repo::StoreError;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Incorrect password")]
    InvalidPassword,
    #[error("Login name already used!")]
    LoginAlreadyUsed,
    #[error("Email is already in use!")]
    EmailAlreadyUsed,
    #[error("Invalid login")]
    InvalidLogin,
    #[error("Invalid email")]
    InvalidEmail,
    #[error("Invalid credentials")]
    BadCredentials,
    #[error("User not activated")]
    NotActivated,
    #[error("No user was found for this activation key")]
    NoUserForActivationKey,
    #[error("No user was found for this reset key")]
    NoUserForResetKey,
    #[error("Current user login not found")]
    NoCurrentUser,
    #[error("User could not be found")]
    UserNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LoginTaken => AccountError::LoginAlreadyUsed,
            StoreError::EmailTaken => AccountError::EmailAlreadyUsed,
            StoreError::Backend(e) => AccountError::Internal(e),
        }
    }
}

impl AccountError {
    pub fn status(&self) -> StatusCode {
        match self {
            AccountError::InvalidPassword
            | AccountError::LoginAlreadyUsed
            | AccountError::EmailAlreadyUsed
            | AccountError::InvalidLogin
            | AccountError::InvalidEmail => StatusCode::BAD_REQUEST,
            AccountError::BadCredentials | AccountError::NotActivated => StatusCode::UNAUTHORIZED,
            AccountError::NoUserForActivationKey
            | AccountError::NoUserForResetKey
            | AccountError::NoCurrentUser
            | AccountError::UserNotFound
            | AccountError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            // Detail stays in the log; the caller gets an opaque failure.
            error!(error = %self, "account request failed");
            return (status, "Internal server error".to_string()).into_response();
        }
        (status, self.to_string()).into_response()
    }
}
