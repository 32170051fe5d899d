use axum::{
    body::Bytes,
    extract::{FromRef, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, instrument};

use crate::{
    account::{
        dto::{
            AccountResponse, ActivateQuery, KeyAndPasswordRequest, LoginRequest,
            PasswordChangeRequest, RegisterRequest, TokenResponse, UpdateAccountRequest,
        },
        errors::AccountError,
        jwt::{JwtKeys, SecurityContext},
    },
    state::AppState,
};

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/activate", get(activate))
        .route("/authenticate", get(is_authenticated).post(authorize))
        .route("/account", get(get_account).post(save_account))
        .route("/account/change-password", post(change_password))
        .route("/account/reset-password/init", post(request_password_reset))
        .route("/account/reset-password/finish", post(finish_password_reset))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<StatusCode, AccountError> {
    state.accounts.register(payload).await?;
    Ok(StatusCode::CREATED)
}

#[instrument(skip(state, q))]
pub async fn activate(
    State(state): State<AppState>,
    Query(q): Query<ActivateQuery>,
) -> Result<(), AccountError> {
    state.accounts.activate(&q.key).await?;
    Ok(())
}

/// Login of the caller, or an empty body when anonymous.
#[instrument(skip(ctx))]
pub async fn is_authenticated(ctx: SecurityContext) -> String {
    debug!("check if the current user is authenticated");
    ctx.current_login().unwrap_or_default().to_string()
}

#[instrument(skip(state, payload))]
pub async fn authorize(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AccountError> {
    let user = state
        .accounts
        .authenticate(&payload.username, &payload.password)
        .await?;
    let id_token = JwtKeys::from_ref(&state).sign(&user)?;
    Ok(Json(TokenResponse { id_token }))
}

#[instrument(skip(state, ctx))]
pub async fn get_account(
    State(state): State<AppState>,
    ctx: SecurityContext,
) -> Result<Json<AccountResponse>, AccountError> {
    let user = state.accounts.get_account(&ctx).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, ctx, payload))]
pub async fn save_account(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<(), AccountError> {
    state.accounts.update_account(&ctx, payload).await?;
    Ok(())
}

#[instrument(skip(state, ctx, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Json(payload): Json<PasswordChangeRequest>,
) -> Result<(), AccountError> {
    state
        .accounts
        .change_password(&ctx, &payload.current_password, &payload.new_password)
        .await
}

/// Always succeeds, whether or not the mail belongs to an account.
#[instrument(skip(state, body))]
pub async fn request_password_reset(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let mail = String::from_utf8_lossy(&body);
    state.accounts.request_password_reset(&mail).await;
    StatusCode::OK
}

#[instrument(skip(state, payload))]
pub async fn finish_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<KeyAndPasswordRequest>,
) -> Result<(), AccountError> {
    state
        .accounts
        .complete_password_reset(&payload.new_password, &payload.key)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    fn register_body(login: &str, email: &str, password: &str) -> Json<RegisterRequest> {
        Json(RegisterRequest {
            login: login.into(),
            email: email.into(),
            password: password.into(),
            first_name: None,
            last_name: None,
            lang_key: None,
            image_url: None,
        })
    }

    #[tokio::test]
    async fn register_answers_created_or_bad_request() {
        let state = AppState::in_memory();
        let status = register(State(state.clone()), register_body("jdoe", "j@x.com", "longenough1"))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let err = register(State(state.clone()), register_body("jdoe", "z@x.com", "longenough1"))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = register(State(state), register_body("kim", "k@x.com", "short"))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_activation_key_is_server_error() {
        let state = AppState::in_memory();
        let err = activate(
            State(state),
            Query(ActivateQuery {
                key: "wrong".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn authenticate_reports_login_or_empty() {
        assert_eq!(is_authenticated(SecurityContext::anonymous()).await, "");
        let ctx = SecurityContext::authenticated("jdoe", vec![]);
        assert_eq!(is_authenticated(ctx).await, "jdoe");
    }

    #[tokio::test]
    async fn reset_init_is_ok_for_any_mail() {
        let state = AppState::in_memory();
        let status = request_password_reset(State(state), Bytes::from_static(b"nobody@x.com")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn reset_init_is_ok_for_a_body_that_is_not_utf8() {
        use axum::{body::Body, http::Request};
        use tower::ServiceExt;

        let app = crate::app::build_app(AppState::in_memory());
        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/account/reset-password/init")
                    .body(Body::from(vec![0xff, 0xfe, b'@']))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn full_login_flow_issues_verifiable_token() {
        let state = AppState::in_memory();
        let user = state
            .accounts
            .register(register_body("jdoe", "j@x.com", "longenough1").0)
            .await
            .unwrap();
        state
            .accounts
            .activate(user.state.activation_key().unwrap())
            .await
            .unwrap();

        let Json(resp) = authorize(
            State(state.clone()),
            Json(LoginRequest {
                username: "jdoe".into(),
                password: "longenough1".into(),
            }),
        )
        .await
        .unwrap();
        let claims = JwtKeys::from_ref(&state).verify(&resp.id_token).unwrap();
        assert_eq!(claims.sub, "jdoe");

        let ctx = SecurityContext::authenticated(claims.sub, claims.auth);
        let Json(account) = get_account(State(state.clone()), ctx).await.unwrap();
        assert_eq!(account.email, "j@x.com");
        assert!(account.activated);
    }

    #[tokio::test]
    async fn missing_current_user_is_server_error() {
        let state = AppState::in_memory();
        let err = get_account(State(state.clone()), SecurityContext::anonymous())
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = save_account(
            State(state),
            SecurityContext::anonymous(),
            Json(UpdateAccountRequest {
                email: "j@x.com".into(),
                first_name: None,
                last_name: None,
                lang_key: None,
                image_url: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
