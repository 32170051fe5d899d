use std::{convert::Infallible, time::Duration};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{
    account::repo_types::{Authority, User},
    config::JwtConfig,
    state::AppState,
};

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,           // login
    pub auth: Vec<Authority>,  // granted authorities
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn sign(&self, user: &User) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user.login.clone(),
            auth: user.authorities.clone(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(login = %user.login, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(login = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub login: String,
    pub authorities: Vec<Authority>,
}

impl Principal {
    pub fn has_any_authority(&self, wanted: &[Authority]) -> bool {
        self.authorities.iter().any(|a| wanted.contains(a))
    }
}

/// Who is making the current request. Handed explicitly to every account
/// operation that acts on behalf of the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityContext {
    principal: Option<Principal>,
}

impl SecurityContext {
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    pub fn authenticated(login: impl Into<String>, authorities: Vec<Authority>) -> Self {
        Self {
            principal: Some(Principal {
                login: login.into(),
                authorities,
            }),
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn current_login(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.login.as_str())
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?;
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
}

/// Never rejects: a missing or invalid token yields an anonymous context.
#[async_trait]
impl<S> FromRequestParts<S> for SecurityContext
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(SecurityContext::anonymous());
        };
        match JwtKeys::from_ref(state).verify(token) {
            Ok(claims) => Ok(SecurityContext::authenticated(claims.sub, claims.auth)),
            Err(e) => {
                warn!(error = %e, "invalid or expired token");
                Ok(SecurityContext::anonymous())
            }
        }
    }
}

/// Requires an authenticated caller.
pub struct AuthUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing Authorization header".to_string(),
        ))?;

        let claims = match JwtKeys::from_ref(state).verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ));
            }
        };

        Ok(AuthUser(Principal {
            login: claims.sub,
            authorities: claims.auth,
        }))
    }
}

impl AuthUser {
    pub fn require_any(&self, wanted: &[Authority]) -> Result<(), (StatusCode, String)> {
        if self.0.has_any_authority(wanted) {
            Ok(())
        } else {
            warn!(login = %self.0.login, "access denied");
            Err((StatusCode::FORBIDDEN, "Access is denied".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::repo_types::AccountState;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
        })
    }

    fn user(login: &str, authorities: Vec<Authority>) -> User {
        User {
            id: 1,
            login: login.into(),
            email: format!("{}@x.com", login),
            password_hash: String::new(),
            first_name: None,
            last_name: None,
            lang_key: None,
            image_url: None,
            authorities,
            state: AccountState::Active { reset: None },
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn sign_and_verify_carries_login_and_authorities() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let token = keys
            .sign(&user("jdoe", vec![Authority::User, Authority::Student]))
            .expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, "jdoe");
        assert_eq!(claims.auth, vec![Authority::User, Authority::Student]);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_keys = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good_keys.sign(&user("jdoe", vec![])).expect("sign");
        assert!(bad_keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_foreign_secret() {
        let a = make_keys("secret-a", "iss", "aud");
        let b = make_keys("secret-b", "iss", "aud");
        let token = a.sign(&user("jdoe", vec![])).expect("sign");
        assert!(b.verify(&token).is_err());
    }

    #[test]
    fn security_context_exposes_login() {
        assert_eq!(SecurityContext::anonymous().current_login(), None);
        let ctx = SecurityContext::authenticated("jdoe", vec![Authority::Admin]);
        assert_eq!(ctx.current_login(), Some("jdoe"));
        assert!(ctx
            .principal()
            .map(|p| p.has_any_authority(&[Authority::Admin, Authority::Student]))
            .unwrap_or(false));
    }
}
