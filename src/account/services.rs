use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, info, warn};

use crate::{
    account::{
        dto::{RegisterRequest, UpdateAccountRequest},
        errors::AccountError,
        jwt::SecurityContext,
        keys::generate_key,
        mail::MailSender,
        password::{hash_password, password_length_ok, verify_password},
        repo::{ProfileUpdate, UserStore},
        repo_types::{AccountState, Authority, NewUser, PasswordReset, User},
    },
    config::AccountPolicy,
};

const LOGIN_MAX_LENGTH: usize = 50;
const EMAIL_MIN_LENGTH: usize = 5;
const EMAIL_MAX_LENGTH: usize = 254;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    (EMAIL_MIN_LENGTH..=EMAIL_MAX_LENGTH).contains(&email.len()) && EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_login(login: &str) -> bool {
    lazy_static! {
        static ref LOGIN_RE: Regex = Regex::new(r"^[_.@A-Za-z0-9-]+$").unwrap();
    }
    login.len() <= LOGIN_MAX_LENGTH && LOGIN_RE.is_match(login)
}

/// Registration, activation, credential and password-reset workflow.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn MailSender>,
    policy: AccountPolicy,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, mailer: Arc<dyn MailSender>, policy: AccountPolicy) -> Self {
        Self {
            users,
            mailer,
            policy,
        }
    }

    fn check_password(&self, password: &str) -> Result<(), AccountError> {
        if password_length_ok(
            password,
            self.policy.password_min_length,
            self.policy.password_max_length,
        ) {
            Ok(())
        } else {
            warn!("password length out of bounds");
            Err(AccountError::InvalidPassword)
        }
    }

    fn reset_cutoff(&self, now: OffsetDateTime) -> OffsetDateTime {
        now - TimeDuration::hours(self.policy.reset_key_ttl_hours)
    }

    /// Creates a pending account and mails its activation key.
    pub async fn register(&self, req: RegisterRequest) -> Result<User, AccountError> {
        self.check_password(&req.password)?;

        let login = req.login.trim().to_lowercase();
        if !is_valid_login(&login) {
            warn!(login = %login, "invalid login");
            return Err(AccountError::InvalidLogin);
        }
        let email = req.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AccountError::InvalidEmail);
        }

        let mut authorities = vec![Authority::User];
        if self.policy.admin_logins.contains(&login) {
            info!(login = %login, "granting admin authority to configured login");
            authorities.push(Authority::Admin);
        }

        let new_user = NewUser {
            login,
            email,
            password_hash: hash_password(&req.password)?,
            first_name: req.first_name,
            last_name: req.last_name,
            lang_key: req.lang_key,
            image_url: req.image_url,
            authorities,
            state: AccountState::PendingActivation {
                activation_key: generate_key(),
            },
        };

        let user = self.users.insert(new_user).await.map_err(|e| {
            warn!(error = %e, "registration rejected by store");
            AccountError::from(e)
        })?;
        info!(user_id = user.id, login = %user.login, "user registered");

        if let Err(e) = self.mailer.send_activation_email(&user).await {
            error!(error = %e, login = %user.login, "activation email failed");
        }
        Ok(user)
    }

    /// Consumes an activation key. The same key never works twice.
    pub async fn activate(&self, key: &str) -> Result<User, AccountError> {
        let user = self
            .users
            .activate(key)
            .await?
            .ok_or(AccountError::NoUserForActivationKey)?;
        info!(login = %user.login, "user activated");
        Ok(user)
    }

    /// Verifies login credentials; only active accounts may sign in.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<User, AccountError> {
        let user = match self.users.find_by_login(login.trim()).await? {
            Some(u) => u,
            None => {
                warn!(login = %login, "login unknown user");
                return Err(AccountError::BadCredentials);
            }
        };
        if !verify_password(password, &user.password_hash)? {
            warn!(login = %user.login, "login invalid password");
            return Err(AccountError::BadCredentials);
        }
        if !user.state.is_active() {
            warn!(login = %user.login, "login on pending account");
            return Err(AccountError::NotActivated);
        }
        info!(login = %user.login, "user logged in");
        Ok(user)
    }

    pub async fn find_by_login(&self, login: &str) -> Result<Option<User>, AccountError> {
        Ok(self.users.find_by_login(login).await?)
    }

    /// The caller's own account.
    pub async fn get_account(&self, ctx: &SecurityContext) -> Result<User, AccountError> {
        let Some(login) = ctx.current_login() else {
            return Err(AccountError::UserNotFound);
        };
        self.users
            .find_by_login(login)
            .await?
            .ok_or(AccountError::UserNotFound)
    }

    pub async fn update_account(
        &self,
        ctx: &SecurityContext,
        req: UpdateAccountRequest,
    ) -> Result<User, AccountError> {
        let login = ctx.current_login().ok_or(AccountError::NoCurrentUser)?;

        let email = req.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AccountError::InvalidEmail);
        }

        let Some(user) = self.users.find_by_login(login).await? else {
            // Report a foreign owner of the email first, as the caller could fix that.
            if let Some(owner) = self.users.find_by_email(&email).await? {
                if !owner.login.eq_ignore_ascii_case(login) {
                    return Err(AccountError::EmailAlreadyUsed);
                }
            }
            return Err(AccountError::UserNotFound);
        };

        let profile = ProfileUpdate {
            email,
            first_name: req.first_name,
            last_name: req.last_name,
            lang_key: req.lang_key,
            image_url: req.image_url,
        };
        let user = self
            .users
            .update_profile(user.id, &profile)
            .await?
            .ok_or(AccountError::UserNotFound)?;
        debug!(login = %user.login, "changed information for user");
        Ok(user)
    }

    pub async fn change_password(
        &self,
        ctx: &SecurityContext,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AccountError> {
        self.check_password(new_password)?;
        let login = ctx.current_login().ok_or(AccountError::NoCurrentUser)?;
        let user = self
            .users
            .find_by_login(login)
            .await?
            .ok_or(AccountError::UserNotFound)?;

        if !verify_password(current_password, &user.password_hash)? {
            warn!(login = %user.login, "change password with wrong current password");
            return Err(AccountError::InvalidPassword);
        }
        let hash = hash_password(new_password)?;
        self.users
            .set_password_hash(user.id, &hash)
            .await?
            .ok_or(AccountError::UserNotFound)?;
        debug!(login = %user.login, "changed password for user");
        Ok(())
    }

    /// Starts a password reset. Never reports whether the email is known.
    pub async fn request_password_reset(&self, email: &str) {
        let email = email.trim();
        let user = match self.users.find_by_email(email).await {
            Ok(Some(u)) if u.state.is_active() => u,
            Ok(_) => {
                warn!(email = %email, "password reset requested for non existing mail");
                return;
            }
            Err(e) => {
                error!(error = %e, "password reset lookup failed");
                return;
            }
        };

        let reset = PasswordReset {
            key: generate_key(),
            issued_at: OffsetDateTime::now_utc(),
        };
        let user = match self.users.set_reset(user.id, &reset).await {
            Ok(Some(u)) => u,
            Ok(None) => {
                warn!(login = %user.login, "account left the active state before reset");
                return;
            }
            Err(e) => {
                error!(error = %e, login = %user.login, "storing reset key failed");
                return;
            }
        };
        if let Err(e) = self.mailer.send_password_reset_mail(&user).await {
            error!(error = %e, login = %user.login, "password reset email failed");
        }
        info!(login = %user.login, "password reset requested");
    }

    /// Finishes a password reset with a key issued within the validity window.
    pub async fn complete_password_reset(
        &self,
        new_password: &str,
        key: &str,
    ) -> Result<(), AccountError> {
        self.check_password(new_password)?;

        let cutoff = self.reset_cutoff(OffsetDateTime::now_utc());
        let hash = hash_password(new_password)?;
        let user = self
            .users
            .consume_reset_key(key, cutoff, &hash)
            .await?
            .ok_or(AccountError::NoUserForResetKey)?;
        info!(login = %user.login, "password reset completed");
        Ok(())
    }
}
