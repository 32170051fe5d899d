use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::account::{
    repo::{ProfileUpdate, StoreError, UserStore},
    repo_types::{AccountState, NewUser, PasswordReset, User},
};

/// In-process user store. Uniqueness is checked and the write applied under a
/// single lock, which gives the same arbitration as the database indexes.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: Vec<User>,
}

impl Inner {
    fn conflict(&self, id: Option<i64>, login: &str, email: &str) -> Option<StoreError> {
        let others = self.users.iter().filter(|u| Some(u.id) != id);
        for u in others {
            if u.login.eq_ignore_ascii_case(login) {
                return Some(StoreError::LoginTaken);
            }
            if u.email.eq_ignore_ascii_case(email) {
                return Some(StoreError::EmailTaken);
            }
        }
        None
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users.iter().find(|u| pred(u)).cloned()
    }

    /// Applies `change` to the first matching user, all under the caller's lock.
    fn modify(&mut self, pred: impl Fn(&User) -> bool, change: impl FnOnce(&mut User)) -> Option<User> {
        let user = self.users.iter_mut().find(|u| pred(u))?;
        change(user);
        Some(user.clone())
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("user store lock poisoned")))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.lock()?;
        if let Some(err) = inner.conflict(None, &user.login, &user.email) {
            return Err(err);
        }
        inner.next_id += 1;
        let user = user.into_user(inner.next_id, OffsetDateTime::now_utc());
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.find(|u| u.login.eq_ignore_ascii_case(login)))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn activate(&self, key: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.modify(
            |u| u.state.activation_key() == Some(key),
            |u| u.state = AccountState::Active { reset: None },
        ))
    }

    async fn set_reset(&self, id: i64, reset: &PasswordReset) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.modify(
            |u| u.id == id && u.state.is_active(),
            |u| {
                u.state = AccountState::Active {
                    reset: Some(reset.clone()),
                }
            },
        ))
    }

    async fn consume_reset_key(
        &self,
        key: &str,
        issued_after: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.modify(
            |u| {
                u.state
                    .reset()
                    .is_some_and(|r| r.key == key && r.issued_at > issued_after)
            },
            |u| {
                u.password_hash = password_hash.to_string();
                u.state = AccountState::Active { reset: None };
            },
        ))
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()?
            .modify(|u| u.id == id, |u| u.password_hash = password_hash.to_string()))
    }

    async fn update_profile(&self, id: i64, profile: &ProfileUpdate) -> Result<Option<User>, StoreError> {
        let mut inner = self.lock()?;
        if inner
            .users
            .iter()
            .any(|u| u.id != id && u.email.eq_ignore_ascii_case(&profile.email))
        {
            return Err(StoreError::EmailTaken);
        }
        Ok(inner.modify(
            |u| u.id == id,
            |u| {
                u.email = profile.email.clone();
                u.first_name = profile.first_name.clone();
                u.last_name = profile.last_name.clone();
                u.lang_key = profile.lang_key.clone();
                u.image_url = profile.image_url.clone();
            },
        ))
    }
}
