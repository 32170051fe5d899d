use async_trait::async_trait;
use tracing::{debug, info};

use crate::{account::repo_types::User, config::MailConfig};

/// Outbound account mail.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send_activation_email(&self, user: &User) -> anyhow::Result<()>;
    async fn send_password_reset_mail(&self, user: &User) -> anyhow::Result<()>;
}

/// Renders the account mails and hands them to the log. Delivery is left to
/// whatever ships the logs.
pub struct LogMailer {
    config: MailConfig,
}

impl LogMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    pub fn activation_link(&self, key: &str) -> String {
        format!("{}/account/activate?key={}", self.config.base_url, key)
    }

    pub fn reset_link(&self, key: &str) -> String {
        format!("{}/account/reset/finish?key={}", self.config.base_url, key)
    }
}

#[async_trait]
impl MailSender for LogMailer {
    async fn send_activation_email(&self, user: &User) -> anyhow::Result<()> {
        let key = user
            .state
            .activation_key()
            .ok_or_else(|| anyhow::anyhow!("user {} has no activation key", user.login))?;
        info!(from = %self.config.from, to = %user.email, login = %user.login, "activation email");
        debug!(link = %self.activation_link(key), "activation email link");
        Ok(())
    }

    async fn send_password_reset_mail(&self, user: &User) -> anyhow::Result<()> {
        let reset = user
            .state
            .reset()
            .ok_or_else(|| anyhow::anyhow!("user {} has no reset key", user.login))?;
        info!(from = %self.config.from, to = %user.email, login = %user.login, "password reset email");
        debug!(link = %self.reset_link(&reset.key), "password reset email link");
        Ok(())
    }
}

#[cfg(test)]
pub use recording::{RecordingMailer, SentMail};

#[cfg(test)]
mod recording {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::MailSender;
    use crate::account::repo_types::User;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SentMail {
        Activation { to: String, key: String },
        Reset { to: String, key: String },
    }

    /// Keeps every mail in memory; can be told to fail.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<SentMail>>,
        pub fail: bool,
    }

    impl RecordingMailer {
        pub fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn sent(&self) -> Vec<SentMail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MailSender for RecordingMailer {
        async fn send_activation_email(&self, user: &User) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("smtp down");
            }
            self.sent.lock().unwrap().push(SentMail::Activation {
                to: user.email.clone(),
                key: user.state.activation_key().unwrap_or_default().to_string(),
            });
            Ok(())
        }

        async fn send_password_reset_mail(&self, user: &User) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("smtp down");
            }
            self.sent.lock().unwrap().push(SentMail::Reset {
                to: user.email.clone(),
                key: user.state.reset().map(|r| r.key.clone()).unwrap_or_default(),
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_carry_the_key() {
        let mailer = LogMailer::new(MailConfig {
            from: "noreply@uni.ro".into(),
            base_url: "https://licenta.uni.ro".into(),
        });
        assert_eq!(
            mailer.activation_link("abc"),
            "https://licenta.uni.ro/account/activate?key=abc"
        );
        assert_eq!(
            mailer.reset_link("xyz"),
            "https://licenta.uni.ro/account/reset/finish?key=xyz"
        );
    }
}
