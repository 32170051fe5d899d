use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Password and key policy applied by the account workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountPolicy {
    pub password_min_length: usize,
    pub password_max_length: usize,
    pub reset_key_ttl_hours: i64,
    /// Logins granted `ROLE_ADMIN` when they register, lower-cased.
    #[serde(default)]
    pub admin_logins: Vec<String>,
}

impl Default for AccountPolicy {
    fn default() -> Self {
        Self {
            password_min_length: 4,
            password_max_length: 100,
            reset_key_ttl_hours: 24,
            admin_logins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub storage: StorageBackend,
    pub jwt: JwtConfig,
    pub account: AccountPolicy,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let storage = match std::env::var("APP_STORAGE")
            .unwrap_or_else(|_| "postgres".into())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => anyhow::bail!("unknown APP_STORAGE '{}'", other),
        };
        let database_url = match storage {
            StorageBackend::Postgres => std::env::var("DATABASE_URL")?,
            StorageBackend::Memory => std::env::var("DATABASE_URL").unwrap_or_default(),
        };
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "licenta".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "licenta-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(60 * 24),
        };
        let defaults = AccountPolicy::default();
        let account = AccountPolicy {
            password_min_length: env_parse("PASSWORD_MIN_LENGTH")
                .unwrap_or(defaults.password_min_length),
            password_max_length: env_parse("PASSWORD_MAX_LENGTH")
                .unwrap_or(defaults.password_max_length),
            reset_key_ttl_hours: env_parse("RESET_KEY_TTL_HOURS")
                .unwrap_or(defaults.reset_key_ttl_hours),
            admin_logins: std::env::var("ADMIN_LOGINS")
                .map(|v| parse_login_list(&v))
                .unwrap_or_default(),
        };
        anyhow::ensure!(
            account.password_min_length <= account.password_max_length,
            "PASSWORD_MIN_LENGTH must not exceed PASSWORD_MAX_LENGTH"
        );
        anyhow::ensure!(
            account.reset_key_ttl_hours > 0,
            "RESET_KEY_TTL_HOURS must be positive"
        );
        let mail = MailConfig {
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "licenta@localhost".into()),
            base_url: std::env::var("MAIL_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".into()),
        };
        Ok(Self {
            database_url,
            storage,
            jwt,
            account,
            mail,
        })
    }

    /// Configuration for the in-memory backend, used by tests.
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            storage: StorageBackend::Memory,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            account: AccountPolicy {
                password_min_length: 8,
                password_max_length: 100,
                reset_key_ttl_hours: 24,
                admin_logins: Vec::new(),
            },
            mail: MailConfig {
                from: "test@localhost".into(),
                base_url: "http://localhost".into(),
            },
        }
    }
}

fn parse_login_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
