use anyhow::{Context, Result};
use chrono::Duration;
use std::path::PathBuf;

/// Static administrator allow-list, parsed once from `KUDO_ADMIN_IDS`.
/// Entries that are not integers are silently skipped.
#[derive(Debug, Clone, Default)]
pub struct AdminList(Vec<i64>);

impl AdminList {
    pub fn from_csv(raw: &str) -> Self {
        Self(
            raw.split(',')
                .filter_map(|part| part.trim().parse().ok())
                .collect(),
        )
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.0.contains(&user_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Process-wide configuration, built once at startup and shared immutably.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token.
    pub bot_token: String,
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Bind address for the verification endpoint.
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL used to build verification links.
    pub public_base_url: String,
    /// Action API URL template with `{region}` and `{uid}` placeholders.
    pub like_api_url: String,
    /// Link-shortener endpoint; keyless deployments skip shortening.
    pub shortener_url: String,
    pub shortener_api_key: Option<String>,
    /// "How to verify" link shown under the verification prompt.
    pub help_url: Option<String>,
    /// VIP purchase link shown in the verification prompt.
    pub vip_url: Option<String>,
    pub admins: AdminList,
    /// Requests a non-privileged user may make per reset window.
    pub daily_request_limit: i64,
    /// Window after which a user's quota refreshes.
    pub reset_window: Duration,
    /// Verification-link lifetime.
    pub link_ttl: Duration,
    /// Reject clicks on expired codes. Off restores the legacy behavior
    /// where a stale link still counts if the code was never used.
    pub enforce_link_expiry: bool,
    /// Job-processor polling interval.
    pub poll_interval: std::time::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            bot_token: std::env::var("KUDO_BOT_TOKEN").context("KUDO_BOT_TOKEN not set")?,
            db_path: PathBuf::from(var_or("KUDO_DB_PATH", "kudo.db")),
            host: var_or("KUDO_HOST", &defaults.host),
            port: parse_var("KUDO_PORT", defaults.port)?,
            public_base_url: var_or("KUDO_PUBLIC_BASE_URL", &defaults.public_base_url),
            like_api_url: std::env::var("KUDO_LIKE_API_URL")
                .context("KUDO_LIKE_API_URL not set")?,
            shortener_url: var_or("KUDO_SHORTENER_URL", &defaults.shortener_url),
            shortener_api_key: std::env::var("KUDO_SHORTENER_API_KEY").ok(),
            help_url: std::env::var("KUDO_HELP_URL").ok(),
            vip_url: std::env::var("KUDO_VIP_URL").ok(),
            admins: AdminList::from_csv(&var_or("KUDO_ADMIN_IDS", "")),
            daily_request_limit: parse_var(
                "KUDO_DAILY_REQUEST_LIMIT",
                defaults.daily_request_limit,
            )?,
            reset_window: Duration::hours(parse_var(
                "KUDO_RESET_HOURS",
                defaults.reset_window.num_hours(),
            )?),
            link_ttl: Duration::minutes(parse_var(
                "KUDO_LINK_TTL_MINUTES",
                defaults.link_ttl.num_minutes(),
            )?),
            enforce_link_expiry: parse_var(
                "KUDO_ENFORCE_LINK_EXPIRY",
                defaults.enforce_link_expiry,
            )?,
            poll_interval: std::time::Duration::from_secs(parse_var(
                "KUDO_POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )?),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            db_path: PathBuf::from("kudo.db"),
            host: "0.0.0.0".into(),
            port: 5000,
            public_base_url: "http://localhost:5000".into(),
            like_api_url: String::new(),
            shortener_url: "https://shortner.in/api".into(),
            shortener_api_key: None,
            help_url: None,
            vip_url: None,
            admins: AdminList::default(),
            daily_request_limit: 1,
            reset_window: Duration::hours(20),
            link_ttl: Duration::minutes(10),
            enforce_link_expiry: true,
            poll_interval: std::time::Duration::from_secs(5),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Set-but-malformed values are a startup error, not a silent default.
fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid {}: {}", key, raw)),
        Err(_) => Ok(default),
    }
}
