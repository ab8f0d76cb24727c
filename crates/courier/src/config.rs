//! Startup settings read from the environment.

use anyhow::{Context as _, Result, bail};
use courier_core::UserId;
use std::collections::HashSet;
use std::path::PathBuf;

const DEFAULT_API_URL: &str = "https://api.telegram.org";
const DEFAULT_LOG_FILE: &str = "courier.log";

/// Everything the binary needs to start.
#[derive(Clone)]
pub struct Settings {
    /// Telegram bot token.
    pub bot_token: String,
    /// Users allowed to run admin commands.
    pub admin_ids: HashSet<UserId>,
    /// Fallback encryption key for a fresh store.
    pub encryption_key: Option<String>,
    /// `SQLite` database file.
    pub database_path: PathBuf,
    /// Log file, also served by `/logs`.
    pub log_file: PathBuf,
    /// Bot API base URL.
    pub api_url: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("admin_ids", &self.admin_ids)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "<redacted>"))
            .field("database_path", &self.database_path)
            .field("log_file", &self.log_file)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Reads settings from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `BOT_TOKEN` is missing or a value is malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, which returns a variable's value.
    ///
    /// # Errors
    ///
    /// Returns an error if `BOT_TOKEN` is missing or a value is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let Some(bot_token) = get("BOT_TOKEN") else {
            bail!("BOT_TOKEN is not set");
        };

        let admin_ids = get("ADMIN_IDS")
            .map(|raw| parse_admin_ids(&raw))
            .transpose()?
            .unwrap_or_default();

        let database_path = get("DATABASE_PATH").map_or_else(default_database_path, PathBuf::from);
        let log_file = get("LOG_FILE").map_or_else(|| PathBuf::from(DEFAULT_LOG_FILE), PathBuf::from);

        let api_url = get("TELEGRAM_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            bail!("TELEGRAM_API_URL must be an http(s) URL, got {api_url:?}");
        }

        Ok(Self {
            bot_token: bot_token.trim().to_string(),
            admin_ids,
            encryption_key: get("ENCRYPTION_KEY"),
            database_path,
            log_file,
            api_url,
        })
    }
}

fn parse_admin_ids(raw: &str) -> Result<HashSet<UserId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<i64>()
                .map(UserId)
                .with_context(|| format!("ADMIN_IDS contains a non-numeric id: {id:?}"))
        })
        .collect()
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("courier")
        .join("courier.db")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let s = settings(&[("BOT_TOKEN", "123:abc")]).unwrap();
        assert_eq!(s.bot_token, "123:abc");
        assert!(s.admin_ids.is_empty());
        assert_eq!(s.encryption_key, None);
        assert_eq!(s.log_file, PathBuf::from("courier.log"));
        assert!(s.database_path.ends_with("courier/courier.db"));
        assert_eq!(s.api_url, "https://api.telegram.org");
    }

    #[test]
    fn token_is_required() {
        assert!(settings(&[]).is_err());
        assert!(settings(&[("BOT_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn admin_ids_parse() {
        let s = settings(&[("BOT_TOKEN", "t"), ("ADMIN_IDS", "1, 22,,333")]).unwrap();
        let expected: HashSet<UserId> = [UserId(1), UserId(22), UserId(333)].into_iter().collect();
        assert_eq!(s.admin_ids, expected);
        assert!(settings(&[("BOT_TOKEN", "t"), ("ADMIN_IDS", "1,abc")]).is_err());
    }

    #[test]
    fn overrides() {
        let s = settings(&[
            ("BOT_TOKEN", "t"),
            ("DATABASE_PATH", "/tmp/c.db"),
            ("LOG_FILE", "/var/log/courier.log"),
            ("TELEGRAM_API_URL", "http://localhost:8081/"),
            ("ENCRYPTION_KEY", "key"),
        ])
        .unwrap();
        assert_eq!(s.database_path, PathBuf::from("/tmp/c.db"));
        assert_eq!(s.log_file, PathBuf::from("/var/log/courier.log"));
        assert_eq!(s.api_url, "http://localhost:8081");
        assert_eq!(s.encryption_key.as_deref(), Some("key"));
        assert!(!format!("{s:?}").contains("key\""));
    }

    #[test]
    fn api_url_must_be_http() {
        assert!(settings(&[("BOT_TOKEN", "t"), ("TELEGRAM_API_URL", "ftp://x")]).is_err());
    }
}
