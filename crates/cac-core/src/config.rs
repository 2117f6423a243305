use std::{env, fs, path::Path, time::Duration};

use crate::{domain::ChatId, domain::UserId, errors::Error, Result};

const MAX_LISTING_LIMIT: u64 = 1_000;

/// Typed configuration for the console, read from the process environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    /// Operator channel for security alerts and failure notices.
    pub operator_chat_id: ChatId,
    pub telegram_safe_limit: usize,

    // Authorization
    pub super_admin_id: UserId,
    pub admin_ids: Vec<UserId>,

    // Storage
    pub mongodb_uri: String,
    pub mongodb_database: Option<String>,
    pub mongodb_connect_attempts: u32,
    pub mongodb_connect_backoff: Duration,
    pub mongodb_server_selection_timeout: Duration,

    // Behavior
    /// `None` disables the periodic refresh task.
    pub stats_refresh_interval: Option<Duration>,
    pub recent_keys_limit: usize,
    pub security_log_limit: usize,
    pub default_key_days: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            get(key).and_then(non_empty).ok_or_else(|| {
                Error::Config(format!("{key} environment variable is required"))
            })
        };

        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let operator_chat_id = ChatId(parse_i64("TELEGRAM_CHAT_ID", &required("TELEGRAM_CHAT_ID")?)?);
        let super_admin_id = UserId(parse_i64("SUPER_ADMIN_ID", &required("SUPER_ADMIN_ID")?)?);

        let mongodb_uri = required("MONGODB_URI")?;
        if !(mongodb_uri.starts_with("mongodb://") || mongodb_uri.starts_with("mongodb+srv://")) {
            return Err(Error::Config(
                "MONGODB_URI must start with mongodb:// or mongodb+srv://".to_string(),
            ));
        }
        let mongodb_database = get("MONGODB_DATABASE").and_then(non_empty);

        let mut admin_ids: Vec<UserId> = parse_csv_i64(get("TELEGRAM_ADMIN_IDS"))
            .into_iter()
            .map(UserId)
            .collect();
        if !admin_ids.contains(&super_admin_id) {
            admin_ids.push(super_admin_id);
        }

        let num = |key: &str| get(key).and_then(|s| s.trim().parse::<u64>().ok());

        let mongodb_connect_attempts =
            u32::try_from(num("MONGODB_CONNECT_ATTEMPTS").unwrap_or(5).clamp(1, 100)).unwrap_or(100);
        let mongodb_connect_backoff =
            Duration::from_millis(num("MONGODB_CONNECT_BACKOFF_MS").unwrap_or(500));
        let mongodb_server_selection_timeout =
            Duration::from_millis(num("MONGODB_SERVER_SELECTION_TIMEOUT_MS").unwrap_or(5000));

        let stats_refresh_interval = match num("STATS_REFRESH_INTERVAL_SECS").unwrap_or(60) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let listing_limit = |key: &str| {
            usize::try_from(num(key).unwrap_or(10).clamp(1, MAX_LISTING_LIMIT))
                .unwrap_or(10)
        };
        let recent_keys_limit = listing_limit("RECENT_KEYS_LIMIT");
        let security_log_limit = listing_limit("SECURITY_LOG_LIMIT");
        let default_key_days = num("DEFAULT_KEY_DAYS").unwrap_or(30).clamp(1, 36_500) as u32;
        let telegram_safe_limit = num("TELEGRAM_SAFE_LIMIT").unwrap_or(4000).clamp(256, 4096) as usize;

        Ok(Self {
            telegram_bot_token,
            operator_chat_id,
            telegram_safe_limit,
            super_admin_id,
            admin_ids,
            mongodb_uri,
            mongodb_database,
            mongodb_connect_attempts,
            mongodb_connect_backoff,
            mongodb_server_selection_timeout,
            stats_refresh_interval,
            recent_keys_limit,
            security_log_limit,
            default_key_days,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_i64(key: &str, v: &str) -> Result<i64> {
    v.trim()
        .parse::<i64>()
        .map_err(|_| Error::Config(format!("{key} must be a numeric Telegram id")))
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
