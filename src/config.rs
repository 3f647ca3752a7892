use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::auth::MAX_SESSION_TTL_HOURS;
use crate::models::Locale;

const DEFAULT_SESSION_TTL_HOURS: i64 = 720;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub site_url: String,
    pub locale: Locale,
    pub session_ttl_hours: i64,
    pub poll_interval: Duration,
}

impl Config {
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("SOUQ_DB")
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);
        let site_url = lookup("SOUQ_SITE_URL")
            .unwrap_or_else(|| "https://souq.example".to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            db_path,
            site_url,
            locale: try_load(&lookup, "SOUQ_LOCALE", Locale::Ar),
            session_ttl_hours: session_ttl_hours(&lookup),
            poll_interval: Duration::from_millis(try_load(&lookup, "SOUQ_POLL_INTERVAL_MS", 2000)),
        }
    }
}

fn default_db_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "souq") {
        proj_dirs.data_dir().join("souq.db")
    } else {
        PathBuf::from("souq.db")
    }
}

fn session_ttl_hours(lookup: &impl Fn(&str) -> Option<String>) -> i64 {
    let hours = try_load(lookup, "SOUQ_SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS);
    if (1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
        return hours;
    }
    warn!(
        "SOUQ_SESSION_TTL_HOURS must be between 1 and {MAX_SESSION_TTL_HOURS}, \
         using default {DEFAULT_SESSION_TTL_HOURS}"
    );
    DEFAULT_SESSION_TTL_HOURS
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.parse() {
        Ok(value) => {
            info!("{key} set to {value:?}");
            value
        }
        Err(e) => {
            warn!("Invalid {key} value '{raw}': {e}, using default {default:?}");
            default
        }
    }
}
