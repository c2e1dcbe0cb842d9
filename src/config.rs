use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub stream_poll_interval: Duration,
    pub lock_timeout: Duration,
    pub email_from: String,
    pub email_queue_size: usize,
    pub page_size: usize,
    pub max_page_size: usize,
    pub seed_users_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            stream_poll_interval: Duration::from_millis(2_000),
            lock_timeout: Duration::from_millis(5_000),
            email_from: "noreply@delivery.local".to_string(),
            email_queue_size: 256,
            page_size: 10,
            max_page_size: 100,
            seed_users_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let log_format = match env::var("LOG_FORMAT") {
            Ok(raw) if raw.eq_ignore_ascii_case("json") => LogFormat::Json,
            Ok(raw) if raw.eq_ignore_ascii_case("compact") => LogFormat::Compact,
            Ok(raw) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {raw}, expected compact or json"
                )));
            }
            Err(_) => defaults.log_format,
        };

        let page_size = parse_or_default("PAGE_SIZE", defaults.page_size)?;
        let max_page_size = parse_or_default("MAX_PAGE_SIZE", defaults.max_page_size)?;
        if page_size == 0 || page_size > max_page_size {
            return Err(AppError::Internal(format!(
                "invalid PAGE_SIZE: {page_size}, must be between 1 and MAX_PAGE_SIZE ({max_page_size})"
            )));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            stream_poll_interval: Duration::from_millis(parse_or_default(
                "STREAM_POLL_INTERVAL_MS",
                2_000u64,
            )?),
            lock_timeout: Duration::from_millis(parse_or_default("LOCK_TIMEOUT_MS", 5_000u64)?),
            email_from: env::var("EMAIL_FROM").unwrap_or(defaults.email_from),
            email_queue_size: parse_or_default("EMAIL_QUEUE_SIZE", defaults.email_queue_size)?,
            page_size,
            max_page_size,
            seed_users_path: env::var("SEED_USERS_PATH").ok().map(PathBuf::from),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_or_default, Config};

    #[test]
    fn defaults_keep_page_size_within_bounds() {
        let config = Config::default();

        assert!(config.page_size >= 1);
        assert!(config.page_size <= config.max_page_size);
    }

    #[test]
    fn parse_or_default_falls_back_when_unset() {
        let value: u16 = parse_or_default("DELIVERY_TRACKER_TEST_UNSET", 3000).unwrap();
        assert_eq!(value, 3000);
    }

    #[test]
    fn parse_or_default_names_the_bad_variable() {
        // SAFETY: the key is unique to this test.
        unsafe { std::env::set_var("DELIVERY_TRACKER_TEST_BAD_PORT", "not-a-port") };

        let err = parse_or_default::<u16>("DELIVERY_TRACKER_TEST_BAD_PORT", 3000).unwrap_err();

        assert!(err.to_string().contains("DELIVERY_TRACKER_TEST_BAD_PORT"));
    }
}
