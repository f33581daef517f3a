use std::fmt;

use crate::adapters::husqvarna::{DEFAULT_IM_URL, DEFAULT_TRACK_URL, HusqvarnaEndpoints};
use crate::app::AppError;

pub const MIN_SCAN_INTERVAL_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppConfig {
    pub username: String,
    pub password: String,
    pub scan_interval_secs: u64,
    pub http_bind: String,
    pub request_timeout_ms: u64,
    pub im_url: String,
    pub track_url: String,
    pub debug_file: Option<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("scan_interval_secs", &self.scan_interval_secs)
            .field("http_bind", &self.http_bind)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("im_url", &self.im_url)
            .field("track_url", &self.track_url)
            .field("debug_file", &self.debug_file)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        // A missing .env file is fine; real deployments set the environment directly.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = required(&lookup, "AUTOMOWER_USERNAME")?;
        let password = lookup("AUTOMOWER_PASSWORD")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::config("AUTOMOWER_PASSWORD is required"))?;

        let scan_interval_secs = parse_or_default(&lookup, "SCAN_INTERVAL_SECS", 30_u64)?;
        if scan_interval_secs == 0 {
            return Err(AppError::config(
                "SCAN_INTERVAL_SECS must be a positive integer",
            ));
        }

        let request_timeout_ms = parse_or_default(&lookup, "REQUEST_TIMEOUT_MS", 10_000_u64)?;
        if request_timeout_ms == 0 {
            return Err(AppError::config(
                "REQUEST_TIMEOUT_MS must be a positive integer",
            ));
        }

        Ok(Self {
            username,
            password,
            scan_interval_secs: scan_interval_secs.max(MIN_SCAN_INTERVAL_SECS),
            http_bind: optional(&lookup, "HTTP_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            request_timeout_ms,
            im_url: optional(&lookup, "HUSQVARNA_IM_URL")
                .unwrap_or_else(|| DEFAULT_IM_URL.to_string()),
            track_url: optional(&lookup, "HUSQVARNA_TRACK_URL")
                .unwrap_or_else(|| DEFAULT_TRACK_URL.to_string()),
            debug_file: optional(&lookup, "MOWER_DEBUG_FILE"),
        })
    }

    pub fn endpoints(&self) -> HusqvarnaEndpoints {
        HusqvarnaEndpoints {
            im_url: self.im_url.clone(),
            track_url: self.track_url.clone(),
        }
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or_else(|| AppError::config(format!("{key} is required")))
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;
    use crate::adapters::husqvarna::{DEFAULT_IM_URL, DEFAULT_TRACK_URL};

    fn credentials(key: &str) -> Option<String> {
        match key {
            "AUTOMOWER_USERNAME" => Some("user@example.com".to_string()),
            "AUTOMOWER_PASSWORD" => Some("hunter2".to_string()),
            _ => None,
        }
    }

    #[test]
    fn rejects_missing_username() {
        let result = AppConfig::from_lookup(|_| None);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: AUTOMOWER_USERNAME is required"
        );
    }

    #[test]
    fn rejects_missing_password() {
        let result = AppConfig::from_lookup(|key| match key {
            "AUTOMOWER_USERNAME" => Some("user@example.com".to_string()),
            _ => None,
        });

        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: AUTOMOWER_PASSWORD is required"
        );
    }

    #[test]
    fn applies_defaults_for_optional_fields() {
        let result = AppConfig::from_lookup(credentials).expect("config should be valid");

        assert_eq!(result.username, "user@example.com");
        assert_eq!(result.password, "hunter2");
        assert_eq!(result.scan_interval_secs, 30);
        assert_eq!(result.http_bind, "0.0.0.0:8080");
        assert_eq!(result.request_timeout_ms, 10_000);
        assert_eq!(result.im_url, DEFAULT_IM_URL);
        assert_eq!(result.track_url, DEFAULT_TRACK_URL);
        assert_eq!(result.debug_file, None);
    }

    #[test]
    fn clamps_scan_interval_to_minimum() {
        let result = AppConfig::from_lookup(|key| match key {
            "SCAN_INTERVAL_SECS" => Some("5".to_string()),
            other => credentials(other),
        })
        .expect("config should be valid");

        assert_eq!(result.scan_interval_secs, 30);
    }

    #[test]
    fn keeps_longer_scan_interval() {
        let result = AppConfig::from_lookup(|key| match key {
            "SCAN_INTERVAL_SECS" => Some(" 120 ".to_string()),
            other => credentials(other),
        })
        .expect("config should be valid");

        assert_eq!(result.scan_interval_secs, 120);
    }

    #[test]
    fn rejects_zero_scan_interval() {
        let result = AppConfig::from_lookup(|key| match key {
            "SCAN_INTERVAL_SECS" => Some("0".to_string()),
            other => credentials(other),
        });

        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: SCAN_INTERVAL_SECS must be a positive integer"
        );
    }

    #[test]
    fn rejects_invalid_numeric_values() {
        let result = AppConfig::from_lookup(|key| match key {
            "SCAN_INTERVAL_SECS" => Some("-30".to_string()),
            other => credentials(other),
        });

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: SCAN_INTERVAL_SECS must be a valid number"
        );
    }

    #[test]
    fn debug_output_redacts_password() {
        let result = AppConfig::from_lookup(credentials).expect("config should be valid");

        let rendered = format!("{result:?}");

        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
