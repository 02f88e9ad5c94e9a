use std::env;

use crate::error::DispatchError;

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
    pub notification_queue_size: usize,
    pub tracking_prefix: String,
    pub tracking_max_attempts: u32,
    pub tracking_min_length: usize,
    /// Send `order_unassigned` to the driver who loses an order on re-assignment.
    pub notify_previous_driver: bool,
    pub bootstrap_admin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            notification_queue_size: 1024,
            tracking_prefix: "LIV-".to_string(),
            tracking_max_attempts: 10,
            tracking_min_length: 5,
            notify_previous_driver: false,
            bootstrap_admin: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DispatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("compact") => LogFormat::Compact,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(DispatchError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact/json"
                )));
            }
        };

        let config = Self {
            http_port: parse_or_default(&lookup, "HTTP_PORT", defaults.http_port)?,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            notification_queue_size: parse_or_default(
                &lookup,
                "NOTIFICATION_QUEUE_SIZE",
                defaults.notification_queue_size,
            )?,
            tracking_prefix: lookup("TRACKING_PREFIX").unwrap_or(defaults.tracking_prefix),
            tracking_max_attempts: parse_or_default(
                &lookup,
                "TRACKING_MAX_ATTEMPTS",
                defaults.tracking_max_attempts,
            )?,
            tracking_min_length: parse_or_default(
                &lookup,
                "TRACKING_MIN_LENGTH",
                defaults.tracking_min_length,
            )?,
            notify_previous_driver: parse_or_default(
                &lookup,
                "NOTIFY_PREVIOUS_DRIVER",
                defaults.notify_previous_driver,
            )?,
            bootstrap_admin: lookup("BOOTSTRAP_ADMIN").filter(|name| !name.trim().is_empty()),
        };

        if config.notification_queue_size == 0 {
            return Err(DispatchError::Internal(
                "NOTIFICATION_QUEUE_SIZE must be > 0".to_string(),
            ));
        }
        if config.tracking_max_attempts == 0 {
            return Err(DispatchError::Internal(
                "TRACKING_MAX_ATTEMPTS must be > 0".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, DispatchError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|err| DispatchError::Internal(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{Config, LogFormat};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.tracking_prefix, "LIV-");
        assert_eq!(config.tracking_max_attempts, 10);
        assert_eq!(config.log_format, LogFormat::Compact);
        assert!(!config.notify_previous_driver);
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("HTTP_PORT", "8080"),
            ("LOG_FORMAT", "json"),
            ("NOTIFY_PREVIOUS_DRIVER", "true"),
            ("BOOTSTRAP_ADMIN", "root"),
        ]))
        .unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.notify_previous_driver);
        assert_eq!(config.bootstrap_admin.as_deref(), Some("root"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("HTTP_PORT", "eighty")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TRACKING_MAX_ATTEMPTS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).is_err());
    }
}
