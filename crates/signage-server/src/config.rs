use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::TimeDelta;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
];

/// Upper bound for the screenshot retention window (10 years).
const MAX_RETENTION_HOURS: u64 = 24 * 365 * 10;

/// Upper bound for the presence window (one day).
const MAX_ONLINE_WINDOW_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SIGNAGE_JWT_SECRET is unset or still a placeholder")]
    MissingSecret,

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub storage_dir: PathBuf,
    pub public_url: String,
    pub provision_token: Option<String>,
    pub online_window: TimeDelta,
    pub max_upload_bytes: u64,
    pub screenshot_retention_hours: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("SIGNAGE_JWT_SECRET").ok_or(ConfigError::MissingSecret)?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::MissingSecret);
        }

        let host = var("SIGNAGE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse(&var, "SIGNAGE_PORT", 3000)?;
        let addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: "SIGNAGE_HOST",
                value: host,
            })?;

        let public_url = var("SIGNAGE_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();
        let max_upload_mb: u64 = parse(&var, "SIGNAGE_MAX_UPLOAD_MB", 200)?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .filter(|bytes| *bytes > 0)
            .ok_or_else(|| invalid("SIGNAGE_MAX_UPLOAD_MB", max_upload_mb))?;

        let online_window_secs: i64 = parse(&var, "SIGNAGE_ONLINE_WINDOW_SECS", 20)?;
        let online_window = Some(online_window_secs)
            .filter(|secs| (1..=MAX_ONLINE_WINDOW_SECS).contains(secs))
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| invalid("SIGNAGE_ONLINE_WINDOW_SECS", online_window_secs))?;

        let screenshot_retention_hours: u64 = parse(&var, "SIGNAGE_SCREENSHOT_RETENTION_HOURS", 168)?;
        if !(1..=MAX_RETENTION_HOURS).contains(&screenshot_retention_hours) {
            return Err(invalid("SIGNAGE_SCREENSHOT_RETENTION_HOURS", screenshot_retention_hours));
        }

        Ok(Self {
            addr,
            db_path: var("SIGNAGE_DB_PATH").unwrap_or_else(|| "signage.db".into()).into(),
            jwt_secret,
            storage_dir: var("SIGNAGE_STORAGE_DIR").unwrap_or_else(|| "./media".into()).into(),
            public_url,
            provision_token: var("SIGNAGE_PROVISION_TOKEN"),
            online_window,
            max_upload_bytes,
            screenshot_retention_hours,
        })
    }
}

fn invalid(name: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
    }
}

fn parse<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let cfg = config(&[("SIGNAGE_JWT_SECRET", "s3cret-value")]).unwrap();
        assert_eq!(cfg.addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(cfg.db_path, PathBuf::from("signage.db"));
        assert_eq!(cfg.storage_dir, PathBuf::from("./media"));
        assert_eq!(cfg.public_url, "http://localhost:3000");
        assert_eq!(cfg.provision_token, None);
        assert_eq!(cfg.online_window, TimeDelta::seconds(20));
        assert_eq!(cfg.max_upload_bytes, 200 * 1024 * 1024);
        assert_eq!(cfg.screenshot_retention_hours, 168);
    }

    #[test]
    fn placeholder_and_missing_secrets_are_rejected() {
        assert!(matches!(config(&[]), Err(ConfigError::MissingSecret)));
        assert!(matches!(
            config(&[("SIGNAGE_JWT_SECRET", "dev-secret-change-me")]),
            Err(ConfigError::MissingSecret)
        ));
        assert!(matches!(
            config(&[("SIGNAGE_JWT_SECRET", "   ")]),
            Err(ConfigError::MissingSecret)
        ));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("SIGNAGE_JWT_SECRET", "s3cret-value"),
            ("SIGNAGE_HOST", "127.0.0.1"),
            ("SIGNAGE_PORT", "8080"),
            ("SIGNAGE_PUBLIC_URL", "https://signs.example.com/"),
            ("SIGNAGE_PROVISION_TOKEN", "factory"),
            ("SIGNAGE_MAX_UPLOAD_MB", "5"),
        ])
        .unwrap();
        assert_eq!(cfg.addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(cfg.public_url, "https://signs.example.com");
        assert_eq!(cfg.provision_token.as_deref(), Some("factory"));
        assert_eq!(cfg.max_upload_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn out_of_range_values_are_rejected_at_startup() {
        let cases = [
            ("SIGNAGE_SCREENSHOT_RETENTION_HOURS", "3000000000"),
            ("SIGNAGE_SCREENSHOT_RETENTION_HOURS", "0"),
            ("SIGNAGE_ONLINE_WINDOW_SECS", "9223372036854775807"),
            ("SIGNAGE_ONLINE_WINDOW_SECS", "-5"),
            ("SIGNAGE_ONLINE_WINDOW_SECS", "0"),
            ("SIGNAGE_MAX_UPLOAD_MB", "18446744073709551615"),
            ("SIGNAGE_MAX_UPLOAD_MB", "0"),
        ];
        for (name, value) in cases {
            let err = config(&[("SIGNAGE_JWT_SECRET", "s3cret-value"), (name, value)]).unwrap_err();
            assert_eq!(err.to_string(), format!("{} has an invalid value '{}'", name, value));
        }
    }

    #[test]
    fn upper_bounds_are_accepted() {
        let cfg = config(&[
            ("SIGNAGE_JWT_SECRET", "s3cret-value"),
            ("SIGNAGE_SCREENSHOT_RETENTION_HOURS", "87600"),
            ("SIGNAGE_ONLINE_WINDOW_SECS", "86400"),
        ])
        .unwrap();
        assert_eq!(cfg.screenshot_retention_hours, MAX_RETENTION_HOURS);
        assert_eq!(cfg.online_window, TimeDelta::days(1));
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = config(&[("SIGNAGE_JWT_SECRET", "s3cret-value"), ("SIGNAGE_PORT", "eighty")]).unwrap_err();
        assert_eq!(err.to_string(), "SIGNAGE_PORT has an invalid value 'eighty'");
    }
}
