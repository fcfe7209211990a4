use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use hustle_api::generator::GeneratorConfig;

/// Secrets that ship in example env files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
];

const DEFAULT_ORIGINS: &str = "http://localhost:3000,http://localhost:3001";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub allowed_origins: AllowedOrigins,
    pub generator: GeneratorConfig,
    pub reconcile_on_start: bool,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = var("HUSTLE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("HUSTLE_JWT_SECRET is unset or still a placeholder; set it in your .env file and restart");
        }

        let host = get("HUSTLE_HOST", "0.0.0.0");
        let port: u16 = get("HUSTLE_PORT", "5000")
            .parse()
            .context("HUSTLE_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let origins = get("HUSTLE_ALLOWED_ORIGINS", DEFAULT_ORIGINS);
        let allowed_origins = if origins.trim() == "*" {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect(),
            )
        };

        let timeout_secs: u64 = get("HUSTLE_GENERATOR_TIMEOUT_SECS", "10")
            .parse()
            .context("HUSTLE_GENERATOR_TIMEOUT_SECS must be a whole number of seconds")?;
        let generator = GeneratorConfig {
            api_key: var("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()),
            model: get("HUSTLE_GEMINI_MODEL", "gemini-1.5-flash"),
            timeout: Duration::from_secs(timeout_secs),
        };

        let reconcile_on_start = parse_bool(&get("HUSTLE_RECONCILE_ON_START", "true"))
            .context("HUSTLE_RECONCILE_ON_START must be true or false")?;

        let log_format = match get("HUSTLE_LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            jwt_secret,
            db_path: get("HUSTLE_DB_PATH", "memehustle.db").into(),
            addr,
            allowed_origins,
            generator,
            reconcile_on_start,
            log_format,
        })
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("not a boolean: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_with_secret() {
        let config = Config::from_lookup(lookup(&[("HUSTLE_JWT_SECRET", "a-real-secret")])).unwrap();
        assert_eq!(config.addr, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(config.db_path, PathBuf::from("memehustle.db"));
        assert_eq!(
            config.allowed_origins,
            AllowedOrigins::List(vec![
                "http://localhost:3000".into(),
                "http://localhost:3001".into()
            ])
        );
        assert_eq!(config.generator.api_key, None);
        assert_eq!(config.generator.model, "gemini-1.5-flash");
        assert_eq!(config.generator.timeout, Duration::from_secs(10));
        assert!(config.reconcile_on_start);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn missing_or_placeholder_secret_fails_fast() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("HUSTLE_JWT_SECRET", "your-secret-key")])).is_err());
        assert!(Config::from_lookup(lookup(&[("HUSTLE_JWT_SECRET", "  ")])).is_err());
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("HUSTLE_JWT_SECRET", "a-real-secret"),
            ("HUSTLE_HOST", "127.0.0.1"),
            ("HUSTLE_PORT", "8080"),
            ("HUSTLE_ALLOWED_ORIGINS", "*"),
            ("GEMINI_API_KEY", "abc"),
            ("HUSTLE_GENERATOR_TIMEOUT_SECS", "3"),
            ("HUSTLE_RECONCILE_ON_START", "off"),
            ("HUSTLE_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.allowed_origins, AllowedOrigins::Any);
        assert_eq!(config.generator.api_key.as_deref(), Some("abc"));
        assert_eq!(config.generator.timeout, Duration::from_secs(3));
        assert!(!config.reconcile_on_start);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn bad_port_is_an_error() {
        let result = Config::from_lookup(lookup(&[
            ("HUSTLE_JWT_SECRET", "a-real-secret"),
            ("HUSTLE_PORT", "eighty"),
        ]));
        assert!(result.is_err());
    }
}
