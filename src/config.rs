use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => anyhow::bail!("unknown environment {other:?} (development|staging|production)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub dsn: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub max_idle_time: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: Environment,
    pub db: DbConfig,
    pub query_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let db = DbConfig {
            dsn: get("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_open_conns: parse_or(&get, "DB_MAX_OPEN_CONNS", 25)?,
            max_idle_conns: parse_or(&get, "DB_MAX_IDLE_CONNS", 25)?,
            max_idle_time: Duration::from_secs(parse_or(&get, "DB_MAX_IDLE_TIME_SECS", 15 * 60)?),
        };
        Ok(Self {
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "APP_PORT", 4000)?,
            env: parse_or(&get, "APP_ENV", Environment::Development)?,
            db,
            query_timeout: Duration::from_secs(parse_or(&get, "QUERY_TIMEOUT_SECS", 3)?),
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}")),
    }
}
