use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that should never reach production.
pub const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub outbound_queue: usize,
    pub history_limit: u32,
    pub heartbeat: Duration,
    pub error_acks: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |keys: &[&'static str]| first_set(&lookup, keys);

        let host = get(&["LANCHAT_HOST"]).map_or_else(|| "0.0.0.0".to_string(), |(_, v)| v);
        let port = parse_or(get(&["LANCHAT_PORT", "PORT"]), 8081u16)?;
        let db_path = get(&["LANCHAT_DB_PATH"])
            .map_or_else(|| PathBuf::from("data/chat.db"), |(_, v)| PathBuf::from(v));
        let jwt_secret = get(&["LANCHAT_JWT_SECRET", "MESSAGING_JWT_SECRET"])
            .map_or_else(|| "dev-secret-change-me".to_string(), |(_, v)| v);
        let outbound_queue = parse_or(get(&["LANCHAT_OUTBOUND_QUEUE"]), 256usize)?;
        let history_limit = parse_or(get(&["LANCHAT_HISTORY_LIMIT"]), 100u32)?;
        let heartbeat_secs = parse_or(get(&["LANCHAT_HEARTBEAT_SECS"]), 15u64)?;
        let error_acks = match get(&["LANCHAT_ERROR_ACKS"]) {
            None => false,
            Some((key, v)) => parse_bool(&v).with_context(|| format!("invalid {key}"))?,
        };

        if outbound_queue == 0 {
            bail!("LANCHAT_OUTBOUND_QUEUE must be greater than zero");
        }
        if history_limit == 0 {
            bail!("LANCHAT_HISTORY_LIMIT must be greater than zero");
        }
        if heartbeat_secs == 0 {
            bail!("LANCHAT_HEARTBEAT_SECS must be greater than zero");
        }

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            outbound_queue,
            history_limit,
            heartbeat: Duration::from_secs(heartbeat_secs),
            error_acks,
        })
    }

    pub fn has_placeholder_secret(&self) -> bool {
        PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}

/// First of `keys` with a non-blank value, paired with the key that held it.
fn first_set(
    lookup: &impl Fn(&str) -> Option<String>,
    keys: &[&'static str],
) -> Option<(&'static str, String)> {
    keys.iter()
        .find_map(|&k| lookup(k).filter(|v| !v.trim().is_empty()).map(|v| (k, v)))
}

fn parse_or<T>(value: Option<(&str, String)>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        None => Ok(default),
        Some((key, v)) => v
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {v:?}")),
    }
}

fn parse_bool(v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("not a boolean: {other:?}"),
    }
}
