use std::path::PathBuf;
use std::str::FromStr;

use jsonwebtoken::Algorithm;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("JWT_SECRET must be at least {} characters long", MIN_SECRET_LEN)]
    WeakSecret,
    #[error("unsupported JWT_ALGORITHM '{0}' (expected HS256, HS384 or HS512)")]
    Algorithm(String),
    #[error("{name} must be a positive integer, got '{value}'")]
    Invalid { name: &'static str, value: String },
}

pub const MIN_SECRET_LEN: usize = 32;

/// Settings consumed by the token service, the gateway and the server.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    pub token_ttl_minutes: i64,
    pub rate_limit_per_minute: u64,
    pub bind_addr: String,
    pub data_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source, so tests never touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        let jwt_algorithm = parse_algorithm(&lookup("JWT_ALGORITHM").unwrap_or_else(|| "HS256".into()))?;
        let token_ttl_minutes = positive(&lookup, "ACCESS_TOKEN_EXPIRE_MINUTES", 60)? as i64;
        let rate_limit_per_minute = positive(&lookup, "RATE_LIMIT_PER_MINUTE", 60)?;
        Ok(Self {
            jwt_secret,
            jwt_algorithm,
            token_ttl_minutes,
            rate_limit_per_minute,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            data_dir: lookup("CATALOG_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
        })
    }
}

/// Only the shared-secret HMAC family makes sense with a single secret.
pub fn parse_algorithm(raw: &str) -> Result<Algorithm, ConfigError> {
    match Algorithm::from_str(raw.trim()) {
        Ok(alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)) => Ok(alg),
        _ => Err(ConfigError::Algorithm(raw.to_string())),
    }
}

fn positive<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(v) => match v.trim().parse::<u64>() {
            Ok(n) if n > 0 && n <= i64::MAX as u64 / 60 => Ok(n),
            _ => Err(ConfigError::Invalid { name, value: v }),
        },
    }
}
