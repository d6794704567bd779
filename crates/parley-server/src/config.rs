use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use parley_gateway::dispatcher::DEFAULT_CAPACITY;

/// Secrets that ship in sample env files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "changeme", "secret", ""];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub broadcast_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("PARLEY_JWT_SECRET").context("PARLEY_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("PARLEY_JWT_SECRET is a placeholder, set a real secret");
        }

        let host = get("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("PARLEY_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PARLEY_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let db_path = PathBuf::from(get("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into()));

        let broadcast_capacity = match get("PARLEY_BROADCAST_CAPACITY") {
            Some(raw) => raw
                .parse()
                .context("PARLEY_BROADCAST_CAPACITY must be a positive integer")?,
            None => DEFAULT_CAPACITY,
        };
        if broadcast_capacity == 0 {
            bail!("PARLEY_BROADCAST_CAPACITY must be a positive integer");
        }

        Ok(Self {
            addr,
            db_path,
            jwt_secret,
            broadcast_capacity,
        })
    }
}
