use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match lookup("HELPMATE_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("HELPMATE_PORT is not a valid port: {raw}"))?,
            None => 3000,
        };

        let jwt_secret = lookup("HELPMATE_JWT_SECRET").unwrap_or_else(|| {
            warn!("HELPMATE_JWT_SECRET not set, using the development secret");
            DEFAULT_JWT_SECRET.into()
        });

        Ok(Self {
            host: lookup("HELPMATE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: lookup("HELPMATE_DB_PATH")
                .unwrap_or_else(|| "helpmate.db".into())
                .into(),
            jwt_secret,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
