use std::time::Duration;

use anyhow::{anyhow, Context};

use crate::retention::{DEFAULT_HORIZON, DEFAULT_INTERVAL};

/// Origin the bundled frontend is served from during development.
pub const DEV_FRONTEND_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub frontend_url: Option<String>,
    pub production: bool,
    pub retention_horizon: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    /// Reads the process environment, after loading `.env` if there is one.
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(anyhow!("DATABASE_URL is not set"))?;

        let port = match lookup("PORT") {
            Some(port) => port.parse().with_context(|| format!("invalid PORT {port:?}"))?,
            None => 5000,
        };

        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(n) => n.parse().with_context(|| format!("invalid DATABASE_MAX_CONNECTIONS {n:?}"))?,
            None => 16,
        };

        Ok(Config {
            database_url,
            database_max_connections,
            host: lookup("HOST").unwrap_or("0.0.0.0".to_owned()),
            port,
            frontend_url: lookup("FRONTEND_URL").filter(|url| !url.is_empty()),
            production: lookup("APP_ENV").is_some_and(|env| env == "production"),
            retention_horizon: DEFAULT_HORIZON,
            sweep_interval: DEFAULT_INTERVAL,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Origins accepted in production. Outside production every origin is mirrored.
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![DEV_FRONTEND_ORIGIN.to_owned()];
        origins.extend(self.frontend_url.clone());
        origins
    }
}
