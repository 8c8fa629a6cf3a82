use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Shared secret for the internal cron/admin endpoints. When unset,
    /// those endpoints refuse every request.
    #[serde(default)]
    pub admin_secret: Option<String>
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_database_url() -> String {
    "postgres://localhost/warden".to_string()
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("WARDEN_BIND_ADDRESS") {
            config.bind_address = addr;
        }
        if let Ok(port) = std::env::var("WARDEN_PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(secret) = std::env::var("WARDEN_ADMIN_SECRET") {
            if !secret.is_empty() {
                config.admin_secret = Some(secret);
            }
        }

        config
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.bind_address, self.port).parse()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            database_url: default_database_url(),
            admin_secret: None
        }
    }
}
