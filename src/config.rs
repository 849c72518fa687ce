use std::time::Duration;

use anyhow::Context;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_TYPING_TTL_SECS: u64 = 6;

/// Runtime configuration, read from the environment (a `.env` file is
/// honored when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    /// How long a typing indicator may go unrefreshed before the hub
    /// synthesizes a `stop_typing` for the room.
    pub typing_ttl: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenv::dotenv();

        let bind_addr =
            dotenv::var("CONFAB_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_owned());
        let database_url = dotenv::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let typing_ttl_secs = match dotenv::var("CONFAB_TYPING_TTL_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("CONFAB_TYPING_TTL_SECS is not a number: {raw:?}"))?,
            Err(_) => DEFAULT_TYPING_TTL_SECS,
        };

        Ok(Self {
            bind_addr,
            database_url,
            typing_ttl: Duration::from_secs(typing_ttl_secs),
        })
    }
}
