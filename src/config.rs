use std::{
    env,
    net::{IpAddr, SocketAddr},
    ops::RangeInclusive,
    path::PathBuf,
    str::FromStr,
};

use thiserror::Error;

use crate::constants::MAX_TOKEN_LIFETIME_HOURS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Runtime settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    pub secret_key: String,
    pub token_lifetime_hours: i64,
    pub media_root: PathBuf,
    pub max_image_bytes: u64,
}

impl Config {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let text = |name: &'static str, default: &str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_owned())
        };

        Ok(Self {
            database_url: text("DATABASE_URL", "postgres://localhost/recipes"),
            database_max_connections: parse("DATABASE_MAX_CONNECTIONS", &text("DATABASE_MAX_CONNECTIONS", "5"))?,
            host: parse("HOST", &text("HOST", "0.0.0.0"))?,
            port: parse("PORT", &text("PORT", "8000"))?,
            secret_key: lookup("SECRET_KEY")
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing("SECRET_KEY"))?,
            token_lifetime_hours: parse_in(
                "TOKEN_LIFETIME_HOURS",
                &text("TOKEN_LIFETIME_HOURS", "24"),
                1..=MAX_TOKEN_LIFETIME_HOURS,
            )?,
            media_root: PathBuf::from(text("MEDIA_ROOT", "./media")),
            max_image_bytes: parse("MAX_IMAGE_BYTES", &text("MAX_IMAGE_BYTES", "5242880"))?,
        })
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_lifetime_hours)
    }
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_owned(),
    })
}

fn parse_in<T>(name: &'static str, value: &str, range: RangeInclusive<T>) -> ConfigResult<T>
where
    T: FromStr + PartialOrd,
{
    let parsed = parse(name, value)?;
    if !range.contains(&parsed) {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_owned(),
        });
    }
    Ok(parsed)
}
