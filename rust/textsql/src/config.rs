use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    net::{SocketAddr, ToSocketAddrs},
    str::FromStr,
    time::Duration,
};

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const DB_PASSWORD_VAR: &str = "TEXTSQL_DB_PASSWORD";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub generation: GenerationConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: Option<String>,
    pub ssl_mode: SslMode,
    pub root_cert: Option<String>,
    pub connect_timeout: Duration,
}

/// Encryption policy for the database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Prefer,
    Require,
}

impl FromStr for SslMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            other => anyhow::bail!("unsupported sslmode '{other}' (expected disable, prefer or require)"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    textsql_listen_addr: Option<String>,
    #[serde(default)]
    textsql_listen_host: Option<String>,
    #[serde(default)]
    textsql_listen_port: Option<u16>,
    #[serde(default)]
    gemini_api_key: Option<String>,
    #[serde(default = "default_model")]
    textsql_model: String,
    #[serde(default = "default_generation_url")]
    textsql_generation_url: String,
    #[serde(default = "default_generation_timeout_secs")]
    textsql_generation_timeout_secs: u64,
    #[serde(default = "default_db_host")]
    textsql_db_host: String,
    #[serde(default = "default_db_port")]
    textsql_db_port: u16,
    #[serde(default = "default_db_name")]
    textsql_db_name: String,
    #[serde(default = "default_db_user")]
    textsql_db_user: String,
    #[serde(default)]
    textsql_db_password: Option<String>,
    #[serde(default)]
    textsql_db_sslmode: Option<String>,
    #[serde(default)]
    textsql_db_root_cert: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    textsql_db_connect_timeout_secs: u64,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_generation_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

const fn default_generation_timeout_secs() -> u64 {
    60
}

fn default_db_host() -> String {
    "localhost".to_string()
}

const fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "postgres".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

const fn default_connect_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse TEXTSQL_* environment variables")?;
        Self::from_raw(raw)
    }

    /// Parses the same variables as [`AppConfig::from_env`] from an explicit set of pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let raw: RawConfig =
            envy::from_iter(vars).context("failed to parse TEXTSQL_* variables")?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let listen_addr = resolve_addr(
            raw.textsql_listen_addr,
            raw.textsql_listen_host,
            raw.textsql_listen_port,
        )?;

        let ssl_mode = match raw.textsql_db_sslmode.as_deref() {
            Some(value) if !value.trim().is_empty() => {
                value.parse::<SslMode>().context("invalid TEXTSQL_DB_SSLMODE")?
            }
            _ => SslMode::Require,
        };

        Ok(Self {
            listen_addr,
            generation: GenerationConfig {
                api_key: non_empty(raw.gemini_api_key),
                model: raw.textsql_model,
                base_url: raw.textsql_generation_url,
                timeout: Duration::from_secs(raw.textsql_generation_timeout_secs.max(1)),
            },
            database: DatabaseConfig {
                host: raw.textsql_db_host,
                port: raw.textsql_db_port,
                name: raw.textsql_db_name,
                user: raw.textsql_db_user,
                password: non_empty(raw.textsql_db_password),
                ssl_mode,
                root_cert: non_empty(raw.textsql_db_root_cert),
                connect_timeout: Duration::from_secs(raw.textsql_db_connect_timeout_secs.max(1)),
            },
        })
    }

    /// Names of the required secrets that were not provided.
    pub fn missing_secrets(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.generation.api_key.is_none() {
            missing.push(API_KEY_VAR);
        }
        if self.database.password.is_none() {
            missing.push(DB_PASSWORD_VAR);
        }
        missing
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid TEXTSQL_LISTEN_ADDR value")?
            .next()
            .context("TEXTSQL_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(5000);
    let combined = format!("{}:{}", host, port);
    combined
        .to_socket_addrs()
        .context("invalid listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}
