//! Shared helpers for CLI commands.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use anneal_adapter_sapi::SapiTransport;
use anneal_client::{Client, ClientConfig, ConnectionConfig, Problem};

/// Connection settings given on the command line or through the environment.
pub struct Connection {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub config: Option<PathBuf>,
}

/// Contents of the configuration file.
///
/// ```yaml
/// connection:
///   endpoint: https://cloud.example.com/sapi/v2
///   request_timeout_secs: 120
/// client:
///   workers: 5
///   max_batch: 20
/// ```
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub client: ClientConfig,
}

/// File-side connection settings; flags and environment take precedence.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub proxy: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

/// Return the default configuration file path (~/.anneal/config.yaml).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".anneal").join("config.yaml"))
}

/// Load settings from an explicit path, or the default path if it exists.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            path.to_path_buf()
        }
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => path,
            None => return Ok(Settings::default()),
        },
    };

    let source = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_yaml_ng::from_str(&source)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Merge command-line connection settings over the file settings.
pub fn connection_config(
    connection: &Connection,
    settings: &ConnectionSettings,
) -> Result<ConnectionConfig> {
    let endpoint = connection
        .endpoint
        .clone()
        .or_else(|| settings.endpoint.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("No endpoint configured. Set ANNEAL_API_ENDPOINT or pass --endpoint")
        })?;
    let token = connection
        .token
        .clone()
        .or_else(|| settings.token.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("No API token configured. Set ANNEAL_API_TOKEN or pass --token")
        })?;

    let mut config = ConnectionConfig::new(endpoint).with_token(token);
    if let Some(proxy) = &settings.proxy {
        config = config.with_proxy(proxy.clone());
    }
    if let Some(secs) = settings.connect_timeout_secs {
        config.connect_timeout_secs = secs;
    }
    if let Some(secs) = settings.request_timeout_secs {
        config.request_timeout_secs = secs;
    }
    Ok(config)
}

/// Build a client for the configured service.
pub fn connect(connection: &Connection) -> Result<Client> {
    let settings = load_settings(connection.config.as_deref())?;
    let config = connection_config(connection, &settings.connection)?;
    tracing::info!(endpoint = %config.endpoint, "connecting");

    let transport = SapiTransport::new(&config)?;
    Ok(Client::new(Arc::new(transport), settings.client)?)
}

/// Load a problem from a JSON file.
pub fn load_problem(path: &Path) -> Result<Problem> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&source)
        .with_context(|| format!("Invalid problem file: {}", path.display()))
}
