// Copyright 2026-Present the Hermes authors
// SPDX-License-Identifier: Apache-2.0

//! Gateway configuration, read from environment variables with
//! parse-or-default semantics. Only SSL enablement is validated hard: a
//! listener that claims to be encrypted but has no certificate material
//! configured is a startup error, everything else falls back to a default.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SSL_PORT: u16 = 8443;
const DEFAULT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024; // 10MB in Bytes
const DEFAULT_RELAY_HOST: &str = "logstash-relay-server";
const DEFAULT_RELAY_PORT: u16 = 5050;
const DEFAULT_RELAY_APP_NAME: &str = "client-errors";

/// Transport used to hand records to the relay collector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RelayTransport {
    #[default]
    Udp,
    Tcp,
}

impl FromStr for RelayTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "udp" => Ok(RelayTransport::Udp),
            "tcp" => Ok(RelayTransport::Tcp),
            _ => Err(format!(
                "Invalid relay transport: '{s}'. Valid transports are: udp, tcp",
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub ssl_enabled: bool,
    pub ssl_port: u16,
    /// Certificate material paths, consumed by the terminating deployment
    /// layer; the gateway only carries them.
    pub ssl_cert: Option<PathBuf>,
    pub ssl_key: Option<PathBuf>,
    /// Per-request deadline covering body read and route dispatch.
    pub timeout_secs: u64,
    pub max_content_length: usize,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Application name stamped on every relayed event.
    pub app_name: String,
    pub transport: RelayTransport,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                port: DEFAULT_PORT,
                ssl_enabled: false,
                ssl_port: DEFAULT_SSL_PORT,
                ssl_cert: None,
                ssl_key: None,
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            },
            relay: RelayConfig {
                host: DEFAULT_RELAY_HOST.to_string(),
                port: DEFAULT_RELAY_PORT,
                app_name: DEFAULT_RELAY_APP_NAME.to_string(),
                transport: RelayTransport::Udp,
            },
            log_level: "info".to_string(),
        }
    }
}

fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|val| val.parse::<T>().ok())
}

impl Config {
    pub fn from_env() -> Result<Config, Box<dyn std::error::Error>> {
        let ssl_enabled = env::var("HERMES_SSL_ENABLED")
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(false);
        let ssl_cert = env::var("HERMES_SSL_CERT").ok().map(PathBuf::from);
        let ssl_key = env::var("HERMES_SSL_KEY").ok().map(PathBuf::from);

        if ssl_enabled && (ssl_cert.is_none() || ssl_key.is_none()) {
            return Err(anyhow::anyhow!(
                "HERMES_SSL_ENABLED is set but HERMES_SSL_CERT/HERMES_SSL_KEY are not"
            )
            .into());
        }

        Ok(Config {
            server: ServerConfig {
                port: env_parsed("HERMES_PORT").unwrap_or(DEFAULT_PORT),
                ssl_enabled,
                ssl_port: env_parsed("HERMES_SSL_PORT").unwrap_or(DEFAULT_SSL_PORT),
                ssl_cert,
                ssl_key,
                timeout_secs: env_parsed("HERMES_TIMEOUT_SECS").unwrap_or(DEFAULT_TIMEOUT_SECS),
                max_content_length: env_parsed("HERMES_MAX_CONTENT_LENGTH")
                    .unwrap_or(DEFAULT_MAX_CONTENT_LENGTH),
            },
            relay: RelayConfig {
                host: env::var("HERMES_RELAY_HOST")
                    .unwrap_or_else(|_| DEFAULT_RELAY_HOST.to_string()),
                port: env_parsed("HERMES_RELAY_PORT").unwrap_or(DEFAULT_RELAY_PORT),
                app_name: env::var("HERMES_RELAY_APP_NAME")
                    .unwrap_or_else(|_| DEFAULT_RELAY_APP_NAME.to_string()),
                transport: env_parsed("HERMES_RELAY_TRANSPORT").unwrap_or_default(),
            },
            log_level: env::var("HERMES_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Hostname stamped into request contexts and access logs. Env-var chain
/// with an explicit override, falling back to "unknown".
pub fn hostname() -> String {
    for name in ["HERMES_HOSTNAME", "HOSTNAME"] {
        if let Ok(value) = env::var(name) {
            if !value.is_empty() {
                return value;
            }
        }
    }
    "unknown".to_string()
}
