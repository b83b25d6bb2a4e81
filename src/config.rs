// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Proxy and worker configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up in the working directory
pub const CONFIG_FILE: &str = "geocloud.toml";

/// Client-side settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Worker host to connect to
    pub host: String,
    /// Worker port
    pub port: u16,
    /// Per-request timeout; no timeout when unset
    pub timeout_ms: Option<u64>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9009,
            timeout_ms: Some(30_000),
        }
    }
}

impl ProxyConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Worker-side settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind; 0 picks a free port
    pub port: u16,
    /// Resident handles per session before least-recently-used eviction
    pub max_handles_per_session: usize,
    /// Idle time after which a resident handle is evicted
    pub handle_ttl_ms: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9009,
            max_handles_per_session: 1024,
            handle_ttl_ms: None,
        }
    }
}

impl WorkerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn handle_ttl(&self) -> Option<Duration> {
        self.handle_ttl_ms.map(Duration::from_millis)
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub proxy: ProxyConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load `geocloud.toml` if present, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = if PathBuf::from(CONFIG_FILE).exists() {
            Self::from_file(CONFIG_FILE)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `GEOCLOUD_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("GEOCLOUD_HOST") {
            self.proxy.host = host.clone();
            self.worker.host = host;
        }

        if let Some(port) = lookup("GEOCLOUD_PORT") {
            let port: u16 = port
                .parse()
                .with_context(|| format!("Invalid GEOCLOUD_PORT: {port}"))?;
            self.proxy.port = port;
            self.worker.port = port;
        }

        if let Some(timeout) = lookup("GEOCLOUD_TIMEOUT_MS") {
            self.proxy.timeout_ms = parse_optional_ms(&timeout)
                .with_context(|| format!("Invalid GEOCLOUD_TIMEOUT_MS: {timeout}"))?;
        }

        if let Some(max) = lookup("GEOCLOUD_MAX_HANDLES") {
            self.worker.max_handles_per_session = max
                .parse()
                .with_context(|| format!("Invalid GEOCLOUD_MAX_HANDLES: {max}"))?;
        }

        if let Some(ttl) = lookup("GEOCLOUD_HANDLE_TTL_MS") {
            self.worker.handle_ttl_ms = parse_optional_ms(&ttl)
                .with_context(|| format!("Invalid GEOCLOUD_HANDLE_TTL_MS: {ttl}"))?;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }
}

/// `0` or `none` disables the limit
fn parse_optional_ms(value: &str) -> Result<Option<u64>, std::num::ParseIntError> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let ms: u64 = value.parse()?;
    Ok(if ms == 0 { None } else { Some(ms) })
}
