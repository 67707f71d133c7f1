//! 服务配置：YAML 文件加载、环境变量覆盖与校验。
//!
//! # Service Configuration
//!
//! ```yaml
//! general:
//!   write_batch_size: 1000
//! producer:
//!   topic: ocp_request_events
//!   capacity: 10000
//!   flush_size: 10000
//!   flush_interval_ms: 1000
//! saver:
//!   capacity: 1000
//!   chunk_size: 100
//!   flush_interval_ms: 1000
//! logging:
//!   filter: info
//! ```
//!
//! Every key is optional. Environment variables named
//! `OCP_REQUEST_<SECTION>_<KEY>` (for example `OCP_REQUEST_SAVER_CHUNK_SIZE`)
//! override values from the file.

use crate::events::ProducerConfig;
use crate::saver::SaverConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub const ENV_PREFIX: &str = "OCP_REQUEST";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub general: GeneralConfig,
    pub producer: ProducerConfig,
    pub saver: SaverConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Max rows per storage call in multi-create.
    pub write_batch_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            write_batch_size: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("failed to read config file: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("service_config"),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// Applies `OCP_REQUEST_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key lookup, keyed like the environment variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |section: &str, key: &str| {
            let name = format!("{}_{}_{}", ENV_PREFIX, section, key).to_uppercase();
            lookup(&name).map(|value| (name, value))
        };

        if let Some(v) = get("general", "write_batch_size") {
            self.general.write_batch_size = parse(v)?;
        }

        if let Some((_, v)) = get("producer", "topic") {
            self.producer.topic = v;
        }
        if let Some(v) = get("producer", "capacity") {
            self.producer.capacity = parse(v)?;
        }
        if let Some(v) = get("producer", "flush_size") {
            self.producer.flush_size = parse(v)?;
        }
        if let Some(v) = get("producer", "flush_interval_ms") {
            self.producer.flush_interval_ms = parse(v)?;
        }

        if let Some(v) = get("saver", "capacity") {
            self.saver.capacity = parse(v)?;
        }
        if let Some(v) = get("saver", "chunk_size") {
            self.saver.chunk_size = parse(v)?;
        }
        if let Some(v) = get("saver", "flush_size") {
            self.saver.flush_size = Some(parse(v)?);
        }
        if let Some(v) = get("saver", "flush_interval_ms") {
            self.saver.flush_interval_ms = parse(v)?;
        }

        if let Some((_, v)) = get("logging", "filter") {
            self.logging.filter = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.write_batch_size == 0 {
            return Err(Error::configuration_with_context(
                "write batch size must be greater than 0",
                ErrorContext::new()
                    .with_field_path("general.write_batch_size")
                    .with_source("service_config"),
            ));
        }
        self.producer.validate()?;
        self.saver.validate()
    }
}

fn parse<V: FromStr>((name, raw): (String, String)) -> Result<V>
where
    V::Err: std::fmt::Display,
{
    raw.trim().parse::<V>().map_err(|e| {
        Error::configuration_with_context(
            format!("invalid value {:?}: {}", raw, e),
            ErrorContext::new()
                .with_field_path(name)
                .with_source("env_override"),
        )
    })
}
