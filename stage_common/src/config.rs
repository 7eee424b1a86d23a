//! Configuration loading and validation.
//!
//! The service reads one TOML file. Every field has a default, so a missing
//! file yields a fully usable configuration (simulation on localhost); a
//! file that exists but fails to parse or validate is a startup error.
//!
//! # TOML Example
//!
//! ```toml
//! [broker]
//! host = "localhost"
//! port = 1883
//!
//! [sampling]
//! rate_hz = 1000
//! cpu_core = 1
//! rt_priority = 50
//!
//! [controllers]
//! xyz_id = 4
//! rot_id = 2222
//! ```

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::consts::{
    DEFAULT_BATCH_INTERVAL_MS, DEFAULT_BATCH_MAX, DEFAULT_COMMAND_FIFO_CAPACITY,
    DEFAULT_RING_CAPACITY, DEFAULT_ROT_CONTROLLER_ID, DEFAULT_XYZ_CONTROLLER_ID,
    MAX_SAMPLE_RATE_HZ, MIN_SAMPLE_RATE_HZ,
};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `DeserializeOwned` type; semantic
/// validation stays with the concrete config type.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// MQTT broker connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker hostname or address.
    pub host: String,
    /// Broker TCP port.
    pub port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Keep-alive interval [s].
    pub keep_alive_s: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "stage_stream".to_string(),
            keep_alive_s: 5,
        }
    }
}

/// Sampler settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Startup sample rate [Hz]; changeable at runtime via SET_RATE.
    pub rate_hz: u32,
    /// CPU core to pin the sampler thread to; `None` leaves affinity alone.
    pub cpu_core: Option<usize>,
    /// SCHED_FIFO priority requested for the sampler thread.
    pub rt_priority: i32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            rate_hz: 1000,
            cpu_core: Some(1),
            rt_priority: 50,
        }
    }
}

/// Publisher batching settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishingConfig {
    /// Maximum samples per published batch.
    pub batch_max: usize,
    /// Batch period [ms].
    pub batch_interval_ms: u64,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            batch_max: DEFAULT_BATCH_MAX,
            batch_interval_ms: DEFAULT_BATCH_INTERVAL_MS,
        }
    }
}

/// Controller id assignment for the logical axes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Id of the controller driving X, Y and Z.
    pub xyz_id: i32,
    /// Id of the controller driving R.
    pub rot_id: i32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            xyz_id: DEFAULT_XYZ_CONTROLLER_ID,
            rot_id: DEFAULT_ROT_CONTROLLER_ID,
        }
    }
}

/// Internal queue sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Sample ring capacity; power of two, at least 4x `batch_max`.
    pub ring_capacity: usize,
    /// Command FIFO depth; overflow drops the oldest command.
    pub command_fifo_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            command_fifo_capacity: DEFAULT_COMMAND_FIFO_CAPACITY,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Broker connection.
    pub broker: BrokerConfig,
    /// Sampler cadence and scheduling.
    pub sampling: SamplingConfig,
    /// Publisher batching.
    pub publishing: PublishingConfig,
    /// Controller id assignment.
    pub controllers: ControllerConfig,
    /// Queue sizing.
    pub queues: QueueConfig,
}

impl StreamConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    ///
    /// Parse and validation errors are still fatal; only a missing file is
    /// forgiven.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let config = match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::FileNotFound) => Self::default(),
            Err(e) => return Err(e),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.rate_hz < MIN_SAMPLE_RATE_HZ || self.sampling.rate_hz > MAX_SAMPLE_RATE_HZ
        {
            return Err(ConfigError::ValidationError(format!(
                "sampling.rate_hz {} outside [{MIN_SAMPLE_RATE_HZ}, {MAX_SAMPLE_RATE_HZ}]",
                self.sampling.rate_hz
            )));
        }
        if !(1..=99).contains(&self.sampling.rt_priority) {
            return Err(ConfigError::ValidationError(format!(
                "sampling.rt_priority {} outside [1, 99]",
                self.sampling.rt_priority
            )));
        }
        if self.publishing.batch_max == 0 {
            return Err(ConfigError::ValidationError(
                "publishing.batch_max must be at least 1".to_string(),
            ));
        }
        if !self.queues.ring_capacity.is_power_of_two() {
            return Err(ConfigError::ValidationError(format!(
                "queues.ring_capacity {} is not a power of two",
                self.queues.ring_capacity
            )));
        }
        if self.queues.ring_capacity < self.publishing.batch_max * 4 {
            return Err(ConfigError::ValidationError(format!(
                "queues.ring_capacity {} smaller than 4x batch_max {}",
                self.queues.ring_capacity, self.publishing.batch_max
            )));
        }
        if self.queues.command_fifo_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "queues.command_fifo_capacity must be at least 1".to_string(),
            ));
        }
        if self.broker.client_id.is_empty() {
            return Err(ConfigError::ValidationError(
                "broker.client_id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Sampling interval for the configured startup rate [ns].
    #[inline]
    pub fn sample_interval_ns(&self) -> u64 {
        1_000_000_000 / self.sampling.rate_hz as u64
    }
}
