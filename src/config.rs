//! Runtime configuration for stores, runners and realtime bridges.
//!
//! Defaults are sensible for small per-owner datasets. A config can be read
//! from JSON and then overridden from `SYNCED_*` environment variables:
//!
//! | variable                        | field                     |
//! |---------------------------------|---------------------------|
//! | `SYNCED_PERSIST_TIMEOUT_MS`     | `persist_timeout_ms`      |
//! | `SYNCED_FETCH_TIMEOUT_MS`       | `fetch_timeout_ms`        |
//! | `SYNCED_OPERATION_TIMEOUT_MS`   | `operation_timeout_ms`    |
//! | `SYNCED_ROLLBACK_POLICY`        | `rollback_policy`         |
//! | `SYNCED_SERIALIZE_MUTATIONS`    | `serialize_mutations`     |
//! | `SYNCED_RESYNC_STRATEGY`        | `resync_strategy`         |
//! | `SYNCED_RECONNECT_INITIAL_MS`   | `reconnect_initial_ms`    |
//! | `SYNCED_RECONNECT_MAX_MS`       | `reconnect_max_ms`        |
//!
//! A timeout of `0` disables that timeout.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a failed optimistic mutation is undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Restore the whole list to the snapshot taken before the mutation.
    /// Any other change that landed in the meantime is discarded.
    #[default]
    Snapshot,
    /// Restore only the affected record, at its original position.
    Entity,
}

impl FromStr for RollbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snapshot" => Ok(RollbackPolicy::Snapshot),
            "entity" => Ok(RollbackPolicy::Entity),
            other => Err(other.to_string()),
        }
    }
}

/// How the realtime bridge reacts to a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncStrategy {
    /// Refetch the full list and replace the store wholesale.
    #[default]
    Full,
    /// Apply the row carried by the event; refetch only when it is missing
    /// or does not decode.
    Delta,
}

impl FromStr for ResyncStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(ResyncStrategy::Full),
            "delta" => Ok(ResyncStrategy::Delta),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub persist_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    pub operation_timeout_ms: u64,
    pub rollback_policy: RollbackPolicy,
    /// Queue mutations against the same record id instead of letting them race.
    pub serialize_mutations: bool,
    pub resync_strategy: ResyncStrategy,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            persist_timeout_ms: 30_000,
            fetch_timeout_ms: 30_000,
            operation_timeout_ms: 30_000,
            rollback_policy: RollbackPolicy::Snapshot,
            serialize_mutations: true,
            resync_strategy: ResyncStrategy::Full,
            reconnect_initial_ms: 250,
            reconnect_max_ms: 10_000,
        }
    }
}

impl SyncConfig {
    /// Parse a (possibly partial) JSON config; missing fields use defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `SYNCED_*` overrides looked up through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SYNCED_PERSIST_TIMEOUT_MS") {
            self.persist_timeout_ms = parse("SYNCED_PERSIST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SYNCED_FETCH_TIMEOUT_MS") {
            self.fetch_timeout_ms = parse("SYNCED_FETCH_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SYNCED_OPERATION_TIMEOUT_MS") {
            self.operation_timeout_ms = parse("SYNCED_OPERATION_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SYNCED_ROLLBACK_POLICY") {
            self.rollback_policy = parse("SYNCED_ROLLBACK_POLICY", &v)?;
        }
        if let Some(v) = lookup("SYNCED_SERIALIZE_MUTATIONS") {
            self.serialize_mutations = parse("SYNCED_SERIALIZE_MUTATIONS", &v)?;
        }
        if let Some(v) = lookup("SYNCED_RESYNC_STRATEGY") {
            self.resync_strategy = parse("SYNCED_RESYNC_STRATEGY", &v)?;
        }
        if let Some(v) = lookup("SYNCED_RECONNECT_INITIAL_MS") {
            self.reconnect_initial_ms = parse("SYNCED_RECONNECT_INITIAL_MS", &v)?;
        }
        if let Some(v) = lookup("SYNCED_RECONNECT_MAX_MS") {
            self.reconnect_max_ms = parse("SYNCED_RECONNECT_MAX_MS", &v)?;
        }
        Ok(self)
    }

    pub fn persist_timeout(&self) -> Option<Duration> {
        millis(self.persist_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        millis(self.fetch_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        millis(self.operation_timeout_ms)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms.max(1))
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_initial_ms).max(1))
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}
