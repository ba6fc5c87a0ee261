//! RCON client configuration.

use crate::protocol::TextEncoding;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on the total time one command may spend retrying.
pub const MAX_BUDGET_MS: u64 = 600_000;

fn default_timeout_ms() -> u64 {
    800
}

fn default_max_retries() -> u32 {
    2
}

fn default_budget_ms() -> u64 {
    5_000
}

fn default_async_retries() -> u32 {
    1
}

fn default_followup_ms() -> u64 {
    50
}

fn default_close_timeout_ms() -> u64 {
    2_000
}

/// Connection and retry settings for an [`RconClient`](crate::RconClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RconConfig {
    /// Server address as `host:port`
    pub address: String,
    pub password: String,
    #[serde(default)]
    pub encoding: TextEncoding,
    /// Per-attempt wait for write and read readiness
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt for synchronous sends
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Hard wall-clock limit for all attempts of one command
    #[serde(default = "default_budget_ms")]
    pub budget_ms: u64,
    /// Retries used by the burst worker
    #[serde(default = "default_async_retries")]
    pub async_retries: u32,
    /// How long to wait for continuation datagrams of a long reply
    #[serde(default = "default_followup_ms")]
    pub followup_ms: u64,
    /// Bound on joining the burst worker during close
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

impl RconConfig {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn followup(&self) -> Duration {
        Duration::from_millis(self.followup_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Checks the settings for values the client cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.address.trim().is_empty() {
            return Err("RCON address cannot be empty".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("RCON timeout_ms must be greater than 0".to_string());
        }
        if self.budget_ms > MAX_BUDGET_MS {
            return Err(format!(
                "RCON budget_ms ({}) cannot exceed {}",
                self.budget_ms, MAX_BUDGET_MS
            ));
        }
        if self.budget_ms < self.timeout_ms {
            return Err(format!(
                "RCON budget_ms ({}) must be at least timeout_ms ({})",
                self.budget_ms, self.timeout_ms
            ));
        }
        Ok(())
    }
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:27960".to_string(),
            password: String::new(),
            encoding: TextEncoding::default(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            budget_ms: default_budget_ms(),
            async_retries: default_async_retries(),
            followup_ms: default_followup_ms(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}
