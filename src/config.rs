//! # Configuration Management
//!
//! Protocol constants and per-node configuration.
//!
//! This module provides structured configuration for a clustering node:
//! timer intervals, directory time-to-live values, and the scoring weight.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//!
//! Protocol constants (port, proximity thresholds) are fixed by the wire
//! contract and are not runtime-tunable.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// UDP port the protocol's transport collaborators bind to.
pub const PROTOCOL_PORT: u16 = 1701;

/// Default weight between the position term and the mobility term in the
/// RPM/RSM scoring functions.
pub const DEFAULT_ALPHA: f64 = 0.5;

/// Proximity classification: combined relative distance below this is Near.
pub const PROXIMITY_NEAR_THRESHOLD: f64 = 50.0;

/// Proximity classification: combined relative distance above this is Far.
pub const PROXIMITY_FAR_THRESHOLD: f64 = 100.0;

/// Fixed per-interface stagger applied to every outgoing transmission to
/// desynchronize simultaneous sends across interfaces.
pub const SEND_STAGGER: Duration = Duration::from_millis(5);

/// Per-node protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Scoring weight for RPM/RSM (0.0..=1.0).
    pub alpha: f64,

    /// Beacon interval; also the refresh delay for the expiring directories.
    pub hello_interval: Duration,

    /// Time-to-live granted to a neighbor or candidate-head entry on update.
    pub neighbor_ttl: Duration,

    /// Time-to-live granted to a member roster entry on update.
    pub member_ttl: Duration,

    /// Period of the role-check timer (beacon + per-role housekeeping).
    pub role_check_interval: Duration,

    /// Period of the velocity sampling timer.
    pub velocity_check_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            alpha: DEFAULT_ALPHA,
            hello_interval: Duration::from_secs(1),
            neighbor_ttl: Duration::from_millis(5000),
            member_ttl: Duration::from_millis(5000),
            role_check_interval: Duration::from_millis(500),
            velocity_check_interval: Duration::from_millis(100),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: NodeConfig = toml::from_str(content)
            .map_err(|e| ProtocolError::ConfigError(format!("failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Interval of the head-election timer, derived from the role check.
    pub fn elect_interval(&self) -> Duration {
        self.role_check_interval * 2
    }

    /// Arming delay of the empty-cluster timer, derived from the role check.
    pub fn contention_interval(&self) -> Duration {
        self.role_check_interval * 4
    }

    /// Validate settings that would break the protocol invariants.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ProtocolError::ConfigError(format!(
                "alpha must be within 0.0..=1.0, got {}",
                self.alpha
            )));
        }
        if self.role_check_interval.is_zero() {
            return Err(ProtocolError::ConfigError(
                "role_check_interval must be non-zero".into(),
            ));
        }
        if self.velocity_check_interval.is_zero() {
            return Err(ProtocolError::ConfigError(
                "velocity_check_interval must be non-zero".into(),
            ));
        }
        if self.neighbor_ttl < self.role_check_interval {
            return Err(ProtocolError::ConfigError(
                "neighbor_ttl shorter than role_check_interval would expire every entry \
                 between beacons"
                    .into(),
            ));
        }
        Ok(())
    }
}
