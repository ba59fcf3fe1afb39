//! Error types surfaced by the Focusclock library.

use crate::common::SubscriberId;
use thiserror::Error;

/// A configuration value was rejected. The previous configuration stays in force.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: i64 },

    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// An externally supplied snapshot could not be used to rehydrate a clock.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Malformed(String),

    #[error("snapshot could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("snapshot carries an invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Writing to one broadcast subscriber failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("subscriber {0} is disconnected")]
    Disconnected(SubscriberId),
    #[error("subscriber {0} is not draining its stream")]
    Lagging(SubscriberId),
}

impl DeliveryError {
    pub fn subscriber(&self) -> &SubscriberId {
        match self {
            Self::Disconnected(id) | Self::Lagging(id) => id,
        }
    }
}
