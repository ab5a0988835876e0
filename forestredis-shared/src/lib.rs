//! # ForestRedis Shared Library
//!
//! Cross-node publish/subscribe messaging over Redis. Every node carries a
//! unique server identifier; anything it publishes reaches every node
//! subscribed to the channel, itself included.
//!
//! ## Module Organization
//!
//! - `config`: Layered node configuration (file + environment)
//! - `models`: Message envelope and Redis connection parameters
//! - `redis`: Connection pools, subscription workers and the manager
//! - `events`: Received-message events handed to the host
//! - `plugin`: Host integration trait and the manager holder

pub mod config;
pub mod events;
pub mod models;
pub mod plugin;
pub mod redis;

/// Current version of the ForestRedis shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
