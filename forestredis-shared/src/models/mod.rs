/// Data models shared by every node
///
/// - `message`: the wire envelope published on Redis channels
/// - `redis_config`: immutable connection parameters that build a pool

pub mod message;
pub mod redis_config;

// Re-export all models for convenience
pub use message::{current_timestamp, MessageError, MessageTransferObject};
pub use redis_config::RedisConfiguration;
