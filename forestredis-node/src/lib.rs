//! # ForestRedis Node Library
//!
//! Hosts a ForestRedis manager inside a standalone process: received
//! messages pass through cancellable listeners before reaching the node's
//! main loop.
//!
//! ## Modules
//!
//! - `dispatcher`: Plugin host feeding the listener pipeline
//! - `events`: Cancellable pre-event and main-loop event
//! - `listeners`: Listener trait and built-in listeners
//! - `node`: Main loop with reload and shutdown
//!
//! ## Example
//!
//! ```no_run
//! use forestredis_node::listeners::{IgnoreOwnMessages, MessageListener};
//! use forestredis_node::node::Node;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let listeners: Vec<Arc<dyn MessageListener>> = vec![Arc::new(IgnoreOwnMessages)];
//! Node::new(None, listeners).run().await
//! # }
//! ```

pub mod dispatcher;
pub mod events;
pub mod listeners;
pub mod node;
