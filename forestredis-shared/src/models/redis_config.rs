/// Redis connection parameters

use crate::redis::client::{RedisPool, DEFAULT_OPERATION_TIMEOUT};
use redis::{Client, IntoConnectionInfo};
use std::fmt;

/// Immutable Redis connection parameters
///
/// The hostname is required: without it [`RedisConfiguration::build`] cannot
/// produce a pool. Credentials never appear in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisConfiguration {
    hostname: Option<String>,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    ssl: bool,
}

impl RedisConfiguration {
    pub fn new(
        hostname: Option<String>,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        ssl: bool,
    ) -> Self {
        Self {
            hostname,
            port,
            username,
            password,
            ssl,
        }
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn ssl(&self) -> bool {
        self.ssl
    }

    /// Builds a connection pool from these parameters
    ///
    /// Returns `None` if the hostname is unset or empty, or if the Redis
    /// client cannot be constructed from the parameters. No connection is
    /// attempted here.
    pub fn build(&self) -> Option<RedisPool> {
        let hostname = self.hostname.as_deref().filter(|h| !h.trim().is_empty())?;

        let scheme = if self.ssl { "rediss" } else { "redis" };
        let url = format!("{}://{}:{}", scheme, url_host(hostname), self.port);

        let mut info = match url.as_str().into_connection_info() {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!(error = %e, "Invalid Redis connection parameters");
                return None;
            }
        };
        info.redis.username = self.username.clone();
        info.redis.password = self.password.clone();

        match Client::open(info) {
            Ok(client) => Some(RedisPool::new(client, self.to_string(), DEFAULT_OPERATION_TIMEOUT)),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to create Redis client");
                None
            }
        }
    }
}

/// Brackets IPv6 literals for use inside a URL authority
fn url_host(hostname: &str) -> String {
    if hostname.contains(':') && !hostname.starts_with('[') {
        format!("[{}]", hostname)
    } else {
        hostname.to_string()
    }
}

impl fmt::Display for RedisConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.hostname.as_deref().unwrap_or("<unset>"),
            self.port
        )?;
        if self.ssl {
            write!(f, " (tls)")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RedisConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfiguration")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("ssl", &self.ssl)
            .finish()
    }
}
