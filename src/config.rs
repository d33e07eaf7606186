//! Server configuration
//!
//! Bind address and channel capacities, taken from the command line and
//! environment with fixed defaults.

use std::env;

use crate::error::AppError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Channel buffer size for server commands
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Per-connection outbound queue size
pub const DEFAULT_CLIENT_BUFFER: usize = 32;

pub const ADDR_VAR: &str = "CHAT_ROUTER_ADDR";
pub const COMMAND_BUFFER_VAR: &str = "CHAT_ROUTER_COMMAND_BUFFER";
pub const CLIENT_BUFFER_VAR: &str = "CHAT_ROUTER_CLIENT_BUFFER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub command_buffer: usize,
    pub client_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            command_buffer: DEFAULT_COMMAND_BUFFER,
            client_buffer: DEFAULT_CLIENT_BUFFER,
        }
    }
}

impl ServerConfig {
    /// Load from the process arguments and environment
    ///
    /// The first argument, if any, overrides `CHAT_ROUTER_ADDR`.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_sources(env::args().nth(1), |key| env::var(key).ok())
    }

    pub fn from_sources(
        addr_arg: Option<String>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let bind_addr = addr_arg
            .or_else(|| var(ADDR_VAR))
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());

        Ok(Self {
            bind_addr,
            command_buffer: parse_capacity(COMMAND_BUFFER_VAR, var(COMMAND_BUFFER_VAR))?
                .unwrap_or(DEFAULT_COMMAND_BUFFER),
            client_buffer: parse_capacity(CLIENT_BUFFER_VAR, var(CLIENT_BUFFER_VAR))?
                .unwrap_or(DEFAULT_CLIENT_BUFFER),
        })
    }
}

/// mpsc channels panic on zero capacity, so zero is rejected here
fn parse_capacity(key: &str, value: Option<String>) -> Result<Option<usize>, AppError> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value.trim().parse::<usize>() {
        Ok(0) | Err(_) => Err(AppError::Config(format!(
            "{} must be a positive integer, got {:?}",
            key, value
        ))),
        Ok(n) => Ok(Some(n)),
    }
}
