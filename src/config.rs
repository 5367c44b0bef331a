//! Server configuration
//!
//! Loaded from an optional JSON file; every field has a default, so an
//! empty object (or no file at all) gives a working local server.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::error::ServerError;

/// Default listening address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default maximum number of simultaneous clients
pub const DEFAULT_MAX_CLIENTS: usize = 10;

/// Default pending-connection backlog
pub const DEFAULT_BACKLOG: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_addr: SocketAddr,
    /// Clients served at once; further connections wait in the backlog
    pub max_clients: usize,
    /// Pending connections the OS keeps before refusing
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_clients: DEFAULT_MAX_CLIENTS,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

impl ServerConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ServerError> {
        let config: ServerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_clients == 0 {
            return Err(ServerError::InvalidConfig(
                "max_clients must be at least 1".to_string(),
            ));
        }
        if self.backlog == 0 {
            return Err(ServerError::InvalidConfig(
                "backlog must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
