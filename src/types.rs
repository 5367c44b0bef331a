//! Basic type definitions for the chat server
//!
//! Provides:
//! - `ClientName`: stable, server-assigned client identity
//! - `ServerStatus`: the server lifecycle states

use std::fmt;

/// Client name assigned on accept (newtype pattern)
///
/// Names are `client-<n>`, numbered from 0 per server instance. Used as the
/// client's identity in rooms, in broadcasts, and in the server's directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientName(String);

impl ClientName {
    /// Name for the `n`-th accepted connection
    pub fn numbered(n: u64) -> Self {
        Self(format!("client-{}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for ClientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server lifecycle
///
/// Transitions only move forward through the variants, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerStatus {
    NotStarted,
    Starting,
    Started,
    Ending,
    Ended,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerStatus::NotStarted => "not started",
            ServerStatus::Starting => "starting",
            ServerStatus::Started => "started",
            ServerStatus::Ending => "ending",
            ServerStatus::Ended => "ended",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_name_numbered() {
        assert_eq!(ClientName::numbered(0).as_str(), "client-0");
        assert_eq!(ClientName::numbered(12).to_string(), "client-12");
    }

    #[test]
    fn test_status_order() {
        assert!(ServerStatus::NotStarted < ServerStatus::Starting);
        assert!(ServerStatus::Started < ServerStatus::Ending);
        assert!(ServerStatus::Ending < ServerStatus::Ended);
    }
}
