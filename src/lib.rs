//! Multi-room line-oriented Chat Server Library
//!
//! A TCP chat server built with tokio. Clients connect, enter named rooms,
//! and exchange plain-text lines with everyone else in the same room.
//!
//! # Protocol
//! Newline-delimited text:
//! - `/enter <room>` - leave the current room (if any) and enter `<room>`
//! - `/leave` - leave the current room
//! - `/exit` - end the session
//! - anything else - post to the current room
//!
//! The server answers with `[OK]`, `[Error: <reason>]`, or, for messages
//! posted by others, `[<room>]<sender> says '<text>'`.
//!
//! # Architecture
//! Each connection runs two tasks sharing one `MessageQueue`:
//! - a read loop that turns remote lines into control messages
//! - a main loop that consumes control messages, runs commands, and is the
//!   only writer to the connection
//!
//! Rooms never write to sockets: posting enqueues a broadcast into each
//! member's queue. Rooms are independent, each with its own lock, and the
//! `RoomRegistry` creates and removes them with single atomic map operations.
//!
//! # Example
//! ```ignore
//! use room_chat::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let server = Server::new(config.clone());
//!     server.start(config.bind_addr).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop()?;
//!     server.join().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod queue;
pub mod registry;
pub mod room;
pub mod server;
pub mod state;
pub mod types;

// Re-export main types for convenience
pub use tokio_util::sync::CancellationToken;
pub use client::ClientHandle;
pub use config::ServerConfig;
pub use error::{AppError, DequeueError, ServerError};
pub use handler::handle_connection;
pub use message::{ClientLine, ControlMessage, Reply};
pub use queue::MessageQueue;
pub use registry::RoomRegistry;
pub use room::Room;
pub use server::Server;
pub use state::ServerState;
pub use types::{ClientName, ServerStatus};
