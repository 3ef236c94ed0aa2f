//! # Pairs Game Server Library
//!
//! This library provides the authoritative server for the multiplayer
//! memory-matching game. Clients only ask to flip cards; the server deals
//! the boards, decides whose turn it is, resolves every revealed pair and
//! broadcasts the resulting session state.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game State
//! Every session lives on the server. A client's request is checked against
//! the session before anything changes, and a rejected request leaves the
//! session exactly as it was.
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - Connection establishment and login
//! - Lobby membership before a game starts
//! - Disconnection and timeout, which count as leaving a running game
//!
//! ### State Broadcasting
//! After every accepted change the full session snapshot is sent to each
//! player still seated in it. Rejections go back to the requesting client
//! only.
//!
//! ## Architecture Design
//!
//! ### One Task per Session
//! Each running session is owned by its own task ([`actor`]). Requests for a
//! session are applied one at a time in arrival order, and the pause before a
//! revealed pair is resolved is a deadline inside that task. Sessions never
//! share mutable state with each other.
//!
//! ### UDP-Based Communication
//! Clients talk to the server over UDP with bincode-encoded packets
//! (see `shared::Packet`). A silent client is dropped after a timeout.
//!
//! ## Module Organization
//!
//! ### Board Module (`board`)
//! Deals a shuffled board of value pairs for a board size.
//!
//! ### Engine Module (`engine`)
//! The turn engine: initializing a session, applying a flip and resolving a
//! revealed pair.
//!
//! ### Rotation Module (`rotation`)
//! Finds the next seat still in the game.
//!
//! ### Lifecycle Module (`lifecycle`)
//! Applies a player's departure and ends the session when too few remain.
//!
//! ### Registry Module (`registry`)
//! Pending lobbies and the live session tasks, keyed by session id.
//!
//! ### Client Manager Module (`client_manager`)
//! Connected clients, their login and the session they sit in.
//!
//! ### Network Module (`network`)
//! UDP socket handling, packet dispatch and fan-out of session updates.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default()
//!         .with_addr("127.0.0.1:8080")
//!         .with_resolution_delay(Duration::from_secs(1));
//!
//!     let mut server = Server::new(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod actor;
pub mod board;
pub mod client_manager;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod registry;
pub mod rotation;
