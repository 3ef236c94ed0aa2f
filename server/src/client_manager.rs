//! Client connection management for the game server
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - The user identity a client logged in with
//! - The lobby or running session a client currently belongs to
//! - Client capacity management and address tracking
//!
//! A client's id is the connection reference the turn engine resolves
//! acting players from.

use log::info;
use shared::{ConnectionId, SessionId, UserRef};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Represents a connected client
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ConnectionId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Identity supplied on login
    pub user: Option<UserRef>,
    /// Running session this client is seated in
    pub session: Option<SessionId>,
}

impl Client {
    /// Creates a new client with the given ID and network address
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            user: None,
            session: None,
        }
    }

    /// Checks if the client has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Enforces server capacity limits and detects clients that went silent.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<ConnectionId, Client>,
    /// Next available client ID for new connections
    next_client_id: ConnectionId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    /// Silence after which a client is dropped
    timeout: Duration,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let client = Client::new(client_id, addr);
        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Removes a client from the server, returning its final state
    pub fn remove_client(&mut self, client_id: &ConnectionId) -> Option<Client> {
        let removed = self.clients.remove(client_id);
        if let Some(client) = &removed {
            info!("Client {} disconnected", client.id);
        }
        removed
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: ConnectionId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Records activity from a client. Returns false if the ID is unknown.
    pub fn touch(&mut self, client_id: ConnectionId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn set_user(&mut self, client_id: ConnectionId, user: UserRef) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            info!("Client {} logged in as {}", client_id, user.name);
            client.user = Some(user);
        }
    }

    pub fn set_session(&mut self, client_id: ConnectionId, session: Option<SessionId>) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.session = session;
        }
    }

    /// Detaches every client still pointing at `session`
    pub fn clear_session(&mut self, session: SessionId) {
        for client in self.clients.values_mut() {
            if client.session == Some(session) {
                client.session = None;
            }
        }
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed clients so their lobby and session can be
    /// cleaned up by the caller.
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timed_out: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(self.timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    /// Network addresses of the given clients that are still connected
    pub fn addrs_of(&self, client_ids: &[ConnectionId]) -> Vec<(ConnectionId, SocketAddr)> {
        client_ids
            .iter()
            .filter_map(|id| self.clients.get(id).map(|c| (*id, c.addr)))
            .collect()
    }

    /// Logged-in clients not currently playing, who follow lobby changes
    pub fn lobby_audience(&self) -> Vec<(ConnectionId, SocketAddr)> {
        self.clients
            .values()
            .filter(|c| c.user.is_some() && c.session.is_none())
            .map(|c| (c.id, c.addr))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
