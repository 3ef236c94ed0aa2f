//! Server network layer handling UDP communications and session fan-out

use crate::actor::SessionUpdate;
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::error::GameError;
use crate::registry::SessionRegistry;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ConnectionId, LobbySummary, Packet, Session, SessionId, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: ConnectionId,
        session: Option<SessionId>,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Same packet to several clients
    Multicast {
        packet: Packet,
        addrs: Vec<SocketAddr>,
    },
}

/// Main server coordinating networking and the session registry
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    registry: SessionRegistry,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
    update_rx: mpsc::UnboundedReceiver<SessionUpdate>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout,
            ))),
            registry: SessionRegistry::new(&config, update_tx),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
            update_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 8192];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::Multicast { packet, addrs } => {
                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client in timed_out {
                    let message = ServerMessage::ClientTimeout {
                        client_id: client.id,
                        session: client.session,
                    };
                    if let Err(e) = server_tx.send(message) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn multicast(&self, packet: Packet, addrs: Vec<SocketAddr>) {
        if addrs.is_empty() {
            return;
        }
        if let Err(e) = self.game_tx.send(GameMessage::Multicast { packet, addrs }) {
            error!("Failed to queue multicast packet: {}", e);
        }
    }

    /// Sends a rejection to the originating client only
    fn reject(&self, error: &GameError, addr: SocketAddr) {
        let packet = Packet::Rejected {
            code: error.code(),
            message: error.to_string(),
        };
        self.send_packet(packet, addr);
    }

    async fn send_to_clients(&self, packet: Packet, client_ids: &[ConnectionId]) {
        let addrs = {
            let clients = self.clients.read().await;
            clients.addrs_of(client_ids)
        };
        self.multicast(packet, addrs.into_iter().map(|(_, addr)| addr).collect());
    }

    /// Tells every idle logged-in client about the current lobbies
    async fn broadcast_lobbies(&self) {
        let addrs = {
            let clients = self.clients.read().await;
            clients.lobby_audience()
        };
        let packet = Packet::Lobbies {
            lobbies: self.registry.lobbies(),
        };
        self.multicast(packet, addrs.into_iter().map(|(_, addr)| addr).collect());
    }

    async fn publish_lobby(&self, lobby: LobbySummary) {
        let members = self
            .registry
            .lobby(lobby.id)
            .map(|l| l.connections())
            .unwrap_or_default();
        self.send_to_clients(Packet::LobbyState { lobby }, &members)
            .await;
        self.broadcast_lobbies().await;
    }

    /// Full-snapshot broadcast to every seat still in the session
    async fn broadcast_session(&mut self, session: Session) {
        let id = session.id;
        let ended = session.is_ended();
        let participants = session.active_connections();

        self.send_to_clients(Packet::SessionState { session }, &participants)
            .await;

        if ended {
            self.registry.destroy_session(id);
            let mut clients = self.clients.write().await;
            clients.clear_session(id);
        }
    }

    /// Drops a client from its lobby and session
    async fn release_client(&mut self, client_id: ConnectionId, session: Option<SessionId>) {
        if !self.registry.leave_lobby(client_id).is_empty() {
            self.broadcast_lobbies().await;
        }

        let Some(handle) = session.and_then(|id| self.registry.get_session(id)) else {
            return;
        };
        let session_id = handle.id();

        // Queued here so later packets from this client reach the session after it.
        // Only the wait runs apart, since it may sit behind a pending resolution.
        match handle.queue_departure(client_id) {
            Ok(departure) => {
                tokio::spawn(async move {
                    if let Err(e) = departure.await {
                        debug!(
                            "Departure of client {} from session {}: {}",
                            client_id, session_id, e
                        );
                    }
                });
            }
            Err(e) => debug!(
                "Departure of client {} from session {}: {}",
                client_id, session_id, e
            ),
        }
    }

    /// Processes an incoming packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { client_version } = packet {
            self.handle_connect(client_version, addr).await;
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            let client_id = clients.find_client_by_addr(addr);
            if let Some(id) = client_id {
                clients.touch(id);
            }
            client_id
        };
        let Some(client_id) = client_id else {
            warn!("Packet from unconnected address {}", addr);
            return;
        };

        if let Err(e) = self.dispatch(client_id, packet, addr).await {
            self.reject(&e, addr);
        }
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            let response = Packet::Disconnected {
                reason: "Protocol version mismatch".to_string(),
            };
            self.send_packet(response, addr);
            return;
        }

        // Remove existing connection if present
        let existing = {
            let mut clients = self.clients.write().await;
            clients
                .find_client_by_addr(addr)
                .and_then(|id| clients.remove_client(&id))
        };
        if let Some(client) = existing {
            info!("Removing existing client {} from {}", client.id, addr);
            self.release_client(client.id, client.session).await;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr)
        };

        let response = match client_id {
            Some(client_id) => Packet::Connected { client_id },
            None => Packet::Disconnected {
                reason: "Server full".to_string(),
            },
        };
        self.send_packet(response, addr);
    }

    async fn dispatch(
        &mut self,
        client_id: ConnectionId,
        packet: Packet,
        addr: SocketAddr,
    ) -> Result<(), GameError> {
        match packet {
            Packet::Heartbeat => {}

            Packet::Login { user } => {
                self.clients.write().await.set_user(client_id, user);
                let lobbies = self.registry.lobbies();
                self.send_packet(Packet::Lobbies { lobbies }, addr);
            }

            Packet::CreateLobby { board_id, capacity } => {
                let user = self.idle_user(client_id).await?;
                let lobby = self
                    .registry
                    .create_lobby(user, client_id, board_id, capacity)?;
                self.publish_lobby(lobby).await;
            }

            Packet::JoinLobby { session_id } => {
                let user = self.idle_user(client_id).await?;
                let lobby = self.registry.join_lobby(session_id, user, client_id)?;
                self.publish_lobby(lobby).await;
            }

            Packet::SetReady { session_id, ready } => {
                let lobby = self.registry.set_ready(session_id, client_id, ready)?;
                self.publish_lobby(lobby).await;
            }

            Packet::LeaveLobby => {
                if !self.registry.leave_lobby(client_id).is_empty() {
                    self.broadcast_lobbies().await;
                }
            }

            Packet::StartSession { session_id } => {
                let session = self.registry.start_session(session_id, client_id)?;
                let participants = session.active_connections();
                {
                    let mut clients = self.clients.write().await;
                    for id in &participants {
                        clients.set_session(*id, Some(session_id));
                    }
                }
                // A player sits in one game at a time; drop their other lobbies.
                for id in &participants {
                    self.registry.leave_lobby(*id);
                }
                self.send_to_clients(Packet::SessionState { session }, &participants)
                    .await;
                self.broadcast_lobbies().await;
            }

            Packet::FlipCard {
                session_id,
                card_id,
            } => {
                let handle = self
                    .registry
                    .get_session(session_id)
                    .ok_or(GameError::UnknownSession(session_id))?;
                handle.play(card_id, client_id).await?;
            }

            Packet::LeaveSession { session_id } => {
                if self.registry.get_session(session_id).is_none() {
                    return Err(GameError::UnknownSession(session_id));
                }
                let seated = {
                    let clients = self.clients.read().await;
                    clients.get(client_id).and_then(|c| c.session)
                };
                if seated != Some(session_id) {
                    return Err(GameError::UnknownActor);
                }
                self.clients.write().await.set_session(client_id, None);
                self.release_client(client_id, Some(session_id)).await;
            }

            Packet::Disconnect => {
                let removed = self.clients.write().await.remove_client(&client_id);
                if let Some(client) = removed {
                    self.release_client(client.id, client.session).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
        Ok(())
    }

    /// Identity of a logged-in client that is not seated in a running session
    async fn idle_user(&self, client_id: ConnectionId) -> Result<shared::UserRef, GameError> {
        let clients = self.clients.read().await;
        let client = clients.get(client_id).ok_or(GameError::NotLoggedIn)?;
        let user = client.user.clone().ok_or(GameError::NotLoggedIn)?;
        if client.session.is_some() {
            return Err(GameError::Lobby(
                "Finish or leave your current game first".to_string(),
            ));
        }
        Ok(user)
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id, session }) => {
                            info!("Client {} timed out", client_id);
                            self.release_client(client_id, session).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Fan out session changes
                Some(update) = self.update_rx.recv() => {
                    self.broadcast_session(update.session).await;
                },
            }
        }

        Ok(())
    }
}
