//! Session registry
//!
//! Owns the mapping from session id to live session task, and the pending
//! lobbies sessions are promoted from. A lobby and the session it becomes
//! share the same id. There is at most one live session per id.

use crate::actor::{SessionActor, SessionHandle, SessionUpdate};
use crate::board::BoardGenerator;
use crate::config::ServerConfig;
use crate::engine;
use crate::error::GameError;
use log::{debug, info};
use shared::{
    BoardSize, ConnectionId, LobbySummary, Session, SessionId, UserRef, MAX_PLAYERS, MIN_PLAYERS,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// A seat in a lobby that has not started yet
#[derive(Debug, Clone)]
pub struct LobbySeat {
    pub user: UserRef,
    pub connection: ConnectionId,
    pub ready: bool,
}

/// A lobby waiting for its creator to start the game
#[derive(Debug, Clone)]
pub struct PendingSession {
    pub id: SessionId,
    pub board_size: BoardSize,
    pub capacity: u8,
    /// First seat is the creator
    pub seats: Vec<LobbySeat>,
}

impl PendingSession {
    pub fn creator(&self) -> &LobbySeat {
        &self.seats[0]
    }

    pub fn connections(&self) -> Vec<ConnectionId> {
        self.seats.iter().map(|s| s.connection).collect()
    }

    pub fn summary(&self) -> LobbySummary {
        LobbySummary {
            id: self.id,
            creator: self.creator().user.clone(),
            board_size: self.board_size,
            capacity: self.capacity,
            players: self
                .seats
                .iter()
                .map(|s| (s.user.clone(), s.ready))
                .collect(),
        }
    }
}

pub struct SessionRegistry {
    lobbies: HashMap<SessionId, PendingSession>,
    sessions: HashMap<SessionId, SessionHandle>,
    next_id: SessionId,
    generator: BoardGenerator,
    resolution_delay: Duration,
    updates: mpsc::UnboundedSender<SessionUpdate>,
}

impl SessionRegistry {
    pub fn new(config: &ServerConfig, updates: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        let generator = match config.seed {
            Some(seed) => BoardGenerator::seeded(seed, config.value_universe),
            None => BoardGenerator::new(config.value_universe),
        };
        Self {
            lobbies: HashMap::new(),
            sessions: HashMap::new(),
            next_id: 1,
            generator,
            resolution_delay: config.resolution_delay,
            updates,
        }
    }

    pub fn create_lobby(
        &mut self,
        user: UserRef,
        connection: ConnectionId,
        board_id: u8,
        capacity: u8,
    ) -> Result<LobbySummary, GameError> {
        let board_size = BoardSize::from_id(board_id)
            .ok_or_else(|| GameError::Configuration(format!("unknown board id {}", board_id)))?;
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&(capacity as usize)) {
            return Err(GameError::Lobby(format!(
                "A game needs between {} and {} players",
                MIN_PLAYERS, MAX_PLAYERS
            )));
        }

        let id = self.next_id;
        self.next_id += 1;
        let lobby = PendingSession {
            id,
            board_size,
            capacity,
            seats: vec![LobbySeat {
                user,
                connection,
                ready: false,
            }],
        };
        let summary = lobby.summary();
        self.lobbies.insert(id, lobby);

        info!("Lobby {} created by connection {}", id, connection);
        Ok(summary)
    }

    pub fn join_lobby(
        &mut self,
        id: SessionId,
        user: UserRef,
        connection: ConnectionId,
    ) -> Result<LobbySummary, GameError> {
        let lobby = self
            .lobbies
            .get_mut(&id)
            .ok_or(GameError::UnknownSession(id))?;

        if lobby.creator().user == user {
            return Err(GameError::Lobby(
                "You cannot join a game you created".to_string(),
            ));
        }
        if lobby
            .seats
            .iter()
            .any(|s| s.user == user || s.connection == connection)
        {
            return Err(GameError::Lobby("You already joined this game".to_string()));
        }
        if lobby.seats.len() >= lobby.capacity as usize {
            return Err(GameError::Lobby("Lobby is full".to_string()));
        }

        lobby.seats.push(LobbySeat {
            user,
            connection,
            ready: false,
        });
        debug!("Connection {} joined lobby {}", connection, id);
        Ok(lobby.summary())
    }

    pub fn set_ready(
        &mut self,
        id: SessionId,
        connection: ConnectionId,
        ready: bool,
    ) -> Result<LobbySummary, GameError> {
        let lobby = self
            .lobbies
            .get_mut(&id)
            .ok_or(GameError::UnknownSession(id))?;
        let seat = lobby
            .seats
            .iter_mut()
            .find(|s| s.connection == connection)
            .ok_or(GameError::UnknownActor)?;

        seat.ready = ready;
        Ok(lobby.summary())
    }

    /// Removes `connection` from every lobby. Lobbies it created are deleted.
    /// Returns the ids of the lobbies that changed.
    pub fn leave_lobby(&mut self, connection: ConnectionId) -> Vec<SessionId> {
        let mut changed = Vec::new();

        self.lobbies.retain(|id, lobby| {
            if lobby.creator().connection == connection {
                info!("Lobby {} removed, its creator left", id);
                changed.push(*id);
                return false;
            }
            let before = lobby.seats.len();
            lobby.seats.retain(|s| s.connection != connection);
            if lobby.seats.len() != before {
                changed.push(*id);
            }
            true
        });

        changed
    }

    pub fn lobby(&self, id: SessionId) -> Option<&PendingSession> {
        self.lobbies.get(&id)
    }

    pub fn lobbies(&self) -> Vec<LobbySummary> {
        let mut lobbies: Vec<LobbySummary> =
            self.lobbies.values().map(PendingSession::summary).collect();
        lobbies.sort_by_key(|l| l.id);
        lobbies
    }

    /// Promotes a lobby to a live session once the roster is valid: at least
    /// two players, everyone but the creator ready, started by the creator.
    pub fn start_session(
        &mut self,
        id: SessionId,
        connection: ConnectionId,
    ) -> Result<Session, GameError> {
        let lobby = self.lobbies.get(&id).ok_or(GameError::UnknownSession(id))?;

        if lobby.creator().connection != connection {
            return Err(GameError::Lobby(
                "Only the creator can start the game".to_string(),
            ));
        }
        if lobby.seats.len() < MIN_PLAYERS {
            return Err(GameError::Lobby(format!(
                "At least {} players are needed",
                MIN_PLAYERS
            )));
        }
        if lobby.seats.iter().skip(1).any(|s| !s.ready) {
            return Err(GameError::Lobby("Not every player is ready".to_string()));
        }

        let roster = lobby
            .seats
            .iter()
            .map(|s| (s.user.clone(), s.connection))
            .collect();
        let board_size = lobby.board_size;
        let session = self.create_session(id, roster, board_size)?;
        self.lobbies.remove(&id);
        Ok(session)
    }

    /// Builds, deals and spawns a session. Nothing is registered on failure.
    pub fn create_session(
        &mut self,
        id: SessionId,
        roster: Vec<(UserRef, ConnectionId)>,
        board_size: BoardSize,
    ) -> Result<Session, GameError> {
        if self.sessions.contains_key(&id) {
            return Err(GameError::Lobby(format!("Session {} is already running", id)));
        }

        let mut session = Session::new(id, board_size, roster);
        for player in session.players.iter_mut() {
            player.is_ready = true;
        }
        engine::initialize(&mut session, &mut self.generator)?;

        let handle = SessionActor::spawn(
            session.clone(),
            self.resolution_delay,
            self.updates.clone(),
        );
        self.sessions.insert(id, handle);
        self.next_id = self.next_id.max(id + 1);
        Ok(session)
    }

    pub fn get_session(&self, id: SessionId) -> Option<&SessionHandle> {
        self.sessions.get(&id)
    }

    /// Drops the registry's handle; the session task stops once in-flight
    /// callers release theirs.
    pub fn destroy_session(&mut self, id: SessionId) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if removed {
            info!("Session {} destroyed", id);
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
