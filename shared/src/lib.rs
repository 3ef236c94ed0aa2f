use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Protocol version a client must announce in `Packet::Connect`.
pub const PROTOCOL_VERSION: u32 = 1;
/// Pause between the second flip of a turn and its match/mismatch commit.
pub const RESOLUTION_DELAY: Duration = Duration::from_secs(1);
/// Default size of the candidate value pool cards are drawn from.
pub const VALUE_UNIVERSE: u8 = 40;
pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 4;

/// Seat number inside one session. Stable for the lifetime of the session.
pub type PlayerId = u32;
/// Position of a card on the board.
pub type CardId = usize;
pub type SessionId = u32;
/// Server-assigned id of a live client connection.
pub type ConnectionId = u32;

/// Stable identity of an authenticated user, supplied on login.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct UserRef {
    pub id: u64,
    pub name: String,
}

impl UserRef {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

/// The three supported board geometries.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardSize {
    Small,
    Medium,
    Large,
}

impl BoardSize {
    pub const ALL: [BoardSize; 3] = [BoardSize::Small, BoardSize::Medium, BoardSize::Large];

    /// Maps a wire board id onto a geometry.
    pub fn from_id(board_id: u8) -> Option<Self> {
        match board_id {
            1 => Some(BoardSize::Small),
            2 => Some(BoardSize::Medium),
            3 => Some(BoardSize::Large),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            BoardSize::Small => 1,
            BoardSize::Medium => 2,
            BoardSize::Large => 3,
        }
    }

    /// `(rows, cols)` of the board.
    pub fn geometry(self) -> (usize, usize) {
        match self {
            BoardSize::Small => (4, 3),
            BoardSize::Medium => (4, 4),
            BoardSize::Large => (6, 6),
        }
    }

    pub fn card_count(self) -> usize {
        let (rows, cols) = self.geometry();
        rows * cols
    }

    pub fn pair_count(self) -> usize {
        self.card_count() / 2
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub value: u8,
    pub is_revealed: bool,
    pub is_matched: bool,
    /// Last player who flipped this card.
    pub owner: Option<PlayerId>,
}

impl Card {
    pub fn new(id: CardId, value: u8) -> Self {
        Self {
            id,
            value,
            is_revealed: false,
            is_matched: false,
            owner: None,
        }
    }

    /// A card can be flipped only while it is face down and unmatched.
    pub fn is_available(&self) -> bool {
        !self.is_revealed && !self.is_matched
    }
}

/// A seat in a running session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub user: UserRef,
    pub connection: ConnectionId,
    pub pairs_won: u32,
    pub has_left: bool,
    pub is_ready: bool,
}

impl Player {
    pub fn new(id: PlayerId, user: UserRef, connection: ConnectionId) -> Self {
        Self {
            id,
            user,
            connection,
            pairs_won: 0,
            has_left: false,
            is_ready: false,
        }
    }
}

/// Moves forward only: `InProgress -> WinDeclared -> Ended` or `InProgress -> Ended`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    InProgress,
    WinDeclared,
    Ended,
}

/// Sub-state of the current turn.
///
/// `AwaitingSecondFlip` and `Resolving` are exactly the phases in which
/// `Session::first_flipped` is set.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingFirstFlip,
    AwaitingSecondFlip,
    Resolving,
    Ended,
}

/// Full authoritative state of one match. Broadcast whole on every change.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub board_size: BoardSize,
    pub board: Vec<Card>,
    /// Seats in turn order.
    pub players: Vec<Player>,
    pub current_player: PlayerId,
    pub phase: TurnPhase,
    pub first_flipped: Option<CardId>,
    pub second_flipped: Option<CardId>,
    pub total_pairs: u32,
    pub pairs_remaining: u32,
    pub active_players: u32,
    pub status: SessionStatus,
    /// Provisional while `WinDeclared`, final once `Ended`. `None` at the end means a draw.
    pub winner: Option<PlayerId>,
}

impl Session {
    /// Builds an unstarted session from a roster. Seats are numbered 1..=N in roster order.
    pub fn new(id: SessionId, board_size: BoardSize, roster: Vec<(UserRef, ConnectionId)>) -> Self {
        let players: Vec<Player> = roster
            .into_iter()
            .enumerate()
            .map(|(i, (user, connection))| Player::new(i as PlayerId + 1, user, connection))
            .collect();
        let total_pairs = board_size.pair_count() as u32;

        Self {
            id,
            board_size,
            board: Vec::new(),
            active_players: players.len() as u32,
            players,
            current_player: 1,
            phase: TurnPhase::AwaitingFirstFlip,
            first_flipped: None,
            second_flipped: None,
            total_pairs,
            pairs_remaining: total_pairs,
            status: SessionStatus::InProgress,
            winner: None,
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn player_by_connection(&self, connection: ConnectionId) -> Option<&Player> {
        self.players.iter().find(|p| p.connection == connection)
    }

    pub fn card(&self, id: CardId) -> Option<&Card> {
        self.board.get(id)
    }

    pub fn card_mut(&mut self, id: CardId) -> Option<&mut Card> {
        self.board.get_mut(id)
    }

    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }

    /// Connections of every seat that has not left, for broadcasting.
    pub fn active_connections(&self) -> Vec<ConnectionId> {
        self.players
            .iter()
            .filter(|p| !p.has_left)
            .map(|p| p.connection)
            .collect()
    }

    pub fn pairs_won_total(&self) -> u32 {
        self.players.iter().map(|p| p.pairs_won).sum()
    }

    /// Checks that the turn phase agrees with the pending-flip bookkeeping.
    pub fn phase_consistent(&self) -> bool {
        match self.phase {
            TurnPhase::AwaitingFirstFlip => {
                self.first_flipped.is_none() && self.second_flipped.is_none()
            }
            TurnPhase::AwaitingSecondFlip => {
                self.first_flipped.is_some() && self.second_flipped.is_none()
            }
            TurnPhase::Resolving => self.first_flipped.is_some() && self.second_flipped.is_some(),
            TurnPhase::Ended => self.status == SessionStatus::Ended,
        }
    }
}

/// Public view of a lobby that has not started yet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LobbySummary {
    pub id: SessionId,
    pub creator: UserRef,
    pub board_size: BoardSize,
    pub capacity: u8,
    pub players: Vec<(UserRef, bool)>,
}

/// Stable codes for rejected requests.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotYourTurn = 5,
    UnknownActor = 6,
    UnknownCard = 7,
    CardUnavailable = 8,
    ResolutionPending = 9,
    SessionEnded = 10,
    UnknownSession = 11,
    Configuration = 12,
    Lobby = 13,
    NotLoggedIn = 14,
    Internal = 99,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Heartbeat,
    Login {
        user: UserRef,
    },
    CreateLobby {
        board_id: u8,
        capacity: u8,
    },
    JoinLobby {
        session_id: SessionId,
    },
    SetReady {
        session_id: SessionId,
        ready: bool,
    },
    LeaveLobby,
    StartSession {
        session_id: SessionId,
    },
    FlipCard {
        session_id: SessionId,
        card_id: CardId,
    },
    LeaveSession {
        session_id: SessionId,
    },
    Disconnect,

    Connected {
        client_id: ConnectionId,
    },
    Lobbies {
        lobbies: Vec<LobbySummary>,
    },
    LobbyState {
        lobby: LobbySummary,
    },
    SessionState {
        session: Session,
    },
    Rejected {
        code: ErrorCode,
        message: String,
    },
    Disconnected {
        reason: String,
    },
}
