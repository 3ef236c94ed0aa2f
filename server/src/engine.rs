//! Turn engine: the authoritative state machine of a running session
//!
//! A turn is two flips by the current player. The first flip only reveals a
//! card. The second flip reveals another and moves the session into
//! `TurnPhase::Resolving`; the caller then waits for the resolution delay
//! and calls [`resolve`], which commits the match or mismatch.
//!
//! Every function here either fully applies its change or returns an error
//! without touching the session.

use crate::board::BoardGenerator;
use crate::error::GameError;
use crate::rotation::next_eligible_player;
use log::{debug, error, info};
use shared::{CardId, ConnectionId, PlayerId, Session, SessionStatus, TurnPhase};

/// Result of an accepted flip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// First card of the turn is face up
    FirstFlip,
    /// Both cards are face up and a resolution is due
    SecondFlip,
}

/// What a resolution committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Pair matched; the same player keeps the turn
    Matched { player: PlayerId },
    /// Pair hidden again; `None` when nobody was left to take the turn
    Mismatched { next_player: Option<PlayerId> },
}

/// Deals a fresh board and resets the turn state.
///
/// The board is generated before anything is written, so a configuration
/// error leaves the session exactly as it was.
pub fn initialize(session: &mut Session, generator: &mut BoardGenerator) -> Result<(), GameError> {
    let board = generator.create_board(session.board_size)?;

    session.total_pairs = (board.len() / 2) as u32;
    session.pairs_remaining = session.total_pairs;
    session.board = board;
    session.status = SessionStatus::InProgress;
    session.phase = TurnPhase::AwaitingFirstFlip;
    session.first_flipped = None;
    session.second_flipped = None;
    session.winner = None;
    session.current_player = session.players.first().map(|p| p.id).unwrap_or(1);
    session.active_players = session.players.iter().filter(|p| !p.has_left).count() as u32;
    for player in session.players.iter_mut() {
        player.pairs_won = 0;
    }

    info!(
        "Session {} started: {} players, {} pairs",
        session.id, session.active_players, session.total_pairs
    );
    Ok(())
}

/// Flips `card_id` on behalf of whoever owns `connection`.
///
/// The acting seat is always re-resolved from the connection; callers never
/// pass a player id in.
pub fn play(
    session: &mut Session,
    card_id: CardId,
    connection: ConnectionId,
) -> Result<PlayOutcome, GameError> {
    debug_assert!(session.phase_consistent());

    let player_id = session
        .player_by_connection(connection)
        .filter(|p| !p.has_left)
        .map(|p| p.id)
        .ok_or(GameError::UnknownActor)?;

    if session.is_ended() {
        return Err(GameError::SessionEnded);
    }
    if player_id != session.current_player {
        return Err(GameError::NotYourTurn);
    }
    if session.phase == TurnPhase::Resolving {
        return Err(GameError::ResolutionPending);
    }

    let card = session
        .card_mut(card_id)
        .ok_or(GameError::UnknownCard(card_id))?;
    if !card.is_available() {
        return Err(GameError::CardUnavailable(card_id));
    }
    card.owner = Some(player_id);
    card.is_revealed = true;

    let outcome = match session.first_flipped {
        None => {
            session.first_flipped = Some(card_id);
            session.phase = TurnPhase::AwaitingSecondFlip;
            PlayOutcome::FirstFlip
        }
        Some(_) => {
            session.second_flipped = Some(card_id);
            session.phase = TurnPhase::Resolving;
            PlayOutcome::SecondFlip
        }
    };

    debug!(
        "Session {}: player {} flipped card {} ({:?})",
        session.id, player_id, card_id, outcome
    );
    debug_assert!(session.phase_consistent());
    Ok(outcome)
}

/// Commits the pending pair. Returns `None` when nothing is pending, which
/// makes a late timer firing on an ended session harmless.
pub fn resolve(session: &mut Session) -> Option<Resolution> {
    debug_assert!(session.phase_consistent());
    if session.is_ended() || session.phase != TurnPhase::Resolving {
        return None;
    }

    let (first, second) = match (session.first_flipped, session.second_flipped) {
        (Some(first), Some(second)) => (first, second),
        _ => {
            error!(
                "Session {}: resolving without two flipped cards, resetting turn",
                session.id
            );
            clear_turn(session);
            return None;
        }
    };

    let current = session.current_player;
    let matched = match (session.card(first), session.card(second)) {
        (Some(a), Some(b)) => a.value == b.value,
        _ => false,
    };
    clear_turn(session);

    let resolution = if matched {
        for id in [first, second] {
            if let Some(card) = session.card_mut(id) {
                card.is_matched = true;
            }
        }
        session.pairs_remaining = session.pairs_remaining.saturating_sub(1);

        let pairs_won = match session.player_mut(current) {
            Some(player) => {
                player.pairs_won += 1;
                player.pairs_won
            }
            None => 0,
        };
        info!(
            "Session {}: player {} matched a pair ({} won, {} left)",
            session.id, current, pairs_won, session.pairs_remaining
        );

        if pairs_won == session.total_pairs / 2 && session.status == SessionStatus::InProgress {
            session.status = SessionStatus::WinDeclared;
            session.winner = Some(current);
            info!("Session {}: player {} declared winner", session.id, current);
        }
        Resolution::Matched { player: current }
    } else {
        for id in [first, second] {
            if let Some(card) = session.card_mut(id) {
                card.is_revealed = false;
            }
        }

        match next_eligible_player(current, session) {
            Some(next) => {
                debug!(
                    "Session {}: mismatch, turn passes {} -> {}",
                    session.id, current, next
                );
                session.current_player = next;
                Resolution::Mismatched {
                    next_player: Some(next),
                }
            }
            None => {
                end_session(session, Some(current));
                Resolution::Mismatched { next_player: None }
            }
        }
    };

    if session.pairs_remaining == 0 && !session.is_ended() {
        let winner = match session.status {
            SessionStatus::WinDeclared => session.winner,
            _ => leader(session),
        };
        end_session(session, winner);
    }

    debug_assert!(session.phase_consistent());
    Some(resolution)
}

/// Forces the session into its terminal state
pub(crate) fn end_session(session: &mut Session, winner: Option<PlayerId>) {
    session.status = SessionStatus::Ended;
    session.phase = TurnPhase::Ended;
    session.first_flipped = None;
    session.second_flipped = None;
    session.winner = winner;

    match winner {
        Some(id) => info!("Session {} ended, winner: player {}", session.id, id),
        None => info!("Session {} ended in a draw", session.id),
    }
}

/// Seat with strictly the most pairs among those still playing, `None` on a tie
pub(crate) fn leader(session: &Session) -> Option<PlayerId> {
    let best = session
        .players
        .iter()
        .filter(|p| !p.has_left)
        .map(|p| p.pairs_won)
        .max()?;
    let mut leaders = session
        .players
        .iter()
        .filter(|p| !p.has_left && p.pairs_won == best);

    match (leaders.next(), leaders.next()) {
        (Some(player), None) => Some(player.id),
        _ => None,
    }
}

pub(crate) fn clear_turn(session: &mut Session) {
    session.first_flipped = None;
    session.second_flipped = None;
    session.phase = TurnPhase::AwaitingFirstFlip;
}
