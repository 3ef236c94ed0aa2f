//! Player departures from a running session
//!
//! A departure is either a voluntary leave or a lost connection; both are
//! handled the same way. The departed seat keeps its id and its pairs, it is
//! only skipped by rotation from then on.

use crate::engine::{clear_turn, end_session};
use crate::error::GameError;
use crate::rotation::next_eligible_player;
use log::{error, info, warn};
use shared::{ConnectionId, PlayerId, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Play goes on with `current_player` holding the turn
    Continued {
        player: PlayerId,
        current_player: PlayerId,
    },
    /// The session is over, either because of this departure or before it
    Ended {
        player: PlayerId,
        winner: Option<PlayerId>,
    },
}

/// Marks the seat owned by `connection` as departed and keeps the turn
/// state consistent. A seat that already left is reported as unknown.
pub fn handle_departure(
    session: &mut Session,
    connection: ConnectionId,
) -> Result<Departure, GameError> {
    let player_id = session
        .players
        .iter()
        .find(|p| p.connection == connection && !p.has_left)
        .map(|p| p.id)
        .ok_or(GameError::UnknownActor)?;

    if let Some(player) = session.player_mut(player_id) {
        player.has_left = true;
    }
    session.active_players = session.active_players.saturating_sub(1);
    info!(
        "Session {}: player {} left ({} still playing)",
        session.id, player_id, session.active_players
    );

    if session.is_ended() {
        return Ok(Departure::Ended {
            player: player_id,
            winner: session.winner,
        });
    }

    let was_current = session.current_player == player_id;
    if was_current && session.first_flipped.is_some() {
        hide_pending_flips(session);
    }

    match session.active_players {
        0 => end_session(session, None),
        1 => {
            let sole = session.players.iter().find(|p| !p.has_left).map(|p| p.id);
            end_session(session, sole);
        }
        _ => {
            let holder_left = session
                .player(session.current_player)
                .map(|p| p.has_left)
                .unwrap_or(true);
            if holder_left {
                if !was_current {
                    warn!(
                        "Session {}: turn holder {} had already left",
                        session.id, session.current_player
                    );
                }
                match next_eligible_player(session.current_player, session) {
                    Some(next) => session.current_player = next,
                    None => {
                        error!(
                            "Session {}: invariant violated, {} players active but none eligible",
                            session.id, session.active_players
                        );
                        let winner = last_opponent(session, player_id);
                        end_session(session, winner);
                    }
                }
            }
        }
    }

    if session.is_ended() {
        Ok(Departure::Ended {
            player: player_id,
            winner: session.winner,
        })
    } else {
        Ok(Departure::Continued {
            player: player_id,
            current_player: session.current_player,
        })
    }
}

/// Turns the orphaned half-played cards face down again
fn hide_pending_flips(session: &mut Session) {
    for id in [session.first_flipped, session.second_flipped]
        .into_iter()
        .flatten()
    {
        if let Some(card) = session.card_mut(id) {
            card.is_revealed = false;
        }
    }
    clear_turn(session);
}

/// Seat that played immediately before `player` in turn order
fn last_opponent(session: &Session, player: PlayerId) -> Option<PlayerId> {
    let index = session.players.iter().position(|p| p.id == player)?;
    let count = session.players.len();
    if count < 2 {
        return None;
    }
    Some(session.players[(index + count - 1) % count].id)
}
