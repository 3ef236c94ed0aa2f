//! Turn rotation
//!
//! Turn order is seat order. Seat ids never change when someone leaves;
//! departed seats are simply skipped.

use shared::{PlayerId, Session};

/// Returns the next seat after `current` that has not left, wrapping around.
///
/// `None` when every other seat has left. Pure: never touches the session.
pub fn next_eligible_player(current: PlayerId, session: &Session) -> Option<PlayerId> {
    let players = &session.players;
    if players.is_empty() {
        return None;
    }

    let start = players
        .iter()
        .position(|p| p.id == current)
        .map(|i| i + 1)
        .unwrap_or(0);

    (0..players.len())
        .map(|offset| &players[(start + offset) % players.len()])
        .find(|p| p.id != current && !p.has_left)
        .map(|p| p.id)
}
