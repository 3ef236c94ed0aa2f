//! Integration tests for the pairs game server
//!
//! These tests drive whole games through the public server API and exercise
//! a live UDP server end to end.

use bincode::{deserialize, serialize};
use server::board::BoardGenerator;
use server::engine::{initialize, play, resolve, PlayOutcome, Resolution};
use server::lifecycle::{handle_departure, Departure};
use server::rotation::next_eligible_player;
use shared::{
    BoardSize, CardId, ConnectionId, ErrorCode, Packet, Session, SessionStatus, TurnPhase, UserRef,
};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests that a full session snapshot survives the wire
    #[test]
    fn session_state_roundtrip() {
        let session = started_session(3, BoardSize::Medium, 8);
        let packet = Packet::SessionState {
            session: session.clone(),
        };

        let serialized = serialize(&packet).unwrap();
        match deserialize::<Packet>(&serialized).unwrap() {
            Packet::SessionState { session: received } => assert_eq!(received, session),
            _ => panic!("Packet type mismatch after serialization"),
        }
    }

    /// Tests malformed packet handling
    #[test]
    fn malformed_packet_handling() {
        let valid_packet = Packet::FlipCard {
            session_id: 1,
            card_id: 3,
        };
        let valid_data = serialize(&valid_packet).unwrap();

        let truncated_data = &valid_data[..valid_data.len() / 2];
        let result: Result<Packet, _> = deserialize(truncated_data);
        assert!(
            result.is_err(),
            "Should fail to deserialize truncated packet"
        );

        let mut corrupted_data = valid_data.clone();
        corrupted_data[0] = 0xFF;
        let result: Result<Packet, _> = deserialize(&corrupted_data);
        assert!(
            result.is_err(),
            "Should fail to deserialize corrupted packet"
        );

        let empty_data = vec![];
        let result: Result<Packet, _> = deserialize(&empty_data);
        assert!(result.is_err(), "Should fail to deserialize empty packet");
    }
}

/// GAME FLOW TESTS
mod game_flow_tests {
    use super::*;

    /// Match keeps the turn, mismatch hides both cards and passes it on
    #[test]
    fn match_then_mismatch() {
        let mut session = started_session(2, BoardSize::Small, 1);
        assert_eq!(session.total_pairs, 6);

        let (a, b) = find_pair(&session, true);
        flip_pair(&mut session, 1, a, b);
        assert_eq!(
            resolve(&mut session),
            Some(Resolution::Matched { player: 1 })
        );
        assert_eq!(session.player(1).unwrap().pairs_won, 1);
        assert_eq!(session.pairs_remaining, 5);
        assert_eq!(session.current_player, 1);
        assert!(session.board[a].is_matched && session.board[b].is_matched);

        let (c, d) = find_pair(&session, false);
        flip_pair(&mut session, 1, c, d);
        assert_eq!(
            resolve(&mut session),
            Some(Resolution::Mismatched {
                next_player: Some(2)
            })
        );
        assert!(!session.board[c].is_revealed);
        assert!(!session.board[d].is_revealed);
        assert_eq!(session.current_player, 2);
        assert_eq!(session.phase, TurnPhase::AwaitingFirstFlip);
    }

    /// Reaching half the pairs declares a winner but the board plays out
    #[test]
    fn win_declared_then_board_cleared() {
        let mut session = started_session(2, BoardSize::Small, 2);

        for _ in 0..3 {
            let (a, b) = find_pair(&session, true);
            flip_pair(&mut session, 1, a, b);
            resolve(&mut session);
        }
        assert_eq!(session.status, SessionStatus::WinDeclared);
        assert_eq!(session.winner, Some(1));
        assert_eq!(session.pairs_remaining, 3);

        let (a, b) = find_pair(&session, false);
        flip_pair(&mut session, 1, a, b);
        resolve(&mut session);
        assert_eq!(session.current_player, 2);

        while session.pairs_remaining > 0 {
            let (a, b) = find_pair(&session, true);
            flip_pair(&mut session, 2, a, b);
            resolve(&mut session);
        }

        assert_eq!(session.status, SessionStatus::Ended);
        assert_eq!(session.phase, TurnPhase::Ended);
        assert_eq!(session.winner, Some(1));
        assert_eq!(session.player(2).unwrap().pairs_won, 3);
        assert_eq!(session.pairs_won_total(), session.total_pairs);
    }

    /// Losing the current player mid-turn hides their card and rotates
    #[test]
    fn current_player_lost_mid_turn() {
        let mut session = started_session(3, BoardSize::Small, 3);
        assert_eq!(play(&mut session, 0, 1), Ok(PlayOutcome::FirstFlip));

        let departure = handle_departure(&mut session, 1).unwrap();

        assert_eq!(
            departure,
            Departure::Continued {
                player: 1,
                current_player: 2
            }
        );
        assert!(!session.board[0].is_revealed);
        assert_eq!(session.active_players, 2);
        assert!(session.phase_consistent());
    }

    /// Down to one player the session ends with them as winner
    #[test]
    fn sole_survivor_wins() {
        let mut session = started_session(4, BoardSize::Large, 4);
        let (a, b) = find_pair(&session, true);
        flip_pair(&mut session, 1, a, b);
        resolve(&mut session);

        assert_ok!(handle_departure(&mut session, 1));
        assert_ok!(handle_departure(&mut session, 2));
        let departure = handle_departure(&mut session, 4).unwrap();

        assert_eq!(
            departure,
            Departure::Ended {
                player: 4,
                winner: Some(3)
            }
        );
        assert_eq!(session.status, SessionStatus::Ended);
        assert_eq!(session.pairs_remaining, 17);
        assert_eq!(play(&mut session, 0, 3), Err(server::error::GameError::SessionEnded));
    }

    /// Rotation skips departed seats and wraps around
    #[test]
    fn rotation_skips_departed() {
        let mut session = started_session(4, BoardSize::Small, 5);
        session.player_mut(3).unwrap().has_left = true;

        assert_eq!(next_eligible_player(2, &session), Some(4));
        assert_eq!(next_eligible_player(4, &session), Some(1));

        for id in [1, 3, 4] {
            session.player_mut(id).unwrap().has_left = true;
        }
        assert_eq!(next_eligible_player(2, &session), None);
    }

    /// Rejected flips leave the session untouched
    #[test]
    fn rejected_flips_do_not_mutate() {
        let mut session = started_session(2, BoardSize::Small, 6);
        assert_ok!(play(&mut session, 0, 1));
        let before = session.clone();

        assert_err!(play(&mut session, 1, 2));
        assert_err!(play(&mut session, 0, 1));
        assert_err!(play(&mut session, 500, 1));
        assert_err!(play(&mut session, 1, 99));
        assert_eq!(session, before);
    }
}

/// LIVE SERVER TESTS
mod server_tests {
    use super::*;
    use server::config::ServerConfig;
    use server::network::Server;
    use std::net::SocketAddr;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    async fn start_server() -> SocketAddr {
        let config = ServerConfig::default()
            .with_addr("127.0.0.1:0")
            .with_resolution_delay(Duration::from_millis(100))
            .with_seed(42);
        let mut server = Server::new(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    async fn send(socket: &UdpSocket, packet: Packet, server: SocketAddr) {
        socket
            .send_to(&serialize(&packet).unwrap(), server)
            .await
            .unwrap();
    }

    /// Reads packets until one matches, skipping unrelated broadcasts
    async fn recv_until<F>(socket: &UdpSocket, accept: F) -> Packet
    where
        F: Fn(&Packet) -> bool,
    {
        let mut buf = [0u8; 8192];
        loop {
            let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
                .await
                .expect("timed out waiting for packet")
                .unwrap();
            let packet: Packet = deserialize(&buf[..len]).unwrap();
            if accept(&packet) {
                return packet;
            }
        }
    }

    async fn recv_session<F>(socket: &UdpSocket, accept: F) -> Session
    where
        F: Fn(&Session) -> bool,
    {
        match recv_until(socket, |p| matches!(p, Packet::SessionState { session } if accept(session)))
            .await
        {
            Packet::SessionState { session } => session,
            _ => unreachable!(),
        }
    }

    async fn connect(server: SocketAddr, user: UserRef) -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        send(&socket, Packet::Connect { client_version: 1 }, server).await;
        recv_until(&socket, |p| matches!(p, Packet::Connected { .. })).await;
        send(&socket, Packet::Login { user }, server).await;
        recv_until(&socket, |p| matches!(p, Packet::Lobbies { .. })).await;
        socket
    }

    /// First socket hosts a small-board lobby, the rest join and ready up,
    /// then the host starts it
    async fn start_game(server: SocketAddr, players: &[&UdpSocket]) -> Session {
        let host = players[0];
        let capacity = players.len() as u8;
        send(host, Packet::CreateLobby { board_id: 1, capacity }, server).await;
        let session_id = match recv_until(host, |p| matches!(p, Packet::LobbyState { .. })).await {
            Packet::LobbyState { lobby } => lobby.id,
            _ => unreachable!(),
        };

        for guest in &players[1..] {
            send(guest, Packet::JoinLobby { session_id }, server).await;
            recv_until(guest, |p| matches!(p, Packet::LobbyState { .. })).await;
            send(guest, Packet::SetReady { session_id, ready: true }, server).await;
        }
        recv_until(host, |p| {
            matches!(p, Packet::LobbyState { lobby }
                if lobby.players.len() == players.len()
                    && lobby.players.iter().skip(1).all(|(_, ready)| *ready))
        })
        .await;

        send(host, Packet::StartSession { session_id }, server).await;
        let session = recv_session(host, |s| s.id == session_id).await;
        for guest in &players[1..] {
            recv_session(guest, |s| s.id == session_id).await;
        }
        session
    }

    async fn expect_rejection(socket: &UdpSocket) -> ErrorCode {
        match recv_until(socket, |p| matches!(p, Packet::Rejected { .. })).await {
            Packet::Rejected { code, .. } => code,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn version_mismatch_is_refused() {
        let server = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(&socket, Packet::Connect { client_version: 999 }, server).await;

        match recv_until(&socket, |_| true).await {
            Packet::Disconnected { reason } => assert!(reason.contains("version")),
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[tokio::test]
    async fn full_game_over_udp() {
        let server = start_server().await;
        let alice = connect(server, UserRef::new(1, "alice")).await;
        let bob = connect(server, UserRef::new(2, "bob")).await;

        send(&alice, Packet::CreateLobby { board_id: 1, capacity: 2 }, server).await;
        let session_id = match recv_until(&alice, |p| matches!(p, Packet::LobbyState { .. })).await
        {
            Packet::LobbyState { lobby } => lobby.id,
            _ => unreachable!(),
        };

        send(&bob, Packet::JoinLobby { session_id }, server).await;
        recv_until(&bob, |p| {
            matches!(p, Packet::LobbyState { lobby } if lobby.players.len() == 2)
        })
        .await;
        send(&bob, Packet::SetReady { session_id, ready: true }, server).await;
        recv_until(&alice, |p| {
            matches!(p, Packet::LobbyState { lobby } if lobby.players.iter().any(|(_, r)| *r))
        })
        .await;

        send(&alice, Packet::StartSession { session_id }, server).await;
        let session = recv_session(&alice, |s| s.status == SessionStatus::InProgress).await;
        recv_session(&bob, |s| s.id == session_id).await;
        assert_eq!(session.board.len(), 12);
        assert_eq!(session.current_player, 1);

        // Only the requester hears about a rejected flip.
        send(&bob, Packet::FlipCard { session_id, card_id: 0 }, server).await;
        match recv_until(&bob, |p| matches!(p, Packet::Rejected { .. })).await {
            Packet::Rejected { code, .. } => assert_eq!(code, ErrorCode::NotYourTurn),
            _ => unreachable!(),
        }

        let (a, b) = find_pair(&session, false);
        send(&alice, Packet::FlipCard { session_id, card_id: a }, server).await;
        recv_session(&alice, |s| s.phase == TurnPhase::AwaitingSecondFlip).await;
        send(&alice, Packet::FlipCard { session_id, card_id: b }, server).await;
        recv_session(&alice, |s| s.phase == TurnPhase::Resolving).await;

        let resolved = recv_session(&bob, |s| s.current_player == 2).await;
        assert!(!resolved.board[a].is_revealed);
        assert!(!resolved.board[b].is_revealed);

        send(&bob, Packet::Disconnect, server).await;
        let ended = recv_session(&alice, |s| s.status == SessionStatus::Ended).await;
        assert_eq!(ended.winner, Some(1));
        assert!(ended.player(2).unwrap().has_left);
        assert_eq!(ended.active_players, 1);
    }

    #[tokio::test]
    async fn flip_after_leaving_is_refused() {
        let server = start_server().await;
        let alice = connect(server, UserRef::new(1, "alice")).await;
        let bob = connect(server, UserRef::new(2, "bob")).await;
        let carol = connect(server, UserRef::new(3, "carol")).await;
        let session = start_game(server, &[&alice, &bob, &carol]).await;
        let session_id = session.id;

        let (a, b) = find_pair(&session, true);
        send(&alice, Packet::FlipCard { session_id, card_id: a }, server).await;
        recv_session(&alice, |s| s.phase == TurnPhase::AwaitingSecondFlip).await;

        send(&alice, Packet::LeaveSession { session_id }, server).await;
        send(&alice, Packet::FlipCard { session_id, card_id: b }, server).await;

        assert_eq!(expect_rejection(&alice).await, ErrorCode::UnknownActor);
        let after = recv_session(&bob, |s| s.player(1).map_or(false, |p| p.has_left)).await;
        assert_eq!(after.player(1).unwrap().pairs_won, 0);
        assert_eq!(after.pairs_remaining, 6);
        assert_eq!(after.current_player, 2);
        assert!(!after.board[a].is_revealed);
        assert!(!after.board[b].is_revealed);
    }

    #[tokio::test]
    async fn seated_player_cannot_enter_another_lobby() {
        let server = start_server().await;
        let alice = connect(server, UserRef::new(1, "alice")).await;
        let bob = connect(server, UserRef::new(2, "bob")).await;
        let carol = connect(server, UserRef::new(3, "carol")).await;
        let session = start_game(server, &[&alice, &bob]).await;

        send(&alice, Packet::CreateLobby { board_id: 1, capacity: 2 }, server).await;
        assert_eq!(expect_rejection(&alice).await, ErrorCode::Lobby);

        send(&carol, Packet::CreateLobby { board_id: 1, capacity: 2 }, server).await;
        let open_lobby = match recv_until(&carol, |p| matches!(p, Packet::LobbyState { .. })).await
        {
            Packet::LobbyState { lobby } => lobby.id,
            _ => unreachable!(),
        };
        send(&bob, Packet::JoinLobby { session_id: open_lobby }, server).await;
        assert_eq!(expect_rejection(&bob).await, ErrorCode::Lobby);

        // Losing the connection still reaches the game alice is seated in.
        send(&alice, Packet::Disconnect, server).await;
        let ended = recv_session(&bob, |s| s.status == SessionStatus::Ended).await;
        assert_eq!(ended.id, session.id);
        assert!(ended.player(1).unwrap().has_left);
        assert_eq!(ended.winner, Some(2));
    }

    #[tokio::test]
    async fn leaving_someone_elses_session_is_refused() {
        let server = start_server().await;
        let alice = connect(server, UserRef::new(1, "alice")).await;
        let bob = connect(server, UserRef::new(2, "bob")).await;
        let carol = connect(server, UserRef::new(3, "carol")).await;
        let dave = connect(server, UserRef::new(4, "dave")).await;
        let first = start_game(server, &[&alice, &bob]).await;
        let second = start_game(server, &[&carol, &dave]).await;

        send(&carol, Packet::LeaveSession { session_id: first.id }, server).await;
        assert_eq!(expect_rejection(&carol).await, ErrorCode::UnknownActor);

        // Carol is still tracked in her own game.
        send(&carol, Packet::Disconnect, server).await;
        let ended = recv_session(&dave, |s| s.status == SessionStatus::Ended).await;
        assert_eq!(ended.id, second.id);
        assert_eq!(ended.winner, Some(2));
    }
}

// HELPER FUNCTIONS

fn started_session(players: usize, board_size: BoardSize, seed: u64) -> Session {
    let roster = (1..=players)
        .map(|i| (UserRef::new(i as u64, "player"), i as ConnectionId))
        .collect();
    let mut session = Session::new(1, board_size, roster);
    initialize(&mut session, &mut BoardGenerator::seeded(seed, 40)).unwrap();
    session
}

/// Two available cards whose values do or do not match
fn find_pair(session: &Session, matching: bool) -> (CardId, CardId) {
    let open: Vec<_> = session.board.iter().filter(|c| c.is_available()).collect();
    for a in &open {
        for b in &open {
            if a.id != b.id && (a.value == b.value) == matching {
                return (a.id, b.id);
            }
        }
    }
    panic!("no suitable pair on the board");
}

fn flip_pair(session: &mut Session, connection: ConnectionId, a: CardId, b: CardId) {
    assert_eq!(play(session, a, connection), Ok(PlayOutcome::FirstFlip));
    assert_eq!(play(session, b, connection), Ok(PlayOutcome::SecondFlip));
}
