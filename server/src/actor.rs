//! Per-session task
//!
//! Each live session is owned by exactly one [`SessionActor`] running in its
//! own tokio task. Commands are processed strictly in arrival order, so no
//! operation ever observes another half-applied. The resolution delay is a
//! deadline inside the actor's loop rather than a detached timer:
//!
//! - while it is pending, flips are rejected and departures are queued
//!   behind it
//! - when it expires, the pair is resolved and queued departures are applied
//! - if the session ends first, the deadline is dropped
//!
//! Every accepted change publishes a full [`SessionUpdate`] snapshot.

use crate::engine::{self, PlayOutcome};
use crate::error::GameError;
use crate::lifecycle::{self, Departure};
use log::{debug, info, warn};
use shared::{CardId, ConnectionId, Session, SessionId, TurnPhase};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

/// Full snapshot emitted after every change, for broadcast
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub session: Session,
}

/// An accepted command together with the session it produced
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub outcome: T,
    pub session: Session,
}

type Reply<T> = oneshot::Sender<Result<Applied<T>, GameError>>;

#[derive(Debug)]
pub enum SessionCommand {
    Play {
        card_id: CardId,
        connection: ConnectionId,
        reply: Reply<PlayOutcome>,
    },
    Depart {
        connection: ConnectionId,
        reply: Reply<Departure>,
    },
    Snapshot {
        reply: oneshot::Sender<Session>,
    },
}

/// Cheap handle used to talk to a session task. The task stops once every
/// handle is dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub async fn play(
        &self,
        card_id: CardId,
        connection: ConnectionId,
    ) -> Result<Applied<PlayOutcome>, GameError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Play {
            card_id,
            connection,
            reply,
        })?;
        response.await.map_err(|_| GameError::SessionClosed)?
    }

    /// Resolves once the departure has actually been applied, which may be
    /// after a pending resolution.
    pub async fn depart(&self, connection: ConnectionId) -> Result<Applied<Departure>, GameError> {
        self.queue_departure(connection)?.await
    }

    /// Enqueues the departure now, in order with every other command, and
    /// returns a future for its outcome.
    pub fn queue_departure(
        &self,
        connection: ConnectionId,
    ) -> Result<impl Future<Output = Result<Applied<Departure>, GameError>>, GameError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Depart { connection, reply })?;
        Ok(async move { response.await.unwrap_or(Err(GameError::SessionClosed)) })
    }

    pub async fn snapshot(&self) -> Result<Session, GameError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply })?;
        response.await.map_err(|_| GameError::SessionClosed)
    }

    fn send(&self, command: SessionCommand) -> Result<(), GameError> {
        self.commands
            .send(command)
            .map_err(|_| GameError::SessionClosed)
    }
}

pub struct SessionActor {
    session: Session,
    resolution_delay: Duration,
    deadline: Option<Instant>,
    deferred: VecDeque<(ConnectionId, Reply<Departure>)>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
}

impl SessionActor {
    /// Moves an initialized session into its own task
    pub fn spawn(
        session: Session,
        resolution_delay: Duration,
        updates: mpsc::UnboundedSender<SessionUpdate>,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            id: session.id,
            commands: tx,
        };
        let actor = Self {
            session,
            resolution_delay,
            deadline: None,
            deferred: VecDeque::new(),
            commands: rx,
            updates,
        };
        tokio::spawn(actor.run());
        handle
    }

    async fn run(mut self) {
        debug!("[session {}] task started", self.session.id);
        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;
                _ = Self::expire(deadline), if deadline.is_some() => {
                    self.on_resolution();
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }
        debug!("[session {}] task stopped", self.session.id);
    }

    async fn expire(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Play {
                card_id,
                connection,
                reply,
            } => {
                let result = engine::play(&mut self.session, card_id, connection);
                if let Ok(PlayOutcome::SecondFlip) = result {
                    self.deadline = Some(Instant::now() + self.resolution_delay);
                }
                let _ = reply.send(self.finish(connection, result));
            }
            SessionCommand::Depart { connection, reply } => {
                if self.deadline.is_some() && self.session.phase == TurnPhase::Resolving {
                    debug!(
                        "[session {}] departure of connection {} queued behind resolution",
                        self.session.id, connection
                    );
                    self.deferred.push_back((connection, reply));
                } else {
                    self.depart(connection, reply);
                }
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.clone());
            }
        }
    }

    fn on_resolution(&mut self) {
        self.deadline = None;
        if let Some(resolution) = engine::resolve(&mut self.session) {
            debug!("[session {}] resolved: {:?}", self.session.id, resolution);
            self.publish();
        }
        while let Some((connection, reply)) = self.deferred.pop_front() {
            self.depart(connection, reply);
        }
    }

    fn depart(&mut self, connection: ConnectionId, reply: Reply<Departure>) {
        let result = lifecycle::handle_departure(&mut self.session, connection);
        let _ = reply.send(self.finish(connection, result));
    }

    /// Publishes accepted changes and logs rejections
    fn finish<T>(
        &mut self,
        connection: ConnectionId,
        result: Result<T, GameError>,
    ) -> Result<Applied<T>, GameError> {
        match result {
            Ok(outcome) => {
                if self.session.is_ended() && self.deadline.take().is_some() {
                    info!(
                        "[session {}] ended with a resolution pending, timer cancelled",
                        self.session.id
                    );
                }
                self.publish();
                Ok(Applied {
                    outcome,
                    session: self.session.clone(),
                })
            }
            Err(e) => {
                if e.is_defensive() {
                    warn!(
                        "[session {}] rejected request from connection {}: {}",
                        self.session.id, connection, e
                    );
                } else {
                    debug!(
                        "[session {}] rejected request from connection {}: {}",
                        self.session.id, connection, e
                    );
                }
                Err(e)
            }
        }
    }

    fn publish(&self) {
        let update = SessionUpdate {
            session: self.session.clone(),
        };
        if self.updates.send(update).is_err() {
            debug!("[session {}] no listener for updates", self.session.id);
        }
    }
}
