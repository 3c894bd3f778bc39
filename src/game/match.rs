//! Match actor, handles and the registry of live matches
//!
//! Each match runs as its own task that owns a [`MatchCoordinator`]. Sockets
//! talk to it through a command channel, read broadcasts from a broadcast
//! channel and receive their own direct messages on the channel they hand
//! over when joining.

use std::collections::HashMap;
use std::future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MatchRules;
use crate::ws::protocol::{ClientMsg, MatchInfo, MatchPhase, ServerMsg, Team};

use super::coordinator::{JoinError, MatchCoordinator, MatchHooks, Outbound};
use super::grid::MapLayout;
use super::PlayerId;

const COMMAND_BUFFER: usize = 256;
const OUTPUT_BUFFER: usize = 64;

/// Requests a socket can make of its match
#[derive(Debug)]
pub enum MatchCommand {
    Join {
        player_id: PlayerId,
        name: Option<String>,
        direct: DirectSender,
        reply: oneshot::Sender<Result<Team, JoinError>>,
    },
    Client {
        player_id: PlayerId,
        msg: ClientMsg,
    },
    Leave {
        player_id: PlayerId,
    },
}

/// Where a match delivers messages meant for one player only. Unbounded so
/// replies are never dropped behind a backlog of snapshots.
pub type DirectSender = mpsc::UnboundedSender<ServerMsg>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("Match is no longer running")]
    Closed,

    #[error(transparent)]
    Join(#[from] JoinError),
}

impl MatchError {
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::Closed => "match_closed",
            MatchError::Join(e) => e.code(),
        }
    }
}

/// Cheap, cloneable reference to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub command_tx: mpsc::Sender<MatchCommand>,
    pub output_tx: broadcast::Sender<ServerMsg>,
    info: Arc<RwLock<MatchInfo>>,
}

impl MatchHandle {
    /// Latest published summary
    pub fn info(&self) -> MatchInfo {
        self.info.read().clone()
    }

    pub fn player_count(&self) -> usize {
        self.info.read().player_count
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.output_tx.subscribe()
    }

    /// Join with `direct` as the player's private channel. Subscribe before
    /// calling this so the broadcast of the join is not missed.
    pub async fn join(
        &self,
        player_id: PlayerId,
        name: Option<String>,
        direct: DirectSender,
    ) -> Result<Team, MatchError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(MatchCommand::Join {
                player_id,
                name,
                direct,
                reply,
            })
            .await
            .map_err(|_| MatchError::Closed)?;

        Ok(rx.await.map_err(|_| MatchError::Closed)??)
    }

    /// Forward a client message; false once the match has shut down
    pub async fn send(&self, player_id: PlayerId, msg: ClientMsg) -> bool {
        self.command_tx
            .send(MatchCommand::Client { player_id, msg })
            .await
            .is_ok()
    }

    pub async fn leave(&self, player_id: PlayerId) {
        let _ = self.command_tx.send(MatchCommand::Leave { player_id }).await;
    }
}

/// Builds the hooks installed on every new match
pub type HooksFactory = Arc<dyn Fn() -> MatchHooks + Send + Sync>;

/// Registry of all active matches
#[derive(Clone)]
pub struct MatchRegistry {
    matches: Arc<DashMap<Uuid, MatchHandle>>,
    rules: MatchRules,
    map: Arc<MapLayout>,
    hooks: Option<HooksFactory>,
}

impl MatchRegistry {
    pub fn new(rules: MatchRules, map: Arc<MapLayout>) -> Self {
        Self {
            matches: Arc::new(DashMap::new()),
            rules,
            map,
            hooks: None,
        }
    }

    pub fn with_hooks(mut self, factory: impl Fn() -> MatchHooks + Send + Sync + 'static) -> Self {
        self.hooks = Some(Arc::new(factory));
        self
    }

    pub fn rules(&self) -> &MatchRules {
        &self.rules
    }

    /// Spawn a new match actor. Must be called inside a tokio runtime.
    pub fn create_match(&self) -> MatchHandle {
        let id = Uuid::new_v4();
        let seed = rand::thread_rng().gen::<u64>();
        let hooks = self.hooks.as_ref().map(|f| f()).unwrap_or_default();

        let coordinator =
            MatchCoordinator::new(id, self.rules.clone(), self.map.clone(), seed).with_hooks(hooks);
        let (game, handle) = GameMatch::new(coordinator);
        self.matches.insert(id, handle.clone());

        let matches = self.matches.clone();
        tokio::spawn(async move {
            game.run().await;
            matches.remove(&id);
        });

        info!(match_id = %id, map = %self.map.name, "Match created");
        handle
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    /// The named match if it exists, otherwise a fresh one
    pub fn find_or_create(&self, match_id: Option<&str>) -> MatchHandle {
        match_id
            .and_then(|id| Uuid::parse_str(id).ok())
            .and_then(|id| self.get(&id))
            .unwrap_or_else(|| self.create_match())
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches
            .iter()
            .map(|m| m.value().player_count())
            .sum()
    }

    pub fn list(&self) -> Vec<MatchInfo> {
        let mut infos: Vec<MatchInfo> = self.matches.iter().map(|m| m.value().info()).collect();
        infos.sort_by_key(|i| i.created_at);
        infos
    }
}

/// What woke the actor
enum Wake {
    Command(Option<MatchCommand>),
    Tick,
    Deadline,
    Idle,
}

/// The task that owns one match
pub struct GameMatch {
    coordinator: MatchCoordinator,
    command_rx: mpsc::Receiver<MatchCommand>,
    output_tx: broadcast::Sender<ServerMsg>,
    directs: HashMap<PlayerId, DirectSender>,
    info: Arc<RwLock<MatchInfo>>,
    started: Instant,
}

impl GameMatch {
    pub fn new(coordinator: MatchCoordinator) -> (Self, MatchHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (output_tx, _) = broadcast::channel(OUTPUT_BUFFER);
        let info = Arc::new(RwLock::new(coordinator.info()));

        let handle = MatchHandle {
            id: coordinator.id(),
            command_tx,
            output_tx: output_tx.clone(),
            info: info.clone(),
        };

        let game_match = Self {
            coordinator,
            command_rx,
            output_tx,
            directs: HashMap::new(),
            info,
            started: Instant::now(),
        };

        (game_match, handle)
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Run until the last player leaves, nobody joins in time or every
    /// handle is dropped
    pub async fn run(mut self) {
        let match_id = self.coordinator.id();
        let tick = Duration::from_millis(self.coordinator.rules().tick_ms);
        let idle_at = self.started + Duration::from_millis(self.coordinator.rules().idle_timeout_ms);
        let mut ticker: Option<Interval> = None;

        debug!(match_id = %match_id, "Match actor running");

        loop {
            // The tick interval only exists while a round is live
            if self.coordinator.phase() == MatchPhase::Playing {
                if ticker.is_none() {
                    let mut interval = interval_at(Instant::now() + tick, tick);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    ticker = Some(interval);
                }
            } else {
                ticker = None;
            }

            let deadline = self
                .coordinator
                .next_deadline()
                .map(|ms| self.started + Duration::from_millis(ms));
            let idle_deadline = (self.coordinator.phase() == MatchPhase::Waiting
                && self.coordinator.is_empty())
            .then_some(idle_at);

            let wake = tokio::select! {
                cmd = self.command_rx.recv() => Wake::Command(cmd),
                _ = next_tick(&mut ticker) => Wake::Tick,
                _ = wait_until(deadline) => Wake::Deadline,
                _ = wait_until(idle_deadline) => Wake::Idle,
            };

            let now = self.now_ms();
            match wake {
                Wake::Command(Some(cmd)) => self.handle_command(cmd, now),
                Wake::Command(None) => {
                    debug!(match_id = %match_id, "All handles dropped");
                    break;
                }
                Wake::Tick => {
                    self.coordinator.fire_due_timers(now);
                    self.coordinator.tick(now);
                }
                Wake::Deadline => self.coordinator.fire_due_timers(now),
                Wake::Idle => {
                    info!(match_id = %match_id, "Nobody joined, closing match");
                    break;
                }
            }

            self.flush();

            if self.coordinator.is_empty() && self.coordinator.phase() != MatchPhase::Waiting {
                info!(match_id = %match_id, "All players left, closing match");
                break;
            }
        }
    }

    fn handle_command(&mut self, cmd: MatchCommand, now: u64) {
        // Keep timers ahead of anything the command does
        self.coordinator.fire_due_timers(now);

        match cmd {
            MatchCommand::Join {
                player_id,
                name,
                direct,
                reply,
            } => {
                let result = self.coordinator.join(player_id, name, now);
                let joined = result.is_ok();
                if reply.send(result).is_err() {
                    // Joiner went away before the reply; undo
                    if joined {
                        self.coordinator.leave(player_id, now);
                    }
                } else if joined {
                    self.directs.insert(player_id, direct);
                }
            }
            MatchCommand::Client { player_id, msg } => {
                self.coordinator.handle_message(player_id, msg, now);
            }
            MatchCommand::Leave { player_id } => {
                self.coordinator.leave(player_id, now);
            }
        }
    }

    fn flush(&mut self) {
        for out in self.coordinator.drain_outbox() {
            match out {
                Outbound::Broadcast(msg) => {
                    // No subscribers is fine
                    let _ = self.output_tx.send(msg);
                }
                Outbound::Direct(player_id, msg) => match self.directs.get(&player_id) {
                    Some(direct) => {
                        if direct.send(msg).is_err() {
                            debug!(player_id = %player_id, "Direct channel closed");
                        }
                    }
                    None => debug!(player_id = %player_id, "No direct channel for player"),
                },
            }
        }

        let coordinator = &self.coordinator;
        self.directs.retain(|id, _| coordinator.player(id).is_some());
        *self.info.write() = coordinator.info();
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => future::pending().await,
    }
}
