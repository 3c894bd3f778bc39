//! Snapshot building for the tick broadcast

use std::collections::HashMap;

use crate::ws::protocol::{GameStateUpdate, MatchPhase, PlayerSnapshot, ServerMsg};

use super::civilian::Civilian;
use super::player::PlayerSession;
use super::scoring::ScoreBoard;
use super::PlayerId;

/// Builds snapshots for network transmission
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
    /// Snapshots built so far
    sent: u64,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
            sent: 0,
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Build a `game_state_update`. Players are listed in join order.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &mut self,
        state: MatchPhase,
        round: u32,
        round_time_remaining: u64,
        order: &[PlayerId],
        players: &HashMap<PlayerId, PlayerSession>,
        civilians: &[Civilian],
        scores: ScoreBoard,
    ) -> ServerMsg {
        let players = order
            .iter()
            .filter_map(|id| players.get(id))
            .map(player_snapshot)
            .collect();

        self.sent += 1;

        ServerMsg::GameStateUpdate(GameStateUpdate {
            state,
            round,
            round_time_remaining,
            players,
            civilians: civilians.iter().map(Civilian::snapshot).collect(),
            scores,
        })
    }
}

pub fn player_snapshot(p: &PlayerSession) -> PlayerSnapshot {
    PlayerSnapshot {
        id: p.id,
        name: p.name.clone(),
        team: p.team,
        x: p.x,
        y: p.y,
        angle: p.angle,
        health: p.health,
        max_health: p.max_health,
        armor: p.armor,
        stamina: p.stamina,
        stance: p.stance,
        alive: p.alive,
        current_weapon: p.current_weapon,
    }
}
