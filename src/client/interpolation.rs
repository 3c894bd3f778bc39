//! Snapshot buffering and remote-entity interpolation

use std::collections::VecDeque;
use std::f32::consts::{PI, TAU};

use crate::ws::protocol::{CivilianSnapshot, GameStateUpdate, PlayerSnapshot};

/// Remote entities render this far behind the newest snapshot
pub const INTERPOLATION_DELAY_MS: u64 = 100;
/// Snapshots older than this are discarded
pub const BUFFER_WINDOW_MS: u64 = 1_000;

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Interpolate along the shorter arc between two headings
pub fn lerp_angle(a: f32, b: f32, t: f32) -> f32 {
    let mut diff = (b - a) % TAU;
    if diff > PI {
        diff -= TAU;
    } else if diff < -PI {
        diff += TAU;
    }
    a + diff * t
}

#[derive(Debug, Clone)]
struct TimedSnapshot {
    received_at: u64,
    state: GameStateUpdate,
}

/// Recent `game_state_update`s keyed by local receive time
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    entries: VecDeque<TimedSnapshot>,
    window_ms: u64,
    delay_ms: u64,
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new(BUFFER_WINDOW_MS, INTERPOLATION_DELAY_MS)
    }
}

impl SnapshotBuffer {
    pub fn new(window_ms: u64, delay_ms: u64) -> Self {
        Self {
            entries: VecDeque::new(),
            window_ms,
            delay_ms,
        }
    }

    pub fn push(&mut self, received_at: u64, state: GameStateUpdate) {
        self.entries.push_back(TimedSnapshot { received_at, state });
        while let Some(front) = self.entries.front() {
            if received_at.saturating_sub(front.received_at) < self.window_ms {
                break;
            }
            self.entries.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&GameStateUpdate> {
        self.entries.back().map(|e| &e.state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// World state to draw at `now_ms`. Top-level fields come from the
    /// newest snapshot; positions are blended between the two snapshots
    /// bracketing `now_ms - delay`.
    pub fn render_state(&self, now_ms: u64) -> Option<GameStateUpdate> {
        let render_time = now_ms.saturating_sub(self.delay_ms);

        let before = self
            .entries
            .iter()
            .rev()
            .find(|e| e.received_at <= render_time);
        let after = self.entries.iter().find(|e| e.received_at > render_time);

        let (before, after) = match (before, after) {
            (None, None) => return None,
            (Some(only), None) | (None, Some(only)) => return Some(only.state.clone()),
            (Some(before), Some(after)) => (before, after),
        };

        let span = after.received_at.saturating_sub(before.received_at);
        let t = if span == 0 {
            0.0
        } else {
            (render_time - before.received_at) as f32 / span as f32
        };

        let mut state = self.latest()?.clone();
        state.players = before
            .state
            .players
            .iter()
            .map(|p| match after.state.players.iter().find(|q| q.id == p.id) {
                Some(q) => blend_player(p, q, t),
                None => p.clone(),
            })
            .collect();
        state.civilians = before
            .state
            .civilians
            .iter()
            .map(|c| match after.state.civilians.iter().find(|d| d.id == c.id) {
                Some(d) => CivilianSnapshot {
                    x: lerp(c.x, d.x, t),
                    y: lerp(c.y, d.y, t),
                    ..c.clone()
                },
                None => c.clone(),
            })
            .collect();

        Some(state)
    }
}

fn blend_player(from: &PlayerSnapshot, to: &PlayerSnapshot, t: f32) -> PlayerSnapshot {
    PlayerSnapshot {
        x: lerp(from.x, to.x, t),
        y: lerp(from.y, to.y, t),
        angle: lerp_angle(from.angle, to.angle, t),
        ..from.clone()
    }
}
