//! Civilian NPC simulation

use rand::Rng;

use crate::ws::protocol::CivilianSnapshot;

use super::grid::Bounds;

pub const CIVILIAN_MAX_HEALTH: f32 = 50.0;
/// Living players closer than this make civilians flee
pub const CIVILIAN_DANGER_RADIUS: f32 = 150.0;
pub const CIVILIAN_WANDER_SPEED: f32 = 0.5;
pub const CIVILIAN_FLEE_SPEED: f32 = 1.5;
pub const CIVILIAN_WANDER_CHANGE_MS: u64 = 2000;
/// Civilians keep this far from the playable edge
pub const CIVILIAN_PADDING: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiState {
    Wander,
    Flee,
}

/// Reported once when a civilian dies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilianDeath {
    pub was_rescued: bool,
    pub was_hostage: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Civilian {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub health: f32,
    pub rescued: bool,
    pub dead: bool,
    pub scared: bool,
    pub hostage: bool,
    pub ai_state: AiState,
    wander_angle: f32,
    wander_changed_at: u64,
}

impl Civilian {
    pub fn spawn<R: Rng>(round: u32, index: usize, x: f32, y: f32, rng: &mut R, now_ms: u64) -> Self {
        Self {
            id: format!("civ_{}_{}", round, index),
            x,
            y,
            health: CIVILIAN_MAX_HEALTH,
            rescued: false,
            dead: false,
            scared: false,
            hostage: false,
            ai_state: AiState::Wander,
            wander_angle: rng.gen_range(0.0..std::f32::consts::TAU),
            wander_changed_at: now_ms,
        }
    }

    /// Still moving around the map
    pub fn is_active(&self) -> bool {
        !self.dead && !self.rescued
    }

    /// One simulation step. `threats` are positions of living players; `dt`
    /// is in frame units.
    pub fn update<R: Rng>(
        &mut self,
        dt: f32,
        threats: &[(f32, f32)],
        bounds: Bounds,
        now_ms: u64,
        rng: &mut R,
    ) {
        if !self.is_active() {
            return;
        }

        let nearest = threats
            .iter()
            .map(|&(x, y)| ((x, y), (x - self.x).hypot(y - self.y)))
            .filter(|(_, dist)| *dist < CIVILIAN_DANGER_RADIUS)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        if let Some(((tx, ty), _)) = nearest {
            self.scared = true;
            self.ai_state = AiState::Flee;
            let flee = (self.y - ty).atan2(self.x - tx);
            self.x += flee.cos() * CIVILIAN_FLEE_SPEED * dt;
            self.y += flee.sin() * CIVILIAN_FLEE_SPEED * dt;
        } else {
            self.scared = false;
            self.ai_state = AiState::Wander;
            if now_ms.saturating_sub(self.wander_changed_at) > CIVILIAN_WANDER_CHANGE_MS {
                self.wander_angle = rng.gen_range(0.0..std::f32::consts::TAU);
                self.wander_changed_at = now_ms;
            }
            self.x += self.wander_angle.cos() * CIVILIAN_WANDER_SPEED * dt;
            self.y += self.wander_angle.sin() * CIVILIAN_WANDER_SPEED * dt;
        }

        let (x, y) = bounds.clamp(self.x, self.y, CIVILIAN_PADDING);
        self.x = x;
        self.y = y;
    }

    /// Damage is a no-op once dead; the transition to dead is reported once
    pub fn take_damage(&mut self, damage: f32) -> Option<CivilianDeath> {
        if self.dead {
            return None;
        }
        self.health = (self.health - damage).max(0.0);
        if self.health > 0.0 {
            return None;
        }
        self.dead = true;
        Some(CivilianDeath {
            was_rescued: self.rescued,
            was_hostage: self.hostage,
        })
    }

    pub fn snapshot(&self) -> CivilianSnapshot {
        CivilianSnapshot {
            id: self.id.clone(),
            x: self.x,
            y: self.y,
            health: self.health,
            rescued: self.rescued,
            dead: self.dead,
            scared: self.scared,
        }
    }
}
