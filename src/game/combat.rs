//! Combat system - damage math and stepped raycast hit detection

use rand::Rng;

use super::grid::TileGrid;
use super::PlayerId;

/// Share of incoming damage soaked by armor
pub const ARMOR_ABSORPTION_RATE: f32 = 0.7;
/// Number of samples along a bullet's path
pub const RAY_STEPS: u32 = 40;
/// Distance between samples
pub const RAY_STEP_LENGTH: f32 = 10.0;
pub const RAY_MAX_RANGE: f32 = RAY_STEPS as f32 * RAY_STEP_LENGTH;
pub const PLAYER_HIT_RADIUS: f32 = 16.0;
pub const CIVILIAN_HIT_RADIUS: f32 = 14.0;

/// Something a bullet can strike
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Player(PlayerId),
    /// Index into the match's civilian list
    Civilian(usize),
}

/// Candidate target position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetPoint<K> {
    pub key: K,
    pub x: f32,
    pub y: f32,
}

/// Hit result from ray resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub shooter_id: PlayerId,
    pub target: HitTarget,
    pub damage: f32,
    pub x: f32,
    pub y: f32,
}

/// Combat system for weapons and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Damage soaked by armor: `min(armor, damage * 0.7)`
    pub fn armor_absorption(armor: f32, damage: f32) -> f32 {
        if armor <= 0.0 {
            return 0.0;
        }
        armor.min(damage * ARMOR_ABSORPTION_RATE)
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
        let new_health = (current_health - damage).max(0.0);
        (new_health, new_health <= 0.0)
    }

    /// Per-pellet aim, uniform within half the spread either side
    pub fn pellet_angle<R: Rng>(rng: &mut R, aim: f32, spread: f32) -> f32 {
        if spread <= 0.0 {
            return aim;
        }
        aim + rng.gen_range(-spread / 2.0..=spread / 2.0)
    }

    /// March a ray from `origin` and return the first thing it strikes.
    ///
    /// Each sample stops on a wall tile, then tests players before civilians.
    /// Callers pass only living targets and leave the shooter out.
    pub fn cast_ray(
        grid: &TileGrid,
        origin: (f32, f32),
        angle: f32,
        players: &[TargetPoint<PlayerId>],
        civilians: &[TargetPoint<usize>],
    ) -> Option<(HitTarget, f32, f32)> {
        let (cos, sin) = (angle.cos(), angle.sin());

        for step in 1..=RAY_STEPS {
            let dist = RAY_STEP_LENGTH * step as f32;
            let x = origin.0 + cos * dist;
            let y = origin.1 + sin * dist;

            if grid.is_wall_at(x, y) {
                return None;
            }

            if let Some(p) = players
                .iter()
                .find(|p| (p.x - x).hypot(p.y - y) < PLAYER_HIT_RADIUS)
            {
                return Some((HitTarget::Player(p.key), x, y));
            }

            if let Some(c) = civilians
                .iter()
                .find(|c| (c.x - x).hypot(c.y - y) < CIVILIAN_HIT_RADIUS)
            {
                return Some((HitTarget::Civilian(c.key), x, y));
            }
        }

        None
    }
}
