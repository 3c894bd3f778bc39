//! Player session - authoritative per-connection state

use crate::ws::protocol::{InputState, LoadoutSelection, Stance, Team, WeaponSlot};

use super::combat::CombatSystem;
use super::grid::Bounds;
use super::loadout::{EquipmentStats, ResolvedLoadout, WeaponStats};
use super::PlayerId;

pub const MAX_HEALTH: f32 = 100.0;
pub const MAX_ARMOR: f32 = 100.0;
pub const MAX_STAMINA: f32 = 100.0;
/// Distance kept from the playable edge
pub const PLAYER_BOUNDS_MARGIN: f32 = 16.0;

pub const BASE_SPEED: f32 = 1.5;
pub const SPRINT_SPEED: f32 = 2.5;
pub const CROUCH_SPEED: f32 = 0.8;
const STAMINA_DRAIN: f32 = 0.8;
const STAMINA_REGEN: f32 = 0.2;
/// Milliseconds per simulation frame used to normalize movement
pub const FRAME_MS: f32 = 16.0;
pub const MAX_FRAME_DELTA: f32 = 3.0;

/// Per-frame speed for an input. Crouching wins over sprinting, and
/// sprinting needs stamina left.
pub fn movement_speed(input: &InputState, stamina: f32) -> f32 {
    if input.crouching {
        CROUCH_SPEED
    } else if input.sprinting && stamina > 0.0 {
        SPRINT_SPEED
    } else {
        BASE_SPEED
    }
}

/// Stamina after one input frame: sprinting drains it, anything else
/// (crouching included) recovers it
pub fn next_stamina(input: &InputState, stamina: f32, dt: f32) -> f32 {
    if !input.crouching && input.sprinting && stamina > 0.0 {
        (stamina - STAMINA_DRAIN * dt).max(0.0)
    } else {
        (stamina + STAMINA_REGEN * dt).min(MAX_STAMINA)
    }
}

/// Displacement along the normalized input direction, `None` when idle
pub fn movement_delta(input: &InputState, speed: f32, dt: f32) -> Option<(f32, f32)> {
    if input.dx == 0.0 && input.dy == 0.0 {
        return None;
    }
    let magnitude = input.dx.hypot(input.dy);
    Some((input.dx / magnitude * speed * dt, input.dy / magnitude * speed * dt))
}

/// One weapon carried by a player
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponInstance {
    pub id: &'static str,
    pub stats: &'static WeaponStats,
    pub current_ammo: u32,
    /// `None` for weapons with an endless reserve
    pub reserve_ammo: Option<u32>,
}

impl WeaponInstance {
    pub fn new(id: &'static str, stats: &'static WeaponStats) -> Self {
        Self {
            id,
            stats,
            current_ammo: stats.mag_size,
            reserve_ammo: stats.total_ammo,
        }
    }

    pub fn can_reload(&self) -> bool {
        self.current_ammo < self.stats.mag_size && self.reserve_ammo != Some(0)
    }

    /// Move `min(mag - current, reserve)` rounds into the magazine
    pub fn reload(&mut self) {
        let needed = self.stats.mag_size.saturating_sub(self.current_ammo);
        match self.reserve_ammo {
            None => self.current_ammo += needed,
            Some(reserve) => {
                let moved = needed.min(reserve);
                self.current_ammo += moved;
                self.reserve_ammo = Some(reserve - moved);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentInstance {
    pub id: &'static str,
    pub stats: &'static EquipmentStats,
    pub remaining: u32,
}

impl EquipmentInstance {
    pub fn new(id: &'static str, stats: &'static EquipmentStats) -> Self {
        Self {
            id,
            stats,
            remaining: stats.quantity,
        }
    }
}

/// Everything a successful trigger pull needs to resolve its pellets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireSolution {
    pub origin: (f32, f32),
    pub damage: f32,
    pub pellets: u32,
    pub spread: f32,
    pub cooldown_ms: u64,
}

/// Why a trigger pull was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FireRejection {
    #[error("round is not live")]
    NotPlaying,
    #[error("player is dead")]
    NotAlive,
    #[error("weapon is reloading")]
    Reloading,
    #[error("weapon is cooling down")]
    CoolingDown,
    #[error("no_ammo")]
    NoAmmo,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOutcome {
    pub absorbed: f32,
    pub health_lost: f32,
    pub killed: bool,
}

/// Authoritative player entity
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub id: PlayerId,
    pub name: String,
    pub team: Team,

    // Position and facing
    pub x: f32,
    pub y: f32,
    pub angle: f32,

    // Vitals
    pub health: f32,
    pub max_health: f32,
    pub armor: f32,
    pub stamina: f32,
    pub stance: Stance,
    pub alive: bool,

    // Arsenal
    pub current_weapon: WeaponSlot,
    pub primary: WeaponInstance,
    pub secondary: WeaponInstance,
    pub equipment: EquipmentInstance,
    /// Last loadout the player confirmed, re-validated at every spawn
    pub chosen_loadout: Option<LoadoutSelection>,
    pub loadout_confirmed: bool,

    pub can_fire: bool,
    pub reloading: bool,
    reload_slot: WeaponSlot,
    reload_token: u64,

    last_update_ms: u64,
    pub last_input_seq: u32,
}

impl PlayerSession {
    pub fn new(id: PlayerId, name: String, team: Team, now_ms: u64) -> Self {
        let kit = ResolvedLoadout::default_for(team);
        Self {
            id,
            name,
            team,
            x: 0.0,
            y: 0.0,
            angle: 0.0,
            health: MAX_HEALTH,
            max_health: MAX_HEALTH,
            armor: MAX_ARMOR,
            stamina: MAX_STAMINA,
            stance: Stance::Standing,
            alive: true,
            current_weapon: WeaponSlot::Primary,
            primary: WeaponInstance::new(kit.primary.0, kit.primary.1),
            secondary: WeaponInstance::new(kit.secondary.0, kit.secondary.1),
            equipment: EquipmentInstance::new(kit.equipment.0, kit.equipment.1),
            chosen_loadout: None,
            loadout_confirmed: false,
            can_fire: true,
            reloading: false,
            reload_slot: WeaponSlot::Primary,
            reload_token: 0,
            last_update_ms: now_ms,
            last_input_seq: 0,
        }
    }

    pub fn weapon(&self, slot: WeaponSlot) -> &WeaponInstance {
        match slot {
            WeaponSlot::Primary => &self.primary,
            WeaponSlot::Secondary => &self.secondary,
        }
    }

    fn weapon_mut(&mut self, slot: WeaponSlot) -> &mut WeaponInstance {
        match slot {
            WeaponSlot::Primary => &mut self.primary,
            WeaponSlot::Secondary => &mut self.secondary,
        }
    }

    pub fn active_weapon(&self) -> &WeaponInstance {
        self.weapon(self.current_weapon)
    }

    /// Loadout that will be issued at the next spawn: the confirmed one when
    /// it is still valid for the current team, otherwise the team default.
    pub fn spawn_kit(&self) -> ResolvedLoadout {
        self.chosen_loadout
            .as_ref()
            .and_then(|selection| ResolvedLoadout::resolve(self.team, selection).ok())
            .unwrap_or_else(|| ResolvedLoadout::default_for(self.team))
    }

    /// Restore vitals and ammunition at a spawn point. Any reload in flight
    /// is invalidated.
    pub fn reset_for_round(&mut self, x: f32, y: f32, kit: ResolvedLoadout, now_ms: u64) {
        self.x = x;
        self.y = y;
        self.health = self.max_health;
        self.armor = MAX_ARMOR;
        self.stamina = MAX_STAMINA;
        self.stance = Stance::Standing;
        self.alive = true;
        self.current_weapon = WeaponSlot::Primary;
        self.primary = WeaponInstance::new(kit.primary.0, kit.primary.1);
        self.secondary = WeaponInstance::new(kit.secondary.0, kit.secondary.1);
        self.equipment = EquipmentInstance::new(kit.equipment.0, kit.equipment.1);
        self.can_fire = true;
        self.reloading = false;
        self.reload_token += 1;
        self.last_update_ms = now_ms;
    }

    /// Apply one movement frame. Dead players are ignored.
    pub fn process_input(&mut self, input: &InputState, now_ms: u64, bounds: Bounds) {
        if !self.alive {
            return;
        }

        let elapsed = now_ms.saturating_sub(self.last_update_ms) as f32;
        let dt = (elapsed / FRAME_MS).min(MAX_FRAME_DELTA);
        self.last_update_ms = now_ms;

        self.stance = if input.crouching {
            Stance::Crouched
        } else {
            Stance::Standing
        };
        let speed = movement_speed(input, self.stamina);
        self.stamina = next_stamina(input, self.stamina, dt);

        if let Some((dx, dy)) = movement_delta(input, speed, dt) {
            let (x, y) = bounds.clamp(self.x + dx, self.y + dy, PLAYER_BOUNDS_MARGIN);
            self.x = x;
            self.y = y;
        }

        if let Some(angle) = input.angle {
            self.angle = angle;
        }
    }

    /// Consume one round from the active weapon and start its cooldown
    pub fn try_fire(&mut self) -> Result<FireSolution, FireRejection> {
        if !self.alive {
            return Err(FireRejection::NotAlive);
        }
        if self.reloading {
            return Err(FireRejection::Reloading);
        }
        if !self.can_fire {
            return Err(FireRejection::CoolingDown);
        }

        let origin = (self.x, self.y);
        let weapon = self.weapon_mut(self.current_weapon);
        if weapon.current_ammo == 0 {
            return Err(FireRejection::NoAmmo);
        }
        weapon.current_ammo -= 1;

        let solution = FireSolution {
            origin,
            damage: weapon.stats.damage,
            pellets: weapon.stats.pellets.max(1),
            spread: weapon.stats.spread,
            cooldown_ms: weapon.stats.fire_rate_ms,
        };
        self.can_fire = false;
        Ok(solution)
    }

    pub fn take_damage(&mut self, damage: f32) -> DamageOutcome {
        if !self.alive {
            return DamageOutcome {
                absorbed: 0.0,
                health_lost: 0.0,
                killed: false,
            };
        }

        let absorbed = CombatSystem::armor_absorption(self.armor, damage);
        self.armor -= absorbed;
        let (health, killed) = CombatSystem::apply_damage(self.health, damage - absorbed);
        let health_lost = self.health - health;
        self.health = health;
        if killed {
            self.alive = false;
        }

        DamageOutcome {
            absorbed,
            health_lost,
            killed,
        }
    }

    /// Start reloading the active weapon. Returns the generation token the
    /// completion must present, or `None` when a reload is pointless or
    /// already running.
    pub fn begin_reload(&mut self) -> Option<u64> {
        if !self.alive || self.reloading || !self.active_weapon().can_reload() {
            return None;
        }
        self.reloading = true;
        self.reload_slot = self.current_weapon;
        self.reload_token += 1;
        Some(self.reload_token)
    }

    /// Complete a reload; stale tokens are ignored
    pub fn finish_reload(&mut self, token: u64) -> bool {
        if !self.reloading || token != self.reload_token {
            return false;
        }
        let slot = self.reload_slot;
        self.weapon_mut(slot).reload();
        self.reloading = false;
        true
    }

    pub fn switch_weapon(&mut self, slot: WeaponSlot) {
        self.current_weapon = slot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const BOUNDS: Bounds = Bounds {
        width: 800.0,
        height: 600.0,
    };

    fn cop_at(x: f32, y: f32) -> PlayerSession {
        let mut player = PlayerSession::new(Uuid::new_v4(), "cop".to_string(), Team::Cops, 0);
        let kit = player.spawn_kit();
        player.reset_for_round(x, y, kit, 0);
        player
    }

    fn input(dx: f32, dy: f32) -> InputState {
        InputState {
            dx,
            dy,
            ..InputState::default()
        }
    }

    #[test]
    fn movement_is_normalized_and_frame_scaled() {
        let mut player = cop_at(100.0, 100.0);
        player.process_input(&input(3.0, 4.0), 32, BOUNDS);

        // dt = 2 frames at base speed 1.5 along (0.6, 0.8)
        assert!((player.x - 101.8).abs() < 1e-4);
        assert!((player.y - 102.4).abs() < 1e-4);
    }

    #[test]
    fn frame_delta_is_capped() {
        let mut player = cop_at(100.0, 100.0);
        player.process_input(&input(1.0, 0.0), 10_000, BOUNDS);
        assert!((player.x - 104.5).abs() < 1e-4);
    }

    #[test]
    fn sprint_drains_and_crouch_slows() {
        let mut player = cop_at(100.0, 100.0);
        let sprint = InputState {
            dx: 1.0,
            sprinting: true,
            ..InputState::default()
        };
        player.process_input(&sprint, 16, BOUNDS);
        assert!((player.x - 102.5).abs() < 1e-4);
        assert!((player.stamina - 99.2).abs() < 1e-4);

        let crouch = InputState {
            dx: 1.0,
            crouching: true,
            sprinting: true,
            ..InputState::default()
        };
        player.process_input(&crouch, 32, BOUNDS);
        assert_eq!(player.stance, Stance::Crouched);
        assert!((player.x - 103.3).abs() < 1e-4);
        assert!((player.stamina - 99.4).abs() < 1e-4);
    }

    #[test]
    fn exhausted_player_cannot_sprint() {
        let mut player = cop_at(100.0, 100.0);
        player.stamina = 0.0;
        let sprint = InputState {
            dx: 1.0,
            sprinting: true,
            ..InputState::default()
        };
        player.process_input(&sprint, 16, BOUNDS);
        assert!((player.x - 101.5).abs() < 1e-4);
        assert!((player.stamina - 0.2).abs() < 1e-4);
    }

    #[test]
    fn position_is_clamped_and_angle_applied() {
        let mut player = cop_at(17.0, 590.0);
        let frame = InputState {
            dx: -1.0,
            dy: 1.0,
            angle: Some(1.25),
            ..InputState::default()
        };
        player.process_input(&frame, 48, BOUNDS);
        assert_eq!(player.x, 16.0);
        assert_eq!(player.y, 584.0);
        assert_eq!(player.angle, 1.25);
    }

    #[test]
    fn dead_players_ignore_input() {
        let mut player = cop_at(100.0, 100.0);
        player.alive = false;
        player.process_input(&input(1.0, 0.0), 16, BOUNDS);
        assert_eq!(player.x, 100.0);
    }

    #[test]
    fn armor_absorbs_seventy_percent_up_to_its_value() {
        let mut player = cop_at(0.0, 0.0);
        let outcome = player.take_damage(100.0);
        assert!((outcome.absorbed - 70.0).abs() < 1e-4);
        assert!((player.health - 70.0).abs() < 1e-4);
        assert!((player.armor - 30.0).abs() < 1e-4);

        let outcome = player.take_damage(100.0);
        assert!((outcome.absorbed - 30.0).abs() < 1e-4);
        assert!((player.health - 0.0).abs() < 1e-4);
        assert!(outcome.killed);
        assert!(!player.alive);

        let outcome = player.take_damage(50.0);
        assert!(!outcome.killed);
        assert_eq!(player.health, 0.0);
    }

    #[test]
    fn firing_consumes_ammo_and_requires_cooldown() {
        let mut player = cop_at(0.0, 0.0);
        let shot = player.try_fire().unwrap();
        assert_eq!(shot.cooldown_ms, 100);
        assert_eq!(player.primary.current_ammo, 29);
        assert_eq!(player.try_fire(), Err(FireRejection::CoolingDown));

        player.can_fire = true;
        player.primary.current_ammo = 0;
        assert_eq!(player.try_fire(), Err(FireRejection::NoAmmo));
    }

    #[test]
    fn reload_conserves_ammunition() {
        let mut player = cop_at(0.0, 0.0);
        player.primary.current_ammo = 10;
        player.primary.reserve_ammo = Some(15);

        let token = player.begin_reload().unwrap();
        assert!(player.begin_reload().is_none());
        assert_eq!(player.try_fire(), Err(FireRejection::Reloading));
        assert!(player.finish_reload(token));

        assert_eq!(player.primary.current_ammo, 25);
        assert_eq!(player.primary.reserve_ammo, Some(0));
        assert!(!player.reloading);
        assert!(player.begin_reload().is_none());
    }

    #[test]
    fn full_magazine_does_not_reload() {
        let mut player = cop_at(0.0, 0.0);
        assert!(player.begin_reload().is_none());
    }

    #[test]
    fn stale_reload_does_not_touch_reset_weapon() {
        let mut player = cop_at(0.0, 0.0);
        player.primary.current_ammo = 5;
        let token = player.begin_reload().unwrap();

        let kit = player.spawn_kit();
        player.reset_for_round(10.0, 10.0, kit, 5_000);
        player.primary.current_ammo = 3;

        assert!(!player.finish_reload(token));
        assert_eq!(player.primary.current_ammo, 3);
        assert_eq!(player.primary.reserve_ammo, Some(90));
    }

    #[test]
    fn reload_targets_the_weapon_it_started_on() {
        let mut player = cop_at(0.0, 0.0);
        player.primary.current_ammo = 0;
        let token = player.begin_reload().unwrap();
        player.switch_weapon(WeaponSlot::Secondary);
        assert!(player.finish_reload(token));
        assert_eq!(player.primary.current_ammo, 30);
        assert_eq!(player.secondary.current_ammo, 7);
    }

    #[test]
    fn knife_reserve_never_depletes() {
        let mut player =
            PlayerSession::new(Uuid::new_v4(), "crim".to_string(), Team::Criminals, 0);
        player.chosen_loadout = Some(LoadoutSelection {
            primary: "uzi".to_string(),
            secondary: "knife".to_string(),
            equipment: "jammer".to_string(),
        });
        let kit = player.spawn_kit();
        player.reset_for_round(0.0, 0.0, kit, 0);
        player.switch_weapon(WeaponSlot::Secondary);

        player.try_fire().unwrap();
        let token = player.begin_reload().unwrap();
        assert!(player.finish_reload(token));
        assert_eq!(player.secondary.current_ammo, 1);
        assert_eq!(player.secondary.reserve_ammo, None);
    }

    #[test]
    fn invalid_choice_after_team_swap_falls_back_to_default() {
        let mut player = cop_at(0.0, 0.0);
        player.chosen_loadout = Some(LoadoutSelection {
            primary: "m4a1".to_string(),
            secondary: "glock".to_string(),
            equipment: "drone".to_string(),
        });
        assert_eq!(player.spawn_kit().primary.0, "m4a1");

        player.team = Team::Criminals;
        assert_eq!(player.spawn_kit().primary.0, "ak47");
    }
}
