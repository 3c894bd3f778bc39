//! Local-player prediction and correction

use crate::game::grid::Bounds;
use crate::game::player::{
    movement_delta, movement_speed, next_stamina, FRAME_MS, MAX_FRAME_DELTA, PLAYER_BOUNDS_MARGIN,
};
use crate::game::PlayerId;
use crate::ws::protocol::{GameStateUpdate, InputState, PlayerSnapshot, Stance};

/// Server truth overrides the prediction once they disagree by more than this
pub const SNAP_THRESHOLD: f32 = 50.0;

/// What a server snapshot did to the prediction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Snapshot did not contain the local player
    Missing,
    /// First sighting; prediction seeded from the server
    Seeded,
    /// Within tolerance, predicted position kept
    Kept { divergence: f32 },
    /// Too far off, position replaced
    Snapped { divergence: f32 },
}

/// The controlling player's state, advanced immediately on local input
#[derive(Debug, Clone)]
pub struct LocalPrediction {
    player_id: PlayerId,
    state: Option<PlayerSnapshot>,
    bounds: Option<Bounds>,
    last_input_ms: Option<u64>,
}

impl LocalPrediction {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            state: None,
            bounds: None,
            last_input_ms: None,
        }
    }

    /// Clamp predicted movement to the arena like the server does
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn player(&self) -> Option<&PlayerSnapshot> {
        self.state.as_ref()
    }

    pub fn clear(&mut self) {
        self.state = None;
        self.last_input_ms = None;
    }

    /// Apply input the moment it is sent. Frame scaling matches the server.
    pub fn apply_input(&mut self, input: &InputState, now_ms: u64) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if !state.alive {
            return;
        }

        let dt = match self.last_input_ms {
            Some(last) => (now_ms.saturating_sub(last) as f32 / FRAME_MS).min(MAX_FRAME_DELTA),
            None => 1.0,
        };
        self.last_input_ms = Some(now_ms);

        state.stance = if input.crouching {
            Stance::Crouched
        } else {
            Stance::Standing
        };
        let speed = movement_speed(input, state.stamina);
        state.stamina = next_stamina(input, state.stamina, dt);
        if let Some((dx, dy)) = movement_delta(input, speed, dt) {
            let (x, y) = match self.bounds {
                Some(bounds) => bounds.clamp(state.x + dx, state.y + dy, PLAYER_BOUNDS_MARGIN),
                None => (state.x + dx, state.y + dy),
            };
            state.x = x;
            state.y = y;
        }
        if let Some(angle) = input.angle {
            state.angle = angle;
        }
    }

    /// Fold in a snapshot. Vitals always follow the server; position only
    /// when the prediction has drifted past [`SNAP_THRESHOLD`].
    pub fn reconcile(&mut self, update: &GameStateUpdate) -> Correction {
        let Some(server) = update.players.iter().find(|p| p.id == self.player_id) else {
            return Correction::Missing;
        };

        let local = match self.state.as_mut() {
            Some(local) => local,
            None => {
                self.state = Some(server.clone());
                return Correction::Seeded;
            }
        };

        let divergence = (server.x - local.x).hypot(server.y - local.y);
        let (x, y, angle) = (local.x, local.y, local.angle);
        *local = server.clone();

        if divergence > SNAP_THRESHOLD {
            Correction::Snapped { divergence }
        } else {
            local.x = x;
            local.y = y;
            local.angle = angle;
            Correction::Kept { divergence }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::scoring::ScoreBoard;
    use crate::ws::protocol::{MatchPhase, Team, WeaponSlot};
    use uuid::Uuid;

    fn update(id: PlayerId, x: f32, y: f32, health: f32) -> GameStateUpdate {
        GameStateUpdate {
            state: MatchPhase::Playing,
            round: 1,
            round_time_remaining: 1_000,
            players: vec![PlayerSnapshot {
                id,
                name: "me".to_string(),
                team: Team::Criminals,
                x,
                y,
                angle: 0.0,
                health,
                max_health: 100.0,
                armor: 0.0,
                stamina: 100.0,
                stance: Stance::Standing,
                alive: true,
                current_weapon: WeaponSlot::Primary,
            }],
            civilians: Vec::new(),
            scores: ScoreBoard::default(),
        }
    }

    #[test]
    fn input_moves_the_local_player_immediately() {
        let id = Uuid::new_v4();
        let mut prediction = LocalPrediction::new(id);
        prediction.apply_input(&InputState::default(), 0);
        assert!(prediction.player().is_none());

        assert_eq!(prediction.reconcile(&update(id, 100.0, 100.0, 100.0)), Correction::Seeded);
        let right = InputState {
            dx: 1.0,
            ..InputState::default()
        };
        prediction.apply_input(&right, 0);
        prediction.apply_input(&right, 32);
        // one frame, then two frames at base speed
        assert!((prediction.player().unwrap().x - 104.5).abs() < 1e-4);
    }

    #[test]
    fn sprinting_drains_predicted_stamina() {
        let id = Uuid::new_v4();
        let mut prediction = LocalPrediction::new(id);
        prediction.reconcile(&update(id, 100.0, 100.0, 100.0));

        let sprint = InputState {
            dx: 1.0,
            sprinting: true,
            ..InputState::default()
        };
        prediction.apply_input(&sprint, 0);
        prediction.apply_input(&sprint, 32);
        let me = prediction.player().unwrap();
        assert!((me.stamina - 97.6).abs() < 1e-3);
        assert!((me.x - 107.5).abs() < 1e-3);

        // Walking again recovers at the server's rate
        prediction.apply_input(&InputState::default(), 48);
        assert!((prediction.player().unwrap().stamina - 97.8).abs() < 1e-3);
    }

    #[test]
    fn small_divergence_keeps_prediction_but_takes_vitals() {
        let id = Uuid::new_v4();
        let mut prediction = LocalPrediction::new(id);
        prediction.reconcile(&update(id, 100.0, 100.0, 100.0));

        let correction = prediction.reconcile(&update(id, 130.0, 120.0, 40.0));
        assert!(
            matches!(correction, Correction::Kept { divergence } if (divergence - 36.0555).abs() < 1e-3)
        );
        let me = prediction.player().unwrap();
        assert_eq!((me.x, me.y), (100.0, 100.0));
        assert_eq!(me.health, 40.0);
    }

    #[test]
    fn large_divergence_snaps_to_server() {
        let id = Uuid::new_v4();
        let mut prediction = LocalPrediction::new(id);
        prediction.reconcile(&update(id, 100.0, 100.0, 100.0));

        let correction = prediction.reconcile(&update(id, 400.0, 100.0, 100.0));
        assert!(matches!(correction, Correction::Snapped { .. }));
        assert_eq!(prediction.player().unwrap().x, 400.0);
    }

    #[test]
    fn other_players_snapshots_are_ignored() {
        let mut prediction = LocalPrediction::new(Uuid::new_v4());
        assert_eq!(
            prediction.reconcile(&update(Uuid::new_v4(), 0.0, 0.0, 100.0)),
            Correction::Missing
        );
    }
}
