//! Consumer-side helpers: snapshot interpolation for remote entities,
//! prediction for the local player and input framing.

pub mod input;
pub mod interpolation;
pub mod prediction;

pub use input::InputEncoder;
pub use interpolation::{lerp, lerp_angle, SnapshotBuffer};
pub use prediction::{Correction, LocalPrediction};

use uuid::Uuid;

use crate::game::grid::Bounds;
use crate::game::PlayerId;
use crate::ws::protocol::{ClientMsg, GameStateUpdate, InputState, MatchPhase, ServerMsg, Team};

/// Client view of one match, fed with every server message in order
#[derive(Debug, Clone)]
pub struct ClientSession {
    player_id: Option<PlayerId>,
    team: Option<Team>,
    match_id: Option<Uuid>,
    phase: Option<MatchPhase>,
    round: u32,
    bounds: Option<Bounds>,
    buffer: SnapshotBuffer,
    prediction: Option<LocalPrediction>,
    encoder: InputEncoder,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSession {
    pub fn new() -> Self {
        Self {
            player_id: None,
            team: None,
            match_id: None,
            phase: None,
            round: 0,
            bounds: None,
            buffer: SnapshotBuffer::default(),
            prediction: None,
            encoder: InputEncoder::new(),
        }
    }

    /// Clamp predicted movement to the arena
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn team(&self) -> Option<Team> {
        self.team
    }

    pub fn match_id(&self) -> Option<Uuid> {
        self.match_id
    }

    pub fn phase(&self) -> Option<MatchPhase> {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn buffer(&self) -> &SnapshotBuffer {
        &self.buffer
    }

    pub fn prediction(&self) -> Option<&LocalPrediction> {
        self.prediction.as_ref()
    }

    /// Fold a server message into the local view. Returns the correction
    /// applied when the message was a world snapshot.
    pub fn handle(&mut self, msg: &ServerMsg, now_ms: u64) -> Option<Correction> {
        match msg {
            // Only the joiner's copy carries the match id
            ServerMsg::PlayerJoined {
                player_id,
                team,
                match_id: Some(match_id),
                match_info,
                ..
            } => {
                self.player_id = Some(*player_id);
                self.team = Some(*team);
                self.match_id = Some(*match_id);
                self.phase = Some(match_info.state);
                self.round = match_info.round;
                self.buffer.clear();
                let prediction = LocalPrediction::new(*player_id);
                self.prediction = Some(match self.bounds {
                    Some(bounds) => prediction.with_bounds(bounds),
                    None => prediction,
                });
                None
            }
            ServerMsg::MatchState { state, round } => {
                self.phase = Some(*state);
                self.round = *round;
                None
            }
            ServerMsg::RoundStart { round } => {
                self.round = *round;
                None
            }
            ServerMsg::RoleSwitch { teams } => {
                if let Some(id) = self.player_id {
                    if teams.cops.contains(&id) {
                        self.team = Some(Team::Cops);
                    } else if teams.criminals.contains(&id) {
                        self.team = Some(Team::Criminals);
                    }
                }
                self.phase = Some(MatchPhase::RoleSwitch);
                None
            }
            ServerMsg::MatchEnd { .. } => {
                self.phase = Some(MatchPhase::MatchEnd);
                None
            }
            ServerMsg::GameStateUpdate(update) => {
                self.phase = Some(update.state);
                self.round = update.round;
                self.buffer.push(now_ms, update.clone());
                self.prediction.as_mut().map(|p| p.reconcile(update))
            }
            _ => None,
        }
    }

    /// Predict `input` locally and build the frame to send
    pub fn send_input(&mut self, input: InputState, now_ms: u64) -> ClientMsg {
        if let Some(prediction) = self.prediction.as_mut() {
            prediction.apply_input(&input, now_ms);
        }
        self.encoder.encode(input)
    }

    /// Interpolated world with the local player taken from the prediction
    pub fn render(&self, now_ms: u64) -> Option<GameStateUpdate> {
        let mut state = self.buffer.render_state(now_ms)?;
        if let Some(local) = self.prediction.as_ref().and_then(LocalPrediction::player) {
            if let Some(slot) = state.players.iter_mut().find(|p| p.id == local.id) {
                *slot = local.clone();
            }
        }
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::scoring::ScoreBoard;
    use crate::ws::protocol::{MatchInfo, PlayerSnapshot, Stance, TeamCounts, TeamRosters, WeaponSlot};
    use chrono::Utc;

    fn joined(player_id: Uuid, match_id: Option<Uuid>) -> ServerMsg {
        ServerMsg::PlayerJoined {
            player_id,
            player_name: Some("me".to_string()),
            team: Team::Cops,
            match_id,
            match_info: MatchInfo {
                match_id: match_id.unwrap_or_else(Uuid::nil),
                state: MatchPhase::Lobby,
                round: 1,
                player_count: 1,
                max_players: 10,
                teams: TeamCounts { cops: 1, criminals: 0 },
                created_at: Utc::now(),
            },
            available_loadouts: None,
        }
    }

    fn world(players: Vec<(Uuid, f32)>) -> ServerMsg {
        ServerMsg::GameStateUpdate(GameStateUpdate {
            state: MatchPhase::Playing,
            round: 1,
            round_time_remaining: 10_000,
            players: players
                .into_iter()
                .map(|(id, x)| PlayerSnapshot {
                    id,
                    name: "p".to_string(),
                    team: Team::Cops,
                    x,
                    y: 100.0,
                    angle: 0.0,
                    health: 100.0,
                    max_health: 100.0,
                    armor: 0.0,
                    stamina: 100.0,
                    stance: Stance::Standing,
                    alive: true,
                    current_weapon: WeaponSlot::Primary,
                })
                .collect(),
            civilians: Vec::new(),
            scores: ScoreBoard::default(),
        })
    }

    #[test]
    fn broadcast_join_of_someone_else_is_ignored() {
        let mut session = ClientSession::new();
        session.handle(&joined(Uuid::new_v4(), None), 0);
        assert!(session.player_id().is_none());

        let me = Uuid::new_v4();
        let match_id = Uuid::new_v4();
        session.handle(&joined(me, Some(match_id)), 0);
        assert_eq!(session.player_id(), Some(me));
        assert_eq!(session.match_id(), Some(match_id));
        assert_eq!(session.phase(), Some(MatchPhase::Lobby));
    }

    #[test]
    fn role_switch_updates_own_team() {
        let me = Uuid::new_v4();
        let mut session = ClientSession::new();
        session.handle(&joined(me, Some(Uuid::new_v4())), 0);

        session.handle(
            &ServerMsg::RoleSwitch {
                teams: TeamRosters {
                    cops: vec![Uuid::new_v4()],
                    criminals: vec![me],
                },
            },
            0,
        );
        assert_eq!(session.team(), Some(Team::Criminals));
        assert_eq!(session.phase(), Some(MatchPhase::RoleSwitch));
    }

    #[test]
    fn render_blends_remotes_and_predicts_self() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut session = ClientSession::new();
        session.handle(&joined(me, Some(Uuid::new_v4())), 0);

        let first = session.handle(&world(vec![(me, 100.0), (other, 0.0)]), 1_000);
        assert_eq!(first, Some(Correction::Seeded));
        session.handle(&world(vec![(me, 100.0), (other, 100.0)]), 1_100);

        let frame = session.send_input(
            InputState {
                dx: 1.0,
                ..InputState::default()
            },
            1_120,
        );
        assert!(matches!(frame, ClientMsg::PlayerInput { sequence: 1, .. }));

        let state = session.render(1_150).unwrap();
        let remote = state.players.iter().find(|p| p.id == other).unwrap();
        assert!((remote.x - 50.0).abs() < 1e-3);
        let local = state.players.iter().find(|p| p.id == me).unwrap();
        assert!((local.x - 101.5).abs() < 1e-3);
    }
}
