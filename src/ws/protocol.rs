//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::loadout::CatalogEntry;
use crate::game::scoring::{MatchResults, RoundSummary, ScoreBoard, ScoreChange};

/// The two asymmetric sides of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Cops,
    Criminals,
}

impl Team {
    pub fn opposite(self) -> Self {
        match self {
            Team::Cops => Team::Criminals,
            Team::Criminals => Team::Cops,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Team::Cops => "cops",
            Team::Criminals => "criminals",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Team {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cops" | "cop" => Ok(Team::Cops),
            "criminals" | "criminal" => Ok(Team::Criminals),
            other => Err(other.to_string()),
        }
    }
}

/// Match lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Created, nobody has joined yet
    Waiting,
    /// Players gathering before the first round
    Lobby,
    /// Players picking weapons and equipment
    LoadoutSelection,
    /// Spawned and frozen before the round goes live
    Countdown,
    /// Round in progress, tick loop running
    Playing,
    /// Round finished, waiting for the transition delay
    RoundEnd,
    /// Teams have just been swapped
    RoleSwitch,
    /// Final round played
    MatchEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    #[default]
    Standing,
    Crouched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponSlot {
    #[default]
    Primary,
    Secondary,
}

/// Why a round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundEndReason {
    /// Every cop is down, criminals take the round
    CriminalsEliminatedCops,
    /// Every criminal is down, cops take the round
    CopsEliminatedCriminals,
    TimerCopsWin,
    TimerCriminalsWin,
}

impl RoundEndReason {
    pub fn winner(self) -> Team {
        match self {
            RoundEndReason::CriminalsEliminatedCops | RoundEndReason::TimerCriminalsWin => {
                Team::Criminals
            }
            RoundEndReason::CopsEliminatedCriminals | RoundEndReason::TimerCopsWin => Team::Cops,
        }
    }

    pub fn is_elimination(self) -> bool {
        matches!(
            self,
            RoundEndReason::CriminalsEliminatedCops | RoundEndReason::CopsEliminatedCriminals
        )
    }
}

/// Loadout as submitted by a client. Missing slots decode as empty strings so
/// validation can name the slot instead of failing the whole frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadoutSelection {
    #[serde(default)]
    pub primary: String,
    #[serde(default)]
    pub secondary: String,
    #[serde(default)]
    pub equipment: String,
}

/// Movement/aim input for one client frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputState {
    /// Un-normalized direction
    #[serde(default)]
    pub dx: f32,
    #[serde(default)]
    pub dy: f32,
    /// Facing in radians, left untouched when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f32>,
    #[serde(default)]
    pub sprinting: bool,
    #[serde(default)]
    pub crouching: bool,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Join an existing match, or create one when the id is absent/unknown
    JoinMatch {
        #[serde(default)]
        match_id: Option<String>,
        #[serde(default)]
        player_name: Option<String>,
    },

    LeaveMatch,

    SelectLoadout {
        #[serde(default)]
        loadout: LoadoutSelection,
    },

    PlayerInput {
        input: InputState,
        /// Client-side reconciliation counter, not enforced by the server
        #[serde(default)]
        sequence: u32,
    },

    PlayerShoot {
        angle: f32,
    },

    PlayerInteract,

    PlayerReload,

    SwitchWeapon {
        weapon: WeaponSlot,
    },

    StartMatch,

    PlayerCommand {
        #[serde(default)]
        command_type: String,
    },
    PlayerTakeHostage,
    PlayerReleaseHostage,
    PlayerSurrender,
    PlayerArrest,
    PlayerEscape,
    PlayerSabotage,
    PlayerBreach,
    PlayerBarricade,
    PlayerUseEquipment,
}

impl ClientMsg {
    /// Every `type` tag the server understands
    pub const TYPES: &'static [&'static str] = &[
        "join_match",
        "leave_match",
        "select_loadout",
        "player_input",
        "player_shoot",
        "player_interact",
        "player_reload",
        "switch_weapon",
        "start_match",
        "player_command",
        "player_take_hostage",
        "player_release_hostage",
        "player_surrender",
        "player_arrest",
        "player_escape",
        "player_sabotage",
        "player_breach",
        "player_barricade",
        "player_use_equipment",
    ];

    /// Decode a text frame, rejecting unknown or malformed shapes before they
    /// reach the simulation.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if !Self::TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
            kind,
            reason: e.to_string(),
        })
    }

    /// Advanced-mechanic intents that are routed to the extension hook
    pub fn intent(&self) -> Option<Intent> {
        let intent = match self {
            ClientMsg::PlayerCommand { command_type } => Intent::Command {
                command_type: command_type.clone(),
            },
            ClientMsg::PlayerTakeHostage => Intent::TakeHostage,
            ClientMsg::PlayerReleaseHostage => Intent::ReleaseHostage,
            ClientMsg::PlayerSurrender => Intent::Surrender,
            ClientMsg::PlayerArrest => Intent::Arrest,
            ClientMsg::PlayerEscape => Intent::Escape,
            ClientMsg::PlayerSabotage => Intent::Sabotage,
            ClientMsg::PlayerBreach => Intent::Breach,
            ClientMsg::PlayerBarricade => Intent::Barricade,
            ClientMsg::PlayerUseEquipment => Intent::UseEquipment,
            _ => return None,
        };
        Some(intent)
    }
}

/// Declared protocol intents without a built-in server handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Command { command_type: String },
    TakeHostage,
    ReleaseHostage,
    Surrender,
    Arrest,
    Escape,
    Sabotage,
    Breach,
    Barricade,
    UseEquipment,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Command { .. } => "player_command",
            Intent::TakeHostage => "player_take_hostage",
            Intent::ReleaseHostage => "player_release_hostage",
            Intent::Surrender => "player_surrender",
            Intent::Arrest => "player_arrest",
            Intent::Escape => "player_escape",
            Intent::Sabotage => "player_sabotage",
            Intent::Breach => "player_breach",
            Intent::Barricade => "player_barricade",
            Intent::UseEquipment => "player_use_equipment",
        }
    }
}

/// Inbound frame decode failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Message has no type field")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Malformed {kind} message: {reason}")]
    Malformed { kind: String, reason: String },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Lifecycle state change outside of round start/end
    MatchState {
        state: MatchPhase,
        round: u32,
    },

    /// Sent directly to the joiner (with match id and loadouts) and then
    /// broadcast to every member
    PlayerJoined {
        player_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
        team: Team,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        match_id: Option<Uuid>,
        match_info: MatchInfo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        available_loadouts: Option<Vec<CatalogEntry>>,
    },

    PlayerLeft {
        player_id: Uuid,
    },

    /// Full world snapshot, sent every tick while playing
    GameStateUpdate(GameStateUpdate),

    RoundStart {
        round: u32,
    },

    RoundEnd {
        round: u32,
        reason: RoundEndReason,
        winner: Team,
        scores: ScoreBoard,
        summary: RoundSummary,
    },

    RoleSwitch {
        teams: TeamRosters,
    },

    MatchEnd {
        results: MatchResults,
    },

    PlayerKilled {
        killer: Uuid,
        victim: Uuid,
        score_change: ScoreChange,
    },

    CivilianRescued {
        player: Uuid,
        civilian_id: String,
        score_change: ScoreChange,
    },

    CivilianKilled {
        killer: Uuid,
        civilian_id: String,
        was_rescued: bool,
        score_change: ScoreChange,
    },

    LoadoutValidated {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        loadout: Option<LoadoutSelection>,
    },

    Error {
        code: String,
        error: String,
    },
}

impl ServerMsg {
    pub fn error(code: &str, error: impl Into<String>) -> Self {
        ServerMsg::Error {
            code: code.to_string(),
            error: error.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMsg::MatchState { .. } => "match_state",
            ServerMsg::PlayerJoined { .. } => "player_joined",
            ServerMsg::PlayerLeft { .. } => "player_left",
            ServerMsg::GameStateUpdate(_) => "game_state_update",
            ServerMsg::RoundStart { .. } => "round_start",
            ServerMsg::RoundEnd { .. } => "round_end",
            ServerMsg::RoleSwitch { .. } => "role_switch",
            ServerMsg::MatchEnd { .. } => "match_end",
            ServerMsg::PlayerKilled { .. } => "player_killed",
            ServerMsg::CivilianRescued { .. } => "civilian_rescued",
            ServerMsg::CivilianKilled { .. } => "civilian_killed",
            ServerMsg::LoadoutValidated { .. } => "loadout_validated",
            ServerMsg::Error { .. } => "error",
        }
    }
}

/// Public summary of a match (join replies, admin listing)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    pub match_id: Uuid,
    pub state: MatchPhase,
    pub round: u32,
    pub player_count: usize,
    pub max_players: usize,
    pub teams: TeamCounts,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamCounts {
    pub cops: usize,
    pub criminals: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRosters {
    pub cops: Vec<Uuid>,
    pub criminals: Vec<Uuid>,
}

/// World snapshot broadcast on the tick cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateUpdate {
    pub state: MatchPhase,
    pub round: u32,
    pub round_time_remaining: u64,
    pub players: Vec<PlayerSnapshot>,
    pub civilians: Vec<CivilianSnapshot>,
    pub scores: ScoreBoard,
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: Uuid,
    pub name: String,
    pub team: Team,
    pub x: f32,
    pub y: f32,
    /// Facing in radians
    pub angle: f32,
    pub health: f32,
    pub max_health: f32,
    pub armor: f32,
    pub stamina: f32,
    pub stance: Stance,
    pub alive: bool,
    pub current_weapon: WeaponSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CivilianSnapshot {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub health: f32,
    pub rescued: bool,
    pub dead: bool,
    pub scared: bool,
}
