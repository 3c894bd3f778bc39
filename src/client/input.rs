//! Outbound frame construction for clients

use crate::ws::protocol::{ClientMsg, InputState, LoadoutSelection, ServerMsg, WeaponSlot};

/// Stamps each `player_input` with a rising sequence number
#[derive(Debug, Clone, Default)]
pub struct InputEncoder {
    sequence: u32,
}

impl InputEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the last encoded input, 0 before the first one
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn encode(&mut self, input: InputState) -> ClientMsg {
        self.sequence = self.sequence.wrapping_add(1);
        ClientMsg::PlayerInput {
            input,
            sequence: self.sequence,
        }
    }
}

pub fn join(match_id: Option<&str>, player_name: Option<&str>) -> ClientMsg {
    ClientMsg::JoinMatch {
        match_id: match_id.map(str::to_string),
        player_name: player_name.map(str::to_string),
    }
}

pub fn select_loadout(primary: &str, secondary: &str, equipment: &str) -> ClientMsg {
    ClientMsg::SelectLoadout {
        loadout: LoadoutSelection {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
            equipment: equipment.to_string(),
        },
    }
}

pub fn shoot(angle: f32) -> ClientMsg {
    ClientMsg::PlayerShoot { angle }
}

pub fn switch_weapon(weapon: WeaponSlot) -> ClientMsg {
    ClientMsg::SwitchWeapon { weapon }
}

/// Serialize a message into a text frame
pub fn to_frame(msg: &ClientMsg) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Parse a server text frame
pub fn decode_server(text: &str) -> Result<ServerMsg, serde_json::Error> {
    serde_json::from_str(text)
}
