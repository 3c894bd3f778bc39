//! Game simulation modules

pub mod civilian;
pub mod combat;
pub mod coordinator;
pub mod grid;
pub mod loadout;
pub mod r#match;
pub mod player;
pub mod scoring;
pub mod snapshot;
pub mod timers;

pub use coordinator::{MatchCoordinator, MatchHooks, Outbound};
pub use grid::MapLayout;
pub use r#match::{DirectSender, GameMatch, MatchCommand, MatchError, MatchHandle, MatchRegistry};

use uuid::Uuid;

/// Connection-scoped player identity
pub type PlayerId = Uuid;
