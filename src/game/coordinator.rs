//! Match coordinator - round lifecycle state machine for one match
//!
//! The coordinator is synchronous and clock-agnostic: every entry point takes
//! the current match time in milliseconds, and everything it wants sent is
//! queued in an outbox that the owning task drains. Deferred work lives in a
//! keyed [`Scheduler`] so nothing can fire after the coordinator is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{MatchRules, StartPolicy};
use crate::ws::protocol::{
    ClientMsg, InputState, Intent, LoadoutSelection, MatchInfo, MatchPhase, RoundEndReason,
    ServerMsg, Team, TeamCounts, TeamRosters, WeaponSlot,
};

use super::civilian::Civilian;
use super::combat::{CombatSystem, HitResult, HitTarget, TargetPoint};
use super::grid::{MapLayout, SpawnPoints, TilePoint};
use super::loadout::{self, Category, ResolvedLoadout};
use super::player::{FireRejection, PlayerSession};
use super::scoring::{PointTable, ScoreBoard, ScoringLedger};
use super::snapshot::SnapshotBuilder;
use super::timers::{FiredTimer, Scheduler, TimerKey};
use super::PlayerId;

/// Cops must be this close to a civilian to rescue them
pub const RESCUE_RANGE: f32 = 40.0;
const MAX_NAME_LEN: usize = 24;

/// A message queued for delivery
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Broadcast(ServerMsg),
    Direct(PlayerId, ServerMsg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Match is full")]
    MatchFull,

    #[error("Player is already in this match")]
    DuplicatePlayer,
}

impl JoinError {
    pub fn code(&self) -> &'static str {
        match self {
            JoinError::MatchFull => "match_full",
            JoinError::DuplicatePlayer => "duplicate_player",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("Match cannot be started from {0:?}")]
    WrongPhase(MatchPhase),

    #[error("Not enough players: {have} of {need}")]
    NotEnoughPlayers { have: usize, need: usize },

    #[error("Teams must be {team_size} vs {team_size}, got {cops} vs {criminals}")]
    UnbalancedTeams {
        cops: usize,
        criminals: usize,
        team_size: usize,
    },
}

impl StartError {
    pub fn code(&self) -> &'static str {
        match self {
            StartError::WrongPhase(_) => "wrong_phase",
            StartError::NotEnoughPlayers { .. } => "not_enough_players",
            StartError::UnbalancedTeams { .. } => "unbalanced_teams",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RescueError {
    #[error("Round is not live")]
    NotPlaying,

    #[error("Dead players cannot rescue")]
    NotAlive,

    #[error("Only cops can rescue")]
    NotACop,

    #[error("No civilian nearby")]
    NoCivilianNearby,
}

/// Passed to `on_player_death` hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerDeath {
    pub round: u32,
    pub killer: PlayerId,
    pub victim: PlayerId,
    pub killer_team: Team,
    pub victim_team: Team,
}

/// Passed to `on_round_end` hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundEnded {
    pub round: u32,
    pub reason: RoundEndReason,
    pub winner: Team,
    pub scores: ScoreBoard,
}

/// What an intent handler may see and change
pub struct IntentContext<'a> {
    pub match_id: Uuid,
    pub round: u32,
    pub phase: MatchPhase,
    pub players: &'a mut HashMap<PlayerId, PlayerSession>,
    pub civilians: &'a mut [Civilian],
    pub ledger: &'a mut ScoringLedger,
}

type DeathHook = Box<dyn FnMut(&PlayerDeath) + Send>;
type RoundEndHook = Box<dyn FnMut(&RoundEnded) + Send>;
/// Returns messages to broadcast, or an error for the requester
pub type IntentHook =
    Box<dyn FnMut(&mut IntentContext<'_>, PlayerId, &Intent) -> Result<Vec<ServerMsg>, String> + Send>;

/// Lifecycle callbacks registered by feature modules
#[derive(Default)]
pub struct MatchHooks {
    death: Vec<DeathHook>,
    round_end: Vec<RoundEndHook>,
    intent: Option<IntentHook>,
}

impl MatchHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_player_death(&mut self, hook: impl FnMut(&PlayerDeath) + Send + 'static) -> &mut Self {
        self.death.push(Box::new(hook));
        self
    }

    pub fn on_round_end(&mut self, hook: impl FnMut(&RoundEnded) + Send + 'static) -> &mut Self {
        self.round_end.push(Box::new(hook));
        self
    }

    /// Install the handler for advanced intents, replacing any previous one
    pub fn on_intent(
        &mut self,
        hook: impl FnMut(&mut IntentContext<'_>, PlayerId, &Intent) -> Result<Vec<ServerMsg>, String>
            + Send
            + 'static,
    ) -> &mut Self {
        self.intent = Some(Box::new(hook));
        self
    }
}

/// Authoritative state for one match
pub struct MatchCoordinator {
    id: Uuid,
    created_at: DateTime<Utc>,
    rules: MatchRules,
    phase: MatchPhase,
    current_round: u32,
    round_started_at: Option<u64>,
    round_time_remaining: u64,
    last_tick_ms: u64,
    role_switched: bool,

    map: Arc<MapLayout>,
    spawns: SpawnPoints,
    players: HashMap<PlayerId, PlayerSession>,
    /// Join order, used for spawn rotation and snapshot ordering
    order: Vec<PlayerId>,
    civilians: Vec<Civilian>,

    ledger: ScoringLedger,
    scheduler: Scheduler,
    hooks: MatchHooks,
    snapshots: SnapshotBuilder,
    rng: ChaCha8Rng,
    outbox: Vec<Outbound>,
}

impl MatchCoordinator {
    pub fn new(id: Uuid, rules: MatchRules, map: Arc<MapLayout>, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let spawns = SpawnPoints::from_map(&map.grid, &map.entities, &mut rng);

        Self {
            id,
            created_at: Utc::now(),
            round_time_remaining: rules.round_time_limit_ms,
            rules,
            phase: MatchPhase::Waiting,
            current_round: 0,
            round_started_at: None,
            last_tick_ms: 0,
            role_switched: false,
            map,
            spawns,
            players: HashMap::new(),
            order: Vec::new(),
            civilians: Vec::new(),
            ledger: ScoringLedger::new(PointTable::default()),
            scheduler: Scheduler::new(),
            hooks: MatchHooks::default(),
            snapshots: SnapshotBuilder::new(1),
            rng,
            outbox: Vec::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: MatchHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn rules(&self) -> &MatchRules {
        &self.rules
    }

    pub fn round_time_remaining(&self) -> u64 {
        self.round_time_remaining
    }

    pub fn player(&self, id: &PlayerId) -> Option<&PlayerSession> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut PlayerSession> {
        self.players.get_mut(id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn civilians(&self) -> &[Civilian] {
        &self.civilians
    }

    pub fn civilians_mut(&mut self) -> &mut [Civilian] {
        &mut self.civilians
    }

    pub fn ledger(&self) -> &ScoringLedger {
        &self.ledger
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn hooks_mut(&mut self) -> &mut MatchHooks {
        &mut self.hooks
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.scheduler.next_deadline()
    }

    /// Take every queued message
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    pub fn team_counts(&self) -> TeamCounts {
        let cops = self.players.values().filter(|p| p.team == Team::Cops).count();
        TeamCounts {
            cops,
            criminals: self.players.len() - cops,
        }
    }

    pub fn rosters(&self) -> TeamRosters {
        let mut rosters = TeamRosters::default();
        for p in self.order.iter().filter_map(|id| self.players.get(id)) {
            match p.team {
                Team::Cops => rosters.cops.push(p.id),
                Team::Criminals => rosters.criminals.push(p.id),
            }
        }
        rosters
    }

    /// Living players per side as (cops, criminals)
    pub fn alive_counts(&self) -> (usize, usize) {
        self.players
            .values()
            .filter(|p| p.alive)
            .fold((0, 0), |(cops, criminals), p| match p.team {
                Team::Cops => (cops + 1, criminals),
                Team::Criminals => (cops, criminals + 1),
            })
    }

    pub fn info(&self) -> MatchInfo {
        MatchInfo {
            match_id: self.id,
            state: self.phase,
            round: self.current_round,
            player_count: self.players.len(),
            max_players: self.rules.max_players,
            teams: self.team_counts(),
            created_at: self.created_at,
        }
    }

    fn broadcast(&mut self, msg: ServerMsg) {
        self.outbox.push(Outbound::Broadcast(msg));
    }

    fn direct(&mut self, player: PlayerId, msg: ServerMsg) {
        self.outbox.push(Outbound::Direct(player, msg));
    }

    /// Route a decoded client message from a member of this match
    pub fn handle_message(&mut self, player_id: PlayerId, msg: ClientMsg, now_ms: u64) {
        if !self.players.contains_key(&player_id) {
            return;
        }

        match msg {
            ClientMsg::JoinMatch { .. } => {
                self.direct(
                    player_id,
                    ServerMsg::error("already_joined", "Already in a match"),
                );
            }
            ClientMsg::LeaveMatch => {
                self.leave(player_id, now_ms);
            }
            ClientMsg::SelectLoadout { loadout } => {
                self.confirm_loadout(player_id, &loadout, now_ms);
            }
            ClientMsg::PlayerInput { input, sequence } => {
                self.player_input(player_id, &input, sequence, now_ms);
            }
            ClientMsg::PlayerShoot { angle } => {
                if let Err(reason) = self.player_shoot(player_id, angle, now_ms) {
                    debug!(match_id = %self.id, player_id = %player_id, %reason, "Shot rejected");
                }
            }
            ClientMsg::PlayerInteract => {
                if let Err(RescueError::NotACop) = self.interact(player_id) {
                    self.direct(
                        player_id,
                        ServerMsg::error("rescue_failed", RescueError::NotACop.to_string()),
                    );
                }
            }
            ClientMsg::PlayerReload => {
                self.player_reload(player_id, now_ms);
            }
            ClientMsg::SwitchWeapon { weapon } => {
                self.switch_weapon(player_id, weapon);
            }
            ClientMsg::StartMatch => {
                if let Err(e) = self.start_match(now_ms) {
                    self.direct(player_id, ServerMsg::error(e.code(), e.to_string()));
                }
            }
            other => {
                if let Some(intent) = other.intent() {
                    self.intent(player_id, intent);
                }
            }
        }
    }

    /// Admit a player to the smaller team (ties go to cops)
    pub fn join(
        &mut self,
        player_id: PlayerId,
        name: Option<String>,
        now_ms: u64,
    ) -> Result<Team, JoinError> {
        if self.players.contains_key(&player_id) {
            return Err(JoinError::DuplicatePlayer);
        }
        if self.players.len() >= self.rules.max_players {
            return Err(JoinError::MatchFull);
        }

        let counts = self.team_counts();
        let team = if counts.cops <= counts.criminals {
            Team::Cops
        } else {
            Team::Criminals
        };

        let name = name
            .map(|n| n.trim().chars().take(MAX_NAME_LEN).collect::<String>())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Player_{}", &player_id.to_string()[..8]));

        let mut session = PlayerSession::new(player_id, name.clone(), team, now_ms);
        // Late joiners spectate until the next round spawns them
        if matches!(self.phase, MatchPhase::Countdown | MatchPhase::Playing) {
            session.alive = false;
        }

        self.players.insert(player_id, session);
        self.order.push(player_id);
        self.ledger.init_player(player_id, team);

        if self.phase == MatchPhase::Waiting {
            self.phase = MatchPhase::Lobby;
        }

        let match_info = self.info();
        self.direct(
            player_id,
            ServerMsg::PlayerJoined {
                player_id,
                player_name: Some(name.clone()),
                team,
                match_id: Some(self.id),
                match_info: match_info.clone(),
                available_loadouts: Some(loadout::available(team, Category::Primary)),
            },
        );
        self.broadcast(ServerMsg::PlayerJoined {
            player_id,
            player_name: Some(name),
            team,
            match_id: None,
            match_info,
            available_loadouts: None,
        });

        info!(
            match_id = %self.id,
            player_id = %player_id,
            team = %team,
            player_count = self.players.len(),
            "Player joined match"
        );

        Ok(team)
    }

    /// Remove a player and everything scheduled for them
    pub fn leave(&mut self, player_id: PlayerId, now_ms: u64) -> bool {
        if self.players.remove(&player_id).is_none() {
            return false;
        }
        self.order.retain(|id| *id != player_id);
        self.scheduler.cancel_player(player_id);

        self.broadcast(ServerMsg::PlayerLeft { player_id });

        info!(
            match_id = %self.id,
            player_id = %player_id,
            player_count = self.players.len(),
            "Player left match"
        );

        if self.phase == MatchPhase::LoadoutSelection {
            self.check_all_confirmed(now_ms);
        }
        true
    }

    pub fn start_match(&mut self, now_ms: u64) -> Result<(), StartError> {
        if self.phase != MatchPhase::Lobby {
            return Err(StartError::WrongPhase(self.phase));
        }

        let have = self.players.len();
        match self.rules.start_policy {
            StartPolicy::Strict => {
                let need = self.rules.team_size * 2;
                if have < need {
                    return Err(StartError::NotEnoughPlayers { have, need });
                }
                let counts = self.team_counts();
                if counts.cops != self.rules.team_size || counts.criminals != self.rules.team_size {
                    return Err(StartError::UnbalancedTeams {
                        cops: counts.cops,
                        criminals: counts.criminals,
                        team_size: self.rules.team_size,
                    });
                }
            }
            StartPolicy::Permissive => {
                if have < self.rules.min_players {
                    return Err(StartError::NotEnoughPlayers {
                        have,
                        need: self.rules.min_players,
                    });
                }
            }
        }

        self.current_round = 1;
        info!(match_id = %self.id, players = have, "Match starting");
        self.enter_loadout_selection(now_ms);
        Ok(())
    }

    fn enter_loadout_selection(&mut self, now_ms: u64) {
        self.phase = MatchPhase::LoadoutSelection;
        for player in self.players.values_mut() {
            player.loadout_confirmed = false;
        }

        self.broadcast(ServerMsg::MatchState {
            state: self.phase,
            round: self.current_round,
        });
        self.scheduler.schedule(
            TimerKey::LoadoutTimeout,
            now_ms + self.rules.loadout_selection_ms,
        );
    }

    /// Validate a loadout against the player's current team. Only accepted
    /// while loadout selection is open.
    pub fn confirm_loadout(&mut self, player_id: PlayerId, selection: &LoadoutSelection, now_ms: u64) {
        if self.phase != MatchPhase::LoadoutSelection {
            return;
        }
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };

        match ResolvedLoadout::resolve(player.team, selection) {
            Ok(_) => {
                player.chosen_loadout = Some(selection.clone());
                player.loadout_confirmed = true;
                self.direct(
                    player_id,
                    ServerMsg::LoadoutValidated {
                        success: true,
                        error: None,
                        loadout: Some(selection.clone()),
                    },
                );
                self.check_all_confirmed(now_ms);
            }
            Err(e) => {
                debug!(match_id = %self.id, player_id = %player_id, error = %e, "Loadout rejected");
                self.direct(
                    player_id,
                    ServerMsg::LoadoutValidated {
                        success: false,
                        error: Some(e.to_string()),
                        loadout: None,
                    },
                );
            }
        }
    }

    fn check_all_confirmed(&mut self, now_ms: u64) {
        if self.phase == MatchPhase::LoadoutSelection
            && !self.players.is_empty()
            && self.players.values().all(|p| p.loadout_confirmed)
        {
            self.begin_countdown(now_ms);
        }
    }

    fn begin_countdown(&mut self, now_ms: u64) {
        self.scheduler.cancel(TimerKey::LoadoutTimeout);
        self.scheduler.cancel_all_players();
        self.phase = MatchPhase::Countdown;

        self.spawn_players(now_ms);
        self.spawn_civilians(now_ms);
        self.ledger.begin_round(self.current_round);

        self.broadcast(ServerMsg::RoundStart {
            round: self.current_round,
        });
        self.scheduler
            .schedule(TimerKey::CountdownComplete, now_ms + self.rules.countdown_ms);

        info!(
            match_id = %self.id,
            round = self.current_round,
            civilians = self.civilians.len(),
            "Round countdown"
        );
    }

    fn spawn_players(&mut self, now_ms: u64) {
        let fallback = {
            let bounds = self.map.grid.bounds();
            (bounds.width / 2.0, bounds.height / 2.0)
        };
        let mut cop_index = 0;
        let mut criminal_index = 0;

        for id in &self.order {
            let Some(player) = self.players.get_mut(id) else {
                continue;
            };
            let slot = match player.team {
                Team::Cops => {
                    cop_index += 1;
                    cycle(&self.spawns.cops, cop_index - 1)
                }
                Team::Criminals => {
                    criminal_index += 1;
                    cycle(&self.spawns.criminals, criminal_index - 1)
                }
            };
            let (x, y) = slot.map(TilePoint::to_world).unwrap_or(fallback);
            let kit = player.spawn_kit();
            player.reset_for_round(x, y, kit, now_ms);
        }
    }

    fn spawn_civilians(&mut self, now_ms: u64) {
        self.civilians.clear();
        if self.spawns.civilians.is_empty() {
            return;
        }

        let count = self
            .rng
            .gen_range(self.rules.min_civilians..=self.rules.max_civilians);
        for i in 0..count {
            let Some(point) = cycle(&self.spawns.civilians, i) else {
                break;
            };
            let (x, y) = point.to_world();
            let civilian = Civilian::spawn(self.current_round, i, x, y, &mut self.rng, now_ms);
            self.civilians.push(civilian);
        }
    }

    fn begin_playing(&mut self, now_ms: u64) {
        self.phase = MatchPhase::Playing;
        self.round_started_at = Some(now_ms);
        self.round_time_remaining = self.rules.round_time_limit_ms;
        self.last_tick_ms = now_ms;

        self.scheduler
            .schedule(TimerKey::RoundTimeout, now_ms + self.rules.round_time_limit_ms);
        self.broadcast(ServerMsg::MatchState {
            state: self.phase,
            round: self.current_round,
        });

        info!(match_id = %self.id, round = self.current_round, "Round live");
    }

    /// One simulation step: civilians, snapshot, then the elimination check
    pub fn tick(&mut self, now_ms: u64) {
        if self.phase != MatchPhase::Playing {
            return;
        }

        let elapsed = now_ms.saturating_sub(self.last_tick_ms);
        self.last_tick_ms = now_ms;
        let dt = (elapsed as f32 / self.rules.tick_ms as f32).min(3.0);

        if let Some(started) = self.round_started_at {
            self.round_time_remaining = self
                .rules
                .round_time_limit_ms
                .saturating_sub(now_ms.saturating_sub(started));
        }

        let threats: Vec<(f32, f32)> = self
            .players
            .values()
            .filter(|p| p.alive)
            .map(|p| (p.x, p.y))
            .collect();
        let bounds = self.map.grid.bounds();
        for civilian in &mut self.civilians {
            civilian.update(dt, &threats, bounds, now_ms, &mut self.rng);
        }

        if self.snapshots.should_send() {
            let snapshot = self.snapshot();
            self.broadcast(snapshot);
        }

        self.check_round_end(now_ms);
    }

    /// Current `game_state_update`
    pub fn snapshot(&mut self) -> ServerMsg {
        self.snapshots.build(
            self.phase,
            self.current_round,
            self.round_time_remaining,
            &self.order,
            &self.players,
            &self.civilians,
            self.ledger.scores(),
        )
    }

    fn check_round_end(&mut self, now_ms: u64) {
        if self.phase != MatchPhase::Playing || self.players.is_empty() {
            return;
        }

        let (cops, criminals) = self.alive_counts();
        if cops == 0 {
            self.end_round(RoundEndReason::CriminalsEliminatedCops, now_ms);
        } else if criminals == 0 {
            self.end_round(RoundEndReason::CopsEliminatedCriminals, now_ms);
        }
    }

    fn end_round_by_timer(&mut self, now_ms: u64) {
        let (cops, criminals) = self.alive_counts();
        let reason = if cops >= criminals {
            RoundEndReason::TimerCopsWin
        } else {
            RoundEndReason::TimerCriminalsWin
        };
        self.end_round(reason, now_ms);
    }

    fn end_round(&mut self, reason: RoundEndReason, now_ms: u64) {
        if self.phase != MatchPhase::Playing {
            return;
        }

        self.scheduler.cancel(TimerKey::RoundTimeout);
        self.scheduler.cancel_all_players();
        self.phase = MatchPhase::RoundEnd;

        let round = self.current_round;
        let winner = reason.winner();
        let summary = self.ledger.end_round(round);
        let scores = self.ledger.scores();

        self.broadcast(ServerMsg::RoundEnd {
            round,
            reason,
            winner,
            scores,
            summary,
        });

        info!(
            match_id = %self.id,
            round,
            reason = ?reason,
            winner = %winner,
            cops = scores.team_scores.cops,
            criminals = scores.team_scores.criminals,
            "Round ended"
        );

        let event = RoundEnded {
            round,
            reason,
            winner,
            scores,
        };
        for hook in &mut self.hooks.round_end {
            hook(&event);
        }

        if round >= self.rules.total_rounds {
            self.end_match();
            return;
        }

        if round == self.rules.role_switch_round && !self.role_switched {
            self.switch_roles();
        }

        self.current_round += 1;
        self.scheduler
            .schedule(TimerKey::RoundTransition, now_ms + self.rules.round_transition_ms);
    }

    fn switch_roles(&mut self) {
        for player in self.players.values_mut() {
            player.team = player.team.opposite();
        }
        self.ledger.switch_all_teams();
        self.role_switched = true;
        self.phase = MatchPhase::RoleSwitch;

        let teams = self.rosters();
        info!(
            match_id = %self.id,
            cops = teams.cops.len(),
            criminals = teams.criminals.len(),
            "Roles switched"
        );
        self.broadcast(ServerMsg::RoleSwitch { teams });
    }

    fn end_match(&mut self) {
        self.phase = MatchPhase::MatchEnd;
        self.scheduler.cancel_all();

        let results = self.ledger.match_results();
        info!(
            match_id = %self.id,
            winner = ?results.winner,
            cops = results.final_scores.cops,
            criminals = results.final_scores.criminals,
            "Match ended"
        );
        self.broadcast(ServerMsg::MatchEnd { results });
    }

    /// Run every timer due at or before `now_ms`, one at a time so a handler
    /// can still cancel later ones. Handlers run at their own deadline so
    /// chained transitions stay on schedule.
    pub fn fire_due_timers(&mut self, now_ms: u64) {
        while let Some(timer) = self.scheduler.pop_next_due(now_ms) {
            self.on_timer(timer);
        }
    }

    fn on_timer(&mut self, timer: FiredTimer) {
        let at = timer.due_ms;
        match timer.key {
            TimerKey::LoadoutTimeout => {
                if self.phase == MatchPhase::LoadoutSelection {
                    debug!(match_id = %self.id, "Loadout selection timed out");
                    self.begin_countdown(at);
                }
            }
            TimerKey::CountdownComplete => {
                if self.phase == MatchPhase::Countdown {
                    self.begin_playing(at);
                }
            }
            TimerKey::RoundTimeout => {
                if self.phase == MatchPhase::Playing {
                    self.end_round_by_timer(at);
                }
            }
            TimerKey::RoundTransition => {
                if matches!(self.phase, MatchPhase::RoundEnd | MatchPhase::RoleSwitch) {
                    self.enter_loadout_selection(at);
                }
            }
            TimerKey::FireCooldown(id) => {
                if let Some(player) = self.players.get_mut(&id) {
                    player.can_fire = true;
                }
            }
            TimerKey::ReloadComplete(id) => {
                if let Some(player) = self.players.get_mut(&id) {
                    player.finish_reload(timer.token);
                }
            }
        }
    }

    /// Movement input, applied immediately while the round is live
    pub fn player_input(
        &mut self,
        player_id: PlayerId,
        input: &InputState,
        sequence: u32,
        now_ms: u64,
    ) {
        if self.phase != MatchPhase::Playing {
            return;
        }
        let bounds = self.map.grid.bounds();
        if let Some(player) = self.players.get_mut(&player_id) {
            player.last_input_seq = sequence;
            player.process_input(input, now_ms, bounds);
        }
    }

    /// Fire the active weapon and resolve every pellet
    pub fn player_shoot(
        &mut self,
        player_id: PlayerId,
        aim: f32,
        now_ms: u64,
    ) -> Result<Vec<HitResult>, FireRejection> {
        if self.phase != MatchPhase::Playing {
            return Err(FireRejection::NotPlaying);
        }
        let shooter = self
            .players
            .get_mut(&player_id)
            .ok_or(FireRejection::NotAlive)?;
        let shooter_team = shooter.team;
        let solution = shooter.try_fire()?;

        self.scheduler
            .schedule(TimerKey::FireCooldown(player_id), now_ms + solution.cooldown_ms);

        let mut hits = Vec::new();
        for _ in 0..solution.pellets {
            let angle = CombatSystem::pellet_angle(&mut self.rng, aim, solution.spread);

            let players: Vec<TargetPoint<PlayerId>> = self
                .order
                .iter()
                .filter(|id| **id != player_id)
                .filter_map(|id| self.players.get(id))
                .filter(|p| p.alive)
                .map(|p| TargetPoint {
                    key: p.id,
                    x: p.x,
                    y: p.y,
                })
                .collect();
            let civilians: Vec<TargetPoint<usize>> = self
                .civilians
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.dead)
                .map(|(i, c)| TargetPoint { key: i, x: c.x, y: c.y })
                .collect();

            if let Some((target, x, y)) =
                CombatSystem::cast_ray(&self.map.grid, solution.origin, angle, &players, &civilians)
            {
                let hit = HitResult {
                    shooter_id: player_id,
                    target,
                    damage: solution.damage,
                    x,
                    y,
                };
                self.apply_hit(&hit, shooter_team);
                hits.push(hit);
            }
        }

        Ok(hits)
    }

    fn apply_hit(&mut self, hit: &HitResult, shooter_team: Team) {
        match hit.target {
            HitTarget::Player(victim_id) => {
                let Some(victim) = self.players.get_mut(&victim_id) else {
                    return;
                };
                if !victim.take_damage(hit.damage).killed {
                    return;
                }
                let victim_team = victim.team;
                self.scheduler.cancel_player(victim_id);

                let score_change = self.ledger.record_player_kill(
                    hit.shooter_id,
                    victim_id,
                    shooter_team,
                    victim_team,
                );
                self.broadcast(ServerMsg::PlayerKilled {
                    killer: hit.shooter_id,
                    victim: victim_id,
                    score_change,
                });

                info!(
                    match_id = %self.id,
                    killer = %hit.shooter_id,
                    victim = %victim_id,
                    points = score_change.points_awarded,
                    "Player killed"
                );

                let death = PlayerDeath {
                    round: self.current_round,
                    killer: hit.shooter_id,
                    victim: victim_id,
                    killer_team: shooter_team,
                    victim_team,
                };
                for hook in &mut self.hooks.death {
                    hook(&death);
                }
            }
            HitTarget::Civilian(index) => {
                let Some(civilian) = self.civilians.get_mut(index) else {
                    return;
                };
                let Some(death) = civilian.take_damage(hit.damage) else {
                    return;
                };
                let civilian_id = civilian.id.clone();

                let score_change = self.ledger.record_civilian_killed(
                    hit.shooter_id,
                    &civilian_id,
                    death.was_rescued,
                    death.was_hostage,
                    shooter_team,
                );
                info!(
                    match_id = %self.id,
                    killer = %hit.shooter_id,
                    civilian = %civilian_id,
                    points = score_change.points_awarded,
                    "Civilian killed"
                );
                self.broadcast(ServerMsg::CivilianKilled {
                    killer: hit.shooter_id,
                    civilian_id,
                    was_rescued: death.was_rescued,
                    score_change,
                });
            }
        }
    }

    /// Start a reload; returns whether one was scheduled
    pub fn player_reload(&mut self, player_id: PlayerId, now_ms: u64) -> bool {
        if !matches!(self.phase, MatchPhase::Countdown | MatchPhase::Playing) {
            return false;
        }
        let Some(player) = self.players.get_mut(&player_id) else {
            return false;
        };
        let Some(token) = player.begin_reload() else {
            return false;
        };

        self.scheduler.schedule_with_token(
            TimerKey::ReloadComplete(player_id),
            now_ms + self.rules.reload_ms,
            token,
        );
        true
    }

    pub fn switch_weapon(&mut self, player_id: PlayerId, slot: WeaponSlot) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.switch_weapon(slot);
        }
    }

    /// Rescue the closest free civilian within reach. Returns its id.
    pub fn interact(&mut self, player_id: PlayerId) -> Result<String, RescueError> {
        if self.phase != MatchPhase::Playing {
            return Err(RescueError::NotPlaying);
        }
        let player = self
            .players
            .get(&player_id)
            .ok_or(RescueError::NotPlaying)?;
        if !player.alive {
            return Err(RescueError::NotAlive);
        }
        if player.team != Team::Cops {
            return Err(RescueError::NotACop);
        }

        let (px, py) = (player.x, player.y);
        let index = self
            .civilians
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_active())
            .map(|(i, c)| (i, (c.x - px).hypot(c.y - py)))
            .filter(|(_, dist)| *dist < RESCUE_RANGE)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
            .ok_or(RescueError::NoCivilianNearby)?;

        let civilian = &mut self.civilians[index];
        civilian.rescued = true;
        civilian.scared = false;
        let civilian_id = civilian.id.clone();

        if let Some(score_change) = self.ledger.record_civilian_rescue(player_id, &civilian_id) {
            self.broadcast(ServerMsg::CivilianRescued {
                player: player_id,
                civilian_id: civilian_id.clone(),
                score_change,
            });
        }

        info!(match_id = %self.id, player_id = %player_id, civilian = %civilian_id, "Civilian rescued");
        Ok(civilian_id)
    }

    /// Hand an advanced intent to the registered handler
    pub fn intent(&mut self, player_id: PlayerId, intent: Intent) {
        let outcome = match self.hooks.intent.as_mut() {
            Some(hook) => {
                let mut ctx = IntentContext {
                    match_id: self.id,
                    round: self.current_round,
                    phase: self.phase,
                    players: &mut self.players,
                    civilians: &mut self.civilians,
                    ledger: &mut self.ledger,
                };
                Some(hook(&mut ctx, player_id, &intent))
            }
            None => None,
        };

        match outcome {
            Some(Ok(messages)) => {
                for msg in messages {
                    self.broadcast(msg);
                }
            }
            Some(Err(error)) => {
                self.direct(player_id, ServerMsg::error("intent_rejected", error));
            }
            None => {
                debug!(match_id = %self.id, intent = intent.name(), "No intent handler registered");
                self.direct(
                    player_id,
                    ServerMsg::error(
                        "unsupported_intent",
                        format!("{} is not supported on this server", intent.name()),
                    ),
                );
            }
        }
    }
}

/// Round-robin pick from a spawn list
fn cycle(points: &[TilePoint], index: usize) -> Option<TilePoint> {
    index.checked_rem(points.len()).map(|i| points[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::scoring::ScoreEventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator() -> MatchCoordinator {
        MatchCoordinator::new(
            Uuid::new_v4(),
            MatchRules::default(),
            Arc::new(MapLayout::default()),
            42,
        )
    }

    #[test]
    fn first_join_opens_the_lobby() {
        let mut m = coordinator();
        assert_eq!(m.phase(), MatchPhase::Waiting);
        m.join(Uuid::new_v4(), None, 0).unwrap();
        assert_eq!(m.phase(), MatchPhase::Lobby);
    }

    #[test]
    fn joiner_gets_direct_reply_then_broadcast() {
        let mut m = coordinator();
        let id = Uuid::new_v4();
        m.join(id, Some("  Ana  ".to_string()), 0).unwrap();

        let out = m.drain_outbox();
        assert_eq!(out.len(), 2);
        match &out[0] {
            Outbound::Direct(
                to,
                ServerMsg::PlayerJoined {
                    match_id,
                    available_loadouts,
                    player_name,
                    ..
                },
            ) => {
                assert_eq!(*to, id);
                assert_eq!(*match_id, Some(m.id()));
                assert_eq!(available_loadouts.as_ref().map(|l| l.len()), Some(5));
                assert_eq!(player_name.as_deref(), Some("Ana"));
            }
            other => panic!("unexpected outbound: {:?}", other),
        }
        assert!(matches!(
            &out[1],
            Outbound::Broadcast(ServerMsg::PlayerJoined { match_id: None, .. })
        ));
    }

    #[test]
    fn duplicate_and_overflow_joins_are_rejected() {
        let mut m = MatchCoordinator::new(
            Uuid::new_v4(),
            MatchRules {
                max_players: 2,
                ..MatchRules::default()
            },
            Arc::new(MapLayout::default()),
            1,
        );
        let a = Uuid::new_v4();
        m.join(a, None, 0).unwrap();
        assert_eq!(m.join(a, None, 0), Err(JoinError::DuplicatePlayer));
        m.join(Uuid::new_v4(), None, 0).unwrap();
        assert_eq!(m.join(Uuid::new_v4(), None, 0), Err(JoinError::MatchFull));
        assert_eq!(JoinError::MatchFull.code(), "match_full");
    }

    #[test]
    fn start_requires_lobby_and_enough_players() {
        let mut m = coordinator();
        assert_eq!(m.start_match(0), Err(StartError::WrongPhase(MatchPhase::Waiting)));
        m.join(Uuid::new_v4(), None, 0).unwrap();
        assert_eq!(
            m.start_match(0),
            Err(StartError::NotEnoughPlayers { have: 1, need: 2 })
        );
        m.join(Uuid::new_v4(), None, 0).unwrap();
        assert_eq!(m.start_match(0), Ok(()));
        assert_eq!(m.phase(), MatchPhase::LoadoutSelection);
        assert_eq!(m.current_round(), 1);
        assert_eq!(m.scheduler().deadline(TimerKey::LoadoutTimeout), Some(30_000));
    }

    #[test]
    fn strict_policy_needs_full_rosters() {
        let mut m = MatchCoordinator::new(
            Uuid::new_v4(),
            MatchRules::competitive(),
            Arc::new(MapLayout::default()),
            1,
        );
        for _ in 0..9 {
            m.join(Uuid::new_v4(), None, 0).unwrap();
        }
        assert_eq!(
            m.start_match(0),
            Err(StartError::NotEnoughPlayers { have: 9, need: 10 })
        );
        m.join(Uuid::new_v4(), None, 0).unwrap();
        assert_eq!(m.start_match(0), Ok(()));
    }

    #[test]
    fn loadout_errors_go_only_to_requester() {
        let mut m = coordinator();
        let a = Uuid::new_v4();
        m.join(a, None, 0).unwrap();
        m.join(Uuid::new_v4(), None, 0).unwrap();
        m.start_match(0).unwrap();
        m.drain_outbox();

        let bad = LoadoutSelection {
            primary: "ak47".to_string(),
            secondary: "m1911".to_string(),
            equipment: "flashbang".to_string(),
        };
        m.confirm_loadout(a, &bad, 10);

        let out = m.drain_outbox();
        assert_eq!(
            out,
            vec![Outbound::Direct(
                a,
                ServerMsg::LoadoutValidated {
                    success: false,
                    error: Some("Invalid primary weapon: ak47".to_string()),
                    loadout: None,
                }
            )]
        );
        assert!(!m.player(&a).unwrap().loadout_confirmed);
    }

    #[test]
    fn advanced_intents_need_a_handler() {
        let mut m = coordinator();
        let a = Uuid::new_v4();
        m.join(a, None, 0).unwrap();
        m.drain_outbox();

        m.handle_message(a, ClientMsg::PlayerSurrender, 0);
        match m.drain_outbox().as_slice() {
            [Outbound::Direct(to, ServerMsg::Error { code, .. })] => {
                assert_eq!(*to, a);
                assert_eq!(code, "unsupported_intent");
            }
            other => panic!("unexpected outbound: {:?}", other),
        }

        m.hooks_mut().on_intent(|ctx, player, intent| match intent {
            Intent::Escape => {
                let score_change = ctx.ledger.record_escape(player, "vent");
                Ok(vec![ServerMsg::MatchState {
                    state: ctx.phase,
                    round: score_change.new_team_score as u32,
                }])
            }
            _ => Err("not now".to_string()),
        });

        m.handle_message(a, ClientMsg::PlayerEscape, 0);
        assert_eq!(m.ledger().events()[0].kind, ScoreEventKind::Escape);
        assert!(matches!(
            m.drain_outbox().as_slice(),
            [Outbound::Broadcast(ServerMsg::MatchState { round: 125, .. })]
        ));

        m.handle_message(a, ClientMsg::PlayerBreach, 0);
        assert!(matches!(
            m.drain_outbox().as_slice(),
            [Outbound::Direct(_, ServerMsg::Error { code, .. })] if code == "intent_rejected"
        ));
    }

    /// Two players, nobody confirmed, round 1 live at t=33_000
    fn playing() -> (MatchCoordinator, PlayerId, PlayerId) {
        let mut m = coordinator();
        let cop = Uuid::new_v4();
        let criminal = Uuid::new_v4();
        m.join(cop, None, 0).unwrap();
        m.join(criminal, None, 0).unwrap();
        m.start_match(0).unwrap();
        m.fire_due_timers(33_000);
        assert_eq!(m.phase(), MatchPhase::Playing);
        m.drain_outbox();
        (m, cop, criminal)
    }

    #[test]
    fn cops_rescue_the_nearest_civilian() {
        let (mut m, cop, criminal) = playing();

        m.handle_message(criminal, ClientMsg::PlayerInteract, 33_010);
        assert!(matches!(
            m.drain_outbox().as_slice(),
            [Outbound::Direct(to, ServerMsg::Error { code, .. })] if *to == criminal && code == "rescue_failed"
        ));

        {
            let player = m.player_mut(&cop).unwrap();
            player.x = 30.0;
            player.y = 30.0;
        }
        assert_eq!(m.interact(cop), Err(RescueError::NoCivilianNearby));

        let civilians = m.civilians_mut();
        civilians[0].x = 60.0;
        civilians[0].y = 30.0;
        civilians[1].x = 50.0;
        civilians[1].y = 30.0;
        let nearest = civilians[1].id.clone();

        assert_eq!(m.interact(cop), Ok(nearest.clone()));
        assert!(m.civilians()[1].rescued);
        assert_eq!(m.ledger().team_score(Team::Cops), 50);
        assert!(matches!(
            m.drain_outbox().as_slice(),
            [Outbound::Broadcast(ServerMsg::CivilianRescued { civilian_id, .. })] if *civilian_id == nearest
        ));
    }

    #[test]
    fn hostage_taken_through_a_hook_scores_when_killed() {
        let (mut m, cop, criminal) = playing();
        m.hooks_mut().on_intent(|ctx, player, intent| match intent {
            Intent::TakeHostage => {
                let (x, y) = ctx
                    .players
                    .get(&player)
                    .map(|p| (p.x, p.y))
                    .ok_or("unknown player")?;
                let civilian = ctx
                    .civilians
                    .iter_mut()
                    .filter(|c| !c.dead && !c.hostage)
                    .min_by(|a, b| (a.x - x).hypot(a.y - y).total_cmp(&(b.x - x).hypot(b.y - y)))
                    .ok_or("no civilian to take")?;
                civilian.hostage = true;
                ctx.ledger.record_hostage_taken(player, &civilian.id);
                Ok(Vec::new())
            }
            _ => Err("not now".to_string()),
        });

        for (id, x, y) in [(criminal, 30.0, 30.0), (cop, 400.0, 400.0)] {
            let player = m.player_mut(&id).unwrap();
            player.x = x;
            player.y = y;
        }
        let civilians = m.civilians_mut();
        for civilian in civilians.iter_mut() {
            civilian.x = 30.0;
            civilian.y = 400.0;
        }
        civilians[0].x = 50.0;
        civilians[0].y = 30.0;
        civilians[0].health = 1.0;

        m.handle_message(criminal, ClientMsg::PlayerTakeHostage, 33_010);
        assert!(m.civilians()[0].hostage);

        assert_eq!(m.player_shoot(criminal, 0.0, 33_020).unwrap().len(), 1);
        assert!(m.civilians()[0].dead);

        let kinds: Vec<ScoreEventKind> = m.ledger().events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ScoreEventKind::HostageTaken, ScoreEventKind::HostageKilled]);
        assert_eq!(m.ledger().team_score(Team::Criminals), 50 - 150);
    }

    #[test]
    fn switched_weapon_is_the_one_fired() {
        let (mut m, cop, _) = playing();
        {
            let player = m.player_mut(&cop).unwrap();
            player.x = 30.0;
            player.y = 30.0;
        }

        m.handle_message(
            cop,
            ClientMsg::SwitchWeapon {
                weapon: WeaponSlot::Secondary,
            },
            33_010,
        );
        assert!(m.player_shoot(cop, std::f32::consts::PI, 33_020).unwrap().is_empty());

        let player = m.player(&cop).unwrap();
        assert_eq!(player.current_weapon, WeaponSlot::Secondary);
        assert_eq!(player.secondary.current_ammo, player.secondary.stats.mag_size - 1);
        assert_eq!(player.primary.current_ammo, player.primary.stats.mag_size);
    }

    #[test]
    fn round_end_hooks_run() {
        let mut m = coordinator();
        let ended = Arc::new(AtomicUsize::new(0));
        let counter = ended.clone();
        m.hooks_mut().on_round_end(move |event| {
            assert_eq!(event.reason, RoundEndReason::TimerCopsWin);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        m.join(Uuid::new_v4(), None, 0).unwrap();
        m.join(Uuid::new_v4(), None, 0).unwrap();
        m.start_match(0).unwrap();
        // loadout timeout, countdown and the full round clock
        m.fire_due_timers(30_000 + 3_000 + 180_000);

        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert_eq!(m.phase(), MatchPhase::RoundEnd);
        assert_eq!(m.current_round(), 2);
    }
}
