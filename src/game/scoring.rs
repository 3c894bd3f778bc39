//! Scoring ledger - append-only event log plus team and player totals

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::protocol::Team;

/// Point deltas per scoring event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointTable {
    pub cop_kill_criminal: i64,
    pub criminal_kill_cop: i64,
    pub friendly_fire_kill: i64,
    pub cop_rescue_civilian: i64,
    pub cop_arrest_criminal: i64,
    pub cop_negotiation_success: i64,
    pub criminal_escape: i64,
    pub criminal_take_hostage: i64,
    pub criminal_kill_rescued_civilian: i64,
    pub kill_unrescued_civilian: i64,
    pub kill_hostage: i64,
}

impl Default for PointTable {
    fn default() -> Self {
        Self {
            cop_kill_criminal: 100,
            criminal_kill_cop: 100,
            friendly_fire_kill: -50,
            cop_rescue_civilian: 50,
            cop_arrest_criminal: 150,
            cop_negotiation_success: 100,
            criminal_escape: 125,
            criminal_take_hostage: 50,
            criminal_kill_rescued_civilian: 75,
            kill_unrescued_civilian: -100,
            kill_hostage: -150,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamScores {
    pub cops: i64,
    pub criminals: i64,
}

impl TeamScores {
    pub fn get(&self, team: Team) -> i64 {
        match team {
            Team::Cops => self.cops,
            Team::Criminals => self.criminals,
        }
    }

    fn add(&mut self, team: Team, points: i64) {
        match team {
            Team::Cops => self.cops += points,
            Team::Criminals => self.criminals += points,
        }
    }
}

/// Score block carried by snapshots and round_end
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBoard {
    pub team_scores: TeamScores,
    pub round_scores: TeamScores,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreEventKind {
    CopKillCriminal,
    CriminalKillCop,
    FriendlyFire,
    Arrest,
    Escape,
    HostageTaken,
    NegotiationSuccess,
    ObjectiveComplete,
    CivilianRescued,
    HostageKilled,
    CriminalKillRescuedCivilian,
    CopKillRescuedCivilian,
    KillUnrescuedCivilian,
}

/// Immutable log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEvent {
    pub kind: ScoreEventKind,
    pub timestamp: DateTime<Utc>,
    pub round: u32,
    /// Player credited or charged
    pub actor: Uuid,
    /// Victim player id or civilian id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Escape method, objective type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub team: Team,
    pub points: i64,
    pub team_total: i64,
}

/// Returned by every `record_*` call for broadcasting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreChange {
    pub points_awarded: i64,
    pub event_type: ScoreEventKind,
    pub team: Team,
    pub new_team_score: i64,
}

/// Per-player cumulative counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub id: Uuid,
    pub original_team: Team,
    pub current_team: Team,
    pub kills: u32,
    pub deaths: u32,
    pub arrests: u32,
    pub arrested: u32,
    pub escapes: u32,
    pub civilians_rescued: u32,
    pub hostages_taken: u32,
    pub rescued_civilians_killed: u32,
    pub unrescued_civilians_killed: u32,
    pub objectives_completed: u32,
    pub negotiations_successful: u32,
    pub points_earned: i64,
    pub points_lost: i64,
    pub rounds_played: u32,
}

impl PlayerStats {
    fn new(id: Uuid, team: Team) -> Self {
        Self {
            id,
            original_team: team,
            current_team: team,
            kills: 0,
            deaths: 0,
            arrests: 0,
            arrested: 0,
            escapes: 0,
            civilians_rescued: 0,
            hostages_taken: 0,
            rescued_civilians_killed: 0,
            unrescued_civilians_killed: 0,
            objectives_completed: 0,
            negotiations_successful: 0,
            points_earned: 0,
            points_lost: 0,
            rounds_played: 0,
        }
    }

    pub fn net_points(&self) -> i64 {
        self.points_earned - self.points_lost
    }

    fn book(&mut self, points: i64) {
        if points >= 0 {
            self.points_earned += points;
        } else {
            self.points_lost += points.abs();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSummary {
    pub round: u32,
    pub round_scores: TeamScores,
    pub total_scores: TeamScores,
    pub events: Vec<ScoreEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchWinner {
    Cops,
    Criminals,
    Tie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResults {
    pub winner: MatchWinner,
    pub final_scores: TeamScores,
    pub player_rankings: Vec<PlayerStats>,
    pub total_events: usize,
}

/// Objectives completed by each side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamObjectives {
    pub cops: Vec<String>,
    pub criminals: Vec<String>,
}

impl TeamObjectives {
    fn push(&mut self, team: Team, objective: String) {
        match team {
            Team::Cops => self.cops.push(objective),
            Team::Criminals => self.criminals.push(objective),
        }
    }
}

/// Scoring ledger for one match
#[derive(Debug, Clone, Default)]
pub struct ScoringLedger {
    points: PointTable,
    team_scores: TeamScores,
    round_scores: TeamScores,
    players: HashMap<Uuid, PlayerStats>,
    objectives: TeamObjectives,
    events: Vec<ScoreEvent>,
    current_round: u32,
}

impl ScoringLedger {
    pub fn new(points: PointTable) -> Self {
        Self {
            points,
            ..Self::default()
        }
    }

    pub fn points(&self) -> &PointTable {
        &self.points
    }

    /// Register a player; existing stats are kept on rejoin
    pub fn init_player(&mut self, id: Uuid, team: Team) {
        self.players
            .entry(id)
            .or_insert_with(|| PlayerStats::new(id, team));
    }

    pub fn player(&self, id: &Uuid) -> Option<&PlayerStats> {
        self.players.get(id)
    }

    pub fn events(&self) -> &[ScoreEvent] {
        &self.events
    }

    pub fn objectives(&self) -> &TeamObjectives {
        &self.objectives
    }

    /// Tag subsequent events with this round number
    pub fn begin_round(&mut self, round: u32) {
        self.current_round = round;
    }

    pub fn scores(&self) -> ScoreBoard {
        ScoreBoard {
            team_scores: self.team_scores,
            round_scores: self.round_scores,
        }
    }

    pub fn team_score(&self, team: Team) -> i64 {
        self.team_scores.get(team)
    }

    fn append(
        &mut self,
        kind: ScoreEventKind,
        actor: Uuid,
        subject: Option<String>,
        detail: Option<String>,
        team: Team,
        points: i64,
    ) -> ScoreChange {
        self.team_scores.add(team, points);
        self.round_scores.add(team, points);
        let team_total = self.team_scores.get(team);

        self.events.push(ScoreEvent {
            kind,
            timestamp: Utc::now(),
            round: self.current_round,
            actor,
            subject,
            detail,
            team,
            points,
            team_total,
        });

        ScoreChange {
            points_awarded: points,
            event_type: kind,
            team,
            new_team_score: team_total,
        }
    }

    pub fn record_player_kill(
        &mut self,
        killer: Uuid,
        victim: Uuid,
        killer_team: Team,
        victim_team: Team,
    ) -> ScoreChange {
        let (kind, points) = match (killer_team, victim_team) {
            (Team::Cops, Team::Criminals) => {
                (ScoreEventKind::CopKillCriminal, self.points.cop_kill_criminal)
            }
            (Team::Criminals, Team::Cops) => {
                (ScoreEventKind::CriminalKillCop, self.points.criminal_kill_cop)
            }
            _ => (ScoreEventKind::FriendlyFire, self.points.friendly_fire_kill),
        };

        if let Some(stats) = self.players.get_mut(&killer) {
            stats.kills += 1;
            stats.book(points);
        }
        if let Some(stats) = self.players.get_mut(&victim) {
            stats.deaths += 1;
        }

        self.append(kind, killer, Some(victim.to_string()), None, killer_team, points)
    }

    pub fn record_civilian_killed(
        &mut self,
        killer: Uuid,
        civilian_id: &str,
        was_rescued: bool,
        was_hostage: bool,
        killer_team: Team,
    ) -> ScoreChange {
        let (kind, points) = if was_hostage {
            (ScoreEventKind::HostageKilled, self.points.kill_hostage)
        } else if was_rescued && killer_team == Team::Criminals {
            (
                ScoreEventKind::CriminalKillRescuedCivilian,
                self.points.criminal_kill_rescued_civilian,
            )
        } else if was_rescued {
            (ScoreEventKind::CopKillRescuedCivilian, 0)
        } else {
            (
                ScoreEventKind::KillUnrescuedCivilian,
                self.points.kill_unrescued_civilian,
            )
        };

        if let Some(stats) = self.players.get_mut(&killer) {
            match kind {
                ScoreEventKind::CriminalKillRescuedCivilian => stats.rescued_civilians_killed += 1,
                ScoreEventKind::KillUnrescuedCivilian => stats.unrescued_civilians_killed += 1,
                _ => {}
            }
            stats.book(points);
        }

        self.append(
            kind,
            killer,
            Some(civilian_id.to_string()),
            None,
            killer_team,
            points,
        )
    }

    /// Only players currently on the cop side may rescue
    pub fn record_civilian_rescue(&mut self, player: Uuid, civilian_id: &str) -> Option<ScoreChange> {
        let points = self.points.cop_rescue_civilian;
        let stats = self.players.get_mut(&player)?;
        if stats.current_team != Team::Cops {
            return None;
        }
        stats.civilians_rescued += 1;
        stats.book(points);

        Some(self.append(
            ScoreEventKind::CivilianRescued,
            player,
            Some(civilian_id.to_string()),
            None,
            Team::Cops,
            points,
        ))
    }

    pub fn record_arrest(&mut self, cop: Uuid, criminal: Uuid) -> ScoreChange {
        let points = self.points.cop_arrest_criminal;
        if let Some(stats) = self.players.get_mut(&cop) {
            stats.arrests += 1;
            stats.book(points);
        }
        if let Some(stats) = self.players.get_mut(&criminal) {
            stats.arrested += 1;
        }
        self.append(
            ScoreEventKind::Arrest,
            cop,
            Some(criminal.to_string()),
            None,
            Team::Cops,
            points,
        )
    }

    pub fn record_escape(&mut self, criminal: Uuid, method: &str) -> ScoreChange {
        let points = self.points.criminal_escape;
        if let Some(stats) = self.players.get_mut(&criminal) {
            stats.escapes += 1;
            stats.book(points);
        }
        self.append(
            ScoreEventKind::Escape,
            criminal,
            None,
            Some(method.to_string()),
            Team::Criminals,
            points,
        )
    }

    pub fn record_hostage_taken(&mut self, criminal: Uuid, civilian_id: &str) -> ScoreChange {
        let points = self.points.criminal_take_hostage;
        if let Some(stats) = self.players.get_mut(&criminal) {
            stats.hostages_taken += 1;
            stats.book(points);
        }
        self.append(
            ScoreEventKind::HostageTaken,
            criminal,
            Some(civilian_id.to_string()),
            None,
            Team::Criminals,
            points,
        )
    }

    pub fn record_negotiation_success(&mut self, cop: Uuid, civilian_id: &str) -> ScoreChange {
        let points = self.points.cop_negotiation_success;
        if let Some(stats) = self.players.get_mut(&cop) {
            stats.negotiations_successful += 1;
            stats.book(points);
        }
        self.append(
            ScoreEventKind::NegotiationSuccess,
            cop,
            Some(civilian_id.to_string()),
            None,
            Team::Cops,
            points,
        )
    }

    pub fn record_objective_complete(
        &mut self,
        player: Uuid,
        objective: &str,
        team: Team,
        points: i64,
    ) -> ScoreChange {
        if let Some(stats) = self.players.get_mut(&player) {
            stats.objectives_completed += 1;
            stats.book(points);
        }
        self.objectives.push(team, objective.to_string());
        self.append(
            ScoreEventKind::ObjectiveComplete,
            player,
            None,
            Some(objective.to_string()),
            team,
            points,
        )
    }

    /// Close a round: snapshot its subtotal, then reset only the subtotal
    pub fn end_round(&mut self, round: u32) -> RoundSummary {
        let summary = RoundSummary {
            round,
            round_scores: self.round_scores,
            total_scores: self.team_scores,
            events: self
                .events
                .iter()
                .filter(|e| e.round == round)
                .cloned()
                .collect(),
        };

        self.round_scores = TeamScores::default();
        for stats in self.players.values_mut() {
            stats.rounds_played += 1;
        }

        summary
    }

    /// Flip every player's current team tag; counters are untouched
    pub fn switch_all_teams(&mut self) {
        for stats in self.players.values_mut() {
            stats.current_team = stats.current_team.opposite();
        }
    }

    pub fn match_results(&self) -> MatchResults {
        let winner = match self.team_scores.cops.cmp(&self.team_scores.criminals) {
            std::cmp::Ordering::Greater => MatchWinner::Cops,
            std::cmp::Ordering::Less => MatchWinner::Criminals,
            std::cmp::Ordering::Equal => MatchWinner::Tie,
        };

        let mut player_rankings: Vec<PlayerStats> = self.players.values().cloned().collect();
        player_rankings.sort_by(|a, b| b.net_points().cmp(&a.net_points()).then(a.id.cmp(&b.id)));

        MatchResults {
            winner,
            final_scores: self.team_scores,
            player_rankings,
            total_events: self.events.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(cop: Uuid, criminal: Uuid) -> ScoringLedger {
        let mut ledger = ScoringLedger::new(PointTable::default());
        ledger.init_player(cop, Team::Cops);
        ledger.init_player(criminal, Team::Criminals);
        ledger.begin_round(1);
        ledger
    }

    #[test]
    fn kill_points_depend_on_team_relationship() {
        let cop = Uuid::new_v4();
        let criminal = Uuid::new_v4();
        let mut ledger = ledger_with(cop, criminal);

        let change = ledger.record_player_kill(cop, criminal, Team::Cops, Team::Criminals);
        assert_eq!(change.points_awarded, 100);
        assert_eq!(change.event_type, ScoreEventKind::CopKillCriminal);
        assert_eq!(change.new_team_score, 100);

        let change = ledger.record_player_kill(cop, cop, Team::Cops, Team::Cops);
        assert_eq!(change.points_awarded, -50);
        assert_eq!(ledger.team_score(Team::Cops), 50);

        let stats = ledger.player(&cop).unwrap();
        assert_eq!(stats.kills, 2);
        assert_eq!(stats.points_earned, 100);
        assert_eq!(stats.points_lost, 50);
        assert_eq!(ledger.player(&criminal).unwrap().deaths, 1);
    }

    #[test]
    fn civilian_kills_are_classified() {
        let cop = Uuid::new_v4();
        let criminal = Uuid::new_v4();
        let mut ledger = ledger_with(cop, criminal);

        let unrescued = ledger.record_civilian_killed(cop, "civ_1_0", false, false, Team::Cops);
        assert_eq!(unrescued.points_awarded, -100);
        assert_eq!(unrescued.event_type, ScoreEventKind::KillUnrescuedCivilian);

        let rescued = ledger.record_civilian_killed(criminal, "civ_1_1", true, false, Team::Criminals);
        assert_eq!(rescued.points_awarded, 75);

        let hostage = ledger.record_civilian_killed(criminal, "civ_1_2", false, true, Team::Criminals);
        assert_eq!(hostage.points_awarded, -150);
        assert_eq!(hostage.event_type, ScoreEventKind::HostageKilled);

        let cop_on_rescued = ledger.record_civilian_killed(cop, "civ_1_3", true, false, Team::Cops);
        assert_eq!(cop_on_rescued.points_awarded, 0);

        assert_eq!(ledger.team_score(Team::Cops), -100);
        assert_eq!(ledger.team_score(Team::Criminals), -75);
        let stats = ledger.player(&criminal).unwrap();
        assert_eq!(stats.rescued_civilians_killed, 1);
        assert_eq!(stats.points_lost, 150);
    }

    #[test]
    fn only_cops_can_rescue() {
        let cop = Uuid::new_v4();
        let criminal = Uuid::new_v4();
        let mut ledger = ledger_with(cop, criminal);

        assert!(ledger.record_civilian_rescue(criminal, "civ_1_0").is_none());
        let change = ledger.record_civilian_rescue(cop, "civ_1_0").unwrap();
        assert_eq!(change.points_awarded, 50);
        assert_eq!(ledger.player(&cop).unwrap().civilians_rescued, 1);
    }

    #[test]
    fn end_round_resets_only_round_subtotal() {
        let cop = Uuid::new_v4();
        let criminal = Uuid::new_v4();
        let mut ledger = ledger_with(cop, criminal);

        ledger.record_arrest(cop, criminal);
        ledger.record_escape(criminal, "sewer");
        let summary = ledger.end_round(1);

        assert_eq!(summary.round_scores.cops, 150);
        assert_eq!(summary.round_scores.criminals, 125);
        assert_eq!(summary.events.len(), 2);
        assert_eq!(ledger.scores().round_scores, TeamScores::default());
        assert_eq!(ledger.scores().team_scores.cops, 150);
        assert_eq!(ledger.player(&cop).unwrap().rounds_played, 1);

        ledger.begin_round(2);
        ledger.record_hostage_taken(criminal, "civ_2_0");
        let summary = ledger.end_round(2);
        assert_eq!(summary.events.len(), 1);
        assert_eq!(summary.total_scores.criminals, 175);
    }

    #[test]
    fn team_switch_keeps_counters() {
        let cop = Uuid::new_v4();
        let criminal = Uuid::new_v4();
        let mut ledger = ledger_with(cop, criminal);
        ledger.record_player_kill(cop, criminal, Team::Cops, Team::Criminals);

        ledger.switch_all_teams();

        let stats = ledger.player(&cop).unwrap();
        assert_eq!(stats.current_team, Team::Criminals);
        assert_eq!(stats.original_team, Team::Cops);
        assert_eq!(stats.kills, 1);
        assert_eq!(ledger.team_score(Team::Cops), 100);
        assert!(ledger.record_civilian_rescue(cop, "civ_6_0").is_none());
    }

    #[test]
    fn objectives_and_negotiations_are_tracked_per_team() {
        let cop = Uuid::new_v4();
        let criminal = Uuid::new_v4();
        let mut ledger = ledger_with(cop, criminal);

        ledger.record_objective_complete(cop, "secure_intel", Team::Cops, 40);
        ledger.record_objective_complete(criminal, "hack_terminal", Team::Criminals, 25);
        ledger.record_negotiation_success(cop, "civ_1_0");

        assert_eq!(ledger.objectives().cops, vec!["secure_intel".to_string()]);
        assert_eq!(ledger.objectives().criminals, vec!["hack_terminal".to_string()]);
        assert_eq!(ledger.team_score(Team::Cops), 140);
        assert_eq!(ledger.player(&cop).unwrap().negotiations_successful, 1);
    }

    #[test]
    fn match_results_rank_by_net_points() {
        let cop = Uuid::new_v4();
        let criminal = Uuid::new_v4();
        let mut ledger = ledger_with(cop, criminal);

        assert_eq!(ledger.match_results().winner, MatchWinner::Tie);

        ledger.record_player_kill(criminal, cop, Team::Criminals, Team::Cops);
        ledger.record_civilian_killed(cop, "civ_1_0", false, false, Team::Cops);

        let results = ledger.match_results();
        assert_eq!(results.winner, MatchWinner::Criminals);
        assert_eq!(results.player_rankings[0].id, criminal);
        assert_eq!(results.player_rankings[1].net_points(), -100);
        assert_eq!(results.total_events, 2);
    }
}
