//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
    /// Allowed client origin for CORS, `*` for any
    pub client_origin: String,
    /// Exported map document to play on; an open default grid when unset
    pub map_path: Option<PathBuf>,
    /// Rules applied to every match this server hosts
    pub rules: MatchRules,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = MatchRules::default();
        let rules = MatchRules {
            start_policy: parse_var("MATCH_START_POLICY", defaults.start_policy)?,
            max_players: parse_var("MATCH_CAPACITY", defaults.max_players)?,
            total_rounds: parse_var("TOTAL_ROUNDS", defaults.total_rounds)?,
            role_switch_round: parse_var("ROLE_SWITCH_ROUND", defaults.role_switch_round)?,
            round_time_limit_ms: parse_var("ROUND_TIME_LIMIT_MS", defaults.round_time_limit_ms)?,
            loadout_selection_ms: parse_var(
                "LOADOUT_SELECTION_TIME_MS",
                defaults.loadout_selection_ms,
            )?,
            round_transition_ms: parse_var(
                "ROUND_TRANSITION_DELAY_MS",
                defaults.round_transition_ms,
            )?,
            idle_timeout_ms: parse_var("MATCH_IDLE_TIMEOUT_MS", defaults.idle_timeout_ms)?,
            ..defaults
        };
        rules.validate()?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            log_json: env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),

            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            map_path: env::var("MAP_PATH").ok().filter(|p| !p.is_empty()).map(PathBuf::from),

            rules,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// How strictly `start_match` checks the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPolicy {
    /// Full roster split evenly between the teams
    Strict,
    /// Any two players
    Permissive,
}

impl FromStr for StartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(StartPolicy::Strict),
            "permissive" => Ok(StartPolicy::Permissive),
            other => Err(other.to_string()),
        }
    }
}

/// Per-match rules and timings
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRules {
    pub max_players: usize,
    pub team_size: usize,
    pub min_players: usize,
    pub start_policy: StartPolicy,
    pub total_rounds: u32,
    /// Teams swap after this round ends
    pub role_switch_round: u32,
    pub tick_ms: u64,
    pub countdown_ms: u64,
    pub round_time_limit_ms: u64,
    pub loadout_selection_ms: u64,
    pub round_transition_ms: u64,
    pub reload_ms: u64,
    /// A match nobody has joined is closed after this long
    pub idle_timeout_ms: u64,
    pub min_civilians: usize,
    pub max_civilians: usize,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            max_players: 10,
            team_size: 5,
            min_players: 2,
            start_policy: StartPolicy::Permissive,
            total_rounds: 10,
            role_switch_round: 5,
            tick_ms: 16,
            countdown_ms: 3_000,
            round_time_limit_ms: 180_000,
            loadout_selection_ms: 30_000,
            round_transition_ms: 5_000,
            reload_ms: 2_000,
            idle_timeout_ms: 60_000,
            min_civilians: 3,
            max_civilians: 8,
        }
    }
}

impl MatchRules {
    /// Full 5v5 rosters required to start
    pub fn competitive() -> Self {
        Self {
            start_policy: StartPolicy::Strict,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_players < 2 {
            return Err(ConfigError::Rules("capacity must allow at least two players"));
        }
        if self.start_policy == StartPolicy::Strict && self.team_size * 2 > self.max_players {
            return Err(ConfigError::Rules("strict start needs room for two full teams"));
        }
        if self.total_rounds == 0 {
            return Err(ConfigError::Rules("a match needs at least one round"));
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::Rules("tick interval must be positive"));
        }
        if self.idle_timeout_ms == 0 {
            return Err(ConfigError::Rules("idle timeout must be positive"));
        }
        if self.min_civilians > self.max_civilians {
            return Err(ConfigError::Rules("civilian range is inverted"));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    Invalid(&'static str, String),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid match rules: {0}")]
    Rules(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_policy_parses_case_insensitively() {
        assert_eq!("Strict".parse::<StartPolicy>(), Ok(StartPolicy::Strict));
        assert_eq!("permissive".parse::<StartPolicy>(), Ok(StartPolicy::Permissive));
        assert!("lenient".parse::<StartPolicy>().is_err());
    }

    #[test]
    fn default_rules_are_valid() {
        assert!(MatchRules::default().validate().is_ok());
        assert_eq!(MatchRules::competitive().start_policy, StartPolicy::Strict);
    }

    #[test]
    fn inverted_civilian_range_is_rejected() {
        let rules = MatchRules {
            min_civilians: 9,
            ..MatchRules::default()
        };
        assert!(matches!(rules.validate(), Err(ConfigError::Rules(_))));
    }

    #[test]
    fn strict_start_needs_capacity_for_both_teams() {
        let rules = MatchRules {
            max_players: 8,
            ..MatchRules::competitive()
        };
        assert!(matches!(rules.validate(), Err(ConfigError::Rules(_))));

        let permissive = MatchRules {
            max_players: 8,
            ..MatchRules::default()
        };
        assert!(permissive.validate().is_ok());
    }
}
