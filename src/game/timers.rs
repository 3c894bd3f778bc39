//! Keyed deadline scheduler owned by a match

use std::collections::HashMap;

use super::PlayerId;

/// Every deferred action a match can arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    LoadoutTimeout,
    CountdownComplete,
    RoundTimeout,
    RoundTransition,
    FireCooldown(PlayerId),
    ReloadComplete(PlayerId),
}

impl TimerKey {
    pub fn player(&self) -> Option<PlayerId> {
        match self {
            TimerKey::FireCooldown(id) | TimerKey::ReloadComplete(id) => Some(*id),
            _ => None,
        }
    }
}

/// A timer that reached its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    pub key: TimerKey,
    pub due_ms: u64,
    /// Generation token supplied when scheduling, 0 when unused
    pub token: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    due_ms: u64,
    token: u64,
    seq: u64,
}

/// At most one pending deadline per key; re-arming a key replaces it
#[derive(Debug, Default)]
pub struct Scheduler {
    entries: HashMap<TimerKey, Entry>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, key: TimerKey, due_ms: u64) {
        self.schedule_with_token(key, due_ms, 0);
    }

    pub fn schedule_with_token(&mut self, key: TimerKey, due_ms: u64, token: u64) {
        self.next_seq += 1;
        self.entries.insert(
            key,
            Entry {
                due_ms,
                token,
                seq: self.next_seq,
            },
        );
    }

    pub fn cancel(&mut self, key: TimerKey) -> bool {
        self.entries.remove(&key).is_some()
    }

    /// Drop every timer that references the player
    pub fn cancel_player(&mut self, player: PlayerId) {
        self.entries.retain(|key, _| key.player() != Some(player));
    }

    /// Drop every per-player timer
    pub fn cancel_all_players(&mut self) {
        self.entries.retain(|key, _| key.player().is_none());
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn is_scheduled(&self, key: TimerKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn deadline(&self, key: TimerKey) -> Option<u64> {
        self.entries.get(&key).map(|e| e.due_ms)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.values().map(|e| e.due_ms).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return the earliest timer due at or before `now_ms`
    pub fn pop_next_due(&mut self, now_ms: u64) -> Option<FiredTimer> {
        let (key, entry) = self
            .entries
            .iter()
            .filter(|(_, e)| e.due_ms <= now_ms)
            .min_by_key(|(_, e)| (e.due_ms, e.seq))
            .map(|(k, e)| (*k, *e))?;
        self.entries.remove(&key);
        Some(FiredTimer {
            key,
            due_ms: entry.due_ms,
            token: entry.token,
        })
    }
}
