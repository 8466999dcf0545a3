//! In-memory store backend
//!
//! Sorted sets keep Redis ordering (ascending score, ties broken by member)
//! so range pagination behaves like the real backend. Every command is
//! recorded, and keys can be marked as failing, which lets callers assert
//! exactly which round-trips happened.

use crate::connection::{Connector, ScoreRange, StoreConnection};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

const BACKEND: &str = "memory";

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(old, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn range(&self, range: ScoreRange) -> impl Iterator<Item = &(i64, String)> {
        let start = (range.min.unwrap_or(i64::MIN), String::new());
        self.ordered
            .range(start..)
            .take_while(move |(score, _)| range.max.map_or(true, |max| *score <= max))
    }
}

#[derive(Debug, Default)]
struct State {
    sorted_sets: HashMap<String, SortedSet>,
    hashes: HashMap<String, HashMap<String, String>>,
    strings: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// One recorded command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub command: &'static str,
    pub key: String,
}

/// Shared in-memory store; clones see the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    log: Arc<Mutex<Vec<CommandRecord>>>,
    failing_keys: Arc<RwLock<HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector handing out connections onto this store
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector {
            store: self.clone(),
        })
    }

    /// Seed a sorted-set member directly, bypassing the command log
    pub fn insert_scored(&self, key: &str, member: &str, score: i64) {
        self.state
            .write()
            .sorted_sets
            .entry(key.to_string())
            .or_default()
            .insert(member, score);
    }

    pub fn score(&self, key: &str, member: &str) -> Option<i64> {
        self.state
            .read()
            .sorted_sets
            .get(key)
            .and_then(|set| set.scores.get(member).copied())
    }

    pub fn insert_hash_field(&self, key: &str, field: &str, value: &str) {
        self.state
            .write()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.state.read().strings.get(key).cloned()
    }

    pub fn set_members(&self, key: &str) -> Vec<String> {
        self.state
            .read()
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Make every subsequent command addressing `key` fail
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.write().insert(key.to_string());
    }

    pub fn commands(&self) -> Vec<CommandRecord> {
        self.log.lock().clone()
    }

    /// Number of recorded commands addressing `key`
    pub fn calls_for_key(&self, key: &str) -> usize {
        self.log.lock().iter().filter(|r| r.key == key).count()
    }

    pub fn calls_for_command(&self, command: &str) -> usize {
        self.log.lock().iter().filter(|r| r.command == command).count()
    }

    fn record(&self, command: &'static str, key: &str) -> Result<()> {
        self.log.lock().push(CommandRecord {
            command,
            key: key.to_string(),
        });
        if self.failing_keys.read().contains(key) {
            return Err(StoreError::command(command, key, "injected failure"));
        }
        Ok(())
    }
}

pub struct MemoryConnector {
    store: MemoryStore,
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        Ok(Box::new(MemoryConnection {
            store: self.store.clone(),
        }))
    }
}

struct MemoryConnection {
    store: MemoryStore,
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn zcount(&mut self, key: &str, range: ScoreRange) -> Result<u64> {
        self.store.record("ZCOUNT", key)?;
        let state = self.store.state.read();
        Ok(state
            .sorted_sets
            .get(key)
            .map_or(0, |set| set.range(range).count() as u64))
    }

    async fn zrange_by_score_with_scores(
        &mut self,
        key: &str,
        range: ScoreRange,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, i64)>> {
        self.store.record("ZRANGEBYSCORE", key)?;
        let state = self.store.state.read();
        Ok(state
            .sorted_sets
            .get(key)
            .map(|set| {
                set.range(range)
                    .skip(offset)
                    .take(count)
                    .map(|(score, member)| (member.clone(), *score))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn zrange_by_score(&mut self, key: &str, range: ScoreRange) -> Result<Vec<String>> {
        self.store.record("ZRANGEBYSCORE", key)?;
        let state = self.store.state.read();
        Ok(state
            .sorted_sets
            .get(key)
            .map(|set| set.range(range).map(|(_, member)| member.clone()).collect())
            .unwrap_or_default())
    }

    async fn zadd(&mut self, key: &str, members: &[(i64, String)]) -> Result<()> {
        self.store.record("ZADD", key)?;
        let mut state = self.store.state.write();
        let set = state.sorted_sets.entry(key.to_string()).or_default();
        for (score, member) in members {
            set.insert(member, *score);
        }
        Ok(())
    }

    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>> {
        self.store.record("HGETALL", key)?;
        Ok(self.store.state.read().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.store.record("SET", key)?;
        self.store
            .state
            .write()
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn sadd(&mut self, key: &str, member: &str) -> Result<()> {
        self.store.record("SADD", key)?;
        self.store
            .state
            .write()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }
}
