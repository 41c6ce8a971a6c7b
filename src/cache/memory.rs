//! In-Memory Cache Store
//!
//! Single-process implementation of [`CacheStore`] with the semantics of a
//! Redis-style server: typed values per key, one batch applied at a time.
//!
//! # Design
//!
//! - One `parking_lot::Mutex` over the keyspace; a batch holds it for its
//!   whole duration, which is what makes batches atomic
//! - Sorted sets keep a score map plus a `BTreeSet` ordered by
//!   `(score, member)`, so rank and score ranges are ordered scans
//! - Fault injection (offline mode, fail-next, fail-on-command) for tests;
//!   an injected failure rejects the whole batch before any command runs
//! - A command that hits a value of the wrong type aborts the batch; keys
//!   written earlier in the batch are restored from an undo journal, so a
//!   batch applies all-or-nothing

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::command::{Command, Reply};
use super::store::CacheStore;
use crate::error::{Error, Result};

// =============================================================================
// Values
// =============================================================================

/// Score with a total order (`f64::total_cmp`).
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Default, Clone)]
struct SortedSet {
    scores: HashMap<String, f64>,
    order: BTreeSet<(Score, String)>,
}

impl SortedSet {
    /// Returns true when the member is new or its score changed.
    fn insert(&mut self, member: &str, score: f64) -> bool {
        match self.scores.get(member) {
            Some(existing) if Score(*existing) == Score(score) => false,
            Some(existing) => {
                self.order.remove(&(Score(*existing), member.to_string()));
                self.order.insert((Score(score), member.to_string()));
                self.scores.insert(member.to_string(), score);
                true
            }
            None => {
                self.order.insert((Score(score), member.to_string()));
                self.scores.insert(member.to_string(), score);
                true
            }
        }
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&(Score(score), member.to_string()));
                true
            }
            None => false,
        }
    }

    fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn rev_range(&self, offset: usize, count: usize) -> Vec<(String, f64)> {
        self.order
            .iter()
            .rev()
            .skip(offset)
            .take(count)
            .map(|(s, m)| (m.clone(), s.0))
            .collect()
    }

    fn rev_range_by_score(&self, max: f64, min: f64, offset: usize, count: usize) -> Vec<(String, f64)> {
        self.order
            .iter()
            .rev()
            .filter(|(s, _)| s.0 <= max && s.0 >= min)
            .skip(offset)
            .take(count)
            .map(|(s, m)| (m.clone(), s.0))
            .collect()
    }

    /// Remove by ascending rank, Redis `ZREMRANGEBYRANK` index rules.
    fn remove_range_by_rank(&mut self, start: i64, stop: i64) -> usize {
        let len = self.len() as i64;
        let mut start = if start < 0 { start + len } else { start };
        let mut stop = if stop < 0 { stop + len } else { stop };
        if start < 0 {
            start = 0;
        }
        if stop >= len {
            stop = len - 1;
        }
        if start > stop || start >= len {
            return 0;
        }

        let doomed: Vec<(Score, String)> = self
            .order
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect();
        for (score, member) in &doomed {
            self.order.remove(&(*score, member.clone()));
            self.scores.remove(member);
        }
        doomed.len()
    }
}

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Bytes(Bytes),
    Set(HashSet<String>),
    Sorted(SortedSet),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) | Value::Bytes(_) => "string",
            Value::Set(_) => "set",
            Value::Sorted(_) => "zset",
        }
    }
}

fn wrong_type(key: &str, value: &Value, command: &str) -> Error {
    Error::CacheStore(format!(
        "WRONGTYPE {} against key '{}' holding a {}",
        command,
        key,
        value.type_name()
    ))
}

fn read_int(key: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Bytes(b) => std::str::from_utf8(b)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| Error::CacheStore(format!("value at '{}' is not an integer", key))),
        other => Err(wrong_type(key, other, "integer read")),
    }
}

fn string_reply(value: &Value) -> Option<Reply> {
    match value {
        Value::Int(n) => Some(Reply::Int(*n)),
        Value::Bytes(b) => Some(Reply::Bytes(b.clone())),
        _ => None,
    }
}

// =============================================================================
// Fault Injection
// =============================================================================

#[derive(Debug, Default)]
struct FaultPlan {
    offline: bool,
    fail_next: usize,
    fail_on: HashMap<&'static str, usize>,
}

impl FaultPlan {
    /// Decide whether this batch fails, consuming one armed fault if so.
    fn check(&mut self, commands: &[Command]) -> Option<String> {
        if self.offline {
            return Some("store is offline".to_string());
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Some("injected failure".to_string());
        }
        for command in commands {
            if let Some(remaining) = self.fail_on.get_mut(command.name()) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Some(format!("injected failure on {}", command.name()));
                }
            }
        }
        None
    }
}

// =============================================================================
// Store
// =============================================================================

/// Cache store statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStoreStats {
    /// Batches executed (including failed ones)
    pub batches: u64,
    /// Commands executed
    pub commands: u64,
    /// Batches rejected by injected transport faults
    pub failures: u64,
}

/// In-memory cache store for tests and standalone mode
#[derive(Default)]
pub struct InMemoryCacheStore {
    keyspace: Mutex<HashMap<String, Value>>,
    faults: Mutex<FaultPlan>,
    batches: AtomicU64,
    commands: AtomicU64,
    failures: AtomicU64,
}

impl InMemoryCacheStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a lost connection: every batch fails until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.faults.lock().offline = offline;
    }

    /// Fail the next `n` batches.
    pub fn fail_next(&self, n: usize) {
        self.faults.lock().fail_next = n;
    }

    /// Fail the next `times` batches that contain `command` (e.g. `"GETDEL"`).
    pub fn fail_on(&self, command: &'static str, times: usize) {
        self.faults.lock().fail_on.insert(command, times);
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        self.keyspace.lock().len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keyspace.lock().contains_key(key)
    }

    pub fn stats(&self) -> CacheStoreStats {
        CacheStoreStats {
            batches: self.batches.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn apply(keyspace: &mut HashMap<String, Value>, command: Command) -> Result<Reply> {
        match command {
            Command::IncrBy { key, delta } => {
                let current = match keyspace.get(&key) {
                    Some(v) => read_int(&key, v)?,
                    None => 0,
                };
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| Error::CacheStore(format!("increment overflow at '{}'", key)))?;
                keyspace.insert(key, Value::Int(next));
                Ok(Reply::Int(next))
            }
            Command::Get { key } => match keyspace.get(&key) {
                None => Ok(Reply::Nil),
                Some(v) => string_reply(v).ok_or_else(|| wrong_type(&key, v, "GET")),
            },
            Command::GetDel { key } => match keyspace.get(&key) {
                None => Ok(Reply::Nil),
                Some(v) => {
                    let reply = string_reply(v).ok_or_else(|| wrong_type(&key, v, "GETDEL"))?;
                    keyspace.remove(&key);
                    Ok(reply)
                }
            },
            Command::Set { key, value } => {
                keyspace.insert(key, Value::Bytes(value));
                Ok(Reply::Ok)
            }
            Command::Del { key } => Ok(Reply::Int(keyspace.remove(&key).is_some() as i64)),
            Command::SAdd { key, member } => {
                let entry = keyspace
                    .entry(key.clone())
                    .or_insert_with(|| Value::Set(HashSet::new()));
                match entry {
                    Value::Set(set) => Ok(Reply::Int(set.insert(member) as i64)),
                    other => Err(wrong_type(&key, other, "SADD")),
                }
            }
            Command::SRem { key, member } => {
                let (removed, now_empty) = match keyspace.get_mut(&key) {
                    None => return Ok(Reply::Int(0)),
                    Some(Value::Set(set)) => (set.remove(&member), set.is_empty()),
                    Some(other) => return Err(wrong_type(&key, other, "SREM")),
                };
                if now_empty {
                    keyspace.remove(&key);
                }
                Ok(Reply::Int(removed as i64))
            }
            Command::SIsMember { key, member } => match keyspace.get(&key) {
                None => Ok(Reply::Int(0)),
                Some(Value::Set(set)) => Ok(Reply::Int(set.contains(&member) as i64)),
                Some(other) => Err(wrong_type(&key, other, "SISMEMBER")),
            },
            Command::SMembers { key } => match keyspace.get(&key) {
                None => Ok(Reply::Members(Vec::new())),
                Some(Value::Set(set)) => {
                    let mut members: Vec<String> = set.iter().cloned().collect();
                    members.sort();
                    Ok(Reply::Members(members))
                }
                Some(other) => Err(wrong_type(&key, other, "SMEMBERS")),
            },
            Command::ZAdd { key, member, score } => {
                let entry = keyspace
                    .entry(key.clone())
                    .or_insert_with(|| Value::Sorted(SortedSet::default()));
                match entry {
                    Value::Sorted(zset) => Ok(Reply::Int(zset.insert(&member, score) as i64)),
                    other => Err(wrong_type(&key, other, "ZADD")),
                }
            }
            Command::ZScore { key, member } => match keyspace.get(&key) {
                None => Ok(Reply::Nil),
                Some(Value::Sorted(zset)) => Ok(zset.score(&member).map(Reply::Score).unwrap_or(Reply::Nil)),
                Some(other) => Err(wrong_type(&key, other, "ZSCORE")),
            },
            Command::ZRem { key, member } => {
                let (removed, now_empty) = match keyspace.get_mut(&key) {
                    None => return Ok(Reply::Int(0)),
                    Some(Value::Sorted(zset)) => (zset.remove(&member), zset.len() == 0),
                    Some(other) => return Err(wrong_type(&key, other, "ZREM")),
                };
                if now_empty {
                    keyspace.remove(&key);
                }
                Ok(Reply::Int(removed as i64))
            }
            Command::ZRevRange { key, offset, count } => match keyspace.get(&key) {
                None => Ok(Reply::Scored(Vec::new())),
                Some(Value::Sorted(zset)) => Ok(Reply::Scored(zset.rev_range(offset, count))),
                Some(other) => Err(wrong_type(&key, other, "ZREVRANGE")),
            },
            Command::ZRevRangeByScore {
                key,
                max,
                min,
                offset,
                count,
            } => match keyspace.get(&key) {
                None => Ok(Reply::Scored(Vec::new())),
                Some(Value::Sorted(zset)) => Ok(Reply::Scored(
                    zset.rev_range_by_score(max, min, offset, count),
                )),
                Some(other) => Err(wrong_type(&key, other, "ZREVRANGEBYSCORE")),
            },
            Command::ZRemRangeByRank { key, start, stop } => {
                let (removed, now_empty) = match keyspace.get_mut(&key) {
                    None => return Ok(Reply::Int(0)),
                    Some(Value::Sorted(zset)) => {
                        let removed = zset.remove_range_by_rank(start, stop);
                        (removed, zset.len() == 0)
                    }
                    Some(other) => return Err(wrong_type(&key, other, "ZREMRANGEBYRANK")),
                };
                if now_empty {
                    keyspace.remove(&key);
                }
                Ok(Reply::Int(removed as i64))
            }
            Command::ZCard { key } => match keyspace.get(&key) {
                None => Ok(Reply::Int(0)),
                Some(Value::Sorted(zset)) => Ok(Reply::Int(zset.len() as i64)),
                Some(other) => Err(wrong_type(&key, other, "ZCARD")),
            },
            Command::SetIfNewer {
                key,
                value,
                watermark_key,
                timestamp,
            } => {
                if !watermark_allows(keyspace, &watermark_key, timestamp)? {
                    return Ok(Reply::Int(0));
                }
                keyspace.insert(key, Value::Bytes(value));
                keyspace.insert(watermark_key, Value::Int(timestamp));
                Ok(Reply::Int(1))
            }
            Command::DelIfNewer {
                key,
                watermark_key,
                timestamp,
            } => {
                if !watermark_allows(keyspace, &watermark_key, timestamp)? {
                    return Ok(Reply::Int(0));
                }
                keyspace.remove(&key);
                keyspace.insert(watermark_key, Value::Int(timestamp));
                Ok(Reply::Int(1))
            }
        }
    }
}

/// Every key a command may write.
fn touched_keys(command: &Command) -> Vec<&str> {
    match command {
        Command::SetIfNewer { key, watermark_key, .. } | Command::DelIfNewer { key, watermark_key, .. } => {
            vec![key.as_str(), watermark_key.as_str()]
        }
        other => vec![other.key()],
    }
}

/// True when `timestamp` is strictly newer than the stored watermark.
fn watermark_allows(keyspace: &HashMap<String, Value>, watermark_key: &str, timestamp: i64) -> Result<bool> {
    match keyspace.get(watermark_key) {
        Some(v) => Ok(timestamp > read_int(watermark_key, v)?),
        None => Ok(true),
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn exec(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        self.batches.fetch_add(1, Ordering::Relaxed);

        if let Some(reason) = self.faults.lock().check(&commands) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(Error::CacheUnavailable(reason));
        }

        self.commands
            .fetch_add(commands.len() as u64, Ordering::Relaxed);

        let mut keyspace = self.keyspace.lock();
        let mut journal: HashMap<String, Option<Value>> = HashMap::new();
        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            for key in touched_keys(&command) {
                if !journal.contains_key(key) {
                    journal.insert(key.to_string(), keyspace.get(key).cloned());
                }
            }
            match Self::apply(&mut keyspace, command) {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    for (key, previous) in journal {
                        match previous {
                            Some(value) => keyspace.insert(key, value),
                            None => keyspace.remove(&key),
                        };
                    }
                    return Err(e);
                }
            }
        }
        Ok(replies)
    }

    async fn ping(&self) -> Result<()> {
        if self.faults.lock().offline {
            return Err(Error::CacheUnavailable("store is offline".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
