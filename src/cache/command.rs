//! Cache Commands, Replies and Pipelines
//!
//! The cache store is driven by batches of [`Command`]s. A batch is executed
//! in one round trip and atomically with respect to other batches, so a caller
//! can compose several mutations (snapshot write + ranking insert, pending-set
//! removal + delta drain) without a lock of its own.

use bytes::Bytes;

use crate::error::{Error, Result};

/// A single cache store operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Add `delta` to an integer key (missing keys start at 0). Replies with the new value.
    IncrBy { key: String, delta: i64 },
    /// Read a key.
    Get { key: String },
    /// Read a key and delete it in the same step.
    GetDel { key: String },
    /// Overwrite a key with raw bytes.
    Set { key: String, value: Bytes },
    /// Delete a key of any type. Replies 1 if something was removed.
    Del { key: String },
    /// Add a set member. Replies 1 if it was not already present.
    SAdd { key: String, member: String },
    /// Remove a set member. Replies 1 if it was present.
    SRem { key: String, member: String },
    /// Test set membership.
    SIsMember { key: String, member: String },
    /// List every set member.
    SMembers { key: String },
    /// Upsert a sorted-set member. Replies 1 if the member is new or its score changed.
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    /// Score of a sorted-set member.
    ZScore { key: String, member: String },
    /// Remove a sorted-set member. Replies 1 if it was present.
    ZRem { key: String, member: String },
    /// Members by descending score, skipping `offset`, at most `count`.
    ZRevRange {
        key: String,
        offset: usize,
        count: usize,
    },
    /// Members with `min <= score <= max`, descending, skipping `offset`, at most `count`.
    ZRevRangeByScore {
        key: String,
        max: f64,
        min: f64,
        offset: usize,
        count: usize,
    },
    /// Remove members by ascending rank, inclusive. Negative ranks count from the tail.
    ZRemRangeByRank { key: String, start: i64, stop: i64 },
    /// Sorted-set cardinality.
    ZCard { key: String },
    /// Write `value` to `key` only when `timestamp` is strictly greater than the
    /// integer stored at `watermark_key` (or no watermark exists), then advance
    /// the watermark. Replies 1 when written, 0 when suppressed.
    SetIfNewer {
        key: String,
        value: Bytes,
        watermark_key: String,
        timestamp: i64,
    },
    /// Delete `key` under the same watermark rule as `SetIfNewer`, leaving the
    /// advanced watermark behind as a tombstone. Replies 1 when applied.
    DelIfNewer {
        key: String,
        watermark_key: String,
        timestamp: i64,
    },
}

impl Command {
    /// Wire-style command name, used for logging and fault injection.
    pub fn name(&self) -> &'static str {
        match self {
            Command::IncrBy { .. } => "INCRBY",
            Command::Get { .. } => "GET",
            Command::GetDel { .. } => "GETDEL",
            Command::Set { .. } => "SET",
            Command::Del { .. } => "DEL",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::SIsMember { .. } => "SISMEMBER",
            Command::SMembers { .. } => "SMEMBERS",
            Command::ZAdd { .. } => "ZADD",
            Command::ZScore { .. } => "ZSCORE",
            Command::ZRem { .. } => "ZREM",
            Command::ZRevRange { .. } => "ZREVRANGE",
            Command::ZRevRangeByScore { .. } => "ZREVRANGEBYSCORE",
            Command::ZRemRangeByRank { .. } => "ZREMRANGEBYRANK",
            Command::ZCard { .. } => "ZCARD",
            Command::SetIfNewer { .. } => "SETIFNEWER",
            Command::DelIfNewer { .. } => "DELIFNEWER",
        }
    }

    /// The primary key the command touches.
    pub fn key(&self) -> &str {
        match self {
            Command::IncrBy { key, .. }
            | Command::Get { key }
            | Command::GetDel { key }
            | Command::Set { key, .. }
            | Command::Del { key }
            | Command::SAdd { key, .. }
            | Command::SRem { key, .. }
            | Command::SIsMember { key, .. }
            | Command::SMembers { key }
            | Command::ZAdd { key, .. }
            | Command::ZScore { key, .. }
            | Command::ZRem { key, .. }
            | Command::ZRevRange { key, .. }
            | Command::ZRevRangeByScore { key, .. }
            | Command::ZRemRangeByRank { key, .. }
            | Command::ZCard { key }
            | Command::SetIfNewer { key, .. }
            | Command::DelIfNewer { key, .. } => key,
        }
    }
}

/// Reply to a single [`Command`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Missing key / member
    Nil,
    /// Acknowledged write with nothing to report
    Ok,
    Int(i64),
    Bytes(Bytes),
    Score(f64),
    Members(Vec<String>),
    Scored(Vec<(String, f64)>),
}

impl Reply {
    /// Integer value; a missing key reads as 0.
    ///
    /// Byte replies holding a decimal integer are accepted so that stores
    /// which keep counters as strings can reuse the same accessors.
    pub fn into_i64(self) -> Result<i64> {
        match self {
            Reply::Nil => Ok(0),
            Reply::Int(n) => Ok(n),
            Reply::Bytes(b) => std::str::from_utf8(&b)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| Error::CacheStore("value is not an integer".into())),
            other => Err(unexpected("integer", &other)),
        }
    }

    /// Integer value, `None` when the key is missing.
    pub fn into_opt_i64(self) -> Result<Option<i64>> {
        match self {
            Reply::Nil => Ok(None),
            other => other.into_i64().map(Some),
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        self.into_i64().map(|n| n != 0)
    }

    pub fn into_bytes(self) -> Result<Option<Bytes>> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Bytes(b) => Ok(Some(b)),
            other => Err(unexpected("bytes", &other)),
        }
    }

    pub fn into_score(self) -> Result<Option<f64>> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Score(s) => Ok(Some(s)),
            other => Err(unexpected("score", &other)),
        }
    }

    pub fn into_members(self) -> Result<Vec<String>> {
        match self {
            Reply::Nil => Ok(Vec::new()),
            Reply::Members(m) => Ok(m),
            other => Err(unexpected("member list", &other)),
        }
    }

    pub fn into_scored(self) -> Result<Vec<(String, f64)>> {
        match self {
            Reply::Nil => Ok(Vec::new()),
            Reply::Scored(s) => Ok(s),
            other => Err(unexpected("scored member list", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &Reply) -> Error {
    Error::CacheStore(format!("expected {} reply, got {:?}", wanted, got))
}

/// Move the reply at `index` out of a batch result, leaving `Nil` behind.
pub fn take_reply(replies: &mut [Reply], index: usize) -> Reply {
    replies
        .get_mut(index)
        .map(|slot| std::mem::replace(slot, Reply::Nil))
        .unwrap_or(Reply::Nil)
}

/// An open batch of commands, executed with [`CacheClient::run`](super::CacheClient::run).
///
/// [`push`](Self::push) returns the index of the command's reply in the
/// result vector, so composed writers can pick out their own replies.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command, returning its reply index.
    pub fn push(&mut self, command: Command) -> usize {
        self.commands.push(command);
        self.commands.len() - 1
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn incr_by(&mut self, key: impl Into<String>, delta: i64) -> usize {
        self.push(Command::IncrBy {
            key: key.into(),
            delta,
        })
    }

    pub fn get(&mut self, key: impl Into<String>) -> usize {
        self.push(Command::Get { key: key.into() })
    }

    pub fn get_del(&mut self, key: impl Into<String>) -> usize {
        self.push(Command::GetDel { key: key.into() })
    }

    pub fn del(&mut self, key: impl Into<String>) -> usize {
        self.push(Command::Del { key: key.into() })
    }

    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> usize {
        self.push(Command::SAdd {
            key: key.into(),
            member: member.into(),
        })
    }

    pub fn srem(&mut self, key: impl Into<String>, member: impl Into<String>) -> usize {
        self.push(Command::SRem {
            key: key.into(),
            member: member.into(),
        })
    }

    pub fn sismember(&mut self, key: impl Into<String>, member: impl Into<String>) -> usize {
        self.push(Command::SIsMember {
            key: key.into(),
            member: member.into(),
        })
    }

    pub fn zadd(&mut self, key: impl Into<String>, member: impl Into<String>, score: f64) -> usize {
        self.push(Command::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        })
    }

    pub fn zrem(&mut self, key: impl Into<String>, member: impl Into<String>) -> usize {
        self.push(Command::ZRem {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Keep only the `cap` highest-scored members.
    pub fn ztrim(&mut self, key: impl Into<String>, cap: usize) -> usize {
        // caps beyond i64 range keep everything
        let stop = i64::try_from(cap)
            .ok()
            .and_then(|cap| cap.checked_neg())
            .and_then(|neg| neg.checked_sub(1))
            .unwrap_or(i64::MIN);
        self.push(Command::ZRemRangeByRank {
            key: key.into(),
            start: 0,
            stop,
        })
    }

    pub fn set_if_newer(
        &mut self,
        key: impl Into<String>,
        value: Bytes,
        watermark_key: impl Into<String>,
        timestamp: i64,
    ) -> usize {
        self.push(Command::SetIfNewer {
            key: key.into(),
            value,
            watermark_key: watermark_key.into(),
            timestamp,
        })
    }

    pub fn del_if_newer(
        &mut self,
        key: impl Into<String>,
        watermark_key: impl Into<String>,
        timestamp: i64,
    ) -> usize {
        self.push(Command::DelIfNewer {
            key: key.into(),
            watermark_key: watermark_key.into(),
            timestamp,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
