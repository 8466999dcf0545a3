//! Store command surface
//!
//! The subset of Redis sorted-set, hash, string and set commands the logic
//! API needs. Backends implement [`StoreConnection`]; a [`Connector`] opens
//! new connections for the [`ConnectionPool`](crate::ConnectionPool).

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Inclusive score window; a missing bound is infinite on that side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl ScoreRange {
    pub fn new(min: Option<i64>, max: Option<i64>) -> Self {
        Self { min, max }
    }

    pub fn between(min: i64, max: i64) -> Self {
        Self::new(Some(min), Some(max))
    }

    pub fn at_least(min: i64) -> Self {
        Self::new(Some(min), None)
    }

    pub fn at_most(max: i64) -> Self {
        Self::new(None, Some(max))
    }

    pub fn admits(&self, score: i64) -> bool {
        self.min.map_or(true, |min| score >= min) && self.max.map_or(true, |max| score <= max)
    }

    /// `min` argument in ZRANGEBYSCORE syntax
    pub fn min_arg(&self) -> String {
        self.min.map_or_else(|| "-inf".to_string(), |v| v.to_string())
    }

    /// `max` argument in ZRANGEBYSCORE syntax
    pub fn max_arg(&self) -> String {
        self.max.map_or_else(|| "+inf".to_string(), |v| v.to_string())
    }
}

/// One live connection to the backing store
#[async_trait]
pub trait StoreConnection: Send {
    /// ZCOUNT: members of `key` whose score falls in `range`
    async fn zcount(&mut self, key: &str, range: ScoreRange) -> Result<u64>;

    /// ZRANGEBYSCORE WITHSCORES LIMIT offset count, in ascending score order
    async fn zrange_by_score_with_scores(
        &mut self,
        key: &str,
        range: ScoreRange,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, i64)>>;

    /// ZRANGEBYSCORE without scores or limit
    async fn zrange_by_score(&mut self, key: &str, range: ScoreRange) -> Result<Vec<String>>;

    /// ZADD of `(score, member)` pairs
    async fn zadd(&mut self, key: &str, members: &[(i64, String)]) -> Result<()>;

    /// HGETALL; a missing key yields an empty map
    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>>;

    async fn set(&mut self, key: &str, value: &str) -> Result<()>;

    async fn sadd(&mut self, key: &str, member: &str) -> Result<()>;

    /// Whether the connection may be handed out again after use
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Opens connections to one backend
#[async_trait]
pub trait Connector: Send + Sync {
    /// Backend name for logs and errors
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<Box<dyn StoreConnection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_arguments() {
        assert_eq!(ScoreRange::between(1, 5).min_arg(), "1");
        assert_eq!(ScoreRange::at_least(7).max_arg(), "+inf");
        assert_eq!(ScoreRange::at_most(7).min_arg(), "-inf");
    }

    #[test]
    fn test_range_admits_inclusive_bounds() {
        let range = ScoreRange::between(10, 20);
        assert!(range.admits(10));
        assert!(range.admits(20));
        assert!(!range.admits(21));
        assert!(ScoreRange::default().admits(i64::MIN));
    }
}
