//! Redis backend
//!
//! Uses multiplexed async connections; the pool bounds how many are open.
//! Scores are read back as integers, matching how attribute indices and
//! ignore lists are written.

use crate::connection::{Connector, ScoreRange, StoreConnection};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use tracing::info;

const BACKEND: &str = "redis";

pub struct RedisConnector {
    client: redis::Client,
    url: String,
}

impl RedisConnector {
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| StoreError::connection(BACKEND, e))?;
        info!(url, "Redis connector configured");
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::connection(format!("{} ({})", BACKEND, self.url), e))?;
        Ok(Box::new(RedisConnection { conn, broken: false }))
    }
}

struct RedisConnection {
    conn: MultiplexedConnection,
    broken: bool,
}

impl RedisConnection {
    fn fail(&mut self, command: &'static str, key: &str, err: redis::RedisError) -> StoreError {
        if err.is_io_error() || err.is_connection_dropped() {
            self.broken = true;
        }
        StoreError::command(command, key, err)
    }
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn zcount(&mut self, key: &str, range: ScoreRange) -> Result<u64> {
        let result: redis::RedisResult<u64> = redis::cmd("ZCOUNT")
            .arg(key)
            .arg(range.min_arg())
            .arg(range.max_arg())
            .query_async(&mut self.conn)
            .await;
        result.map_err(|e| self.fail("ZCOUNT", key, e))
    }

    async fn zrange_by_score_with_scores(
        &mut self,
        key: &str,
        range: ScoreRange,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, i64)>> {
        let result: redis::RedisResult<Vec<(String, i64)>> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(range.min_arg())
            .arg(range.max_arg())
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(offset)
            .arg(count)
            .query_async(&mut self.conn)
            .await;
        result.map_err(|e| self.fail("ZRANGEBYSCORE", key, e))
    }

    async fn zrange_by_score(&mut self, key: &str, range: ScoreRange) -> Result<Vec<String>> {
        let result: redis::RedisResult<Vec<String>> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(range.min_arg())
            .arg(range.max_arg())
            .query_async(&mut self.conn)
            .await;
        result.map_err(|e| self.fail("ZRANGEBYSCORE", key, e))
    }

    async fn zadd(&mut self, key: &str, members: &[(i64, String)]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key);
        for (score, member) in members {
            cmd.arg(*score).arg(member);
        }
        let result: redis::RedisResult<()> = cmd.query_async(&mut self.conn).await;
        result.map_err(|e| self.fail("ZADD", key, e))
    }

    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>> {
        let result: redis::RedisResult<HashMap<String, String>> =
            redis::cmd("HGETALL").arg(key).query_async(&mut self.conn).await;
        result.map_err(|e| self.fail("HGETALL", key, e))
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let result: redis::RedisResult<()> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut self.conn)
            .await;
        result.map_err(|e| self.fail("SET", key, e))
    }

    async fn sadd(&mut self, key: &str, member: &str) -> Result<()> {
        let result: redis::RedisResult<()> = redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async(&mut self.conn)
            .await;
        result.map_err(|e| self.fail("SADD", key, e))
    }

    fn is_healthy(&self) -> bool {
        !self.broken
    }
}
