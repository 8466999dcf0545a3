//! Ignore list aggregation

use crate::engine::idset::IdSet;
use crate::error::{EngineError, Result};
use crate::observer::{EngineEvent, Observer};
use mmlogic_config::IgnoreListConfig;
use state_storage::{ignorelist, ConnectionPool};
use std::sync::Arc;
use tracing::debug;

/// Combines configured ignore lists into one exclusion set
#[derive(Clone)]
pub struct IgnoreListAggregator {
    pool: Arc<ConnectionPool>,
    observer: Arc<dyn Observer>,
}

impl IgnoreListAggregator {
    pub fn new(pool: Arc<ConnectionPool>, observer: Arc<dyn Observer>) -> Self {
        Self { pool, observer }
    }

    /// Entries of one list added at or before `as_of` and within its horizon
    pub async fn retrieve(&self, list: &IgnoreListConfig, as_of: i64) -> Result<Vec<String>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| EngineError::store(format!("ignore list '{}'", list.name), e))?;
        let window = ignorelist::window(as_of, list.horizon());
        ignorelist::retrieve(&mut *conn, &list.key, window)
            .await
            .map_err(|e| EngineError::store(format!("ignore list '{}'", list.name), e))
    }

    /// Union of every list in `lists` as of `as_of`.
    ///
    /// Any list failing to load fails the whole call; a partial exclusion
    /// set would let ignored players through.
    pub async fn combine(&self, lists: &[IgnoreListConfig], as_of: i64) -> Result<IdSet> {
        let mut ignored = IdSet::new();
        if lists.is_empty() {
            return Ok(ignored);
        }

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| EngineError::store("ignore lists", e))?;

        for list in lists {
            let window = ignorelist::window(as_of, list.horizon());
            let ids = match ignorelist::retrieve(&mut *conn, &list.key, window).await {
                Ok(ids) => ids,
                Err(e) => {
                    let err = EngineError::store(format!("ignore list '{}'", list.name), e);
                    self.observer.record_error("combine_ignore_lists", &err);
                    return Err(err);
                }
            };
            let before = ignored.len();
            ignored.extend(ids);
            debug!(list = %list.name, added = ignored.len() - before, total = ignored.len(), "Merged ignore list");
        }

        self.observer.record_event(EngineEvent::IgnoreListsCombined {
            lists: lists.len(),
            ignored: ignored.len(),
        });
        Ok(ignored)
    }
}
