//! Ignore lists
//!
//! An ignore list is a sorted set whose scores are the Unix time (seconds) at
//! which each player id was added. Re-adding an id refreshes its timestamp.

use crate::connection::{ScoreRange, StoreConnection};
use crate::error::Result;
use tracing::debug;

/// Add `player_ids` to `list`, stamped with `now`
pub async fn add(
    conn: &mut dyn StoreConnection,
    list: &str,
    player_ids: &[String],
    now: i64,
) -> Result<()> {
    if player_ids.is_empty() {
        return Ok(());
    }
    let members: Vec<(i64, String)> = player_ids.iter().map(|id| (now, id.clone())).collect();
    conn.zadd(list, &members).await?;
    debug!(list, count = player_ids.len(), "Updated ignore list");
    Ok(())
}

/// Player ids of `list` whose insertion time falls inside `window`
pub async fn retrieve(
    conn: &mut dyn StoreConnection,
    list: &str,
    window: ScoreRange,
) -> Result<Vec<String>> {
    conn.zrange_by_score(list, window).await
}

/// Window covering entries added at or before `as_of` and, when a horizon is
/// given, no earlier than `as_of - horizon_secs`
pub fn window(as_of: i64, horizon_secs: Option<u64>) -> ScoreRange {
    let min = horizon_secs
        .filter(|h| *h > 0)
        .map(|h| as_of.saturating_sub(i64::try_from(h).unwrap_or(i64::MAX)));
    ScoreRange::new(min, Some(as_of))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_add_then_retrieve_respects_window() {
        let store = MemoryStore::new();
        let mut conn = store.connector().connect().await.unwrap();

        add(conn.as_mut(), "proposed", &["old".to_string()], 100).await.unwrap();
        add(conn.as_mut(), "proposed", &["new".to_string()], 200).await.unwrap();

        let upto_150 = retrieve(conn.as_mut(), "proposed", window(150, None)).await.unwrap();
        assert_eq!(upto_150, vec!["old"]);

        let recent = retrieve(conn.as_mut(), "proposed", window(250, Some(60))).await.unwrap();
        assert_eq!(recent, vec!["new"]);
    }

    #[tokio::test]
    async fn test_empty_add_issues_no_command() {
        let store = MemoryStore::new();
        let mut conn = store.connector().connect().await.unwrap();

        add(conn.as_mut(), "proposed", &[], 100).await.unwrap();
        assert!(store.commands().is_empty());
    }

    #[test]
    fn test_zero_horizon_means_no_lower_bound() {
        assert_eq!(window(500, Some(0)), ScoreRange::at_most(500));
        assert_eq!(window(500, Some(100)), ScoreRange::between(400, 500));
    }
}
