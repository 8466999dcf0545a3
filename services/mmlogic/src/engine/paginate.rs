//! Roster pagination and page delivery

use crate::engine::idset::IdSet;
use crate::engine::filter::FilterResult;
use crate::error::{EngineError, Result, SinkError};
use crate::observer::{EngineEvent, Observer};
use async_trait::async_trait;
use mmlogic_protocol::{Player, PlayerPool, Property, Roster};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Destination for streamed pool pages
#[async_trait]
pub trait PageSink: Send {
    async fn send_page(&mut self, page: PlayerPool) -> std::result::Result<(), SinkError>;
}

#[async_trait]
impl PageSink for mpsc::Sender<PlayerPool> {
    async fn send_page(&mut self, page: PlayerPool) -> std::result::Result<(), SinkError> {
        self.send(page)
            .await
            .map_err(|_| SinkError::new("page receiver dropped"))
    }
}

#[async_trait]
impl PageSink for Vec<PlayerPool> {
    async fn send_page(&mut self, page: PlayerPool) -> std::result::Result<(), SinkError> {
        self.push(page);
        Ok(())
    }
}

/// Values one filter matched, keyed by the attribute it indexes
#[derive(Debug, Clone)]
pub struct AttributeMatches {
    pub attribute: String,
    pub values: FilterResult,
}

/// Outcome of streaming one pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub pages: usize,
    pub players: usize,
    pub short_circuited: bool,
}

/// Splits the final roster into fixed-size pages and sends them in order
#[derive(Clone)]
pub struct RosterPaginator {
    page_size: usize,
    observer: Arc<dyn Observer>,
}

impl RosterPaginator {
    pub fn new(page_size: usize, observer: Arc<dyn Observer>) -> Self {
        Self {
            page_size: page_size.max(1),
            observer,
        }
    }

    /// Stream `players` as pages of `pool`, each player carrying the value
    /// matched by every filter. At least one page is always sent.
    pub async fn stream<S>(
        &self,
        pool: &PlayerPool,
        players: &IdSet,
        matched: &[AttributeMatches],
        sink: &mut S,
    ) -> Result<PoolSummary>
    where
        S: PageSink + ?Sized,
    {
        let total = players.len();
        let page_count = total.div_ceil(self.page_size).max(1);
        let mut batch = Vec::with_capacity(self.page_size.min(total));
        let mut sent = 0;

        for id in players {
            batch.push(resolve_player(id, matched));
            if batch.len() == self.page_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.page_size));
                self.send(pool, sent, page_count, full, sink).await?;
                sent += 1;
            }
        }
        if !batch.is_empty() || sent == 0 {
            self.send(pool, sent, page_count, batch, sink).await?;
            sent += 1;
        }

        self.observer.record_event(EngineEvent::PoolStreamed {
            pool_id: pool.id.clone(),
            pages: sent,
            players: total,
        });
        Ok(PoolSummary {
            pages: sent,
            players: total,
            short_circuited: false,
        })
    }

    /// Single page with an empty roster
    pub async fn stream_empty<S>(&self, pool: &PlayerPool, sink: &mut S) -> Result<PoolSummary>
    where
        S: PageSink + ?Sized,
    {
        self.send(pool, 0, 1, Vec::new(), sink).await?;
        Ok(PoolSummary {
            pages: 1,
            players: 0,
            short_circuited: true,
        })
    }

    async fn send<S>(
        &self,
        pool: &PlayerPool,
        index: usize,
        page_count: usize,
        players: Vec<Player>,
        sink: &mut S,
    ) -> Result<()>
    where
        S: PageSink + ?Sized,
    {
        let count = players.len();
        let page = page_of(pool, index, page_count, players);
        sink.send_page(page)
            .await
            .map_err(|e| EngineError::StreamSend {
                pool_id: pool.id.clone(),
                page: index + 1,
                reason: e.reason,
            })?;
        self.observer.record_event(EngineEvent::PageSent {
            pool_id: pool.id.clone(),
            page: index + 1,
            players: count,
        });
        Ok(())
    }
}

fn page_of(pool: &PlayerPool, index: usize, page_count: usize, players: Vec<Player>) -> PlayerPool {
    PlayerPool {
        id: format!("{}.page{}of{}", pool.id, index + 1, page_count),
        name: pool.name.clone(),
        filters: pool.filters.clone(),
        rosters: vec![Roster {
            id: format!("{}.partialRoster", pool.id),
            players,
        }],
        stats: pool.stats,
    }
}

fn resolve_player(id: &str, matched: &[AttributeMatches]) -> Player {
    let properties = matched
        .iter()
        .filter_map(|m| {
            m.values.get(id).map(|value| Property {
                name: m.attribute.clone(),
                value: *value,
            })
        })
        .collect();
    Player {
        id: id.to_string(),
        properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RecordingObserver;
    use mmlogic_protocol::Filter;

    fn ids(n: usize) -> IdSet {
        (0..n).map(|i| format!("p{:03}", i)).collect()
    }

    fn pool() -> PlayerPool {
        PlayerPool::new("pool", vec![Filter::new("f", "rating", 0, None)])
    }

    async fn page_sizes(players: usize, page_size: usize) -> Vec<usize> {
        let paginator = RosterPaginator::new(page_size, RecordingObserver::new());
        let mut pages: Vec<PlayerPool> = Vec::new();
        paginator.stream(&pool(), &ids(players), &[], &mut pages).await.unwrap();
        pages.iter().map(|p| p.players().count()).collect()
    }

    #[tokio::test]
    async fn test_page_boundaries() {
        assert_eq!(page_sizes(250, 100).await, vec![100, 100, 50]);
        assert_eq!(page_sizes(5, 1).await, vec![1; 5]);
        assert_eq!(page_sizes(5, 5).await, vec![5]);
        assert_eq!(page_sizes(5, 50).await, vec![5]);
        assert_eq!(page_sizes(0, 10).await, vec![0]);
    }

    #[tokio::test]
    async fn test_pages_preserve_order_and_carry_request() {
        let observer = RecordingObserver::new();
        let paginator = RosterPaginator::new(2, observer.clone());
        let mut pages: Vec<PlayerPool> = Vec::new();
        let summary = paginator.stream(&pool(), &ids(3), &[], &mut pages).await.unwrap();

        assert_eq!(
            observer.events(),
            vec![
                EngineEvent::PageSent {
                    pool_id: "pool".to_string(),
                    page: 1,
                    players: 2,
                },
                EngineEvent::PageSent {
                    pool_id: "pool".to_string(),
                    page: 2,
                    players: 1,
                },
                EngineEvent::PoolStreamed {
                    pool_id: "pool".to_string(),
                    pages: 2,
                    players: 3,
                },
            ]
        );

        assert_eq!(summary.pages, 2);
        assert_eq!(pages[0].id, "pool.page1of2");
        assert_eq!(pages[1].id, "pool.page2of2");
        assert_eq!(pages[0].rosters[0].id, "pool.partialRoster");
        assert_eq!(pages[1].filters, pool().filters);

        let streamed: Vec<_> = pages.iter().flat_map(|p| p.players()).map(|p| p.id.clone()).collect();
        assert_eq!(streamed, ids(3).into_vec());
    }

    #[tokio::test]
    async fn test_players_carry_matched_values() {
        let matched = vec![
            AttributeMatches {
                attribute: "rating".to_string(),
                values: [("a".to_string(), 1500)].into_iter().collect(),
            },
            AttributeMatches {
                attribute: "region".to_string(),
                values: [("a".to_string(), 2)].into_iter().collect(),
            },
        ];
        let players: IdSet = ["a".to_string()].into_iter().collect();
        let paginator = RosterPaginator::new(10, RecordingObserver::new());
        let mut pages: Vec<PlayerPool> = Vec::new();
        paginator.stream(&pool(), &players, &matched, &mut pages).await.unwrap();

        let player = pages[0].players().next().unwrap();
        assert_eq!(player.property("rating"), Some(1500));
        assert_eq!(player.property("region"), Some(2));
    }

    #[tokio::test]
    async fn test_closed_receiver_fails_stream() {
        let (mut tx, rx) = mpsc::channel::<PlayerPool>(1);
        drop(rx);
        let paginator = RosterPaginator::new(10, RecordingObserver::new());

        let err = paginator.stream(&pool(), &ids(3), &[], &mut tx).await.unwrap_err();
        assert!(matches!(err, EngineError::StreamSend { page: 1, .. }));
    }
}
