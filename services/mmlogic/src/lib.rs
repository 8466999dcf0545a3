//! # Matchmaking Logic API
//!
//! Serves player pool queries for matchmaking functions. A pool is a set of
//! numeric range filters over indexed player attributes; the service
//! resolves it to the players matching every filter, removes anyone on a
//! configured ignore list, and streams the result back in fixed-size pages.
//!
//! ## Architecture
//!
//! ```text
//! PlayerPool ──► RangeFilterApplier (per filter, ZCOUNT + chunked ZRANGEBYSCORE)
//!                      │
//!                      ▼
//!                intersect ids ──► IgnoreListAggregator ──► difference
//!                                                             │
//!                                                             ▼
//!                                   RosterPaginator ──► PageSink (WebSocket / mpsc)
//! ```
//!
//! The same [`api::MmlogicApi`] also reads profiles, writes proposals and
//! exposes ignore lists. [`server`] puts it behind `warp`.

pub mod api;
pub mod engine;
pub mod error;
pub mod observer;
pub mod server;

pub use api::{MmlogicApi, StatusReport};
pub use engine::{EngineSettings, IdSet, PageSink, PoolEngine, PoolSummary};
pub use error::{ApiError, EngineError, Result, SinkError};
pub use observer::{EngineEvent, MetricsSnapshot, Observer, RecordingObserver, ServiceMetrics, TracingObserver};
pub use server::{routes, MmlogicServer};
