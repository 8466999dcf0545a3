//! Player pool query engine

pub mod filter;
pub mod idset;
pub mod ignore;
pub mod intersect;
pub mod paginate;

pub use filter::{FilterLimits, FilterResult, RangeFilterApplier};
pub use idset::IdSet;
pub use ignore::IgnoreListAggregator;
pub use intersect::{EngineSettings, PoolEngine};
pub use paginate::{AttributeMatches, PageSink, PoolSummary, RosterPaginator};
