//! # Matchmaking Logic Protocol Types
//!
//! Messages exchanged between matchmaking functions and the logic API.
//! Field names serialize in lowerCamelCase so that profiles written by the
//! backend API as JSON decode without translation.
//!
//! ## Overview
//!
//! - [`Filter`]: a numeric range constraint over one indexed player attribute
//! - [`PlayerPool`]: an ordered set of filters plus the rosters they resolve to
//! - [`Roster`] / [`Player`]: resolved players and their matched attribute values
//! - [`Profile`] / [`MatchObject`]: profile and proposal envelopes

pub mod filter;
mod int64;
pub mod pool;
pub mod profile;

pub use filter::{Filter, Stats};
pub use pool::{Player, PlayerPool, Property, Roster};
pub use profile::{IgnoreListQuery, MatchObject, Profile, RpcResult, Timestamp};
