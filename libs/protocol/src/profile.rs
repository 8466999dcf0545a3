//! Profile, proposal and ignore-list envelopes

use crate::pool::{PlayerPool, Roster};
use serde::{Deserialize, Serialize};

/// A matchmaking profile as stored by the backend API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub id: String,

    /// Opaque JSON blob owned by the matchmaking function
    pub properties: String,

    pub player_pools: Vec<PlayerPool>,
}

/// A match proposal written by a matchmaking function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchObject {
    pub id: String,
    pub properties: String,
    pub rosters: Vec<Roster>,
    pub pools: Vec<PlayerPool>,
}

impl MatchObject {
    /// Every player id across all rosters, in roster order
    pub fn player_ids(&self) -> Vec<String> {
        self.rosters
            .iter()
            .flat_map(|r| r.player_ids().map(str::to_string))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResult {
    pub success: bool,
    pub error: String,
}

impl RpcResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: String::new(),
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: error.to_string(),
        }
    }
}

/// Unix timestamp in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(deserialize_with = "crate::int64::deserialize")]
    pub ts: i64,
}

/// Input for combining every configured ignore list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IgnoreListQuery {
    /// Cutoff timestamp; defaults to now
    #[serde(deserialize_with = "crate::int64::option::deserialize")]
    pub as_of: Option<i64>,
}
