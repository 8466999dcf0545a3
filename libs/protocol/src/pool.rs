//! Player pools, rosters and players

use crate::filter::{Filter, Stats};
use serde::{Deserialize, Serialize};

/// A matched attribute value carried by a player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(deserialize_with = "crate::int64::deserialize")]
    pub value: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Player {
    pub id: String,
    pub properties: Vec<Property>,
}

impl Player {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: Vec::new(),
        }
    }

    /// Value recorded for `name`, if any filter matched on it
    pub fn property(&self, name: &str) -> Option<i64> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Roster {
    pub id: String,
    pub players: Vec<Player>,
}

impl Roster {
    /// Roster of bare player ids, no properties attached
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: String::new(),
            players: ids.into_iter().map(Player::new).collect(),
        }
    }

    pub fn player_ids(&self) -> impl Iterator<Item = &str> {
        self.players.iter().map(|p| p.id.as_str())
    }
}

/// A pool request, and also the unit streamed back page by page.
///
/// Each streamed page carries the originating pool's filters and aggregate
/// stats, with `rosters` holding exactly one partial roster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerPool {
    pub id: String,
    pub name: String,
    pub filters: Vec<Filter>,
    pub rosters: Vec<Roster>,
    pub stats: Option<Stats>,
}

impl PlayerPool {
    pub fn new(id: impl Into<String>, filters: Vec<Filter>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            filters,
            rosters: Vec::new(),
            stats: None,
        }
    }

    /// All players across every roster of this pool (or page)
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.rosters.iter().flat_map(|r| r.players.iter())
    }
}
