//! Server -> Client message building.

use crate::{Coord, Portal, ProtocolError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub pseudo: String,
    pub score: u32,
}

/// Full world snapshot, sent once per tick to every connection.
///
/// Maps are keyed by player id and ordered, so two encodes of the same
/// state produce the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub snakes: BTreeMap<u32, Vec<Coord>>,
    pub apples: Vec<Coord>,
    pub alive: BTreeMap<u32, bool>,
    pub scores: BTreeMap<u32, u32>,
    pub boosts: BTreeMap<u32, bool>,
    pub boost_cooldowns: BTreeMap<u32, u32>,
    pub pseudos: BTreeMap<u32, String>,
    pub portals: Vec<Portal>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Parsed/built server message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to `init` with the assigned identity.
    InitAck { id: u32, pseudo: String },
    /// Per-tick world state.
    State(StateSnapshot),
}

impl ServerMessage {
    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decode a server frame (used by test clients).
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::InvalidJson)
    }
}
