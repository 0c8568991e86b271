//! Shared protocol crate for serpent-arena.
//!
//! This crate contains:
//! - Grid primitives shared by server and clients (Coord, Direction, Portal)
//! - Client -> server message parsing
//! - Server -> client message encoding

mod error;
pub mod packets;

pub use error::ProtocolError;

use serde::{Deserialize, Serialize};

/// A grid cell position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Raw `{x, y}` vector as sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vector {
    pub x: i32,
    pub y: i32,
}

/// One of the four orthogonal unit directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Right,
    Left,
    Down,
    Up,
}

impl Direction {
    /// Convert a client vector into a direction.
    ///
    /// Returns `None` for anything that is not a unit orthogonal vector.
    pub fn from_vector(v: Vector) -> Option<Self> {
        match (v.x, v.y) {
            (1, 0) => Some(Direction::Right),
            (-1, 0) => Some(Direction::Left),
            (0, 1) => Some(Direction::Down),
            (0, -1) => Some(Direction::Up),
            _ => None,
        }
    }

    /// The `(dx, dy)` offset of one step.
    #[inline]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Right => (1, 0),
            Direction::Left => (-1, 0),
            Direction::Down => (0, 1),
            Direction::Up => (0, -1),
        }
    }

    pub const fn to_vector(self) -> Vector {
        let (x, y) = self.delta();
        Vector { x, y }
    }
}

/// A bidirectional teleport between two cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portal {
    pub entry: Coord,
    pub exit: Coord,
}
