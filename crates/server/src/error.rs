//! Simulation error types.

use protocol::Coord;
use thiserror::Error;

/// Invariant violations detected at the end of a tick.
///
/// None of these should be reachable; when one is, the tick's broadcast is
/// dropped and the loop carries on.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("Apple pool underflow: {count} apples, target {target}")]
    ApplePoolUnderflow { count: usize, target: usize },

    #[error("Living player {0} has an empty body")]
    EmptyLivingBody(u32),

    #[error("Player {id} has a segment outside the grid at {at:?}")]
    SegmentOutOfBounds { id: u32, at: Coord },
}
