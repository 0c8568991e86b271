//! Apple pellet.

use protocol::Coord;

/// An apple that grows the snake that eats it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Apple {
    pub position: Coord,
    /// Remaining lifetime in ticks, `None` when apples never expire.
    pub ttl: Option<u32>,
}

impl Apple {
    /// Create a new apple.
    pub fn new(position: Coord, ttl: Option<u32>) -> Self {
        Self { position, ttl }
    }

    /// Age the apple by one tick. Returns true once it has expired.
    #[inline]
    pub fn age(&mut self) -> bool {
        match self.ttl.as_mut() {
            Some(ttl) => {
                *ttl = ttl.saturating_sub(1);
                *ttl == 0
            }
            None => false,
        }
    }
}
