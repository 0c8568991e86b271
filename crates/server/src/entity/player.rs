//! Player snake.

use crate::config::BoostConfig;
use protocol::{Coord, Direction};
use std::collections::VecDeque;

/// A snake controlled by one identified connection.
#[derive(Debug, Clone)]
pub struct Player {
    /// Connection id, stable for the connection's lifetime.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Latched direction, consumed by the next movement phase.
    pub direction: Direction,
    /// Body cells, head first.
    pub body: VecDeque<Coord>,
    pub alive: bool,
    pub score: u32,
    /// Segments still owed to the body.
    pub pending_growth: u32,
    pub boosted: bool,
    /// Ticks of boost left while `boosted`.
    pub boost_ticks: u32,
    /// Ticks before boost may be activated again.
    pub boost_cooldown: u32,
}

impl Player {
    /// Create a one-segment snake at `head`.
    pub fn new(id: u32, name: String, head: Coord) -> Self {
        Self {
            id,
            name,
            direction: Direction::default(),
            body: VecDeque::from([head]),
            alive: true,
            score: 0,
            pending_growth: 0,
            boosted: false,
            boost_ticks: 0,
            boost_cooldown: 0,
        }
    }

    /// Reinitialize in place as a fresh snake, keeping id and name.
    pub fn respawn(&mut self, head: Coord, keep_score: bool) {
        let score = if keep_score { self.score } else { 0 };
        let name = std::mem::take(&mut self.name);
        *self = Self::new(self.id, name, head);
        self.score = score;
    }

    #[inline]
    pub fn head(&self) -> Option<Coord> {
        self.body.front().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Whether a boost request would be accepted right now.
    pub fn can_boost(&self, config: &BoostConfig) -> bool {
        self.alive
            && !self.boosted
            && self.body.len() >= config.min_length
            && (!config.cooldown_enabled || self.boost_cooldown == 0)
    }

    /// Start a boost. Callers check [`Player::can_boost`] first.
    pub fn activate_boost(&mut self, config: &BoostConfig) {
        self.boosted = true;
        self.boost_ticks = config.duration_ticks;
        if config.cooldown_enabled {
            self.boost_cooldown = config.cooldown_ticks;
        }
    }

    /// Per-tick boost timers and the shrink cost of boosting.
    pub fn update_boost(&mut self, config: &BoostConfig) {
        if self.boost_cooldown > 0 {
            self.boost_cooldown -= 1;
        }
        if !self.boosted {
            return;
        }

        self.boost_ticks = self.boost_ticks.saturating_sub(1);
        for _ in 0..config.shrink_per_tick {
            if self.body.len() <= config.min_body_length {
                break;
            }
            self.body.pop_back();
        }
        if self.boost_ticks == 0 {
            self.boosted = false;
        }
    }

    /// Drain one unit of pending growth, or drop the tail when nothing is owed.
    ///
    /// Boosted snakes keep their tail here; they already paid in
    /// [`Player::update_boost`].
    pub fn settle_tail(&mut self) {
        if self.pending_growth > 0 {
            self.pending_growth -= 1;
        } else if !self.boosted {
            self.body.pop_back();
        }
    }

    /// Eliminate the snake. The body stays until the end of the tick.
    pub fn kill(&mut self) {
        self.alive = false;
    }
}
