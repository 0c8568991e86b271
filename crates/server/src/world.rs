//! World state management.
//!
//! The toroidal grid, the portal table and the apple pool.

use crate::config::Config;
use crate::entity::Apple;
use protocol::{Coord, Direction, Portal};
use rand::Rng;

/// Grid bounds. Coordinates wrap on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub cols: i32,
    pub rows: i32,
}

impl Grid {
    pub fn new(cols: i32, rows: i32) -> Self {
        Self { cols, rows }
    }

    /// The cell one step from `from` in `direction`, wrapped.
    #[inline]
    pub fn step(&self, from: Coord, direction: Direction) -> Coord {
        let (dx, dy) = direction.delta();
        Coord::new(
            (from.x + dx).rem_euclid(self.cols),
            (from.y + dy).rem_euclid(self.rows),
        )
    }

    #[inline]
    pub fn contains(&self, c: Coord) -> bool {
        c.x >= 0 && c.y >= 0 && c.x < self.cols && c.y < self.rows
    }

    /// Get a uniformly random cell.
    #[inline]
    pub fn random_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Coord {
        Coord::new(rng.random_range(0..self.cols), rng.random_range(0..self.rows))
    }
}

/// The shared world: grid, portals and apples.
#[derive(Debug)]
pub struct World {
    pub grid: Grid,
    pub portals: Vec<Portal>,
    pub apples: Vec<Apple>,
    /// Pool size restored after every tick.
    pub apple_target: usize,
    /// Lifetime given to new apples, `None` when apples never expire.
    pub apple_lifetime: Option<u32>,
}

impl World {
    /// Create an empty world from configuration.
    pub fn new(config: &Config) -> Self {
        let (cols, rows) = config.grid.dimensions();
        Self {
            grid: Grid::new(cols, rows),
            portals: config.portals.iter().copied().map(Portal::from).collect(),
            apples: Vec::with_capacity(config.apple.target_count * 2),
            apple_target: config.apple.target_count,
            apple_lifetime: config.apple.ttl_enabled.then_some(config.apple.lifetime_ticks),
        }
    }

    /// Apply the portal table to a head position.
    ///
    /// Portals work both ways. Entry is checked before exit and the first
    /// matching portal in list order wins.
    pub fn teleport(&self, at: Coord) -> Coord {
        for portal in &self.portals {
            if at == portal.entry {
                return portal.exit;
            }
            if at == portal.exit {
                return portal.entry;
            }
        }
        at
    }

    /// Place an apple at a fixed cell with a full lifetime.
    pub fn spawn_apple_at(&mut self, position: Coord) {
        self.apples.push(Apple::new(position, self.apple_lifetime));
    }

    /// Place an apple on a random cell. Occupied cells are allowed.
    pub fn spawn_apple<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let position = self.grid.random_cell(rng);
        self.spawn_apple_at(position);
    }

    /// Remove the first apple at `position`. Returns true if one was eaten.
    pub fn take_apple_at(&mut self, position: Coord) -> bool {
        match self.apples.iter().position(|a| a.position == position) {
            Some(idx) => {
                self.apples.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Age every apple and drop the expired ones. Returns how many expired.
    pub fn age_apples(&mut self) -> usize {
        let before = self.apples.len();
        self.apples.retain_mut(|apple| !apple.age());
        before - self.apples.len()
    }

    /// Spawn random apples until the pool is back at its target.
    pub fn replenish_apples<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        while self.apples.len() < self.apple_target {
            self.spawn_apple(rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn world(portals: Vec<Portal>) -> World {
        let mut config = Config::default();
        config.apple.target_count = 5;
        let mut world = World::new(&config);
        world.portals = portals;
        world
    }

    #[test]
    fn test_step_wraps() {
        let grid = Grid::new(10, 8);
        assert_eq!(grid.step(Coord::new(9, 3), Direction::Right), Coord::new(0, 3));
        assert_eq!(grid.step(Coord::new(0, 3), Direction::Left), Coord::new(9, 3));
        assert_eq!(grid.step(Coord::new(4, 7), Direction::Down), Coord::new(4, 0));
        assert_eq!(grid.step(Coord::new(4, 0), Direction::Up), Coord::new(4, 7));
        assert_eq!(grid.step(Coord::new(4, 4), Direction::Right), Coord::new(5, 4));
    }

    #[test]
    fn test_teleport_both_ways() {
        let world = world(vec![Portal { entry: Coord::new(1, 1), exit: Coord::new(6, 6) }]);
        assert_eq!(world.teleport(Coord::new(1, 1)), Coord::new(6, 6));
        assert_eq!(world.teleport(Coord::new(6, 6)), Coord::new(1, 1));
        assert_eq!(world.teleport(Coord::new(2, 2)), Coord::new(2, 2));
    }

    #[test]
    fn test_teleport_first_match_wins() {
        let world = world(vec![
            Portal { entry: Coord::new(1, 1), exit: Coord::new(6, 6) },
            Portal { entry: Coord::new(6, 6), exit: Coord::new(9, 9) },
        ]);
        // (6,6) is the first portal's exit, which is checked before the
        // second portal's entry.
        assert_eq!(world.teleport(Coord::new(6, 6)), Coord::new(1, 1));
    }

    #[test]
    fn test_replenish_and_expire() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut world = world(Vec::new());
        world.apple_lifetime = Some(2);
        world.replenish_apples(&mut rng);
        assert_eq!(world.apples.len(), 5);
        assert!(world.apples.iter().all(|a| world.grid.contains(a.position)));

        assert_eq!(world.age_apples(), 0);
        assert_eq!(world.age_apples(), 5);
        assert!(world.apples.is_empty());

        world.replenish_apples(&mut rng);
        assert_eq!(world.apples.len(), 5);
    }

    #[test]
    fn test_take_apple_removes_first_match_only() {
        let mut world = world(Vec::new());
        world.spawn_apple_at(Coord::new(3, 3));
        world.spawn_apple_at(Coord::new(4, 4));
        world.spawn_apple_at(Coord::new(3, 3));

        assert!(world.take_apple_at(Coord::new(3, 3)));
        assert_eq!(world.apples.len(), 2);
        assert_eq!(world.apples[0].position, Coord::new(4, 4));
        assert!(world.take_apple_at(Coord::new(3, 3)));
        assert!(!world.take_apple_at(Coord::new(3, 3)));
    }
}
