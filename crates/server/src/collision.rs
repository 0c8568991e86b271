//! Collision detection for a single movement step.
//!
//! Detection only. Resolution (deaths, cuts, rewards) happens in the game
//! tick, which owns the mutable player store.

use crate::entity::Player;
use protocol::Coord;
use std::collections::BTreeMap;

/// What a head moving into a cell runs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCollision {
    /// Free cell.
    None,
    /// The snake's own body.
    SelfHit,
    /// Another snake's body at `index` (0 is its head).
    Opponent { victim: u32, index: usize },
}

/// Index of the first segment of `body` lying on `cell`.
#[inline]
pub fn find_hit<'a>(body: impl IntoIterator<Item = &'a Coord>, cell: Coord) -> Option<usize> {
    body.into_iter().position(|&seg| seg == cell)
}

/// Check the cell `next` that snake `mover` is about to enter.
///
/// Self-collision is checked against the mover's current (in-progress)
/// body. Opponents are the snakes in `contenders` other than the mover,
/// scanned in the given order; the first one whose body contains `next`
/// is reported.
pub fn check_step(
    players: &BTreeMap<u32, Player>,
    mover: u32,
    next: Coord,
    contenders: &[u32],
) -> StepCollision {
    if let Some(me) = players.get(&mover) {
        if find_hit(&me.body, next).is_some() {
            return StepCollision::SelfHit;
        }
    }

    for &other_id in contenders {
        if other_id == mover {
            continue;
        }
        let Some(other) = players.get(&other_id) else {
            continue;
        };
        if let Some(index) = find_hit(&other.body, next) {
            return StepCollision::Opponent { victim: other_id, index };
        }
    }

    StepCollision::None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: u32, cells: &[(i32, i32)]) -> Player {
        let mut p = Player::new(id, format!("p{id}"), Coord::new(cells[0].0, cells[0].1));
        for &(x, y) in &cells[1..] {
            p.body.push_back(Coord::new(x, y));
        }
        p
    }

    fn store(players: Vec<Player>) -> BTreeMap<u32, Player> {
        players.into_iter().map(|p| (p.id, p)).collect()
    }

    #[test]
    fn test_find_hit() {
        let p = player(1, &[(3, 0), (2, 0), (1, 0)]);
        assert_eq!(find_hit(&p.body, Coord::new(3, 0)), Some(0));
        assert_eq!(find_hit(&p.body, Coord::new(1, 0)), Some(2));
        assert_eq!(find_hit(&p.body, Coord::new(0, 0)), None);
    }

    #[test]
    fn test_self_hit_has_priority() {
        let players = store(vec![
            player(1, &[(3, 0), (3, 1), (2, 1), (2, 0)]),
            player(2, &[(2, 0)]),
        ]);
        assert_eq!(check_step(&players, 1, Coord::new(2, 0), &[1, 2]), StepCollision::SelfHit);
    }

    #[test]
    fn test_first_opponent_in_order_wins() {
        let players = store(vec![
            player(1, &[(0, 0)]),
            player(2, &[(5, 5), (4, 5)]),
            player(3, &[(4, 5)]),
        ]);
        assert_eq!(
            check_step(&players, 1, Coord::new(4, 5), &[1, 2, 3]),
            StepCollision::Opponent { victim: 2, index: 1 }
        );
        assert_eq!(
            check_step(&players, 1, Coord::new(4, 5), &[1, 3, 2]),
            StepCollision::Opponent { victim: 3, index: 0 }
        );
    }

    #[test]
    fn test_non_contenders_are_ignored() {
        let players = store(vec![player(1, &[(0, 0)]), player(2, &[(1, 0)])]);
        assert_eq!(check_step(&players, 1, Coord::new(1, 0), &[1]), StepCollision::None);
        assert_eq!(check_step(&players, 1, Coord::new(7, 7), &[1, 2]), StepCollision::None);
    }
}
