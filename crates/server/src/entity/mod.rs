//! Game entities.
//!
//! Snakes are owned by their connection's player record; apples are owned
//! by the world.

mod apple;
mod player;

pub use apple::Apple;
pub use player::Player;
