//! Serpent Arena game server library.

pub mod collision;
pub mod config;
pub mod entity;
pub mod error;
pub mod server;
pub mod world;

// Re-export commonly used types
pub use config::Config;
pub use error::GameError;
pub use server::{run, serve, GameCommand, GameState, StateBroadcast, TargetedMessage};
