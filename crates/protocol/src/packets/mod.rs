//! Message definitions for the snake protocol.
//!
//! Every frame is a UTF-8 JSON object with a `type` discriminator.

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Message types accepted from clients.
pub const CLIENT_TYPES: [&str; 4] = ["init", "direction", "restart", "boost"];
