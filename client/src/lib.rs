//! # Bot Client Library
//!
//! Headless client for the arena server. It registers, keeps its heartbeat
//! alive, deploys random units on its own half of the board, fires its super
//! ability when charged and asks for a rematch after every result.
//!
//! - [`game`]: the bot's view of its match and its decision making
//! - [`network`]: UDP socket, heartbeat and action timers

pub mod game;
pub mod network;
