//! # Arena Server Library
//!
//! Authoritative server for a two-player real-time arena battler. Clients send
//! intents (deploy a unit, fire a super ability, emote, ask for a rematch) and
//! the server owns every consequence: elixir accounting, movement, combat,
//! scripted events and trophy settlement.
//!
//! ## Architecture
//!
//! A single [`world::World`] is the only writer of game state. The network
//! layer ([`network::Server`]) feeds it decoded packets and timer events from
//! one `tokio::select!` loop, then drains the world's outbox into a sender task.
//! Profile writes are handed to blocking tasks and never stall the loop.
//!
//! ## Modules
//!
//! - [`session`]: connections, player identity binding, heartbeats and rate limits
//! - [`matchmaking`]: trophy-ordered queue with AI fallback
//! - [`game`]: the match record (towers, units, modifiers, rematch votes)
//! - [`commands`]: validation and effects of client intents
//! - [`combat`]: targeting, movement and the per-tick damage ledger
//! - [`events`]: timed rule changes and arena shifts
//! - [`simulation`]: the fixed-step tick and match settlement
//! - [`ai`]: computer opponent
//! - [`persistence`]: sharded profile storage
//!
//! Timing is driven by [`config::ServerConfig`]; the default tick is 50ms.

pub mod ai;
pub mod combat;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod matchmaking;
pub mod network;
pub mod persistence;
pub mod session;
pub mod simulation;
pub mod world;
