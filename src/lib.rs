//! # Tickshift
//!
//! State synchronization core for authoritative multiplayer games:
//! - Client-side prediction with rollback and replay on server acks
//! - Snapshot interpolation of remote entities at a delayed render time
//! - Server-side lag compensation by rewinding world history
//! - Compact little-endian wire encoding of entity state updates
//!
//! ## Components
//!
//! - `tickshift-protocol`: wire formats, send queue and the `Transport` trait
//! - `tickshift-simulation`: predictor, snapshot buffer, world history and
//!   lag compensator
//! - `tickshift-server`: authoritative tick loop and hit validation
//! - `tickshift-client`: per-frame client loop and in-memory transport

pub use tickshift_client as client;
pub use tickshift_protocol as protocol;
pub use tickshift_server as server;
pub use tickshift_simulation as simulation;
