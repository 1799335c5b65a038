//! # Tickshift Protocol
//!
//! Wire formats shared by the tickshift client and server.
//!
//! This crate provides:
//! - `StateUpdate` / `WireCodec`: server → client entity state in a compact
//!   little-endian layout with forward-compatible component records
//! - `ClientMessage`: client → server input commands and hit claims
//! - `SendQueue`: priority-ordered outbound scheduling under a byte budget
//! - `Transport`: hands datagrams to and from the network
//! - `ProtocolError`: decode/encode failures
//!
//! ## Example
//!
//! ```
//! use tickshift_protocol::{Component, StateUpdate, Vec2, WireCodec};
//!
//! let update = StateUpdate::new(40, 3)
//!     .with_sequence_ack(12)
//!     .with_component(Component::position(Vec2::new(4.0, 1.0)))
//!     .with_component(Component::velocity(Vec2::new(5.0, 0.0)));
//!
//! let bytes = WireCodec::encode(&update).unwrap();
//! let received = WireCodec::decode(bytes).unwrap();
//! assert_eq!(received.sequence_ack, 12);
//! assert_eq!(received.position(), Some(Ok(Vec2::new(4.0, 1.0))));
//! ```

pub mod codec;
pub mod error;
pub mod messages;
pub mod send_queue;
pub mod transport;
pub mod types;
pub mod update;

pub use codec::{WireCodec, UPDATE_HEADER_SIZE, UPDATE_MIN_SIZE};
pub use error::{ProtocolError, Result};
pub use messages::{ClientMessage, HitClaim, InputCommand};
pub use send_queue::SendQueue;
pub use transport::{Datagram, Transport};
pub use types::{ConnectionId, EntityId, Sequence, Tick, Vec2};
pub use update::{Component, ComponentKind, StateUpdate};
