//! Client → server messages
//!
//! Every client datagram starts with a one-byte kind:
//! - `1` INPUT: one movement input command
//! - `2` HIT_CLAIM: a claim that a shot hit a target at a given position
//!
//! Layouts (little-endian, after the kind byte):
//! ```text
//! INPUT:     [sequence u32][dx f32][dy f32][delta_time f32][timestamp_local_us u64]
//! HIT_CLAIM: [target_id u64][x f32][y f32][view_timestamp u64][hit_radius f32]
//! ```

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::types::{EntityId, Sequence, Vec2};

/// Message kind bytes
pub mod kinds {
    /// Movement input (client → server)
    pub const INPUT: u8 = 1;

    /// Lag-compensated hit claim (client → server)
    pub const HIT_CLAIM: u8 = 2;
}

const INPUT_BODY_SIZE: usize = 4 + 4 + 4 + 4 + 8;
const HIT_CLAIM_BODY_SIZE: usize = 8 + 4 + 4 + 8 + 4;

/// One locally applied movement input
///
/// Owned by the client until sent; the server treats a received command as an
/// immutable record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputCommand {
    pub sequence: Sequence,
    pub dx: f32,
    pub dy: f32,

    /// Step length the client integrated this input with
    pub delta_time: f32,

    /// Time since session start when the input was sampled
    pub timestamp_local: Duration,
}

impl InputCommand {
    pub fn new(sequence: Sequence, dx: f32, dy: f32, delta_time: f32, timestamp_local: Duration) -> Self {
        Self {
            sequence,
            dx,
            dy,
            delta_time,
            timestamp_local,
        }
    }

    /// Direction of the input as a vector
    #[inline]
    pub fn direction(&self) -> Vec2 {
        Vec2::new(self.dx, self.dy)
    }
}

/// A client's claim that it hit `target_id`
///
/// `view_timestamp` is the server time (ms) the shooter was rendering when it
/// fired; the server turns it into the shooter's latency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitClaim {
    pub target_id: EntityId,
    pub claimed_position: Vec2,
    pub view_timestamp: u64,
    pub hit_radius: f32,
}

/// Any message a client sends to the server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Input(InputCommand),
    HitClaim(HitClaim),
}

impl ClientMessage {
    pub fn kind(&self) -> u8 {
        match self {
            ClientMessage::Input(_) => kinds::INPUT,
            ClientMessage::HitClaim(_) => kinds::HIT_CLAIM,
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            ClientMessage::Input(cmd) => {
                let mut buf = BytesMut::with_capacity(1 + INPUT_BODY_SIZE);
                buf.put_u8(kinds::INPUT);
                buf.put_u32_le(cmd.sequence);
                buf.put_f32_le(cmd.dx);
                buf.put_f32_le(cmd.dy);
                buf.put_f32_le(cmd.delta_time);
                buf.put_u64_le(u64::try_from(cmd.timestamp_local.as_micros()).unwrap_or(u64::MAX));
                buf.freeze()
            }
            ClientMessage::HitClaim(claim) => {
                let mut buf = BytesMut::with_capacity(1 + HIT_CLAIM_BODY_SIZE);
                buf.put_u8(kinds::HIT_CLAIM);
                buf.put_u64_le(claim.target_id);
                buf.put_f32_le(claim.claimed_position.x);
                buf.put_f32_le(claim.claimed_position.y);
                buf.put_u64_le(claim.view_timestamp);
                buf.put_f32_le(claim.hit_radius);
                buf.freeze()
            }
        }
    }

    pub fn decode(mut data: Bytes) -> Result<Self> {
        if data.is_empty() {
            return Err(ProtocolError::BufferTooShort { need: 1, have: 0 });
        }

        let kind = data.get_u8();
        let body_size = match kind {
            kinds::INPUT => INPUT_BODY_SIZE,
            kinds::HIT_CLAIM => HIT_CLAIM_BODY_SIZE,
            other => return Err(ProtocolError::UnknownMessageKind(other)),
        };

        if data.len() < body_size {
            return Err(ProtocolError::BufferTooShort {
                need: body_size,
                have: data.len(),
            });
        }
        if data.len() > body_size {
            return Err(ProtocolError::TrailingBytes(data.len() - body_size));
        }

        let message = if kind == kinds::INPUT {
            ClientMessage::Input(InputCommand {
                sequence: data.get_u32_le(),
                dx: data.get_f32_le(),
                dy: data.get_f32_le(),
                delta_time: data.get_f32_le(),
                timestamp_local: Duration::from_micros(data.get_u64_le()),
            })
        } else {
            ClientMessage::HitClaim(HitClaim {
                target_id: data.get_u64_le(),
                claimed_position: Vec2::new(data.get_f32_le(), data.get_f32_le()),
                view_timestamp: data.get_u64_le(),
                hit_radius: data.get_f32_le(),
            })
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_roundtrip() {
        let msg = ClientMessage::Input(InputCommand::new(
            17,
            1.0,
            -0.5,
            0.05,
            Duration::from_micros(1_250_000),
        ));
        let bytes = msg.encode();

        assert_eq!(bytes.len(), 1 + INPUT_BODY_SIZE);
        assert_eq!(ClientMessage::decode(bytes).unwrap(), msg);
    }

    #[test]
    fn test_hit_claim_roundtrip() {
        let msg = ClientMessage::HitClaim(HitClaim {
            target_id: 3,
            claimed_position: Vec2::new(10.0, 4.0),
            view_timestamp: 9_900,
            hit_radius: 0.5,
        });
        assert_eq!(ClientMessage::decode(msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_unknown_kind() {
        let result = ClientMessage::decode(Bytes::from_static(&[42, 0, 0]));
        assert_eq!(result, Err(ProtocolError::UnknownMessageKind(42)));
    }

    #[test]
    fn test_truncated_input() {
        let bytes = ClientMessage::Input(InputCommand::new(1, 0.0, 0.0, 0.05, Duration::ZERO)).encode();
        for len in 0..bytes.len() {
            assert!(ClientMessage::decode(bytes.slice(..len)).is_err());
        }
    }

    #[test]
    fn test_trailing_bytes() {
        let mut raw = BytesMut::from(
            &ClientMessage::Input(InputCommand::new(1, 0.0, 0.0, 0.05, Duration::ZERO)).encode()[..],
        );
        raw.put_u8(0);
        assert_eq!(
            ClientMessage::decode(raw.freeze()),
            Err(ProtocolError::TrailingBytes(1))
        );
    }
}
