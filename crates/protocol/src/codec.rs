//! Binary codec for `StateUpdate`
//!
//! Wire format (little-endian):
//! ```text
//! ┌─────────────────┬──────┬───────────┐
//! │ timestamp       │ u64  │  8 bytes  │
//! ├─────────────────┼──────┼───────────┤
//! │ entity_id       │ u64  │  8 bytes  │
//! ├─────────────────┼──────┼───────────┤
//! │ priority        │ u8   │  1 byte   │
//! ├─────────────────┼──────┼───────────┤
//! │ sequence_ack    │ u32  │  4 bytes  │
//! ├─────────────────┼──────┼───────────┤
//! │ component_count │ u16  │  2 bytes  │
//! ├─────────────────┼──────┼───────────┤
//! │ per component:  │      │           │
//! │   tag           │ u16  │  2 bytes  │
//! │   length        │ u16  │  2 bytes  │
//! │   payload       │ [u8] │  N bytes  │
//! └─────────────────┴──────┴───────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use tickshift_protocol::{Component, StateUpdate, Vec2, WireCodec};
//!
//! let update = StateUpdate::new(120, 7)
//!     .with_priority(3)
//!     .with_component(Component::position(Vec2::new(1.0, 2.0)));
//!
//! let bytes = WireCodec::encode(&update).unwrap();
//! let decoded = WireCodec::decode(bytes).unwrap();
//! assert_eq!(decoded, update);
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::update::{Component, ComponentKind, StateUpdate};

/// Size of the fixed header (timestamp, entity_id, priority, sequence_ack)
pub const UPDATE_HEADER_SIZE: usize = 8 + 8 + 1 + 4;

/// Header plus the component count
pub const UPDATE_MIN_SIZE: usize = UPDATE_HEADER_SIZE + 2;

/// Tag and length prefix of each component record
pub const COMPONENT_RECORD_HEADER_SIZE: usize = 4;

/// Encoder/decoder for the state update wire layout
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec;

impl WireCodec {
    /// Serializes an update
    ///
    /// Fails when the component count or a payload length does not fit in
    /// its `u16` field.
    pub fn encode(update: &StateUpdate) -> Result<Bytes> {
        let count = u16::try_from(update.components.len()).map_err(|_| {
            ProtocolError::PayloadTooLarge {
                field: "component count",
                len: update.components.len(),
                max: u16::MAX as usize,
            }
        })?;

        let body: usize = update
            .components
            .iter()
            .map(|c| COMPONENT_RECORD_HEADER_SIZE + c.payload.len())
            .sum();
        let mut buf = BytesMut::with_capacity(UPDATE_MIN_SIZE + body);

        buf.put_u64_le(update.timestamp);
        buf.put_u64_le(update.entity_id);
        buf.put_u8(update.priority);
        buf.put_u32_le(update.sequence_ack);
        buf.put_u16_le(count);

        for component in &update.components {
            let len = u16::try_from(component.payload.len()).map_err(|_| {
                ProtocolError::PayloadTooLarge {
                    field: "component payload",
                    len: component.payload.len(),
                    max: u16::MAX as usize,
                }
            })?;
            buf.put_u16_le(component.kind.tag());
            buf.put_u16_le(len);
            buf.put_slice(&component.payload);
        }

        Ok(buf.freeze())
    }

    /// Parses an update
    ///
    /// Either the whole message is returned or an error; truncated input,
    /// record lengths running past the buffer and trailing garbage are all
    /// rejected. Records with unknown tags are skipped.
    pub fn decode(mut data: Bytes) -> Result<StateUpdate> {
        if data.len() < UPDATE_MIN_SIZE {
            return Err(ProtocolError::BufferTooShort {
                need: UPDATE_MIN_SIZE,
                have: data.len(),
            });
        }

        let timestamp = data.get_u64_le();
        let entity_id = data.get_u64_le();
        let priority = data.get_u8();
        let sequence_ack = data.get_u32_le();
        let count = data.get_u16_le();

        let mut components = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if data.len() < COMPONENT_RECORD_HEADER_SIZE {
                return Err(ProtocolError::BufferTooShort {
                    need: COMPONENT_RECORD_HEADER_SIZE,
                    have: data.len(),
                });
            }
            let tag = data.get_u16_le();
            let len = data.get_u16_le() as usize;
            if data.len() < len {
                return Err(ProtocolError::ComponentLengthMismatch {
                    tag,
                    declared: len,
                    remaining: data.len(),
                });
            }
            let payload = data.copy_to_bytes(len);

            match ComponentKind::from_tag(tag) {
                Some(kind) => components.push(Component::new(kind, payload)),
                None => {
                    tracing::trace!(tag, len, "Skipping unknown component");
                }
            }
        }

        if data.has_remaining() {
            return Err(ProtocolError::TrailingBytes(data.remaining()));
        }

        Ok(StateUpdate {
            timestamp,
            entity_id,
            components,
            priority,
            sequence_ack,
        })
    }
}
