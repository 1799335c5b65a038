//! Server → client state update message
//!
//! A `StateUpdate` carries one entity's replicated components for one tick.
//! Updates addressed to the entity a client controls also carry the last input
//! sequence the server applied for that client (`sequence_ack`).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::types::{EntityId, Sequence, Tick, Vec2};

/// Known component kinds and their wire tags
///
/// Tags not listed here are skipped by the decoder so an older receiver keeps
/// working when a newer sender adds components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ComponentKind {
    /// Two little-endian `f32`: x, y
    Position = 1,
    /// Two little-endian `f32`: x, y
    Velocity = 2,
    /// One little-endian `f32`
    Health = 3,
}

impl ComponentKind {
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(ComponentKind::Position),
            2 => Some(ComponentKind::Velocity),
            3 => Some(ComponentKind::Health),
            _ => None,
        }
    }

    #[inline]
    pub fn tag(self) -> u16 {
        self as u16
    }
}

/// A single tagged component record
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub kind: ComponentKind,
    pub payload: Bytes,
}

impl Component {
    pub fn new(kind: ComponentKind, payload: Bytes) -> Self {
        Self { kind, payload }
    }

    pub fn position(position: Vec2) -> Self {
        Self::new(ComponentKind::Position, encode_vec2(position))
    }

    pub fn velocity(velocity: Vec2) -> Self {
        Self::new(ComponentKind::Velocity, encode_vec2(velocity))
    }

    pub fn health(health: f32) -> Self {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_f32_le(health);
        Self::new(ComponentKind::Health, buf.freeze())
    }

    /// Reads the payload as a vector (position/velocity layout)
    pub fn as_vec2(&self) -> Result<Vec2> {
        if self.payload.len() != 8 {
            return Err(ProtocolError::MalformedComponent {
                tag: self.kind.tag(),
                expected: 8,
                actual: self.payload.len(),
            });
        }
        let mut data = self.payload.clone();
        Ok(Vec2::new(data.get_f32_le(), data.get_f32_le()))
    }

    /// Reads the payload as a single scalar (health layout)
    pub fn as_f32(&self) -> Result<f32> {
        if self.payload.len() != 4 {
            return Err(ProtocolError::MalformedComponent {
                tag: self.kind.tag(),
                expected: 4,
                actual: self.payload.len(),
            });
        }
        let mut data = self.payload.clone();
        Ok(data.get_f32_le())
    }
}

fn encode_vec2(v: Vec2) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_f32_le(v.x);
    buf.put_f32_le(v.y);
    buf.freeze()
}

/// State delta for one entity at one server tick
///
/// `priority` orders transmission under bandwidth pressure (higher first).
/// It is a scheduling hint and never affects how the update is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    /// Server tick the state belongs to
    pub timestamp: Tick,

    pub entity_id: EntityId,

    /// Ordered component records
    pub components: Vec<Component>,

    pub priority: u8,

    /// Last applied input sequence; only meaningful on the local-player channel
    pub sequence_ack: Sequence,
}

impl StateUpdate {
    pub fn new(timestamp: Tick, entity_id: EntityId) -> Self {
        Self {
            timestamp,
            entity_id,
            components: Vec::new(),
            priority: 0,
            sequence_ack: 0,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_sequence_ack(mut self, sequence_ack: Sequence) -> Self {
        self.sequence_ack = sequence_ack;
        self
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// First component of the given kind, if any
    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.iter().find(|c| c.kind == kind)
    }

    pub fn position(&self) -> Option<Result<Vec2>> {
        self.component(ComponentKind::Position).map(Component::as_vec2)
    }

    pub fn velocity(&self) -> Option<Result<Vec2>> {
        self.component(ComponentKind::Velocity).map(Component::as_vec2)
    }

    pub fn health(&self) -> Option<Result<f32>> {
        self.component(ComponentKind::Health).map(Component::as_f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_accessors() {
        let update = StateUpdate::new(7, 42)
            .with_component(Component::position(Vec2::new(1.5, -2.0)))
            .with_component(Component::health(80.0));

        assert_eq!(update.position(), Some(Ok(Vec2::new(1.5, -2.0))));
        assert_eq!(update.health(), Some(Ok(80.0)));
        assert!(update.velocity().is_none());
    }

    #[test]
    fn test_malformed_vec2_payload() {
        let component = Component::new(ComponentKind::Velocity, Bytes::from_static(&[0, 0, 0]));
        assert!(matches!(
            component.as_vec2(),
            Err(ProtocolError::MalformedComponent { tag: 2, expected: 8, actual: 3 })
        ));
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(ComponentKind::from_tag(1), Some(ComponentKind::Position));
        assert_eq!(ComponentKind::from_tag(999), None);
    }
}
