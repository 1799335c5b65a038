//! Wire-level robustness: anything a peer sends must decode or fail cleanly

use bytes::{BufMut, Bytes, BytesMut};
use proptest::prelude::*;
use tickshift::protocol::{
    ClientMessage, Component, ComponentKind, ProtocolError, StateUpdate, Vec2, WireCodec,
    UPDATE_MIN_SIZE,
};

fn sample_update() -> StateUpdate {
    StateUpdate::new(1_234, 42)
        .with_priority(7)
        .with_sequence_ack(99)
        .with_component(Component::position(Vec2::new(1.5, -2.0)))
        .with_component(Component::velocity(Vec2::new(0.0, 3.0)))
        .with_component(Component::health(75.0))
}

#[test]
fn test_update_from_newer_sender_still_decodes() {
    let encoded = WireCodec::encode(&sample_update()).unwrap();

    // Append a record of a component kind this build does not know
    let mut extended = BytesMut::from(&encoded[..]);
    let count_offset = UPDATE_MIN_SIZE - 2;
    extended[count_offset] += 1;
    extended.put_u16_le(0x7F00);
    extended.put_u16_le(3);
    extended.put_slice(&[9, 9, 9]);

    let decoded = WireCodec::decode(extended.freeze()).unwrap();
    assert_eq!(decoded.components.len(), 3);
    assert_eq!(decoded.position(), Some(Ok(Vec2::new(1.5, -2.0))));
    assert_eq!(decoded.health(), Some(Ok(75.0)));
}

#[test]
fn test_header_only_update() {
    let encoded = WireCodec::encode(&StateUpdate::new(0, 1)).unwrap();
    assert_eq!(encoded.len(), UPDATE_MIN_SIZE);

    let decoded = WireCodec::decode(encoded).unwrap();
    assert!(decoded.components.is_empty());
    assert!(decoded.component(ComponentKind::Position).is_none());
}

#[test]
fn test_trailing_garbage_rejected() {
    let mut bytes = BytesMut::from(&WireCodec::encode(&sample_update()).unwrap()[..]);
    bytes.put_u8(0);
    assert_eq!(
        WireCodec::decode(bytes.freeze()),
        Err(ProtocolError::TrailingBytes(1))
    );
}

#[test]
fn test_every_truncation_of_client_message_fails() {
    let encoded = ClientMessage::Input(tickshift::protocol::InputCommand::new(
        5,
        1.0,
        0.0,
        0.016,
        std::time::Duration::from_millis(80),
    ))
    .encode();

    for len in 0..encoded.len() {
        assert!(ClientMessage::decode(encoded.slice(..len)).is_err(), "prefix {}", len);
    }
    assert!(ClientMessage::decode(encoded).is_ok());
}

fn component_strategy() -> impl Strategy<Value = Component> {
    let coord = -1.0e6f32..1.0e6;
    prop_oneof![
        (coord.clone(), coord.clone()).prop_map(|(x, y)| Component::position(Vec2::new(x, y))),
        (coord.clone(), coord).prop_map(|(x, y)| Component::velocity(Vec2::new(x, y))),
        (0.0f32..1_000.0).prop_map(Component::health),
    ]
}

fn update_strategy() -> impl Strategy<Value = StateUpdate> {
    (
        any::<u64>(),
        any::<u64>(),
        any::<u8>(),
        any::<u32>(),
        proptest::collection::vec(component_strategy(), 0..8),
    )
        .prop_map(|(timestamp, entity_id, priority, ack, components)| {
            components.into_iter().fold(
                StateUpdate::new(timestamp, entity_id)
                    .with_priority(priority)
                    .with_sequence_ack(ack),
                StateUpdate::with_component,
            )
        })
}

proptest! {
    #[test]
    fn prop_arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..128)) {
        let bytes = Bytes::from(data);
        let _ = WireCodec::decode(bytes.clone());
        let _ = ClientMessage::decode(bytes);
    }

    #[test]
    fn prop_truncated_update_rejected(cut in 0usize..59) {
        let encoded = WireCodec::encode(&sample_update()).unwrap();
        prop_assume!(cut < encoded.len());
        prop_assert!(WireCodec::decode(encoded.slice(..cut)).is_err());
    }

    #[test]
    fn prop_any_update_survives_the_wire(update in update_strategy()) {
        let encoded = WireCodec::encode(&update).unwrap();
        let body: usize = update.components.iter().map(|c| 4 + c.payload.len()).sum();
        prop_assert_eq!(encoded.len(), UPDATE_MIN_SIZE + body);
        prop_assert_eq!(WireCodec::decode(encoded).unwrap(), update);
    }
}
