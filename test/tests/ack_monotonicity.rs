/// The change history keeps exactly the passes no acknowledgment has covered

use proptest::prelude::*;
use replica_shared::{FieldValue, Replica, ReplicationConfig, ReplicationFlags};
use replica_test::{protocol, test_protocol::PAWN, AgentLink};

#[derive(Clone, Debug)]
enum Event {
    Ack(usize),
    Nak(usize),
}

fn event_strategy(passes: usize) -> impl Strategy<Value = Event> {
    prop_oneof![
        (0..passes).prop_map(Event::Ack),
        (0..passes).prop_map(Event::Nak),
    ]
}

proptest! {
    #[test]
    fn retained_entries_end_after_every_ack(
        (passes, events) in (1usize..20).prop_flat_map(|passes| {
            (Just(passes), prop::collection::vec(event_strategy(passes), 0..40))
        })
    ) {
        let schema = protocol().class_schema(PAWN).unwrap();
        let mut live = Replica::new(schema.clone());
        let remote = Replica::new(schema);
        let mut link = AgentLink::new(&live, &remote, &ReplicationConfig::default());

        let mut packets = Vec::new();
        for pass in 0..passes {
            live.set_field("health", FieldValue::Int(pass as i32 + 1));
            let sent = link.send(&live, ReplicationFlags::new());
            prop_assert!(sent.wrote);
            packets.push(sent.packet);
        }

        let mut highest_ack: Option<u16> = None;
        let mut nakked = Vec::new();
        for event in events {
            match event {
                Event::Ack(index) => {
                    link.ack(packets[index]);
                    highest_ack = highest_ack.max(Some(packets[index]));
                }
                Event::Nak(index) => {
                    link.nak(packets[index]);
                    nakked.push(packets[index]);
                }
            }
        }

        let pending: Vec<u16> = link
            .sender
            .snapshot()
            .history()
            .pending_ranges()
            .map(|range| range.last)
            .collect();
        let expected: Vec<u16> = packets
            .iter()
            .copied()
            .filter(|packet| highest_ack.map_or(true, |acked| *packet > acked))
            .filter(|packet| !nakked.contains(packet))
            .collect();
        prop_assert_eq!(pending, expected);
    }
}

#[test]
fn ack_of_a_later_pass_covers_earlier_ones() {
    let schema = protocol().class_schema(PAWN).unwrap();
    let mut live = Replica::new(schema.clone());
    let remote = Replica::new(schema);
    let mut link = AgentLink::new(&live, &remote, &ReplicationConfig::default());

    let mut packets = Vec::new();
    for health in 1..=3 {
        live.set_field("health", FieldValue::Int(health));
        packets.push(link.send(&live, ReplicationFlags::new()).packet);
    }
    assert_eq!(link.sender.snapshot().history().len(), 3);

    link.ack(packets[1]);
    assert_eq!(link.sender.snapshot().history().len(), 1);
    link.ack(packets[0]);
    assert_eq!(link.sender.snapshot().history().len(), 1);
    link.ack(packets[2]);
    assert!(link.sender.snapshot().all_acked());
}
