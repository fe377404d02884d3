//! Property-based tests for message reconciliation and presence.
//!
//! Arbitrary interleavings of sends, deliveries, keystrokes, clock advances
//! and server faults must keep every invariant, and once the network is
//! drained every client must show exactly the server's history.

use std::time::Duration;

use huddle_client::ClientConfig;
use huddle_harness::{InvariantRegistry, SimServer, SimWorld};
use proptest::prelude::*;

const BODIES: [&str; 3] = ["ok", "hi", "ok"];

#[derive(Debug, Clone)]
enum Op {
    Send { client: usize, body: usize },
    Keystroke { client: usize },
    Deliver,
    Advance { millis: u64 },
    ToggleDuplicates,
    ToggleTokenEcho,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => (0..2usize, 0..BODIES.len()).prop_map(|(client, body)| Op::Send { client, body }),
        2 => (0..2usize).prop_map(|client| Op::Keystroke { client }),
        3 => Just(Op::Deliver),
        2 => (0..4000u64).prop_map(|millis| Op::Advance { millis }),
        1 => Just(Op::ToggleDuplicates),
        1 => Just(Op::ToggleTokenEcho),
    ]
}

proptest! {
    #[test]
    fn every_client_converges_on_server_history(
        seed in any::<u64>(),
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let mut world = SimWorld::new(seed, "acme", SimServer::default());
        let clients = [
            world.add_client("alice", "Alice", ClientConfig::default()),
            world.add_client("bob", "Bob", ClientConfig::default()),
        ];
        let general = world.room("general");
        for id in clients {
            world.open(id).unwrap();
            world.select(id, &general).unwrap();
        }
        let invariants = InvariantRegistry::standard();

        for op in ops {
            match &op {
                Op::Send { client, body } => world.send(clients[*client], &general.id, BODIES[*body]).unwrap(),
                Op::Keystroke { client } => world.keystroke(clients[*client], &general.id).unwrap(),
                Op::Deliver => {
                    world.deliver().unwrap();
                },
                Op::Advance { millis } => world.advance(Duration::from_millis(*millis)).unwrap(),
                Op::ToggleDuplicates => {
                    let config = world.network_mut().server_mut().config_mut();
                    config.duplicate_deliveries = !config.duplicate_deliveries;
                },
                Op::ToggleTokenEcho => {
                    let config = world.network_mut().server_mut().config_mut();
                    config.echo_client_tokens = !config.echo_client_tokens;
                },
            }

            let snapshot = world.snapshot();
            prop_assert!(invariants.check_all(&snapshot).is_ok(), "invariant violated after {:?}", op);
        }

        world.deliver().unwrap();

        let expected: Vec<_> = world.server().history("general").map(|m| m.id.clone()).collect();
        for id in clients {
            let client = world.client(id);
            prop_assert_eq!(client.store().unconfirmed_len(&general.id), 0);

            let shown: Vec<_> = client
                .sequence_for(&general.id)
                .map(|m| match &m.key {
                    huddle_client::MessageKey::Server(server_id) => server_id.clone(),
                    huddle_client::MessageKey::Local(token) => token.to_string(),
                })
                .collect();
            prop_assert_eq!(&shown, &expected);
        }
    }
}
