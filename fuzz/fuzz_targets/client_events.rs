//! Fuzz target for the client dispatcher
//!
//! Drives two simulated clients through arbitrary interleavings of user
//! writes, server deliveries, clock advances, transport faults and hostile
//! frames.
//!
//! # Invariants
//!
//! - No server id is shown twice in a room
//! - Confirmed messages precede unconfirmed ones
//! - The local user never appears as a typist
//! - Local tokens are unique within a room
//!
//! Client errors are expected for writes made in the wrong state and are
//! ignored; panics and invariant violations are not.

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use huddle_client::{ClientConfig, ClientEvent, RetryPolicy};
use huddle_harness::{SimServer, SimWorld};
use huddle_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::presence::{UserStoppedTyping, UserTyping},
};
use libfuzzer_sys::fuzz_target;

const ROOMS: [&str; 2] = ["general", "random"];
const BODIES: [&str; 3] = ["ok", "hi", "ok"];
const TYPISTS: [(&str, &str); 3] = [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")];

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    seed: u64,
    reconnect: bool,
    ops: Vec<Op>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Open { client: bool },
    Close { client: bool },
    Select { client: bool, room: u8 },
    Send { client: bool, room: u8, body: u8 },
    Keystroke { client: bool, room: u8 },
    Deliver,
    Advance { millis: u16 },
    Sever { client: bool },
    RemoteTyping { client: bool, typist: u8, room: u8, stop: bool },
    Garbage { client: bool, opcode: u16, body: Vec<u8> },
    ToggleDuplicates,
    ToggleTokenEcho,
}

fn pick<T>(items: &[T], index: u8) -> &T {
    &items[usize::from(index) % items.len()]
}

fn typing_frame(typist: (&str, &str), room: &str, stop: bool) -> Frame {
    let payload = if stop {
        Payload::UserStoppedTyping(UserStoppedTyping {
            user_id: typist.0.into(),
            group_id: room.into(),
        })
    } else {
        Payload::UserTyping(UserTyping {
            user_id: typist.0.into(),
            group_id: room.into(),
            username: typist.1.into(),
        })
    };
    payload.into_frame().expect("typing payload encodes")
}

/// A well-formed header carrying an arbitrary opcode and body.
fn garbage_frame(opcode: u16, body: Vec<u8>) -> Option<Frame> {
    let mut bytes = Vec::new();
    Frame::new(FrameHeader::new(Opcode::ReceiveMessage), body).encode(&mut bytes).ok()?;
    bytes[6..8].copy_from_slice(&opcode.to_be_bytes());
    Frame::decode(&bytes).ok()
}

fuzz_target!(|scenario: Scenario| {
    let mut world = SimWorld::new(scenario.seed, "acme", SimServer::default());
    let config = ClientConfig {
        reconnect: if scenario.reconnect { RetryPolicy::backoff(3) } else { RetryPolicy::Never },
        ..ClientConfig::default()
    };
    let clients = [
        world.add_client("alice", "Alice", config.clone()),
        world.add_client("bob", "Bob", config),
    ];
    let rooms: Vec<_> = ROOMS.iter().map(|name| world.room(name)).collect();
    let id = |client: bool| clients[usize::from(client)];

    for op in scenario.ops.into_iter().take(256) {
        let _ = match op {
            Op::Open { client } => world.open(id(client)),
            Op::Close { client } => world.handle(id(client), ClientEvent::Close).map(drop),
            Op::Select { client, room } => world.select(id(client), pick(&rooms, room)),
            Op::Send { client, room, body } => {
                world.send(id(client), &pick(&rooms, room).id, pick(&BODIES, body))
            },
            Op::Keystroke { client, room } => world.keystroke(id(client), &pick(&rooms, room).id),
            Op::Deliver => world.deliver().map(drop),
            Op::Advance { millis } => world.advance(Duration::from_millis(u64::from(millis))),
            Op::Sever { client } => world.sever(id(client)),
            Op::RemoteTyping { client, typist, room, stop } => {
                let frame = typing_frame(*pick(&TYPISTS, typist), pick(&ROOMS, room), stop);
                world.inject(id(client), frame).map(drop)
            },
            Op::Garbage { client, opcode, body } => match garbage_frame(opcode, body) {
                Some(frame) => world.inject(id(client), frame).map(drop),
                None => Ok(()),
            },
            Op::ToggleDuplicates => {
                let config = world.network_mut().server_mut().config_mut();
                config.duplicate_deliveries = !config.duplicate_deliveries;
                Ok(())
            },
            Op::ToggleTokenEcho => {
                let config = world.network_mut().server_mut().config_mut();
                config.echo_client_tokens = !config.echo_client_tokens;
                Ok(())
            },
        };

        world.check_invariants("during fuzzed scenario");
    }
});
