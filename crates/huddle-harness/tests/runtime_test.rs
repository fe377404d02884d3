//! The production `Runtime` driven through `SimDriver`.

use std::time::Duration;

use huddle_app::{Intent, Runtime, ViewUpdate};
use huddle_client::{
    Client, ClientConfig, ConnectionState, Identity, MessageState, RetryPolicy, Room, RoomId,
    UserId, WorkspaceId,
};
use huddle_harness::{SharedNetwork, SimDriver, SimEnv, SimNetwork};

fn workspace() -> WorkspaceId {
    WorkspaceId::new("acme").unwrap()
}

fn general() -> Room {
    Room::new(RoomId::new("general").unwrap(), workspace(), "General", UserId::new("alice").unwrap())
}

fn runtime(config: ClientConfig) -> (Runtime<SimDriver, SimEnv>, SharedNetwork, SimEnv) {
    let env = SimEnv::with_seed(11);
    let network = SimNetwork::default().shared();
    let identity = Identity::new(UserId::new("alice").unwrap(), "Alice");
    let client = Client::new(env.clone(), identity, workspace(), config);
    let driver = SimDriver::new(network.clone(), env.clone());
    (Runtime::new(driver, client), network, env)
}

#[tokio::test]
async fn handshake_then_send_and_reconcile() {
    let (mut runtime, network, _env) = runtime(ClientConfig::default());

    runtime.start().await.unwrap();
    runtime.step().await.unwrap();
    assert_eq!(runtime.client().connection_state(), Some(ConnectionState::Open));

    runtime.driver_mut().push_intent(Intent::SelectRoom(general()));
    runtime.step().await.unwrap();
    runtime.driver_mut().take_renders();

    runtime
        .driver_mut()
        .push_intent(Intent::Submit { room_id: general().id, body: "hello".into() });
    runtime.step().await.unwrap();

    let states: Vec<_> = runtime.client().sequence_for(&general().id).map(|m| m.state).collect();
    assert_eq!(states, [MessageState::Confirmed]);
    assert_eq!(network.lock().unwrap().server().history("general").count(), 1);

    let renders = runtime.driver_mut().take_renders();
    assert!(renders.contains(&ViewUpdate::Messages(general().id)));
}

#[tokio::test]
async fn refused_connect_retried_after_backoff() {
    let config = ClientConfig { reconnect: RetryPolicy::backoff(3), ..ClientConfig::default() };
    let (mut runtime, network, env) = runtime(config);
    network.lock().unwrap().refuse_next(1);

    runtime.start().await.unwrap();
    assert_eq!(runtime.client().connection_state(), Some(ConnectionState::Errored));
    assert_eq!(runtime.driver_mut().take_renders(), [
        ViewUpdate::Connection(ConnectionState::Connecting),
        ViewUpdate::Connection(ConnectionState::Errored),
    ]);

    env.advance(Duration::from_millis(500));
    runtime.step().await.unwrap();
    runtime.step().await.unwrap();

    assert_eq!(runtime.client().connection_state(), Some(ConnectionState::Open));
}

#[tokio::test]
async fn dropped_transport_reported_to_client() {
    let (mut runtime, network, _env) = runtime(ClientConfig::default());
    runtime.start().await.unwrap();
    runtime.step().await.unwrap();

    let session = runtime.driver().session().unwrap();
    network.lock().unwrap().disconnect(session);
    runtime.step().await.unwrap();

    assert_eq!(runtime.client().connection_state(), Some(ConnectionState::Closed));
}

#[tokio::test]
async fn quit_closes_workspace() {
    let (mut runtime, network, _env) = runtime(ClientConfig::default());
    runtime.driver_mut().push_intent(Intent::Quit);

    runtime.run().await.unwrap();

    assert!(!network.lock().unwrap().server().is_connected(1));
}
