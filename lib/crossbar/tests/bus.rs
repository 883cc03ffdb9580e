//! End-to-end tests: a registry and several participants on localhost TCP,
//! exchanging typed messages over virtual links.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbar::config::Config;
use crossbar::connection::Connection;
use crossbar::error::Error;
use crossbar::messages::can::CanFrameEvent;
use crossbar::messages::sync::{ParticipantCommand, ParticipantCommandKind, ParticipantState, ParticipantStatus};
use crossbar::messages::{MsgType, SimMsg, DEFAULT_NETWORK};
use crossbar::protocol::ProtocolVersion;
use crossbar::registry::Registry;
use crossbar::service::{Service, ServiceDescriptor, ServiceType};
use plinth::logging;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const SILENCE: Duration = Duration::from_millis(300);

fn test_config() -> Config {
    let mut config = Config::default();
    // Tests run on plain localhost TCP; local IPC would leak socket files
    // between concurrently running test binaries.
    config.middleware.enable_domain_sockets = false;
    config
}

fn descriptor(connection: &Connection, network: &str) -> ServiceDescriptor {
    let mut desc = ServiceDescriptor::new(connection.participant_name());
    desc.set_service_type(ServiceType::Controller);
    desc.set_network_name(network);
    desc.set_service_id(connection.next_endpoint_id());
    desc
}

/// A service that forwards every delivered message into an mpsc channel.
struct Collector {
    descriptor: ServiceDescriptor,
    recv_types: Vec<MsgType>,
    tx: Mutex<mpsc::Sender<(ServiceDescriptor, SimMsg)>>,
}

impl Collector {
    fn create(
        connection: &Connection,
        network: &str,
        recv_types: Vec<MsgType>,
    ) -> (Arc<Collector>, mpsc::Receiver<(ServiceDescriptor, SimMsg)>) {
        let (tx, rx) = mpsc::channel();
        let collector = Arc::new(Collector {
            descriptor: descriptor(connection, network),
            recv_types,
            tx: Mutex::new(tx),
        });
        (collector, rx)
    }
}

impl Service for Collector {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    fn receive_types(&self) -> &[MsgType] {
        &self.recv_types
    }

    fn send_types(&self) -> &[MsgType] {
        &[]
    }

    fn receive(&self, from: &ServiceDescriptor, msg: &SimMsg) {
        let _ = self.tx.lock().unwrap().send((from.clone(), msg.clone()));
    }
}

/// A send-only service; registering it creates the sender-side link.
struct Producer {
    descriptor: ServiceDescriptor,
    send_types: Vec<MsgType>,
}

impl Producer {
    fn create(connection: &Connection, network: &str, send_types: Vec<MsgType>) -> Arc<Producer> {
        Arc::new(Producer {
            descriptor: descriptor(connection, network),
            send_types,
        })
    }
}

impl Service for Producer {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    fn receive_types(&self) -> &[MsgType] {
        &[]
    }

    fn send_types(&self) -> &[MsgType] {
        &self.send_types
    }

    fn receive(&self, _from: &ServiceDescriptor, _msg: &SimMsg) {
        panic!("a producer never receives messages");
    }
}

fn start_registry(domain: u32) -> Registry {
    let mut registry = Registry::new(test_config(), &logging::discard()).unwrap();
    registry.provide_domain(domain).unwrap();
    registry
}

fn join(name: &str, domain: u32) -> Connection {
    let mut connection = Connection::new(test_config(), name, &logging::discard()).unwrap();
    connection.join_domain(domain).unwrap();
    connection
}

#[test]
fn test_typed_message_exchange() {
    let domain = 60;
    let _registry = start_registry(domain);

    let node_a = join("NodeA", domain);
    let (collector, rx) = Collector::create(&node_a, "CAN1", vec![MsgType::CanFrameEvent]);
    node_a.register_service(collector).unwrap();

    let node_b = join("NodeB", domain);
    let producer = Producer::create(&node_b, "CAN1", vec![MsgType::CanFrameEvent]);
    node_b.register_service(producer.clone()).unwrap();

    let frame = CanFrameEvent {
        transmit_id: 1,
        timestamp: 0,
        can_id: 5,
        flags: 0,
        dlc: 7,
        data: vec![1, 2, 3, 4, 5, 6, 1],
    };
    node_b.send_msg(producer.descriptor(), frame.clone());

    let (from, msg) = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(msg, SimMsg::CanFrameEvent(frame));
    assert_eq!(from.participant_name(), "NodeB");
    assert_eq!(from.network_name(), "CAN1");

    // Exactly one delivery for one send.
    assert!(rx.recv_timeout(SILENCE).is_err());
}

#[test]
fn test_targeted_send_reaches_only_the_target() {
    let domain = 61;
    let _registry = start_registry(domain);

    let receivers: Vec<_> = ["Node1", "Node2", "Node3"]
        .iter()
        .map(|name| {
            let node = join(name, domain);
            let (collector, rx) = Collector::create(&node, "ctl", vec![MsgType::ParticipantCommand]);
            node.register_service(collector).unwrap();
            (node, rx)
        })
        .collect();

    let sender = join("Commander", domain);
    let producer = Producer::create(&sender, "ctl", vec![MsgType::ParticipantCommand]);
    sender.register_service(producer.clone()).unwrap();

    let command = ParticipantCommand {
        participant: 0,
        kind: ParticipantCommandKind::Run,
    };
    sender.send_msg_to(producer.descriptor(), "Node2", command).unwrap();

    let (_, msg) = receivers[1].1.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(msg, SimMsg::ParticipantCommand(command));

    assert!(receivers[0].1.recv_timeout(SILENCE).is_err());
    assert!(receivers[2].1.recv_timeout(SILENCE).is_err());

    // A target that is not subscribed on the link is an error.
    let err = sender.send_msg_to(producer.descriptor(), "Ghost", command).unwrap_err();
    assert_eq!(err, Error::UnknownTarget("Ghost".to_string()));
}

#[test]
fn test_history_replayed_to_late_joiner() {
    let domain = 62;
    let _registry = start_registry(domain);

    let node_a = join("Publisher", domain);
    let producer = Producer::create(&node_a, DEFAULT_NETWORK, vec![MsgType::ParticipantStatus]);
    node_a.register_service(producer.clone()).unwrap();
    node_a.set_history_length(DEFAULT_NETWORK, 1, &[MsgType::ParticipantStatus]);

    let status = ParticipantStatus {
        participant_name: "Publisher".to_string(),
        state: ParticipantState::Running,
        enter_reason: "simulation started".to_string(),
        enter_time: std::time::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        refresh_time: std::time::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
    };
    node_a.send_msg(producer.descriptor(), status.clone());

    // The subscriber attaches after the publish and must still observe the
    // last known value, exactly once.
    let node_b = join("LateJoiner", domain);
    let (collector, rx) = Collector::create(&node_b, DEFAULT_NETWORK, vec![MsgType::ParticipantStatus]);
    node_b.register_service(collector).unwrap();

    let (_, msg) = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(msg, SimMsg::ParticipantStatus(status));

    assert!(rx.recv_timeout(SILENCE).is_err());
}

#[test]
fn test_connection_loss_synthesizes_error_status() {
    let domain = 63;
    let _registry = start_registry(domain);

    let node_a = join("Watcher", domain);
    let (collector, rx) = Collector::create(&node_a, DEFAULT_NETWORK, vec![MsgType::ParticipantStatus]);
    node_a.register_service(collector).unwrap();

    let node_b = join("Doomed", domain);

    // Kill the connection by dropping the participant outright.
    drop(node_b);

    let (_, msg) = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    match msg {
        SimMsg::ParticipantStatus(status) => {
            assert_eq!(status.participant_name, "Doomed");
            assert_eq!(status.state, ParticipantState::Error);
            assert_eq!(status.enter_reason, "Connection Lost");
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_unsupported_version_is_rejected() {
    let domain = 64;
    let _registry = start_registry(domain);

    let mut ancient =
        Connection::with_version(test_config(), "Ancient", ProtocolVersion::new(1, 0), &logging::discard()).unwrap();

    let err = ancient.join_domain(domain).unwrap_err();
    assert!(matches!(err, Error::Protocol(_)), "{:?}", err);
}

#[test]
fn test_duplicate_participant_name_is_rejected() {
    let domain = 65;
    let _registry = start_registry(domain);

    let _first = join("Twin", domain);

    let mut second = Connection::new(test_config(), "Twin", &logging::discard()).unwrap();
    let err = second.join_domain(domain).unwrap_err();
    assert!(matches!(err, Error::Protocol(_)), "{:?}", err);
}

#[test]
fn test_registry_listen_uri_override() {
    // The registry binds the explicit URI; participants reach it through
    // their configured registry port on domain 0.
    let mut registry = Registry::new(test_config(), &logging::discard()).unwrap();
    registry.provide_domain_uri("tcp://127.0.0.1:8567").unwrap();

    let mut config = test_config();
    config.middleware.registry.port = 8567;

    let mut node = Connection::new(config, "NodeA", &logging::discard()).unwrap();
    node.join_domain(0).unwrap();

    assert_eq!(registry.participant_count(), 1);
}

#[test]
fn test_registry_tracks_membership() {
    let domain = 66;
    let registry = start_registry(domain);

    let node_a = join("NodeA", domain);
    let node_b = join("NodeB", domain);

    // Both announcements have been processed once both joins returned.
    assert_eq!(registry.participant_count(), 2);

    drop(node_a);
    drop(node_b);

    assert!(registry.wait_all_disconnected(RECV_TIMEOUT));
    assert_eq!(registry.participant_count(), 0);
}
