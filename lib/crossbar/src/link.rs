use std::sync::Arc;

use plinth::logging::{self, trace};

use crate::error::{Error, Result};
use crate::messages::{MsgType, SimMsg};
use crate::peer::PeerId;
use crate::service::{EndpointAddress, Service, ServiceDescriptor};
use crate::wire::envelope::SerializedMessage;

/// A remote subscriber: which peer to send to, and the receiver index the
/// message must carry so the remote process can route it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteReceiver {
    pub peer: PeerId,
    pub remote_idx: u16,
    pub participant_name: String,
}

/// Per-(message-type, network-name) routing object: fans every message out
/// to the local receivers and the remote subscribers of that network.
///
/// Links never send on their own; outbound frames are handed to the caller
/// through a sink closure so the link stays independent of the socket layer.
pub struct Link {
    msg_type: MsgType,
    network_name: String,
    local_receivers: Vec<Arc<dyn Service>>,
    remote_receivers: Vec<RemoteReceiver>,
    history_length: usize,
    history: Option<(EndpointAddress, SimMsg)>,
    log: logging::Logger,
}

impl Link {
    pub fn new(msg_type: MsgType, network_name: &str, log: &logging::Logger) -> Link {
        Link {
            msg_type,
            network_name: network_name.to_string(),
            local_receivers: Vec::new(),
            remote_receivers: Vec::new(),
            history_length: 0,
            history: None,
            log: log.new(logging::o!(
                "link" => format!("{}/{}", network_name, msg_type.type_name()),
            )),
        }
    }

    #[inline]
    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    #[inline]
    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn add_local_receiver(&mut self, receiver: Arc<dyn Service>) {
        self.local_receivers.push(receiver);
    }

    /// Registers a remote subscriber, de-duplicating on `(peer, remote_idx)`.
    /// When the link holds a history value and the receiver is new, the
    /// stored message is replayed to it exactly once via the returned frame.
    pub fn add_remote_receiver(
        &mut self,
        peer: PeerId,
        remote_idx: u16,
        participant_name: &str,
    ) -> Option<SerializedMessage> {
        let receiver = RemoteReceiver {
            peer,
            remote_idx,
            participant_name: participant_name.to_string(),
        };

        if self.remote_receivers.contains(&receiver) {
            return None;
        }

        trace!(self.log, "remote receiver added";
               "participant" => participant_name,
               "remote_idx" => remote_idx);

        self.remote_receivers.push(receiver);

        self.history.as_ref().map(|(from, msg)| {
            SerializedMessage::simulation(self.msg_type.wire_kind(), msg, *from, remote_idx)
        })
    }

    /// Drops every remote receiver bound to the given peer. Called when the
    /// peer shuts down so a reused peer slot cannot inherit stale routes.
    pub fn remove_peer(&mut self, peer: PeerId) {
        self.remote_receivers.retain(|receiver| receiver.peer != peer);
    }

    #[inline]
    pub fn local_receiver_count(&self) -> usize {
        self.local_receivers.len()
    }

    #[inline]
    pub fn remote_receivers(&self) -> &[RemoteReceiver] {
        &self.remote_receivers
    }

    /// Enables or disables the one-slot history. A no-op for message types
    /// that do not declare history capacity.
    pub fn set_history_length(&mut self, length: usize) {
        if self.msg_type.hist_size() == 0 {
            return;
        }

        self.history_length = length.min(self.msg_type.hist_size());
        if self.history_length == 0 {
            self.history = None;
        }
    }

    /// Outbound fan-out: invokes every local receiver synchronously, stores
    /// the message in the history slot, and emits one frame per remote
    /// receiver through `send`.
    pub fn distribute_local(
        &mut self,
        from: &ServiceDescriptor,
        msg: &SimMsg,
        send: &mut dyn FnMut(PeerId, SerializedMessage),
    ) {
        for receiver in &self.local_receivers {
            receiver.receive(from, msg);
        }

        self.save_history(from, msg);

        let sender = from.endpoint_address();
        for receiver in &self.remote_receivers {
            let frame = SerializedMessage::simulation(self.msg_type.wire_kind(), msg, sender, receiver.remote_idx);
            send(receiver.peer, frame);
        }
    }

    /// Inbound delivery: invokes the local receivers only. Remote messages
    /// are never re-broadcast.
    pub fn deliver_remote(&self, from: &ServiceDescriptor, msg: &SimMsg) {
        for receiver in &self.local_receivers {
            receiver.receive(from, msg);
        }
    }

    /// Unicast to the one remote receiver whose peer is the named
    /// participant.
    pub fn dispatch_to_target(
        &mut self,
        from: &ServiceDescriptor,
        target_participant_name: &str,
        msg: &SimMsg,
        send: &mut dyn FnMut(PeerId, SerializedMessage),
    ) -> Result<()> {
        self.save_history(from, msg);

        let receiver = self
            .remote_receivers
            .iter()
            .find(|receiver| receiver.participant_name == target_participant_name)
            .ok_or_else(|| Error::UnknownTarget(target_participant_name.to_string()))?;

        let frame =
            SerializedMessage::simulation(self.msg_type.wire_kind(), msg, from.endpoint_address(), receiver.remote_idx);
        send(receiver.peer, frame);
        Ok(())
    }

    fn save_history(&mut self, from: &ServiceDescriptor, msg: &SimMsg) {
        if self.history_length == 0 {
            return;
        }

        trace!(self.log, "history slot updated");
        self.history = Some((from.endpoint_address(), msg.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::sync::{ParticipantState, ParticipantStatus};
    use crate::messages::{can::CanFrameEvent, DEFAULT_NETWORK};
    use crate::service::{NetworkType, ServiceType};
    use std::sync::Mutex;
    use std::time::UNIX_EPOCH;

    struct Sink {
        descriptor: ServiceDescriptor,
        received: Mutex<Vec<(ServiceDescriptor, SimMsg)>>,
    }

    impl Sink {
        fn new(name: &str, network: &str) -> Arc<Sink> {
            let mut descriptor = ServiceDescriptor::new(name);
            descriptor.set_service_type(ServiceType::Controller);
            descriptor.set_network_name(network);
            descriptor.set_network_type(NetworkType::Can);

            Arc::new(Sink {
                descriptor,
                received: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.received.lock().unwrap().len()
        }
    }

    impl Service for Sink {
        fn descriptor(&self) -> &ServiceDescriptor {
            &self.descriptor
        }

        fn receive_types(&self) -> &[MsgType] {
            &[MsgType::CanFrameEvent]
        }

        fn send_types(&self) -> &[MsgType] {
            &[]
        }

        fn receive(&self, from: &ServiceDescriptor, msg: &SimMsg) {
            self.received.lock().unwrap().push((from.clone(), msg.clone()));
        }
    }

    fn sender_descriptor() -> ServiceDescriptor {
        let mut desc = ServiceDescriptor::new("Sender");
        desc.set_network_name("CAN1");
        desc.set_service_id(11);
        desc
    }

    fn can_msg() -> SimMsg {
        SimMsg::from(CanFrameEvent {
            can_id: 5,
            data: vec![1, 2, 3],
            ..Default::default()
        })
    }

    fn status_msg(state: ParticipantState) -> SimMsg {
        SimMsg::from(ParticipantStatus {
            participant_name: "Sender".to_string(),
            state,
            enter_reason: String::new(),
            enter_time: UNIX_EPOCH,
            refresh_time: UNIX_EPOCH,
        })
    }

    #[test]
    fn test_local_fan_out() {
        let mut link = Link::new(MsgType::CanFrameEvent, "CAN1", &logging::discard());
        let first = Sink::new("NodeA", "CAN1");
        let second = Sink::new("NodeB", "CAN1");

        link.add_local_receiver(first.clone());
        link.add_local_receiver(second.clone());

        let mut sent = Vec::new();
        link.distribute_local(&sender_descriptor(), &can_msg(), &mut |peer, frame| {
            sent.push((peer, frame));
        });

        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 1);
        assert!(sent.is_empty());
    }

    #[test]
    fn test_remote_fan_out_in_discovery_order() {
        let mut link = Link::new(MsgType::CanFrameEvent, "CAN1", &logging::discard());

        assert!(link.add_remote_receiver(2, 4, "NodeB").is_none());
        assert!(link.add_remote_receiver(5, 0, "NodeC").is_none());

        let mut sent = Vec::new();
        link.distribute_local(&sender_descriptor(), &can_msg(), &mut |peer, frame| {
            sent.push((peer, frame));
        });

        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, 2);
        assert_eq!(sent[1].0, 5);

        // Each frame is addressed to the receiver's own remote index.
        let first = SerializedMessage::from_frame(sent.remove(0).1.release().unwrap()).unwrap();
        assert_eq!(first.remote_index().unwrap(), 4);
        assert_eq!(first.sender().unwrap(), sender_descriptor().endpoint_address());
    }

    #[test]
    fn test_remote_receivers_deduplicated() {
        let mut link = Link::new(MsgType::CanFrameEvent, "CAN1", &logging::discard());

        link.add_remote_receiver(1, 3, "NodeB");
        link.add_remote_receiver(1, 3, "NodeB");
        link.add_remote_receiver(1, 4, "NodeB");

        assert_eq!(link.remote_receivers().len(), 2);
    }

    #[test]
    fn test_deliver_remote_does_not_rebroadcast() {
        let mut link = Link::new(MsgType::CanFrameEvent, "CAN1", &logging::discard());
        let local = Sink::new("NodeA", "CAN1");

        link.add_local_receiver(local.clone());
        link.add_remote_receiver(1, 0, "NodeB");

        link.deliver_remote(&sender_descriptor(), &can_msg());

        assert_eq!(local.count(), 1);
    }

    #[test]
    fn test_dispatch_to_target() {
        let mut link = Link::new(MsgType::CanFrameEvent, "CAN1", &logging::discard());

        link.add_remote_receiver(1, 0, "receiver1");
        link.add_remote_receiver(2, 0, "receiver2");
        link.add_remote_receiver(3, 0, "receiver3");

        let mut sent = Vec::new();
        link.dispatch_to_target(&sender_descriptor(), "receiver2", &can_msg(), &mut |peer, frame| {
            sent.push((peer, frame));
        })
        .unwrap();

        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 2);
    }

    #[test]
    fn test_dispatch_to_unknown_target() {
        let mut link = Link::new(MsgType::CanFrameEvent, "CAN1", &logging::discard());

        let result = link.dispatch_to_target(&sender_descriptor(), "ghost", &can_msg(), &mut |_, _| {
            panic!("nothing may be sent");
        });

        assert_eq!(result.unwrap_err(), Error::UnknownTarget("ghost".to_string()));
    }

    #[test]
    fn test_history_replayed_to_late_joiner_once() {
        let mut link = Link::new(MsgType::ParticipantStatus, DEFAULT_NETWORK, &logging::discard());
        link.set_history_length(1);

        link.distribute_local(&sender_descriptor(), &status_msg(ParticipantState::Running), &mut |_, _| {});

        // The late joiner gets exactly one replay frame on attachment.
        let replay = link.add_remote_receiver(7, 2, "NodeLate");
        let mut frame = SerializedMessage::from_frame(replay.unwrap().release().unwrap()).unwrap();
        assert_eq!(frame.remote_index().unwrap(), 2);

        let decoded = MsgType::ParticipantStatus.decode_payload(frame.payload_buffer()).unwrap();
        assert_eq!(decoded, status_msg(ParticipantState::Running));

        // Re-announcing the same receiver is de-duplicated, no second replay.
        assert!(link.add_remote_receiver(7, 2, "NodeLate").is_none());
    }

    #[test]
    fn test_history_keeps_latest_message() {
        let mut link = Link::new(MsgType::ParticipantStatus, DEFAULT_NETWORK, &logging::discard());
        link.set_history_length(1);

        link.distribute_local(&sender_descriptor(), &status_msg(ParticipantState::Idle), &mut |_, _| {});
        link.distribute_local(&sender_descriptor(), &status_msg(ParticipantState::Running), &mut |_, _| {});

        let replay = link.add_remote_receiver(1, 0, "NodeLate").unwrap();
        let mut frame = SerializedMessage::from_frame(replay.release().unwrap()).unwrap();
        let decoded = MsgType::ParticipantStatus.decode_payload(frame.payload_buffer()).unwrap();

        assert_eq!(decoded, status_msg(ParticipantState::Running));
    }

    #[test]
    fn test_history_noop_for_unhistoried_types() {
        let mut link = Link::new(MsgType::CanFrameEvent, "CAN1", &logging::discard());
        link.set_history_length(1);

        link.distribute_local(&sender_descriptor(), &can_msg(), &mut |_, _| {});

        assert!(link.add_remote_receiver(1, 0, "NodeLate").is_none());
    }

    #[test]
    fn test_remove_peer_drops_its_receivers() {
        let mut link = Link::new(MsgType::CanFrameEvent, "CAN1", &logging::discard());

        link.add_remote_receiver(1, 0, "NodeB");
        link.add_remote_receiver(2, 0, "NodeC");

        link.remove_peer(1);

        assert_eq!(link.remote_receivers().len(), 1);
        assert_eq!(link.remote_receivers()[0].participant_name, "NodeC");
    }
}
