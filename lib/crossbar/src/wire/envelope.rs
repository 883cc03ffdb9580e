use crate::error::{Error, Result};
use crate::protocol::version::{ProtocolVersion, RegistryMsgHeader};
use crate::service::EndpointAddress;
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

/// First tag of every frame on every transport.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum MsgKind {
    Invalid = 0,
    SubscriptionAnnouncement = 1,
    SubscriptionAcknowledge = 2,
    MiddlewareMessage = 3,
    SimulationMessage = 4,
    RegistryMessage = 5,
}

impl MsgKind {
    pub fn from_u8(value: u8) -> Result<MsgKind> {
        match value {
            0 => Ok(MsgKind::Invalid),
            1 => Ok(MsgKind::SubscriptionAnnouncement),
            2 => Ok(MsgKind::SubscriptionAcknowledge),
            3 => Ok(MsgKind::MiddlewareMessage),
            4 => Ok(MsgKind::SimulationMessage),
            5 => Ok(MsgKind::RegistryMessage),
            other => Err(Error::Protocol(format!("invalid message kind {}", other))),
        }
    }

    /// Kinds whose envelope carries a remote receiver index and the sender's
    /// endpoint address.
    #[inline]
    pub fn carries_sender(self) -> bool {
        self == MsgKind::MiddlewareMessage || self == MsgKind::SimulationMessage
    }
}

/// Second tag, present only when the kind is `RegistryMessage`.
///
/// `ParticipantAnnouncement` is the first message on every new connection
/// and carries the protocol version; its tag value must never change or
/// version-mismatch detection against old peers breaks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum RegistryMsgKind {
    Invalid = 0,
    ParticipantAnnouncement = 1,
    AnnouncementReply = 2,
    KnownParticipants = 3,
}

impl RegistryMsgKind {
    pub fn from_u8(value: u8) -> Result<RegistryMsgKind> {
        match value {
            0 => Ok(RegistryMsgKind::Invalid),
            1 => Ok(RegistryMsgKind::ParticipantAnnouncement),
            2 => Ok(RegistryMsgKind::AnnouncementReply),
            3 => Ok(RegistryMsgKind::KnownParticipants),
            other => Err(Error::Protocol(format!("invalid registry message kind {}", other))),
        }
    }
}

/// A framed message in wire form.
///
/// Outbound: one of the constructors writes the envelope headers, encodes the
/// payload, and [`release`](SerializedMessage::release) finalizes the size
/// prefix. Inbound: [`from_frame`](SerializedMessage::from_frame) peels the
/// headers, leaving the read cursor at the start of the payload.
///
/// Envelope shape:
///
/// ```text
/// u32 totalSize                 (includes this field)
/// u8  msgKind
/// u8  registryMsgKind           (only if msgKind == RegistryMessage)
/// u64 remoteReceiverIndex       (only if msgKind is middleware/simulation)
/// u64+u64 senderEndpointAddress (ditto)
/// ...payload
/// ```
pub struct SerializedMessage {
    kind: MsgKind,
    registry_kind: RegistryMsgKind,
    remote_index: u64,
    sender: EndpointAddress,
    buffer: MessageBuffer,
}

impl SerializedMessage {
    /// Frames a handshake message. The buffer is tagged with `version` so the
    /// payload codec can emit a legacy layout for old peers.
    pub fn registry<T: Encode>(version: ProtocolVersion, kind: RegistryMsgKind, msg: &T) -> SerializedMessage {
        let mut this = SerializedMessage {
            kind: MsgKind::RegistryMessage,
            registry_kind: kind,
            remote_index: 0,
            sender: EndpointAddress::default(),
            buffer: MessageBuffer::new(),
        };

        this.buffer.set_version(version);
        this.write_headers();
        msg.encode(&mut this.buffer);
        this
    }

    /// Frames a subscription announcement or acknowledge.
    pub fn subscription<T: Encode>(kind: MsgKind, version: ProtocolVersion, msg: &T) -> SerializedMessage {
        debug_assert!(kind == MsgKind::SubscriptionAnnouncement || kind == MsgKind::SubscriptionAcknowledge);

        let mut this = SerializedMessage {
            kind,
            registry_kind: RegistryMsgKind::Invalid,
            remote_index: 0,
            sender: EndpointAddress::default(),
            buffer: MessageBuffer::new(),
        };

        this.buffer.set_version(version);
        this.write_headers();
        msg.encode(&mut this.buffer);
        this
    }

    /// Frames a typed simulation or middleware message bound to one remote
    /// receiver index.
    pub fn simulation<T: Encode>(
        kind: MsgKind,
        msg: &T,
        sender: EndpointAddress,
        remote_index: u16,
    ) -> SerializedMessage {
        debug_assert!(kind.carries_sender());

        let mut this = SerializedMessage {
            kind,
            registry_kind: RegistryMsgKind::Invalid,
            remote_index: u64::from(remote_index),
            sender,
            buffer: MessageBuffer::new(),
        };

        this.write_headers();
        msg.encode(&mut this.buffer);
        this
    }

    fn write_headers(&mut self) {
        // Size placeholder, finalized by release().
        self.buffer.write_u32(0);
        self.buffer.write_u8(self.kind as u8);

        if self.kind == MsgKind::RegistryMessage {
            self.buffer.write_u8(self.registry_kind as u8);
        }
        if self.kind.carries_sender() {
            self.buffer.write_u64(self.remote_index);
            self.sender.encode(&mut self.buffer);
        }
    }

    /// Finalizes the size prefix and hands out the frame bytes.
    pub fn release(mut self) -> Result<Vec<u8>> {
        let total = self.buffer.len();
        if total > u32::max_value() as usize {
            return Err(Error::Protocol("message buffer exceeds the frame size limit".to_string()));
        }

        self.buffer.patch_u32(0, total as u32);
        Ok(self.buffer.release_storage())
    }

    /// Peels the envelope headers off a reassembled frame.
    pub fn from_frame(frame: Vec<u8>) -> Result<SerializedMessage> {
        let mut buffer = MessageBuffer::from_vec(frame);

        // The size prefix was already validated during reassembly.
        let _total = buffer.read_u32()?;
        let kind = MsgKind::from_u8(buffer.read_u8()?)?;

        let mut registry_kind = RegistryMsgKind::Invalid;
        let mut remote_index = 0u64;
        let mut sender = EndpointAddress::default();

        if kind == MsgKind::RegistryMessage {
            registry_kind = RegistryMsgKind::from_u8(buffer.read_u8()?)?;
        }
        if kind.carries_sender() {
            remote_index = buffer.read_u64()?;
            sender = EndpointAddress::decode(&mut buffer)?;
        }

        Ok(SerializedMessage {
            kind,
            registry_kind,
            remote_index,
            sender,
            buffer,
        })
    }

    #[inline]
    pub fn kind(&self) -> MsgKind {
        self.kind
    }

    #[inline]
    pub fn registry_kind(&self) -> RegistryMsgKind {
        self.registry_kind
    }

    /// The local receiver index this frame is addressed to. Only simulation
    /// and middleware frames carry one.
    pub fn remote_index(&self) -> Result<u16> {
        if !self.kind.carries_sender() {
            return Err(Error::InvalidOperation(
                "remote receiver index read on a frame kind that does not carry one",
            ));
        }
        Ok(self.remote_index as u16)
    }

    /// The sender's endpoint address. Only simulation and middleware frames
    /// carry one.
    pub fn sender(&self) -> Result<EndpointAddress> {
        if !self.kind.carries_sender() {
            return Err(Error::InvalidOperation(
                "sender endpoint read on a frame kind that does not carry one",
            ));
        }
        Ok(self.sender)
    }

    #[inline]
    pub fn set_protocol_version(&mut self, version: ProtocolVersion) {
        self.buffer.set_version(version);
    }

    /// Reads the registry message header without consuming it, so the wire
    /// version can be inspected before committing to a payload layout.
    pub fn peek_registry_header(&mut self) -> Result<RegistryMsgHeader> {
        let mark = self.buffer.read_pos();
        let header = RegistryMsgHeader::decode(&mut self.buffer);
        self.buffer.set_read_pos(mark);
        header
    }

    /// Decodes the payload with the type-specific codec.
    #[inline]
    pub fn decode<T: Decode>(&mut self) -> Result<T> {
        T::decode(&mut self.buffer)
    }

    /// Direct payload access for dispatch code that selects the codec by
    /// receiver index.
    #[inline]
    pub fn payload_buffer(&mut self) -> &mut MessageBuffer {
        &mut self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};

    struct Probe(u64);

    impl Encode for Probe {
        fn encode(&self, buffer: &mut MessageBuffer) {
            buffer.write_u64(self.0);
        }
    }

    impl Decode for Probe {
        fn decode(buffer: &mut MessageBuffer) -> Result<Probe> {
            Ok(Probe(buffer.read_u64()?))
        }
    }

    #[test]
    fn test_size_prefix_equals_frame_length() {
        let msg = SerializedMessage::subscription(
            MsgKind::SubscriptionAnnouncement,
            ProtocolVersion::new(3, 1),
            &Probe(99),
        );

        let bytes = msg.release().unwrap();
        assert_eq!(LittleEndian::read_u32(&bytes[..4]) as usize, bytes.len());
        // size + kind + payload
        assert_eq!(bytes.len(), 4 + 1 + 8);
    }

    #[test]
    fn test_simulation_roundtrip() {
        let sender = EndpointAddress {
            participant: 11,
            endpoint: 22,
        };

        let msg = SerializedMessage::simulation(MsgKind::SimulationMessage, &Probe(777), sender, 5);
        let bytes = msg.release().unwrap();

        let mut inbound = SerializedMessage::from_frame(bytes).unwrap();
        assert_eq!(inbound.kind(), MsgKind::SimulationMessage);
        assert_eq!(inbound.remote_index().unwrap(), 5);
        assert_eq!(inbound.sender().unwrap(), sender);
        assert_eq!(inbound.decode::<Probe>().unwrap().0, 777);
    }

    #[test]
    fn test_registry_kind_tag() {
        let msg = SerializedMessage::registry(
            ProtocolVersion::new(3, 1),
            RegistryMsgKind::KnownParticipants,
            &Probe(1),
        );
        let bytes = msg.release().unwrap();

        assert_eq!(bytes[4], MsgKind::RegistryMessage as u8);
        assert_eq!(bytes[5], RegistryMsgKind::KnownParticipants as u8);

        let inbound = SerializedMessage::from_frame(bytes).unwrap();
        assert_eq!(inbound.registry_kind(), RegistryMsgKind::KnownParticipants);
    }

    #[test]
    fn test_wrong_kind_accessors_fail() {
        let msg = SerializedMessage::subscription(
            MsgKind::SubscriptionAcknowledge,
            ProtocolVersion::new(3, 1),
            &Probe(0),
        );
        let inbound = SerializedMessage::from_frame(msg.release().unwrap()).unwrap();

        assert!(matches!(inbound.remote_index(), Err(Error::InvalidOperation(_))));
        assert!(matches!(inbound.sender(), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let header = RegistryMsgHeader::new(ProtocolVersion::new(3, 1));
        let msg = SerializedMessage::registry(
            ProtocolVersion::new(3, 1),
            RegistryMsgKind::ParticipantAnnouncement,
            &header,
        );

        let mut inbound = SerializedMessage::from_frame(msg.release().unwrap()).unwrap();
        let peeked = inbound.peek_registry_header().unwrap();
        assert_eq!(peeked.version(), ProtocolVersion::new(3, 1));

        // The payload can still be decoded in full afterwards.
        let decoded: RegistryMsgHeader = inbound.decode().unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_truncated_frame() {
        assert!(SerializedMessage::from_frame(vec![1, 2]).is_err());
    }
}
