use crate::error::{Error, Result};
use crate::protocol::compat;
use crate::protocol::version::{ProtocolVersion, RegistryMsgHeader, CURRENT_VERSION, UNKNOWN_VERSION};
use crate::service::ParticipantId;
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

const LEGACY_VERSION: ProtocolVersion = ProtocolVersion::new(3, 0);

/// How a participant can be reached: its identity plus the acceptor URIs it
/// listens on, ordered local-IPC first so that connecting peers prefer the
/// cheaper transport.
///
/// `capabilities` is an opaque semicolon-delimited list reserved for future
/// connection upgrades; it is carried verbatim and never interpreted here.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PeerInfo {
    pub participant_name: String,
    pub participant_id: ParticipantId,
    pub acceptor_uris: Vec<String>,
    pub capabilities: String,
}

impl Encode for PeerInfo {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_string(&self.participant_name);
        buffer.write_u64(self.participant_id);
        buffer.write_seq(&self.acceptor_uris);
        buffer.write_string(&self.capabilities);
    }
}

impl Decode for PeerInfo {
    fn decode(buffer: &mut MessageBuffer) -> Result<PeerInfo> {
        Ok(PeerInfo {
            participant_name: buffer.read_string()?,
            participant_id: buffer.read_u64()?,
            acceptor_uris: buffer.read_seq()?,
            capabilities: buffer.read_string()?,
        })
    }
}

/// "I have a local receiver at index `receiver_idx` for messages of
/// `msg_type_name` on `network_name`." The codec for this struct is shared
/// by all supported wire revisions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MsgSubscriber {
    pub receiver_idx: u16,
    pub network_name: String,
    pub msg_type_name: String,
    pub version: u32,
}

impl Encode for MsgSubscriber {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u16(self.receiver_idx);
        buffer.write_string(&self.network_name);
        buffer.write_string(&self.msg_type_name);
        buffer.write_u32(self.version);
    }
}

impl Decode for MsgSubscriber {
    fn decode(buffer: &mut MessageBuffer) -> Result<MsgSubscriber> {
        Ok(MsgSubscriber {
            receiver_idx: buffer.read_u16()?,
            network_name: buffer.read_string()?,
            msg_type_name: buffer.read_string()?,
            version: buffer.read_u32()?,
        })
    }
}

/// Shared accept/reject tag for announcement replies and subscription
/// acknowledgements.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Status {
    Failed = 0,
    Success = 1,
}

impl Status {
    pub fn from_u8(value: u8) -> Result<Status> {
        match value {
            0 => Ok(Status::Failed),
            1 => Ok(Status::Success),
            other => Err(Error::Protocol(format!("invalid status value {}", other))),
        }
    }
}

/// Confirms or rejects a subscription, echoing the (possibly
/// version-adjusted) subscriber record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubscriptionAck {
    pub status: Status,
    pub subscriber: MsgSubscriber,
}

impl Encode for SubscriptionAck {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u8(self.status as u8);
        self.subscriber.encode(buffer);
    }
}

impl Decode for SubscriptionAck {
    fn decode(buffer: &mut MessageBuffer) -> Result<SubscriptionAck> {
        Ok(SubscriptionAck {
            status: Status::from_u8(buffer.read_u8()?)?,
            subscriber: MsgSubscriber::decode(buffer)?,
        })
    }
}

/// First message on every new connection: introduces the sender and carries
/// its wire revision in the header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParticipantAnnouncement {
    pub header: RegistryMsgHeader,
    pub peer_info: PeerInfo,
}

impl ParticipantAnnouncement {
    pub fn new(version: ProtocolVersion, peer_info: PeerInfo) -> ParticipantAnnouncement {
        ParticipantAnnouncement {
            header: RegistryMsgHeader::new(version),
            peer_info,
        }
    }
}

impl Encode for ParticipantAnnouncement {
    fn encode(&self, buffer: &mut MessageBuffer) {
        if buffer.version() == LEGACY_VERSION {
            compat::write_announcement(buffer, self);
        } else {
            self.header.encode(buffer);
            self.peer_info.encode(buffer);
        }
    }
}

impl Decode for ParticipantAnnouncement {
    fn decode(buffer: &mut MessageBuffer) -> Result<ParticipantAnnouncement> {
        if buffer.version() == LEGACY_VERSION {
            compat::read_announcement(buffer)
        } else {
            Ok(ParticipantAnnouncement {
                header: RegistryMsgHeader::decode(buffer)?,
                peer_info: PeerInfo::decode(buffer)?,
            })
        }
    }
}

/// Accepts or rejects an announcement. `remote_header` tells the announcing
/// peer which revision the replying side will speak on this connection;
/// `subscribers` advertises the replying side's local receivers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnnouncementReply {
    pub remote_header: RegistryMsgHeader,
    pub status: Status,
    pub subscribers: Vec<MsgSubscriber>,
}

impl Encode for AnnouncementReply {
    fn encode(&self, buffer: &mut MessageBuffer) {
        if buffer.version() == LEGACY_VERSION {
            compat::write_reply(buffer, self);
        } else {
            self.remote_header.encode(buffer);
            buffer.write_u8(self.status as u8);
            buffer.write_seq(&self.subscribers);
        }
    }
}

impl AnnouncementReply {
    fn decode_current(buffer: &mut MessageBuffer) -> Result<AnnouncementReply> {
        Ok(AnnouncementReply {
            remote_header: RegistryMsgHeader::decode(buffer)?,
            status: Status::from_u8(buffer.read_u8()?)?,
            subscribers: buffer.read_seq()?,
        })
    }
}

impl Decode for AnnouncementReply {
    fn decode(buffer: &mut MessageBuffer) -> Result<AnnouncementReply> {
        if buffer.version() == LEGACY_VERSION {
            return compat::read_reply(buffer);
        }

        if buffer.version() == UNKNOWN_VERSION {
            // A reply on a connection whose version has not been negotiated
            // yet, i.e. between two non-registry peers. Probe the current
            // layout first and fall back to the 3.0 shape on a mismatch.
            // This is a heuristic, not a robust format detection.
            let mark = buffer.read_pos();

            match Self::decode_current(buffer) {
                Ok(reply) if reply.remote_header.preamble_valid() => return Ok(reply),
                _ => {
                    buffer.set_read_pos(mark);
                    buffer.set_version(LEGACY_VERSION);
                    return compat::read_reply(buffer);
                }
            }
        }

        Self::decode_current(buffer)
    }
}

/// The registry's census of currently connected peers, sent as the answer
/// to a `ParticipantAnnouncement`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KnownParticipants {
    pub header: RegistryMsgHeader,
    pub peer_infos: Vec<PeerInfo>,
}

impl KnownParticipants {
    pub fn new(version: ProtocolVersion, peer_infos: Vec<PeerInfo>) -> KnownParticipants {
        KnownParticipants {
            header: RegistryMsgHeader::new(version),
            peer_infos,
        }
    }
}

impl Encode for KnownParticipants {
    fn encode(&self, buffer: &mut MessageBuffer) {
        if buffer.version() == LEGACY_VERSION {
            compat::write_known_participants(buffer, self);
        } else {
            self.header.encode(buffer);
            buffer.write_seq(&self.peer_infos);
        }
    }
}

impl Decode for KnownParticipants {
    fn decode(buffer: &mut MessageBuffer) -> Result<KnownParticipants> {
        // The message's own header announces its layout, so the branch is
        // taken on the decoded version rather than on the buffer tag.
        let header = RegistryMsgHeader::decode(buffer)?;

        if header.version() == LEGACY_VERSION {
            return compat::read_known_participants(buffer, header);
        }

        Ok(KnownParticipants {
            header,
            peer_infos: buffer.read_seq()?,
        })
    }
}

impl Default for RegistryMsgHeader {
    fn default() -> RegistryMsgHeader {
        RegistryMsgHeader::new(CURRENT_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_info(name: &str) -> PeerInfo {
        PeerInfo {
            participant_name: name.to_string(),
            participant_id: crate::service::participant_id_of(name),
            acceptor_uris: vec![
                format!("local:///tmp/{}.xbar", name),
                "tcp://127.0.0.1:37001".to_string(),
            ],
            capabilities: String::new(),
        }
    }

    fn subscriber(idx: u16) -> MsgSubscriber {
        MsgSubscriber {
            receiver_idx: idx,
            network_name: "CAN1".to_string(),
            msg_type_name: "CanMessage".to_string(),
            version: 1,
        }
    }

    #[test]
    fn test_peer_info_roundtrip() {
        let info = peer_info("NodeA");

        let mut buffer = MessageBuffer::new();
        info.encode(&mut buffer);

        assert_eq!(PeerInfo::decode(&mut buffer).unwrap(), info);
    }

    #[test]
    fn test_subscriber_roundtrip() {
        let sub = subscriber(3);

        let mut buffer = MessageBuffer::new();
        sub.encode(&mut buffer);

        assert_eq!(MsgSubscriber::decode(&mut buffer).unwrap(), sub);
    }

    #[test]
    fn test_ack_roundtrip() {
        let ack = SubscriptionAck {
            status: Status::Success,
            subscriber: subscriber(9),
        };

        let mut buffer = MessageBuffer::new();
        ack.encode(&mut buffer);

        assert_eq!(SubscriptionAck::decode(&mut buffer).unwrap(), ack);
    }

    #[test]
    fn test_announcement_current_roundtrip() {
        let announcement = ParticipantAnnouncement::new(CURRENT_VERSION, peer_info("NodeA"));

        let mut buffer = MessageBuffer::new();
        buffer.set_version(CURRENT_VERSION);
        announcement.encode(&mut buffer);

        let decoded = ParticipantAnnouncement::decode(&mut buffer).unwrap();
        assert_eq!(decoded, announcement);
    }

    #[test]
    fn test_announcement_legacy_roundtrip() {
        let announcement = ParticipantAnnouncement::new(LEGACY_VERSION, peer_info("NodeA"));

        let mut buffer = MessageBuffer::new();
        buffer.set_version(LEGACY_VERSION);
        announcement.encode(&mut buffer);

        let decoded = ParticipantAnnouncement::decode(&mut buffer).unwrap();
        // Name, id and URIs survive the legacy encoding; capabilities did
        // not exist in 3.0.
        assert_eq!(decoded.header.version(), LEGACY_VERSION);
        assert_eq!(decoded.peer_info.participant_name, "NodeA");
        assert_eq!(decoded.peer_info.participant_id, announcement.peer_info.participant_id);
        assert_eq!(decoded.peer_info.acceptor_uris, announcement.peer_info.acceptor_uris);
        assert_eq!(decoded.peer_info.capabilities, "");
    }

    #[test]
    fn test_reply_current_roundtrip() {
        let reply = AnnouncementReply {
            remote_header: RegistryMsgHeader::new(CURRENT_VERSION),
            status: Status::Success,
            subscribers: vec![subscriber(0), subscriber(1)],
        };

        let mut buffer = MessageBuffer::new();
        buffer.set_version(CURRENT_VERSION);
        reply.encode(&mut buffer);

        assert_eq!(AnnouncementReply::decode(&mut buffer).unwrap(), reply);
    }

    #[test]
    fn test_reply_unknown_version_probes_current() {
        let reply = AnnouncementReply {
            remote_header: RegistryMsgHeader::new(CURRENT_VERSION),
            status: Status::Success,
            subscribers: vec![subscriber(2)],
        };

        let mut buffer = MessageBuffer::new();
        buffer.set_version(CURRENT_VERSION);
        reply.encode(&mut buffer);

        // Receiver side: version not negotiated yet.
        buffer.set_version(UNKNOWN_VERSION);
        assert_eq!(AnnouncementReply::decode(&mut buffer).unwrap(), reply);
    }

    #[test]
    fn test_reply_unknown_version_falls_back_to_legacy() {
        let reply = AnnouncementReply {
            remote_header: RegistryMsgHeader::new(LEGACY_VERSION),
            status: Status::Success,
            subscribers: vec![subscriber(2)],
        };

        // A 3.0 peer sends the bare subscriber list.
        let mut buffer = MessageBuffer::new();
        buffer.set_version(LEGACY_VERSION);
        reply.encode(&mut buffer);

        buffer.set_version(UNKNOWN_VERSION);
        let decoded = AnnouncementReply::decode(&mut buffer).unwrap();

        // The legacy shape has no status and no header: both are synthesized.
        assert_eq!(decoded.status, Status::Success);
        assert_eq!(decoded.remote_header.version(), LEGACY_VERSION);
        assert_eq!(decoded.subscribers, reply.subscribers);
    }

    #[test]
    fn test_known_participants_current_roundtrip() {
        let known = KnownParticipants::new(CURRENT_VERSION, vec![peer_info("NodeA"), peer_info("NodeB")]);

        let mut buffer = MessageBuffer::new();
        buffer.set_version(CURRENT_VERSION);
        known.encode(&mut buffer);

        assert_eq!(KnownParticipants::decode(&mut buffer).unwrap(), known);
    }

    #[test]
    fn test_known_participants_legacy_roundtrip() {
        let known = KnownParticipants::new(CURRENT_VERSION, vec![peer_info("NodeA")]);

        let mut buffer = MessageBuffer::new();
        buffer.set_version(LEGACY_VERSION);
        known.encode(&mut buffer);

        let decoded = KnownParticipants::decode(&mut buffer).unwrap();
        assert_eq!(decoded.header.version(), LEGACY_VERSION);
        assert_eq!(decoded.peer_infos.len(), 1);
        assert_eq!(decoded.peer_infos[0].participant_name, "NodeA");
        assert_eq!(decoded.peer_infos[0].acceptor_uris, known.peer_infos[0].acceptor_uris);
    }
}
