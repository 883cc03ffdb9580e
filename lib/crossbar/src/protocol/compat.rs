//! Frozen wire shapes of protocol revision 3.0 and the adapters that map
//! them onto the canonical in-memory structs.
//!
//! In 3.0 the peer identity was split across two records: a `PeerInfo`
//! carrying a single host/port pair, and a separate `PeerUri` carrying the
//! acceptor URI list. 3.1 merged them and added the capabilities string.
//! The canonical structs stay unchanged; every legacy delta lives here.

use crate::error::Result;
use crate::protocol::handshake::{AnnouncementReply, KnownParticipants, ParticipantAnnouncement, PeerInfo, Status};
use crate::protocol::version::{ProtocolVersion, RegistryMsgHeader};
use crate::service::ParticipantId;
use crate::uri::Uri;
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

const LEGACY_VERSION: ProtocolVersion = ProtocolVersion::new(3, 0);

/// 3.0 peer identity: one host/port pair instead of a URI list.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct LegacyPeerInfo {
    participant_name: String,
    participant_id: ParticipantId,
    acceptor_host: String,
    acceptor_port: u16,
}

impl Encode for LegacyPeerInfo {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_string(&self.participant_name);
        buffer.write_u64(self.participant_id);
        buffer.write_string(&self.acceptor_host);
        buffer.write_u16(self.acceptor_port);
    }
}

impl Decode for LegacyPeerInfo {
    fn decode(buffer: &mut MessageBuffer) -> Result<LegacyPeerInfo> {
        Ok(LegacyPeerInfo {
            participant_name: buffer.read_string()?,
            participant_id: buffer.read_u64()?,
            acceptor_host: buffer.read_string()?,
            acceptor_port: buffer.read_u16()?,
        })
    }
}

/// 3.0 companion record carrying the acceptor URI list. No capabilities
/// field existed yet.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct LegacyPeerUri {
    participant_name: String,
    participant_id: ParticipantId,
    acceptor_uris: Vec<String>,
}

impl Encode for LegacyPeerUri {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_string(&self.participant_name);
        buffer.write_u64(self.participant_id);
        buffer.write_seq(&self.acceptor_uris);
    }
}

impl Decode for LegacyPeerUri {
    fn decode(buffer: &mut MessageBuffer) -> Result<LegacyPeerUri> {
        Ok(LegacyPeerUri {
            participant_name: buffer.read_string()?,
            participant_id: buffer.read_u64()?,
            acceptor_uris: buffer.read_seq()?,
        })
    }
}

fn to_legacy_uri(info: &PeerInfo) -> LegacyPeerUri {
    LegacyPeerUri {
        participant_name: info.participant_name.clone(),
        participant_id: info.participant_id,
        acceptor_uris: info.acceptor_uris.clone(),
    }
}

fn from_legacy(uri: LegacyPeerUri) -> PeerInfo {
    PeerInfo {
        participant_name: uri.participant_name,
        participant_id: uri.participant_id,
        acceptor_uris: uri.acceptor_uris,
        capabilities: String::new(),
    }
}

/// Builds a canonical info from the host/port pair alone. Used as fallback
/// when a legacy census entry has no URI record.
fn from_legacy_info(info: LegacyPeerInfo) -> PeerInfo {
    let mut acceptor_uris = Vec::new();
    if !info.acceptor_host.is_empty() {
        acceptor_uris.push(Uri::tcp(&info.acceptor_host, info.acceptor_port).as_str().to_string());
    }

    PeerInfo {
        participant_name: info.participant_name,
        participant_id: info.participant_id,
        acceptor_uris,
        capabilities: String::new(),
    }
}

/// 3.0 announcement layout: header, host/port record, URI record. The
/// host/port record is vestigial and written empty; 3.0 receivers take the
/// identity from the URI record.
pub(crate) fn write_announcement(buffer: &mut MessageBuffer, announcement: &ParticipantAnnouncement) {
    RegistryMsgHeader::new(LEGACY_VERSION).encode(buffer);
    LegacyPeerInfo::default().encode(buffer);
    to_legacy_uri(&announcement.peer_info).encode(buffer);
}

pub(crate) fn read_announcement(buffer: &mut MessageBuffer) -> Result<ParticipantAnnouncement> {
    let header = RegistryMsgHeader::decode(buffer)?;
    let _legacy_info = LegacyPeerInfo::decode(buffer)?;
    let legacy_uri = LegacyPeerUri::decode(buffer)?;

    Ok(ParticipantAnnouncement {
        header,
        peer_info: from_legacy(legacy_uri),
    })
}

/// The 3.0 reply carried the subscriber list only; neither a status nor the
/// remote's header existed yet.
pub(crate) fn write_reply(buffer: &mut MessageBuffer, reply: &AnnouncementReply) {
    buffer.write_seq(&reply.subscribers);
}

pub(crate) fn read_reply(buffer: &mut MessageBuffer) -> Result<AnnouncementReply> {
    Ok(AnnouncementReply {
        // A 3.0 peer that answered at all accepted the announcement.
        remote_header: RegistryMsgHeader::new(LEGACY_VERSION),
        status: Status::Success,
        subscribers: buffer.read_seq()?,
    })
}

/// 3.0 census layout: header, host/port records, URI records. Only the URI
/// records are emitted; the host/port vector is left empty, matching what
/// 3.0 registries produced once URI support existed.
pub(crate) fn write_known_participants(buffer: &mut MessageBuffer, known: &KnownParticipants) {
    RegistryMsgHeader::new(LEGACY_VERSION).encode(buffer);

    let infos: Vec<LegacyPeerInfo> = Vec::new();
    buffer.write_seq(&infos);

    let uris: Vec<LegacyPeerUri> = known.peer_infos.iter().map(to_legacy_uri).collect();
    buffer.write_seq(&uris);
}

/// Continues decoding a census whose header announced revision 3.0. The URI
/// record vector was appended after 3.4.1 and may be absent entirely.
pub(crate) fn read_known_participants(
    buffer: &mut MessageBuffer,
    header: RegistryMsgHeader,
) -> Result<KnownParticipants> {
    let legacy_infos: Vec<LegacyPeerInfo> = buffer.read_seq()?;

    let peer_infos = if buffer.remaining() > 0 {
        let legacy_uris: Vec<LegacyPeerUri> = buffer.read_seq()?;
        legacy_uris.into_iter().map(from_legacy).collect()
    } else {
        legacy_infos.into_iter().map(from_legacy_info).collect()
    };

    Ok(KnownParticipants { header, peer_infos })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_records_roundtrip() {
        let info = LegacyPeerInfo {
            participant_name: "NodeA".to_string(),
            participant_id: 42,
            acceptor_host: "127.0.0.1".to_string(),
            acceptor_port: 37000,
        };
        let uri = LegacyPeerUri {
            participant_name: "NodeA".to_string(),
            participant_id: 42,
            acceptor_uris: vec!["tcp://127.0.0.1:37000".to_string()],
        };

        let mut buffer = MessageBuffer::new();
        info.encode(&mut buffer);
        uri.encode(&mut buffer);

        assert_eq!(LegacyPeerInfo::decode(&mut buffer).unwrap(), info);
        assert_eq!(LegacyPeerUri::decode(&mut buffer).unwrap(), uri);
    }

    #[test]
    fn test_census_without_uri_records_uses_host_port() {
        // A very old census: host/port records only, no URI vector at all.
        let mut buffer = MessageBuffer::new();
        let infos = vec![LegacyPeerInfo {
            participant_name: "NodeA".to_string(),
            participant_id: 42,
            acceptor_host: "10.0.0.5".to_string(),
            acceptor_port: 37000,
        }];
        buffer.write_seq(&infos);

        let known = read_known_participants(&mut buffer, RegistryMsgHeader::new(LEGACY_VERSION)).unwrap();
        assert_eq!(known.peer_infos.len(), 1);
        assert_eq!(known.peer_infos[0].acceptor_uris, vec!["tcp://10.0.0.5:37000".to_string()]);
    }
}
