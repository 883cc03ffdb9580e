//! Versioned handshake protocol: the registry message header with its magic
//! preamble, the announcement/reply/census messages exchanged while a peer
//! connection is established, and the backward-compatible codecs for the
//! supported legacy wire revision.

pub mod compat;
pub mod handshake;
pub mod version;

pub use handshake::{
    AnnouncementReply, KnownParticipants, MsgSubscriber, ParticipantAnnouncement, PeerInfo, Status,
    SubscriptionAck,
};
pub use version::{
    version_supported, version_to_release, ProtocolVersion, RegistryMsgHeader, CURRENT_VERSION, PREAMBLE,
    UNKNOWN_VERSION,
};
