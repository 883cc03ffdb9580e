//! The closed set of typed messages carried by the fabric.
//!
//! [`SimMsg`] is the sum of every supported wire message; [`MsgType`] is its
//! field-less mirror and carries the per-type constants: the type name, the
//! wire-compatible serdes name (stable across API renames), the payload
//! codec version and the history capacity. Dispatch from a receiver index to
//! the right codec is a plain match on the `MsgType` tag.

pub mod can;
pub mod data;
pub mod discovery;
pub mod eth;
pub mod flexray;
pub mod lin;
pub mod logmsg;
pub mod rpc;
pub mod sync;

use crate::error::Result;
use crate::wire::buffer::MessageBuffer;
use crate::wire::envelope::MsgKind;
use crate::wire::{Decode, Encode};

/// Simulation time in nanoseconds.
pub type SimTime = i64;

/// The lifecycle messages travel on this network unless configured otherwise.
pub const DEFAULT_NETWORK: &str = "default";

macro_rules! sim_messages {
    ($( $variant:ident($ty:ty) { serdes: $serdes:expr, version: $version:expr, hist: $hist:expr, kind: $kind:ident } )+) => {
        /// One wire message of any supported type.
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub enum SimMsg {
            $( $variant($ty), )+
        }

        /// Field-less tag of a [`SimMsg`] variant.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub enum MsgType {
            $( $variant, )+
        }

        impl MsgType {
            pub const ALL: &'static [MsgType] = &[ $( MsgType::$variant, )+ ];

            /// The API-facing type name.
            pub fn type_name(self) -> &'static str {
                match self {
                    $( MsgType::$variant => stringify!($variant), )+
                }
            }

            /// The name used on the wire in subscription announcements.
            /// Frozen at the historic value for types that were renamed
            /// since, so old peers keep matching.
            pub fn serdes_name(self) -> &'static str {
                match self {
                    $( MsgType::$variant => $serdes, )+
                }
            }

            /// Payload codec revision, announced with every subscription.
            pub fn version(self) -> u32 {
                match self {
                    $( MsgType::$variant => $version, )+
                }
            }

            /// History slots a link of this type may keep (0 or 1).
            pub fn hist_size(self) -> usize {
                match self {
                    $( MsgType::$variant => $hist, )+
                }
            }

            /// Envelope kind used when this type goes on the wire.
            pub fn wire_kind(self) -> MsgKind {
                match self {
                    $( MsgType::$variant => MsgKind::$kind, )+
                }
            }

            pub fn of(msg: &SimMsg) -> MsgType {
                match msg {
                    $( SimMsg::$variant(_) => MsgType::$variant, )+
                }
            }

            /// Decodes a payload of this type.
            pub fn decode_payload(self, buffer: &mut MessageBuffer) -> Result<SimMsg> {
                match self {
                    $( MsgType::$variant => Ok(SimMsg::$variant(<$ty>::decode(buffer)?)), )+
                }
            }
        }

        impl Encode for SimMsg {
            fn encode(&self, buffer: &mut MessageBuffer) {
                match self {
                    $( SimMsg::$variant(msg) => msg.encode(buffer), )+
                }
            }
        }

        $(
            impl From<$ty> for SimMsg {
                #[inline]
                fn from(msg: $ty) -> SimMsg {
                    SimMsg::$variant(msg)
                }
            }
        )+
    };
}

sim_messages! {
    // Middleware: logging, lifecycle, time synchronization, discovery.
    LogMsg(logmsg::LogMsg) { serdes: "LogMsg", version: 1, hist: 0, kind: MiddlewareMessage }
    NextSimTask(sync::NextSimTask) { serdes: "NextSimTask", version: 1, hist: 0, kind: MiddlewareMessage }
    SystemCommand(sync::SystemCommand) { serdes: "SystemCommand", version: 1, hist: 0, kind: MiddlewareMessage }
    ParticipantCommand(sync::ParticipantCommand) { serdes: "ParticipantCommand", version: 1, hist: 0, kind: MiddlewareMessage }
    ParticipantStatus(sync::ParticipantStatus) { serdes: "ParticipantStatus", version: 1, hist: 1, kind: MiddlewareMessage }
    ExpectedParticipants(sync::ExpectedParticipants) { serdes: "ExpectedParticipants", version: 1, hist: 0, kind: MiddlewareMessage }
    ParticipantDiscoveryEvent(discovery::ParticipantDiscoveryEvent) { serdes: "ServiceAnnouncement", version: 1, hist: 1, kind: MiddlewareMessage }
    ServiceDiscoveryEvent(discovery::ServiceDiscoveryEvent) { serdes: "ServiceDiscoveryEvent", version: 1, hist: 0, kind: MiddlewareMessage }

    // Generic publish/subscribe and RPC.
    DataMessageEvent(data::DataMessageEvent) { serdes: "DataMessageEvent", version: 1, hist: 0, kind: SimulationMessage }
    FunctionCall(rpc::FunctionCall) { serdes: "FunctionCall", version: 1, hist: 0, kind: SimulationMessage }
    FunctionCallResponse(rpc::FunctionCallResponse) { serdes: "FunctionCallResponse", version: 1, hist: 0, kind: SimulationMessage }

    // CAN.
    CanFrameEvent(can::CanFrameEvent) { serdes: "CanMessage", version: 1, hist: 0, kind: SimulationMessage }
    CanFrameTransmitEvent(can::CanFrameTransmitEvent) { serdes: "CanTransmitAcknowledge", version: 1, hist: 0, kind: SimulationMessage }
    CanControllerStatus(can::CanControllerStatus) { serdes: "CanControllerStatus", version: 1, hist: 0, kind: SimulationMessage }
    CanConfigureBaudrate(can::CanConfigureBaudrate) { serdes: "CanConfigureBaudrate", version: 1, hist: 0, kind: SimulationMessage }
    CanSetControllerMode(can::CanSetControllerMode) { serdes: "CanSetControllerMode", version: 1, hist: 0, kind: SimulationMessage }

    // Ethernet.
    EthernetFrameEvent(eth::EthernetFrameEvent) { serdes: "EthMessage", version: 1, hist: 0, kind: SimulationMessage }
    EthernetFrameTransmitEvent(eth::EthernetFrameTransmitEvent) { serdes: "EthTransmitAcknowledge", version: 1, hist: 0, kind: SimulationMessage }
    EthernetStatus(eth::EthernetStatus) { serdes: "EthStatus", version: 1, hist: 0, kind: SimulationMessage }
    EthernetSetMode(eth::EthernetSetMode) { serdes: "EthSetMode", version: 1, hist: 0, kind: SimulationMessage }

    // LIN.
    LinSendFrameRequest(lin::LinSendFrameRequest) { serdes: "LinSendFrameRequest", version: 1, hist: 0, kind: SimulationMessage }
    LinSendFrameHeaderRequest(lin::LinSendFrameHeaderRequest) { serdes: "LinSendFrameHeaderRequest", version: 1, hist: 0, kind: SimulationMessage }
    LinTransmission(lin::LinTransmission) { serdes: "LinTransmission", version: 1, hist: 0, kind: SimulationMessage }
    LinWakeupPulse(lin::LinWakeupPulse) { serdes: "LinWakeupPulse", version: 1, hist: 0, kind: SimulationMessage }
    LinControllerConfig(lin::LinControllerConfig) { serdes: "LinControllerConfig", version: 1, hist: 0, kind: SimulationMessage }
    LinControllerStatusUpdate(lin::LinControllerStatusUpdate) { serdes: "LinControllerStatusUpdate", version: 1, hist: 0, kind: SimulationMessage }
    LinFrameResponseUpdate(lin::LinFrameResponseUpdate) { serdes: "LinFrameResponseUpdate", version: 1, hist: 0, kind: SimulationMessage }

    // FlexRay.
    FlexrayFrameEvent(flexray::FlexrayFrameEvent) { serdes: "FrMessage", version: 1, hist: 0, kind: SimulationMessage }
    FlexrayFrameTransmitEvent(flexray::FlexrayFrameTransmitEvent) { serdes: "FrMessageAck", version: 1, hist: 0, kind: SimulationMessage }
    FlexraySymbolEvent(flexray::FlexraySymbolEvent) { serdes: "FrSymbol", version: 1, hist: 0, kind: SimulationMessage }
    FlexraySymbolTransmitEvent(flexray::FlexraySymbolTransmitEvent) { serdes: "FrSymbolAck", version: 1, hist: 0, kind: SimulationMessage }
    FlexrayCycleStartEvent(flexray::FlexrayCycleStartEvent) { serdes: "CycleStart", version: 1, hist: 0, kind: SimulationMessage }
    FlexrayHostCommand(flexray::FlexrayHostCommand) { serdes: "HostCommand", version: 1, hist: 0, kind: SimulationMessage }
    FlexrayControllerConfig(flexray::FlexrayControllerConfig) { serdes: "ControllerConfig", version: 1, hist: 0, kind: SimulationMessage }
    FlexrayTxBufferConfigUpdate(flexray::FlexrayTxBufferConfigUpdate) { serdes: "TxBufferConfigUpdate", version: 1, hist: 0, kind: SimulationMessage }
    FlexrayTxBufferUpdate(flexray::FlexrayTxBufferUpdate) { serdes: "TxBufferUpdate", version: 1, hist: 0, kind: SimulationMessage }
    FlexrayPocStatusEvent(flexray::FlexrayPocStatusEvent) { serdes: "PocStatus", version: 1, hist: 0, kind: SimulationMessage }
}

impl MsgType {
    /// Selects the local message type for an announced subscription: the
    /// type whose serdes name matches and whose codec version is the largest
    /// one not newer than the announced version. Returns `None` when the
    /// serdes name is unknown or every local codec is newer than what the
    /// remote can decode.
    pub fn best_match(serdes_name: &str, announced_version: u32) -> Option<MsgType> {
        MsgType::ALL
            .iter()
            .copied()
            .filter(|mt| mt.serdes_name() == serdes_name && mt.version() <= announced_version)
            .max_by_key(|mt| mt.version())
    }

    /// Finds any type by serdes name, ignoring the version.
    pub fn by_serdes_name(serdes_name: &str) -> Option<MsgType> {
        MsgType::ALL.iter().copied().find(|mt| mt.serdes_name() == serdes_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_of_message() {
        let msg = SimMsg::from(can::CanFrameEvent::default());
        assert_eq!(MsgType::of(&msg), MsgType::CanFrameEvent);
    }

    #[test]
    fn test_serdes_names_are_frozen() {
        assert_eq!(MsgType::CanFrameEvent.serdes_name(), "CanMessage");
        assert_eq!(MsgType::EthernetFrameEvent.serdes_name(), "EthMessage");
        assert_eq!(MsgType::FlexrayFrameEvent.serdes_name(), "FrMessage");
        assert_eq!(MsgType::ParticipantDiscoveryEvent.serdes_name(), "ServiceAnnouncement");
    }

    #[test]
    fn test_serdes_names_are_unique() {
        for (i, a) in MsgType::ALL.iter().enumerate() {
            for b in &MsgType::ALL[i + 1..] {
                assert_ne!(a.serdes_name(), b.serdes_name(), "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_history_only_on_lifecycle_types() {
        for mt in MsgType::ALL {
            let expected = matches!(mt, MsgType::ParticipantStatus | MsgType::ParticipantDiscoveryEvent);
            assert_eq!(mt.hist_size() == 1, expected, "{:?}", mt);
        }
    }

    #[test]
    fn test_payload_dispatch_roundtrip() {
        let original = SimMsg::from(can::CanFrameEvent {
            transmit_id: 1,
            timestamp: 2,
            can_id: 5,
            flags: 0,
            dlc: 7,
            data: vec![1, 2, 3, 4, 5, 6, 1],
        });

        let mut buffer = MessageBuffer::new();
        original.encode(&mut buffer);

        let decoded = MsgType::of(&original).decode_payload(&mut buffer).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_best_match_version_rules() {
        // Exact version matches.
        assert_eq!(MsgType::best_match("CanMessage", 1), Some(MsgType::CanFrameEvent));
        // A newer remote still matches our older codec.
        assert_eq!(MsgType::best_match("CanMessage", 7), Some(MsgType::CanFrameEvent));
        // A remote older than any local codec has no match.
        assert_eq!(MsgType::best_match("CanMessage", 0), None);
        // Unknown serdes name.
        assert_eq!(MsgType::best_match("NoSuchMessage", 1), None);
        assert_eq!(MsgType::by_serdes_name("NoSuchMessage"), None);
    }

    #[test]
    fn test_wire_kind_split() {
        assert_eq!(MsgType::ParticipantStatus.wire_kind(), MsgKind::MiddlewareMessage);
        assert_eq!(MsgType::LogMsg.wire_kind(), MsgKind::MiddlewareMessage);
        assert_eq!(MsgType::CanFrameEvent.wire_kind(), MsgKind::SimulationMessage);
        assert_eq!(MsgType::DataMessageEvent.wire_kind(), MsgKind::SimulationMessage);
    }
}
