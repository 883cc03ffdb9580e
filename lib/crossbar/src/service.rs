use std::collections::BTreeMap;
use std::fmt;

use plinth::hash::hash_str;

use crate::error::{Error, Result};
use crate::messages::{MsgType, SimMsg};
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

/// Stable 64-bit hash of the participant name.
pub type ParticipantId = u64;

/// Per-participant monotonically increasing counter of created services.
pub type EndpointId = u64;

/// The registry's reserved participant id.
pub const REGISTRY_PARTICIPANT_ID: ParticipantId = 0;

/// Derives the wire-visible participant id from the human-readable name.
#[inline]
pub fn participant_id_of(participant_name: &str) -> ParticipantId {
    hash_str(participant_name)
}

/// `(participant, endpoint)` pair identifying the sending service instance
/// of a simulation message.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct EndpointAddress {
    pub participant: ParticipantId,
    pub endpoint: EndpointId,
}

impl Encode for EndpointAddress {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u64(self.participant);
        buffer.write_u64(self.endpoint);
    }
}

impl Decode for EndpointAddress {
    fn decode(buffer: &mut MessageBuffer) -> Result<EndpointAddress> {
        Ok(EndpointAddress {
            participant: buffer.read_u64()?,
            endpoint: buffer.read_u64()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ServiceType {
    Undefined = 0,
    Link = 1,
    Controller = 2,
    SimulatedController = 3,
    InternalController = 4,
}

impl ServiceType {
    pub fn from_u8(value: u8) -> Result<ServiceType> {
        match value {
            0 => Ok(ServiceType::Undefined),
            1 => Ok(ServiceType::Link),
            2 => Ok(ServiceType::Controller),
            3 => Ok(ServiceType::SimulatedController),
            4 => Ok(ServiceType::InternalController),
            other => Err(Error::Protocol(format!("invalid service type {}", other))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum NetworkType {
    Undefined = 0,
    Can = 1,
    Lin = 2,
    Ethernet = 3,
    Flexray = 4,
    Data = 5,
    Rpc = 6,
}

impl NetworkType {
    pub fn from_u8(value: u8) -> Result<NetworkType> {
        match value {
            0 => Ok(NetworkType::Undefined),
            1 => Ok(NetworkType::Can),
            2 => Ok(NetworkType::Lin),
            3 => Ok(NetworkType::Ethernet),
            4 => Ok(NetworkType::Flexray),
            5 => Ok(NetworkType::Data),
            6 => Ok(NetworkType::Rpc),
            other => Err(Error::Protocol(format!("invalid network type {}", other))),
        }
    }
}

/// Well-known supplemental-data keys.
pub mod supplemental_keys {
    /// Kind of controller a service descriptor describes (e.g. "DataPublisher").
    pub const CONTROLLER_TYPE: &str = "controllerType";
    /// Topic of a data publisher/subscriber.
    pub const DATA_TOPIC: &str = "dataTopic";
    /// Function name of an RPC client/server.
    pub const RPC_FUNCTION_NAME: &str = "rpcFunctionName";
}

/// The logical sender identity attached to every message: who created the
/// service, on which network, and under which per-participant endpoint id.
///
/// Two descriptors are equal when participant id, network name, service type
/// and endpoint id all match; the remaining fields are descriptive only.
#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    participant_name: String,
    participant_id: ParticipantId,
    service_type: ServiceType,
    network_name: String,
    network_type: NetworkType,
    service_name: String,
    service_id: EndpointId,
    supplemental_data: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    pub fn new(participant_name: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            participant_name: participant_name.to_string(),
            participant_id: participant_id_of(participant_name),
            service_type: ServiceType::Undefined,
            network_name: String::new(),
            network_type: NetworkType::Undefined,
            service_name: String::new(),
            service_id: 0,
            supplemental_data: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn participant_name(&self) -> &str {
        &self.participant_name
    }

    /// Renames the descriptor, re-deriving the participant id.
    pub fn set_participant_name(&mut self, participant_name: &str) {
        self.participant_id = participant_id_of(participant_name);
        self.participant_name = participant_name.to_string();
    }

    #[inline]
    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    #[inline]
    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn set_service_type(&mut self, service_type: ServiceType) {
        self.service_type = service_type;
    }

    #[inline]
    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn set_network_name(&mut self, network_name: &str) {
        self.network_name = network_name.to_string();
    }

    #[inline]
    pub fn network_type(&self) -> NetworkType {
        self.network_type
    }

    pub fn set_network_type(&mut self, network_type: NetworkType) {
        self.network_type = network_type;
    }

    #[inline]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn set_service_name(&mut self, service_name: &str) {
        self.service_name = service_name.to_string();
    }

    #[inline]
    pub fn service_id(&self) -> EndpointId {
        self.service_id
    }

    pub fn set_service_id(&mut self, service_id: EndpointId) {
        self.service_id = service_id;
    }

    pub fn supplemental_data(&self) -> &BTreeMap<String, String> {
        &self.supplemental_data
    }

    pub fn supplemental_data_item(&self, key: &str) -> Option<&str> {
        self.supplemental_data.get(key).map(String::as_str)
    }

    pub fn set_supplemental_data_item(&mut self, key: &str, value: &str) {
        self.supplemental_data.insert(key.to_string(), value.to_string());
    }

    #[inline]
    pub fn endpoint_address(&self) -> EndpointAddress {
        EndpointAddress {
            participant: self.participant_id,
            endpoint: self.service_id,
        }
    }
}

impl PartialEq for ServiceDescriptor {
    fn eq(&self, other: &ServiceDescriptor) -> bool {
        self.participant_id == other.participant_id
            && self.network_name == other.network_name
            && self.service_type == other.service_type
            && self.service_id == other.service_id
    }
}

impl Eq for ServiceDescriptor {}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}/{:?}/{}/{}",
            self.participant_name, self.service_type, self.network_name, self.service_name
        )
    }
}

impl Encode for ServiceDescriptor {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_string(&self.participant_name);
        buffer.write_u8(self.service_type as u8);
        buffer.write_string(&self.network_name);
        buffer.write_u8(self.network_type as u8);
        buffer.write_string(&self.service_name);
        buffer.write_u64(self.service_id);
        buffer.write_string_map(&self.supplemental_data);
        buffer.write_u64(self.participant_id);
    }
}

impl Decode for ServiceDescriptor {
    fn decode(buffer: &mut MessageBuffer) -> Result<ServiceDescriptor> {
        let participant_name = buffer.read_string()?;
        let service_type = ServiceType::from_u8(buffer.read_u8()?)?;
        let network_name = buffer.read_string()?;
        let network_type = NetworkType::from_u8(buffer.read_u8()?)?;
        let service_name = buffer.read_string()?;
        let service_id = buffer.read_u64()?;
        let supplemental_data = buffer.read_string_map()?;
        let participant_id = buffer.read_u64()?;

        Ok(ServiceDescriptor {
            participant_name,
            participant_id,
            service_type,
            network_name,
            network_type,
            service_name,
            service_id,
            supplemental_data,
        })
    }
}

/// A registrable bus service: declares which message types it receives and
/// sends on its network, and handles delivered messages.
///
/// Registration is synchronous by default: `Connection::register_service`
/// returns once every connected peer has acknowledged the service's
/// subscriptions. Services that report `async_registration` skip the wait,
/// which makes them registrable from within a message-delivery callback on
/// the I/O thread (dynamically spawned internal subscribers).
pub trait Service: Send + Sync {
    fn descriptor(&self) -> &ServiceDescriptor;

    fn receive_types(&self) -> &[MsgType];

    fn send_types(&self) -> &[MsgType];

    fn async_registration(&self) -> bool {
        false
    }

    /// Called on the reactor thread for every message delivered to this
    /// service, together with the sender's descriptor so controller-level
    /// reception gating can be evaluated.
    fn receive(&self, from: &ServiceDescriptor, msg: &SimMsg);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(participant: &str, network: &str, service_id: EndpointId) -> ServiceDescriptor {
        let mut desc = ServiceDescriptor::new(participant);
        desc.set_service_type(ServiceType::Controller);
        desc.set_network_name(network);
        desc.set_network_type(NetworkType::Can);
        desc.set_service_name("CanCtrl1");
        desc.set_service_id(service_id);
        desc
    }

    #[test]
    fn test_participant_id_is_name_hash() {
        let desc = ServiceDescriptor::new("NodeA");
        assert_eq!(desc.participant_id(), hash_str("NodeA"));

        let mut renamed = desc.clone();
        renamed.set_participant_name("NodeB");
        assert_eq!(renamed.participant_id(), hash_str("NodeB"));
    }

    #[test]
    fn test_equality_ignores_descriptive_fields() {
        let mut a = descriptor("NodeA", "CAN1", 7);
        let mut b = descriptor("NodeA", "CAN1", 7);

        a.set_service_name("first");
        b.set_service_name("second");
        b.set_supplemental_data_item(supplemental_keys::CONTROLLER_TYPE, "CanController");

        assert_eq!(a, b);

        let c = descriptor("NodeA", "CAN2", 7);
        assert_ne!(a, c);

        let d = descriptor("NodeA", "CAN1", 8);
        assert_ne!(a, d);
    }

    #[test]
    fn test_endpoint_address() {
        let desc = descriptor("NodeA", "CAN1", 7);
        let addr = desc.endpoint_address();

        assert_eq!(addr.participant, hash_str("NodeA"));
        assert_eq!(addr.endpoint, 7);
    }

    #[test]
    fn test_descriptor_codec_roundtrip() {
        let mut desc = descriptor("NodeA", "CAN1", 7);
        desc.set_supplemental_data_item(supplemental_keys::CONTROLLER_TYPE, "CanController");

        let mut buffer = MessageBuffer::new();
        desc.encode(&mut buffer);

        let decoded = ServiceDescriptor::decode(&mut buffer).unwrap();
        assert_eq!(decoded, desc);
        assert_eq!(decoded.participant_name(), "NodeA");
        assert_eq!(decoded.service_name(), "CanCtrl1");
        assert_eq!(
            decoded.supplemental_data_item(supplemental_keys::CONTROLLER_TYPE),
            Some("CanController")
        );
    }

    #[test]
    fn test_invalid_enum_values() {
        assert!(ServiceType::from_u8(9).is_err());
        assert!(NetworkType::from_u8(9).is_err());
    }
}
