//! Service discovery events: participants announce their created and
//! removed services so peers can spawn matching internal counterparts.

use crate::error::{Error, Result};
use crate::service::ServiceDescriptor;
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

/// A participant's full service inventory, sent once on attachment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParticipantDiscoveryEvent {
    pub participant_name: String,
    pub version: u64,
    pub services: Vec<ServiceDescriptor>,
}

impl Encode for ParticipantDiscoveryEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_string(&self.participant_name);
        buffer.write_u64(self.version);
        buffer.write_seq(&self.services);
    }
}

impl Decode for ParticipantDiscoveryEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<ParticipantDiscoveryEvent> {
        Ok(ParticipantDiscoveryEvent {
            participant_name: buffer.read_string()?,
            version: buffer.read_u64()?,
            services: buffer.read_seq()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ServiceDiscoveryEventType {
    Invalid = 0,
    ServiceCreated = 1,
    ServiceRemoved = 2,
}

impl ServiceDiscoveryEventType {
    pub fn from_u8(value: u8) -> Result<ServiceDiscoveryEventType> {
        match value {
            0 => Ok(ServiceDiscoveryEventType::Invalid),
            1 => Ok(ServiceDiscoveryEventType::ServiceCreated),
            2 => Ok(ServiceDiscoveryEventType::ServiceRemoved),
            other => Err(Error::Protocol(format!("invalid discovery event type {}", other))),
        }
    }
}

/// Incremental change to a participant's service inventory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceDiscoveryEvent {
    pub event_type: ServiceDiscoveryEventType,
    pub service: ServiceDescriptor,
}

impl Encode for ServiceDiscoveryEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u8(self.event_type as u8);
        self.service.encode(buffer);
    }
}

impl Decode for ServiceDiscoveryEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<ServiceDiscoveryEvent> {
        Ok(ServiceDiscoveryEvent {
            event_type: ServiceDiscoveryEventType::from_u8(buffer.read_u8()?)?,
            service: ServiceDescriptor::decode(buffer)?,
        })
    }
}
