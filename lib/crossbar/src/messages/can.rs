//! CAN bus messages. Frame flag bits follow the controller convention:
//! bit 0 = IDE (extended identifier), bit 1 = RTR (remote transmission
//! request), bit 2 = FDF (CAN FD format), bit 3 = BRS (bit rate switch),
//! bit 4 = ESI (error state indicator).

use crate::error::{Error, Result};
use crate::messages::SimTime;
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

pub type CanTxId = u32;

/// A CAN frame observed on or injected into the bus.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CanFrameEvent {
    pub transmit_id: CanTxId,
    pub timestamp: SimTime,
    pub can_id: u32,
    pub flags: u8,
    pub dlc: u8,
    pub data: Vec<u8>,
}

impl Encode for CanFrameEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u32(self.transmit_id);
        buffer.write_i64(self.timestamp);
        buffer.write_u32(self.can_id);
        buffer.write_u8(self.flags);
        buffer.write_u8(self.dlc);
        buffer.write_bytes(&self.data);
    }
}

impl Decode for CanFrameEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<CanFrameEvent> {
        Ok(CanFrameEvent {
            transmit_id: buffer.read_u32()?,
            timestamp: buffer.read_i64()?,
            can_id: buffer.read_u32()?,
            flags: buffer.read_u8()?,
            dlc: buffer.read_u8()?,
            data: buffer.read_bytes()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum CanTransmitStatus {
    Transmitted = 0,
    Canceled = 1,
    TransmitQueueFull = 2,
    DuplicatedTransmitId = 3,
}

impl CanTransmitStatus {
    pub fn from_u8(value: u8) -> Result<CanTransmitStatus> {
        match value {
            0 => Ok(CanTransmitStatus::Transmitted),
            1 => Ok(CanTransmitStatus::Canceled),
            2 => Ok(CanTransmitStatus::TransmitQueueFull),
            3 => Ok(CanTransmitStatus::DuplicatedTransmitId),
            other => Err(Error::Protocol(format!("invalid CAN transmit status {}", other))),
        }
    }
}

/// Acknowledges a frame transmission request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CanFrameTransmitEvent {
    pub transmit_id: CanTxId,
    pub timestamp: SimTime,
    pub status: CanTransmitStatus,
}

impl Encode for CanFrameTransmitEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u32(self.transmit_id);
        buffer.write_i64(self.timestamp);
        buffer.write_u8(self.status as u8);
    }
}

impl Decode for CanFrameTransmitEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<CanFrameTransmitEvent> {
        Ok(CanFrameTransmitEvent {
            transmit_id: buffer.read_u32()?,
            timestamp: buffer.read_i64()?,
            status: CanTransmitStatus::from_u8(buffer.read_u8()?)?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum CanControllerState {
    Uninit = 0,
    Stopped = 1,
    Started = 2,
    Sleep = 3,
}

impl CanControllerState {
    pub fn from_u8(value: u8) -> Result<CanControllerState> {
        match value {
            0 => Ok(CanControllerState::Uninit),
            1 => Ok(CanControllerState::Stopped),
            2 => Ok(CanControllerState::Started),
            3 => Ok(CanControllerState::Sleep),
            other => Err(Error::Protocol(format!("invalid CAN controller state {}", other))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum CanErrorState {
    NotAvailable = 0,
    ErrorActive = 1,
    ErrorPassive = 2,
    BusOff = 3,
}

impl CanErrorState {
    pub fn from_u8(value: u8) -> Result<CanErrorState> {
        match value {
            0 => Ok(CanErrorState::NotAvailable),
            1 => Ok(CanErrorState::ErrorActive),
            2 => Ok(CanErrorState::ErrorPassive),
            3 => Ok(CanErrorState::BusOff),
            other => Err(Error::Protocol(format!("invalid CAN error state {}", other))),
        }
    }
}

/// Periodic controller state report from a simulated CAN controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CanControllerStatus {
    pub timestamp: SimTime,
    pub controller_state: CanControllerState,
    pub error_state: CanErrorState,
}

impl Encode for CanControllerStatus {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.timestamp);
        buffer.write_u8(self.controller_state as u8);
        buffer.write_u8(self.error_state as u8);
    }
}

impl Decode for CanControllerStatus {
    fn decode(buffer: &mut MessageBuffer) -> Result<CanControllerStatus> {
        Ok(CanControllerStatus {
            timestamp: buffer.read_i64()?,
            controller_state: CanControllerState::from_u8(buffer.read_u8()?)?,
            error_state: CanErrorState::from_u8(buffer.read_u8()?)?,
        })
    }
}

/// Baud rate configuration for classic and FD operation.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CanConfigureBaudrate {
    pub rate: u32,
    pub fd_rate: u32,
}

impl Encode for CanConfigureBaudrate {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u32(self.rate);
        buffer.write_u32(self.fd_rate);
    }
}

impl Decode for CanConfigureBaudrate {
    fn decode(buffer: &mut MessageBuffer) -> Result<CanConfigureBaudrate> {
        Ok(CanConfigureBaudrate {
            rate: buffer.read_u32()?,
            fd_rate: buffer.read_u32()?,
        })
    }
}

/// Mode change request towards a simulated controller. `flags` bit 0 resets
/// error handling, bit 1 cancels pending transmit requests.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CanSetControllerMode {
    pub flags: u8,
    pub mode: CanControllerState,
}

impl Encode for CanSetControllerMode {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u8(self.flags);
        buffer.write_u8(self.mode as u8);
    }
}

impl Decode for CanSetControllerMode {
    fn decode(buffer: &mut MessageBuffer) -> Result<CanSetControllerMode> {
        Ok(CanSetControllerMode {
            flags: buffer.read_u8()?,
            mode: CanControllerState::from_u8(buffer.read_u8()?)?,
        })
    }
}
