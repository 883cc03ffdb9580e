//! Ethernet messages. Frames are carried as raw bytes including the MAC
//! header; the core never inspects them.

use crate::error::{Error, Result};
use crate::messages::SimTime;
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

pub type EthernetTxId = u32;
pub type EthernetMac = [u8; 6];

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EthernetFrameEvent {
    pub transmit_id: EthernetTxId,
    pub timestamp: SimTime,
    pub frame: Vec<u8>,
}

impl Encode for EthernetFrameEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u32(self.transmit_id);
        buffer.write_i64(self.timestamp);
        buffer.write_bytes(&self.frame);
    }
}

impl Decode for EthernetFrameEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<EthernetFrameEvent> {
        Ok(EthernetFrameEvent {
            transmit_id: buffer.read_u32()?,
            timestamp: buffer.read_i64()?,
            frame: buffer.read_bytes()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum EthernetTransmitStatus {
    Transmitted = 0,
    InvalidFrameFormat = 1,
    Dropped = 2,
    DuplicatedTransmitId = 3,
    ControllerInactive = 4,
}

impl EthernetTransmitStatus {
    pub fn from_u8(value: u8) -> Result<EthernetTransmitStatus> {
        match value {
            0 => Ok(EthernetTransmitStatus::Transmitted),
            1 => Ok(EthernetTransmitStatus::InvalidFrameFormat),
            2 => Ok(EthernetTransmitStatus::Dropped),
            3 => Ok(EthernetTransmitStatus::DuplicatedTransmitId),
            4 => Ok(EthernetTransmitStatus::ControllerInactive),
            other => Err(Error::Protocol(format!("invalid ethernet transmit status {}", other))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EthernetFrameTransmitEvent {
    pub transmit_id: EthernetTxId,
    pub source_mac: EthernetMac,
    pub timestamp: SimTime,
    pub status: EthernetTransmitStatus,
}

impl Encode for EthernetFrameTransmitEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u32(self.transmit_id);
        buffer.write_raw(&self.source_mac);
        buffer.write_i64(self.timestamp);
        buffer.write_u8(self.status as u8);
    }
}

impl Decode for EthernetFrameTransmitEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<EthernetFrameTransmitEvent> {
        let transmit_id = buffer.read_u32()?;
        let mut source_mac = [0u8; 6];
        buffer.read_raw(&mut source_mac)?;

        Ok(EthernetFrameTransmitEvent {
            transmit_id,
            source_mac,
            timestamp: buffer.read_i64()?,
            status: EthernetTransmitStatus::from_u8(buffer.read_u8()?)?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum EthernetState {
    Inactive = 0,
    LinkDown = 1,
    LinkUp = 2,
}

impl EthernetState {
    pub fn from_u8(value: u8) -> Result<EthernetState> {
        match value {
            0 => Ok(EthernetState::Inactive),
            1 => Ok(EthernetState::LinkDown),
            2 => Ok(EthernetState::LinkUp),
            other => Err(Error::Protocol(format!("invalid ethernet state {}", other))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EthernetStatus {
    pub timestamp: SimTime,
    pub state: EthernetState,
    pub bitrate: u32,
}

impl Encode for EthernetStatus {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.timestamp);
        buffer.write_u8(self.state as u8);
        buffer.write_u32(self.bitrate);
    }
}

impl Decode for EthernetStatus {
    fn decode(buffer: &mut MessageBuffer) -> Result<EthernetStatus> {
        Ok(EthernetStatus {
            timestamp: buffer.read_i64()?,
            state: EthernetState::from_u8(buffer.read_u8()?)?,
            bitrate: buffer.read_u32()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum EthernetMode {
    Inactive = 0,
    Active = 1,
}

impl EthernetMode {
    pub fn from_u8(value: u8) -> Result<EthernetMode> {
        match value {
            0 => Ok(EthernetMode::Inactive),
            1 => Ok(EthernetMode::Active),
            other => Err(Error::Protocol(format!("invalid ethernet mode {}", other))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EthernetSetMode {
    pub mode: EthernetMode,
}

impl Encode for EthernetSetMode {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u8(self.mode as u8);
    }
}

impl Decode for EthernetSetMode {
    fn decode(buffer: &mut MessageBuffer) -> Result<EthernetSetMode> {
        Ok(EthernetSetMode {
            mode: EthernetMode::from_u8(buffer.read_u8()?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_event_roundtrip() {
        let event = EthernetFrameEvent {
            transmit_id: 3,
            timestamp: 500,
            frame: vec![0xff; 64],
        };

        let mut buffer = MessageBuffer::new();
        event.encode(&mut buffer);

        assert_eq!(EthernetFrameEvent::decode(&mut buffer).unwrap(), event);
    }

    #[test]
    fn test_transmit_event_roundtrip() {
        let ack = EthernetFrameTransmitEvent {
            transmit_id: 3,
            source_mac: [0, 1, 2, 3, 4, 5],
            timestamp: 501,
            status: EthernetTransmitStatus::Dropped,
        };

        let mut buffer = MessageBuffer::new();
        ack.encode(&mut buffer);

        assert_eq!(EthernetFrameTransmitEvent::decode(&mut buffer).unwrap(), ack);
    }

    #[test]
    fn test_status_and_mode_roundtrip() {
        let mut buffer = MessageBuffer::new();

        let status = EthernetStatus {
            timestamp: 1,
            state: EthernetState::LinkUp,
            bitrate: 100_000,
        };
        let mode = EthernetSetMode {
            mode: EthernetMode::Active,
        };

        status.encode(&mut buffer);
        mode.encode(&mut buffer);

        assert_eq!(EthernetStatus::decode(&mut buffer).unwrap(), status);
        assert_eq!(EthernetSetMode::decode(&mut buffer).unwrap(), mode);
    }
}
