//! LIN bus messages. A LIN frame always carries an 8-byte data array; the
//! `data_length` field says how many bytes are significant.

use crate::error::{Error, Result};
use crate::messages::SimTime;
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

/// Protected LIN identifier, 0..=63.
pub type LinId = u8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LinChecksumModel {
    Undefined = 0,
    Enhanced = 1,
    Classic = 2,
}

impl LinChecksumModel {
    pub fn from_u8(value: u8) -> Result<LinChecksumModel> {
        match value {
            0 => Ok(LinChecksumModel::Undefined),
            1 => Ok(LinChecksumModel::Enhanced),
            2 => Ok(LinChecksumModel::Classic),
            other => Err(Error::Protocol(format!("invalid LIN checksum model {}", other))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinFrame {
    pub id: LinId,
    pub checksum_model: LinChecksumModel,
    pub data_length: u8,
    pub data: [u8; 8],
}

impl Default for LinFrame {
    fn default() -> LinFrame {
        LinFrame {
            id: 0,
            checksum_model: LinChecksumModel::Undefined,
            data_length: 0,
            data: [0; 8],
        }
    }
}

impl Encode for LinFrame {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u8(self.id);
        buffer.write_u8(self.checksum_model as u8);
        buffer.write_u8(self.data_length);
        buffer.write_raw(&self.data);
    }
}

impl Decode for LinFrame {
    fn decode(buffer: &mut MessageBuffer) -> Result<LinFrame> {
        let id = buffer.read_u8()?;
        let checksum_model = LinChecksumModel::from_u8(buffer.read_u8()?)?;
        let data_length = buffer.read_u8()?;
        let mut data = [0u8; 8];
        buffer.read_raw(&mut data)?;

        Ok(LinFrame {
            id,
            checksum_model,
            data_length,
            data,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LinFrameResponseType {
    MasterResponse = 0,
    SlaveResponse = 1,
    SlaveToSlave = 2,
}

impl LinFrameResponseType {
    pub fn from_u8(value: u8) -> Result<LinFrameResponseType> {
        match value {
            0 => Ok(LinFrameResponseType::MasterResponse),
            1 => Ok(LinFrameResponseType::SlaveResponse),
            2 => Ok(LinFrameResponseType::SlaveToSlave),
            other => Err(Error::Protocol(format!("invalid LIN response type {}", other))),
        }
    }
}

/// Master request to transmit a full frame (header + response).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinSendFrameRequest {
    pub frame: LinFrame,
    pub response_type: LinFrameResponseType,
}

impl Encode for LinSendFrameRequest {
    fn encode(&self, buffer: &mut MessageBuffer) {
        self.frame.encode(buffer);
        buffer.write_u8(self.response_type as u8);
    }
}

impl Decode for LinSendFrameRequest {
    fn decode(buffer: &mut MessageBuffer) -> Result<LinSendFrameRequest> {
        Ok(LinSendFrameRequest {
            frame: LinFrame::decode(buffer)?,
            response_type: LinFrameResponseType::from_u8(buffer.read_u8()?)?,
        })
    }
}

/// Master request to transmit a bare frame header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinSendFrameHeaderRequest {
    pub timestamp: SimTime,
    pub id: LinId,
}

impl Encode for LinSendFrameHeaderRequest {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.timestamp);
        buffer.write_u8(self.id);
    }
}

impl Decode for LinSendFrameHeaderRequest {
    fn decode(buffer: &mut MessageBuffer) -> Result<LinSendFrameHeaderRequest> {
        Ok(LinSendFrameHeaderRequest {
            timestamp: buffer.read_i64()?,
            id: buffer.read_u8()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LinFrameStatus {
    NotOk = 0,
    TxOk = 1,
    RxOk = 2,
    TxBusy = 3,
    RxBusy = 4,
    RxError = 5,
    TxError = 6,
    RxNoResponse = 7,
}

impl LinFrameStatus {
    pub fn from_u8(value: u8) -> Result<LinFrameStatus> {
        match value {
            0 => Ok(LinFrameStatus::NotOk),
            1 => Ok(LinFrameStatus::TxOk),
            2 => Ok(LinFrameStatus::RxOk),
            3 => Ok(LinFrameStatus::TxBusy),
            4 => Ok(LinFrameStatus::RxBusy),
            5 => Ok(LinFrameStatus::RxError),
            6 => Ok(LinFrameStatus::TxError),
            7 => Ok(LinFrameStatus::RxNoResponse),
            other => Err(Error::Protocol(format!("invalid LIN frame status {}", other))),
        }
    }
}

/// A completed frame transmission as observed on the bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinTransmission {
    pub timestamp: SimTime,
    pub frame: LinFrame,
    pub status: LinFrameStatus,
}

impl Encode for LinTransmission {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.timestamp);
        self.frame.encode(buffer);
        buffer.write_u8(self.status as u8);
    }
}

impl Decode for LinTransmission {
    fn decode(buffer: &mut MessageBuffer) -> Result<LinTransmission> {
        Ok(LinTransmission {
            timestamp: buffer.read_i64()?,
            frame: LinFrame::decode(buffer)?,
            status: LinFrameStatus::from_u8(buffer.read_u8()?)?,
        })
    }
}

/// Wakeup pulse on the bus. `is_send` distinguishes the initiator's own
/// event from the observation at the other controllers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinWakeupPulse {
    pub timestamp: SimTime,
    pub is_send: bool,
}

impl Encode for LinWakeupPulse {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.timestamp);
        buffer.write_bool(self.is_send);
    }
}

impl Decode for LinWakeupPulse {
    fn decode(buffer: &mut MessageBuffer) -> Result<LinWakeupPulse> {
        Ok(LinWakeupPulse {
            timestamp: buffer.read_i64()?,
            is_send: buffer.read_bool()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LinControllerMode {
    Inactive = 0,
    Master = 1,
    Slave = 2,
}

impl LinControllerMode {
    pub fn from_u8(value: u8) -> Result<LinControllerMode> {
        match value {
            0 => Ok(LinControllerMode::Inactive),
            1 => Ok(LinControllerMode::Master),
            2 => Ok(LinControllerMode::Slave),
            other => Err(Error::Protocol(format!("invalid LIN controller mode {}", other))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LinFrameResponseMode {
    Unused = 0,
    Rx = 1,
    TxUnconditional = 2,
}

impl LinFrameResponseMode {
    pub fn from_u8(value: u8) -> Result<LinFrameResponseMode> {
        match value {
            0 => Ok(LinFrameResponseMode::Unused),
            1 => Ok(LinFrameResponseMode::Rx),
            2 => Ok(LinFrameResponseMode::TxUnconditional),
            other => Err(Error::Protocol(format!("invalid LIN response mode {}", other))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinFrameResponse {
    pub frame: LinFrame,
    pub response_mode: LinFrameResponseMode,
}

impl Encode for LinFrameResponse {
    fn encode(&self, buffer: &mut MessageBuffer) {
        self.frame.encode(buffer);
        buffer.write_u8(self.response_mode as u8);
    }
}

impl Decode for LinFrameResponse {
    fn decode(buffer: &mut MessageBuffer) -> Result<LinFrameResponse> {
        Ok(LinFrameResponse {
            frame: LinFrame::decode(buffer)?,
            response_mode: LinFrameResponseMode::from_u8(buffer.read_u8()?)?,
        })
    }
}

/// Announces a controller's operating mode, baud rate and configured frame
/// responses to the other controllers on the network.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinControllerConfig {
    pub controller_mode: LinControllerMode,
    pub baud_rate: u32,
    pub frame_responses: Vec<LinFrameResponse>,
}

impl Encode for LinControllerConfig {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u8(self.controller_mode as u8);
        buffer.write_u32(self.baud_rate);
        buffer.write_seq(&self.frame_responses);
    }
}

impl Decode for LinControllerConfig {
    fn decode(buffer: &mut MessageBuffer) -> Result<LinControllerConfig> {
        Ok(LinControllerConfig {
            controller_mode: LinControllerMode::from_u8(buffer.read_u8()?)?,
            baud_rate: buffer.read_u32()?,
            frame_responses: buffer.read_seq()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LinControllerStatus {
    Unknown = 0,
    Operational = 1,
    Sleep = 2,
    SleepPending = 3,
}

impl LinControllerStatus {
    pub fn from_u8(value: u8) -> Result<LinControllerStatus> {
        match value {
            0 => Ok(LinControllerStatus::Unknown),
            1 => Ok(LinControllerStatus::Operational),
            2 => Ok(LinControllerStatus::Sleep),
            3 => Ok(LinControllerStatus::SleepPending),
            other => Err(Error::Protocol(format!("invalid LIN controller status {}", other))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinControllerStatusUpdate {
    pub timestamp: SimTime,
    pub status: LinControllerStatus,
}

impl Encode for LinControllerStatusUpdate {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.timestamp);
        buffer.write_u8(self.status as u8);
    }
}

impl Decode for LinControllerStatusUpdate {
    fn decode(buffer: &mut MessageBuffer) -> Result<LinControllerStatusUpdate> {
        Ok(LinControllerStatusUpdate {
            timestamp: buffer.read_i64()?,
            status: LinControllerStatus::from_u8(buffer.read_u8()?)?,
        })
    }
}

/// Incremental update of a slave's configured frame responses.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LinFrameResponseUpdate {
    pub frame_responses: Vec<LinFrameResponse>,
}

impl Encode for LinFrameResponseUpdate {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_seq(&self.frame_responses);
    }
}

impl Decode for LinFrameResponseUpdate {
    fn decode(buffer: &mut MessageBuffer) -> Result<LinFrameResponseUpdate> {
        Ok(LinFrameResponseUpdate {
            frame_responses: buffer.read_seq()?,
        })
    }
}
