//! Lifecycle and time-synchronization messages. The core treats these as
//! ordinary typed payloads; their service semantics live outside this crate.

use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::messages::SimTime;
use crate::service::ParticipantId;
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ParticipantState {
    Invalid = 0,
    Idle = 1,
    Initializing = 2,
    Initialized = 3,
    Running = 4,
    Paused = 5,
    Stopping = 6,
    Stopped = 7,
    Error = 8,
    ShuttingDown = 9,
    Shutdown = 10,
}

impl ParticipantState {
    pub fn from_u8(value: u8) -> Result<ParticipantState> {
        match value {
            0 => Ok(ParticipantState::Invalid),
            1 => Ok(ParticipantState::Idle),
            2 => Ok(ParticipantState::Initializing),
            3 => Ok(ParticipantState::Initialized),
            4 => Ok(ParticipantState::Running),
            5 => Ok(ParticipantState::Paused),
            6 => Ok(ParticipantState::Stopping),
            7 => Ok(ParticipantState::Stopped),
            8 => Ok(ParticipantState::Error),
            9 => Ok(ParticipantState::ShuttingDown),
            10 => Ok(ParticipantState::Shutdown),
            other => Err(Error::Protocol(format!("invalid participant state {}", other))),
        }
    }
}

/// Current lifecycle state of one participant. Published on the `"default"`
/// lifecycle network with a one-slot history so late joiners observe the
/// last known state on attachment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParticipantStatus {
    pub participant_name: String,
    pub state: ParticipantState,
    pub enter_reason: String,
    pub enter_time: SystemTime,
    pub refresh_time: SystemTime,
}

impl Encode for ParticipantStatus {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_string(&self.participant_name);
        buffer.write_u8(self.state as u8);
        buffer.write_string(&self.enter_reason);
        buffer.write_time(self.enter_time);
        buffer.write_time(self.refresh_time);
    }
}

impl Decode for ParticipantStatus {
    fn decode(buffer: &mut MessageBuffer) -> Result<ParticipantStatus> {
        Ok(ParticipantStatus {
            participant_name: buffer.read_string()?,
            state: ParticipantState::from_u8(buffer.read_u8()?)?,
            enter_reason: buffer.read_string()?,
            enter_time: buffer.read_time()?,
            refresh_time: buffer.read_time()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ParticipantCommandKind {
    Invalid = 0,
    Initialize = 1,
    Run = 2,
    Stop = 3,
    Restart = 4,
    Shutdown = 5,
}

impl ParticipantCommandKind {
    pub fn from_u8(value: u8) -> Result<ParticipantCommandKind> {
        match value {
            0 => Ok(ParticipantCommandKind::Invalid),
            1 => Ok(ParticipantCommandKind::Initialize),
            2 => Ok(ParticipantCommandKind::Run),
            3 => Ok(ParticipantCommandKind::Stop),
            4 => Ok(ParticipantCommandKind::Restart),
            5 => Ok(ParticipantCommandKind::Shutdown),
            other => Err(Error::Protocol(format!("invalid participant command {}", other))),
        }
    }
}

/// A command addressed at a single participant, typically sent targeted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ParticipantCommand {
    pub participant: ParticipantId,
    pub kind: ParticipantCommandKind,
}

impl Encode for ParticipantCommand {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u64(self.participant);
        buffer.write_u8(self.kind as u8);
    }
}

impl Decode for ParticipantCommand {
    fn decode(buffer: &mut MessageBuffer) -> Result<ParticipantCommand> {
        Ok(ParticipantCommand {
            participant: buffer.read_u64()?,
            kind: ParticipantCommandKind::from_u8(buffer.read_u8()?)?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum SystemCommandKind {
    Invalid = 0,
    Run = 1,
    Stop = 2,
    Shutdown = 3,
    AbortSimulation = 4,
}

impl SystemCommandKind {
    pub fn from_u8(value: u8) -> Result<SystemCommandKind> {
        match value {
            0 => Ok(SystemCommandKind::Invalid),
            1 => Ok(SystemCommandKind::Run),
            2 => Ok(SystemCommandKind::Stop),
            3 => Ok(SystemCommandKind::Shutdown),
            4 => Ok(SystemCommandKind::AbortSimulation),
            other => Err(Error::Protocol(format!("invalid system command {}", other))),
        }
    }
}

/// A command addressed at the whole simulation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SystemCommand {
    pub kind: SystemCommandKind,
}

impl Encode for SystemCommand {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u8(self.kind as u8);
    }
}

impl Decode for SystemCommand {
    fn decode(buffer: &mut MessageBuffer) -> Result<SystemCommand> {
        Ok(SystemCommand {
            kind: SystemCommandKind::from_u8(buffer.read_u8()?)?,
        })
    }
}

/// Announces the sender's next simulation step to the time-sync peers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NextSimTask {
    pub time_point: SimTime,
    pub duration: SimTime,
}

impl Encode for NextSimTask {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.time_point);
        buffer.write_i64(self.duration);
    }
}

impl Decode for NextSimTask {
    fn decode(buffer: &mut MessageBuffer) -> Result<NextSimTask> {
        Ok(NextSimTask {
            time_point: buffer.read_i64()?,
            duration: buffer.read_i64()?,
        })
    }
}

/// The set of participant names the system controller waits for.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExpectedParticipants {
    pub names: Vec<String>,
}

impl Encode for ExpectedParticipants {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_seq(&self.names);
    }
}

impl Decode for ExpectedParticipants {
    fn decode(buffer: &mut MessageBuffer) -> Result<ExpectedParticipants> {
        Ok(ExpectedParticipants {
            names: buffer.read_seq()?,
        })
    }
}
