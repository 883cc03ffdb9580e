//! Remote log distribution: a participant may forward its log records to
//! interested peers as ordinary middleware messages.

use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Critical = 5,
    Off = 6,
}

impl LogLevel {
    pub fn from_u8(value: u8) -> Result<LogLevel> {
        match value {
            0 => Ok(LogLevel::Trace),
            1 => Ok(LogLevel::Debug),
            2 => Ok(LogLevel::Info),
            3 => Ok(LogLevel::Warn),
            4 => Ok(LogLevel::Error),
            5 => Ok(LogLevel::Critical),
            6 => Ok(LogLevel::Off),
            other => Err(Error::Protocol(format!("invalid log level {}", other))),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SourceLoc {
    pub filename: String,
    pub line: u32,
    pub funcname: String,
}

impl Encode for SourceLoc {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_string(&self.filename);
        buffer.write_u32(self.line);
        buffer.write_string(&self.funcname);
    }
}

impl Decode for SourceLoc {
    fn decode(buffer: &mut MessageBuffer) -> Result<SourceLoc> {
        Ok(SourceLoc {
            filename: buffer.read_string()?,
            line: buffer.read_u32()?,
            funcname: buffer.read_string()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogMsg {
    pub logger_name: String,
    pub level: LogLevel,
    pub time: SystemTime,
    pub source: SourceLoc,
    pub payload: String,
}

impl Encode for LogMsg {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_string(&self.logger_name);
        buffer.write_u8(self.level as u8);
        buffer.write_time(self.time);
        self.source.encode(buffer);
        buffer.write_string(&self.payload);
    }
}

impl Decode for LogMsg {
    fn decode(buffer: &mut MessageBuffer) -> Result<LogMsg> {
        Ok(LogMsg {
            logger_name: buffer.read_string()?,
            level: LogLevel::from_u8(buffer.read_u8()?)?,
            time: buffer.read_time()?,
            source: SourceLoc::decode(buffer)?,
            payload: buffer.read_string()?,
        })
    }
}
