//! RPC call and response payloads. Call matching uses a 128-bit UUID split
//! into two words.

use crate::error::Result;
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CallUuid {
    pub ab: u64,
    pub cd: u64,
}

impl Encode for CallUuid {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u64(self.ab);
        buffer.write_u64(self.cd);
    }
}

impl Decode for CallUuid {
    fn decode(buffer: &mut MessageBuffer) -> Result<CallUuid> {
        Ok(CallUuid {
            ab: buffer.read_u64()?,
            cd: buffer.read_u64()?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FunctionCall {
    pub call_uuid: CallUuid,
    pub data: Vec<u8>,
}

impl Encode for FunctionCall {
    fn encode(&self, buffer: &mut MessageBuffer) {
        self.call_uuid.encode(buffer);
        buffer.write_bytes(&self.data);
    }
}

impl Decode for FunctionCall {
    fn decode(buffer: &mut MessageBuffer) -> Result<FunctionCall> {
        Ok(FunctionCall {
            call_uuid: CallUuid::decode(buffer)?,
            data: buffer.read_bytes()?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FunctionCallResponse {
    pub call_uuid: CallUuid,
    pub data: Vec<u8>,
}

impl Encode for FunctionCallResponse {
    fn encode(&self, buffer: &mut MessageBuffer) {
        self.call_uuid.encode(buffer);
        buffer.write_bytes(&self.data);
    }
}

impl Decode for FunctionCallResponse {
    fn decode(buffer: &mut MessageBuffer) -> Result<FunctionCallResponse> {
        Ok(FunctionCallResponse {
            call_uuid: CallUuid::decode(buffer)?,
            data: buffer.read_bytes()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_and_response_roundtrip() {
        let call = FunctionCall {
            call_uuid: CallUuid { ab: 1, cd: 2 },
            data: vec![1, 2, 3],
        };
        let response = FunctionCallResponse {
            call_uuid: call.call_uuid,
            data: vec![4, 5],
        };

        let mut buffer = MessageBuffer::new();
        call.encode(&mut buffer);
        response.encode(&mut buffer);

        assert_eq!(FunctionCall::decode(&mut buffer).unwrap(), call);
        assert_eq!(FunctionCallResponse::decode(&mut buffer).unwrap(), response);
    }
}
