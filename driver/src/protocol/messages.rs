//! Messages exchanged between coordinator and workers
//!
//! Each message belongs to exactly one logical channel. A receiver always
//! names the channel it expects, so control, common, input and output traffic
//! never mix.

use crate::errors::Result;
use crate::job::{CommonParams, InputColumns, JobHeader, OutputColumns};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Control signal sent to each worker before anything else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    /// Terminate without reading any further channel
    Exit,
    /// Proceed to receive common parameters and an input slice
    Go,
}

impl Opcode {
    /// Numeric value of the opcode (EXIT = 0, GO = 1)
    pub fn code(self) -> i32 {
        match self {
            Opcode::Exit => 0,
            Opcode::Go => 1,
        }
    }
}

/// Logical channel a message travels on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Control,
    Common,
    Input,
    Output,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Control,
        Channel::Common,
        Channel::Input,
        Channel::Output,
    ];

    /// Numeric tag of the channel
    pub fn tag(self) -> u8 {
        match self {
            Channel::Control => 0,
            Channel::Common => 1,
            Channel::Input => 2,
            Channel::Output => 3,
        }
    }

    /// Position of the channel in [`Channel::ALL`]
    pub fn index(self) -> usize {
        self.tag() as usize
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Control => write!(f, "control"),
            Channel::Common => write!(f, "common"),
            Channel::Input => write!(f, "input"),
            Channel::Output => write!(f, "output"),
        }
    }
}

/// A protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// GO or EXIT
    Opcode(Opcode),
    /// Job header and parameters shared by every sample
    ///
    /// The header lets the worker derive its own slice length from the
    /// partition.
    CommonParams {
        job_id: Uuid,
        header: JobHeader,
        params: CommonParams,
    },
    /// The worker's input samples
    InputSlice(InputColumns),
    /// The worker's results, index-aligned with its input slice
    OutputSlice(OutputColumns),
}

impl Message {
    /// Channel this message travels on
    pub fn channel(&self) -> Channel {
        match self {
            Message::Opcode(_) => Channel::Control,
            Message::CommonParams { .. } => Channel::Common,
            Message::InputSlice(_) => Channel::Input,
            Message::OutputSlice(_) => Channel::Output,
        }
    }

    /// Short name for logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Opcode(_) => "Opcode",
            Message::CommonParams { .. } => "CommonParams",
            Message::InputSlice(_) => "InputSlice",
            Message::OutputSlice(_) => "OutputSlice",
        }
    }

    /// Serialize to CBOR bytes
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        Ok(ciborium::from_reader(bytes)?)
    }
}
