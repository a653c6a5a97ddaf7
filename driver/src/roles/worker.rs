//! One-shot worker traversal
//!
//! ```text
//! AWAIT_OPCODE ─ EXIT ─> terminate
//!      └─ GO ─> RECEIVE_COMMON ─> RECEIVE_SLICE ─> COMPUTE ─> SEND_RESULT ─> terminate
//! ```

use crate::compute::{compute_range, ComputeStats};
use crate::errors::{DriverError, Result};
use crate::job::{CommonParams, InputColumns, JobHeader, OutputColumns};
use crate::kernel::PhysicsKernel;
use crate::partition::partition;
use crate::protocol::parts::OUTPUT_SAMPLE_BYTES;
use crate::protocol::{part_ranges, samples_per_part, Channel, Message, Opcode, SliceAssembly};
use crate::transport::{Transport, COORDINATOR_RANK};
use tracing::{debug, info};
use uuid::Uuid;

/// Common parameters as received from the coordinator
#[derive(Debug, Clone)]
pub struct Assignment {
    pub job_id: Uuid,
    pub header: JobHeader,
    pub common: CommonParams,
}

pub struct Worker<'a, T: Transport> {
    transport: T,
    kernel: &'a dyn PhysicsKernel,
}

impl<'a, T: Transport> Worker<'a, T> {
    pub fn new(transport: T, kernel: &'a dyn PhysicsKernel) -> Self {
        Self { transport, kernel }
    }

    /// Walk the state machine once
    ///
    /// EXIT surfaces as [`DriverError::Aborted`].
    pub async fn run(mut self) -> Result<ComputeStats> {
        self.receive_opcode().await?;

        let assignment = self.receive_common().await?;
        let range = partition(assignment.header.ntimes, self.transport.world_size())
            .range_for(self.transport.rank());
        debug!(job_id = %assignment.job_id, range = ?range, "Received assignment");

        let slice = self.receive_slice(range.len()).await?;
        let (outputs, stats) = self.compute(&assignment.common, &slice);
        stats.print_summary();

        self.send_result(outputs).await?;
        Ok(stats)
    }

    /// Wait for GO; EXIT ends the traversal
    pub async fn receive_opcode(&mut self) -> Result<()> {
        match self
            .transport
            .recv(COORDINATOR_RANK, Channel::Control)
            .await?
        {
            Message::Opcode(Opcode::Go) => Ok(()),
            Message::Opcode(Opcode::Exit) => {
                info!("Coordinator sent EXIT");
                Err(DriverError::Aborted)
            }
            other => Err(unexpected(&other, Channel::Control)),
        }
    }

    pub async fn receive_common(&mut self) -> Result<Assignment> {
        match self
            .transport
            .recv(COORDINATOR_RANK, Channel::Common)
            .await?
        {
            Message::CommonParams {
                job_id,
                header,
                params,
            } => Ok(Assignment {
                job_id,
                header,
                common: params,
            }),
            other => Err(unexpected(&other, Channel::Common)),
        }
    }

    /// Receive the input slice, in as many parts as it was sent, and check
    /// it has the partition's length
    pub async fn receive_slice(&mut self, expected: usize) -> Result<InputColumns> {
        let mut assembly = SliceAssembly::new(expected);
        let mut slice = InputColumns::default();

        loop {
            let part = match self
                .transport
                .recv(COORDINATOR_RANK, Channel::Input)
                .await?
            {
                Message::InputSlice(part) => part,
                other => return Err(unexpected(&other, Channel::Input)),
            };

            if !part.is_consistent() || !assembly.accept(part.len()) {
                return Err(DriverError::Protocol(format!(
                    "received {} input samples, partition assigns {}",
                    assembly.received() + part.len(),
                    expected
                )));
            }
            slice.append(part);
            if assembly.is_complete() {
                return Ok(slice);
            }
        }
    }

    pub fn compute(
        &self,
        common: &CommonParams,
        slice: &InputColumns,
    ) -> (OutputColumns, ComputeStats) {
        let mut outputs = OutputColumns::with_len(slice.len());
        let stats = compute_range(self.kernel, common, slice, 0..slice.len(), &mut outputs);
        (outputs, stats)
    }

    /// Send the results back, split to fit the transport's message limit
    pub async fn send_result(&mut self, outputs: OutputColumns) -> Result<()> {
        let per_part = samples_per_part(self.transport.max_message_bytes(), OUTPUT_SAMPLE_BYTES);
        let parts = part_ranges(0..outputs.len(), per_part);
        if parts.len() == 1 {
            return self
                .transport
                .send(COORDINATOR_RANK, Message::OutputSlice(outputs))
                .await;
        }

        debug!(samples = outputs.len(), parts = parts.len(), "Sending results in parts");
        for range in parts {
            self.transport
                .send(COORDINATOR_RANK, Message::OutputSlice(outputs.slice(range)))
                .await?;
        }
        Ok(())
    }
}

fn unexpected(message: &Message, channel: Channel) -> DriverError {
    DriverError::Protocol(format!(
        "unexpected {} on the {} channel",
        message.kind(),
        channel
    ))
}
