//! Rank 0: load, partition, distribute, compute the tail, gather, persist

use crate::cli::JobPaths;
use crate::compute::{compute_range, ComputeStats};
use crate::config::FailurePolicy;
use crate::errors::{DriverError, Result};
use crate::job::{self, Job, OutputColumns, OutputFile};
use crate::kernel::PhysicsKernel;
use crate::partition::{partition, Partition};
use crate::protocol::parts::INPUT_SAMPLE_BYTES;
use crate::protocol::{part_ranges, samples_per_part, Channel, Message, Opcode, SliceAssembly};
use crate::transport::{Rank, Transport};
use std::path::Path;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Coordinator side of a run
///
/// `transport` is `None` in a single-process group, in which case no
/// message is ever sent.
pub struct Coordinator<'a, T: Transport> {
    transport: Option<T>,
    kernel: &'a dyn PhysicsKernel,
    on_failure: FailurePolicy,
    job_id: Uuid,
}

impl<'a, T: Transport> Coordinator<'a, T> {
    pub fn new(
        transport: Option<T>,
        kernel: &'a dyn PhysicsKernel,
        on_failure: FailurePolicy,
    ) -> Self {
        Self {
            transport,
            kernel,
            on_failure,
            job_id: Uuid::new_v4(),
        }
    }

    /// Processes in the group, coordinator included
    pub fn world_size(&self) -> usize {
        self.transport.as_ref().map_or(1, |t| t.world_size())
    }

    /// Full traversal: setup, then the job
    ///
    /// Any setup failure, `paths` included, broadcasts EXIT before the
    /// error is returned. A failure after setup removes the output file.
    pub async fn run(&mut self, paths: Result<JobPaths>) -> Result<ComputeStats> {
        let (job, output) = match paths.and_then(|paths| self.setup(&paths)) {
            Ok(ready) => ready,
            Err(e) => {
                warn!(error = %e, "Setup failed");
                self.abort().await;
                return Err(e);
            }
        };

        let output_path = output.path().to_path_buf();
        let result = self.execute(&job, output).await;
        if result.is_err() {
            job::discard_output(&output_path);
        }
        result
    }

    async fn execute(&mut self, job: &Job, output: OutputFile) -> Result<ComputeStats> {
        let partition = partition(job.header.ntimes, self.world_size());
        info!(
            job_id = %self.job_id,
            ntimes = partition.ntimes,
            world_size = partition.world_size,
            chunk = partition.chunk,
            coordinator_range = ?partition.coordinator_range(),
            "Partitioned job"
        );

        self.distribute(job, &partition).await?;

        let mut outputs = OutputColumns::with_len(job.header.ntimes);
        let stats = self.compute_local_range(job, &partition, &mut outputs);
        stats.print_summary();

        self.gather_results(&partition, &mut outputs).await?;
        self.persist(output, &outputs)?;
        Ok(stats)
    }

    /// Load the job and create the output file
    fn setup(&self, paths: &JobPaths) -> Result<(Job, OutputFile)> {
        let job = self.load_job(&paths.input)?;
        let output = OutputFile::create(&paths.output)?;
        Ok((job, output))
    }

    pub fn load_job(&self, path: &Path) -> Result<Job> {
        job::load_job(path)
    }

    /// Send GO, the common parameters and the input slice to every worker,
    /// in increasing rank order
    ///
    /// A slice larger than the transport's message limit goes out as
    /// several consecutive parts.
    #[instrument(skip_all, fields(job_id = %self.job_id))]
    pub async fn distribute(&mut self, job: &Job, partition: &Partition) -> Result<()> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };
        let per_part = samples_per_part(transport.max_message_bytes(), INPUT_SAMPLE_BYTES);

        for rank in partition.worker_ranks() {
            let range = partition.range_for(rank);
            let parts = part_ranges(range.clone(), per_part);
            debug!(rank, range = ?range, parts = parts.len(), "Distributing slice");

            transport.send(rank, Message::Opcode(Opcode::Go)).await?;
            transport
                .send(
                    rank,
                    Message::CommonParams {
                        job_id: self.job_id,
                        header: job.header,
                        params: job.common.clone(),
                    },
                )
                .await?;
            for part in parts {
                transport
                    .send(rank, Message::InputSlice(job.inputs.slice(part)))
                    .await?;
            }
        }
        Ok(())
    }

    /// Run the kernel over the coordinator's own tail, in place
    pub fn compute_local_range(
        &self,
        job: &Job,
        partition: &Partition,
        outputs: &mut OutputColumns,
    ) -> ComputeStats {
        compute_range(
            self.kernel,
            &job.common,
            &job.inputs,
            partition.coordinator_range(),
            outputs,
        )
    }

    /// Receive every worker's results in increasing rank order and place
    /// them at the offset of that worker's range
    #[instrument(skip_all, fields(job_id = %self.job_id))]
    pub async fn gather_results(
        &mut self,
        partition: &Partition,
        outputs: &mut OutputColumns,
    ) -> Result<()> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };

        for rank in partition.worker_ranks() {
            let range = partition.range_for(rank);
            let mut assembly = SliceAssembly::new(range.len());
            let mut failed = 0;

            loop {
                let part = expect_output(transport.recv(rank, Channel::Output).await?, rank)?;
                let offset = range.start + assembly.received();
                if !part.is_consistent() || !assembly.accept(part.len()) {
                    return Err(DriverError::Protocol(format!(
                        "rank {} returned {} samples, expected {}",
                        rank,
                        assembly.received() + part.len(),
                        range.len()
                    )));
                }
                failed += part.failed_count();
                outputs.place(offset, &part);
                if assembly.is_complete() {
                    break;
                }
            }
            debug!(rank, range = ?range, failed, "Gathered slice");
        }

        info!(workers = partition.world_size - 1, "Gathered results");
        Ok(())
    }

    /// Apply the failure policy, then write the output file
    pub fn persist(&self, output: OutputFile, outputs: &OutputColumns) -> Result<()> {
        let failed = outputs.failed_count();
        if failed > 0 {
            match self.on_failure {
                FailurePolicy::Fail => {
                    return Err(DriverError::Kernel(format!(
                        "{} of {} samples failed",
                        failed,
                        outputs.len()
                    )));
                }
                FailurePolicy::Fill => {
                    warn!(failed, ntimes = outputs.len(), "Persisting failed samples as fill");
                }
            }
        }

        output.persist(outputs)
    }

    /// Tell every worker to exit without reading further
    ///
    /// Only valid before the first GO. Send failures are logged and the
    /// broadcast continues with the next rank.
    pub async fn abort(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        let world_size = transport.world_size();
        warn!(workers = world_size - 1, "Broadcasting EXIT");
        for rank in 1..world_size {
            if let Err(e) = transport.send(rank, Message::Opcode(Opcode::Exit)).await {
                warn!(rank, error = %e, "Could not deliver EXIT");
            }
        }
    }
}

fn expect_output(message: Message, rank: Rank) -> Result<OutputColumns> {
    match message {
        Message::OutputSlice(part) => Ok(part),
        other => Err(DriverError::Protocol(format!(
            "rank {} sent {} on the output channel",
            rank,
            other.kind()
        ))),
    }
}
