//! The per-range compute loop shared by both roles

use crate::job::{CommonParams, InputColumns, OutputColumns, SampleOutput, SampleStatus};
use crate::kernel::PhysicsKernel;
use std::ops::Range;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one compute pass
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComputeStats {
    /// Samples processed
    pub samples: usize,
    /// Samples the kernel could not compute
    pub failed: usize,
    pub elapsed: Duration,
}

impl ComputeStats {
    /// Mean time per sample in milliseconds
    pub fn avg_sample_time_ms(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.elapsed.as_secs_f64() * 1000.0 / self.samples as f64
        }
    }

    pub fn print_summary(&self) {
        info!(
            samples = self.samples,
            failed = self.failed,
            elapsed_ms = self.elapsed.as_millis() as u64,
            avg_sample_time_ms = format!("{:.3}", self.avg_sample_time_ms()),
            "Compute finished"
        );
    }
}

/// Run `kernel` over `inputs[range]` in index order, writing each result to
/// the same index of `outputs`
///
/// Failed samples are stored as the fill value with status `Failed`.
///
/// # Panics
/// If `range` is out of bounds for `inputs` or `outputs`.
pub fn compute_range(
    kernel: &dyn PhysicsKernel,
    common: &CommonParams,
    inputs: &InputColumns,
    range: Range<usize>,
    outputs: &mut OutputColumns,
) -> ComputeStats {
    assert!(
        range.end <= inputs.len() && range.end <= outputs.len(),
        "range {:?} exceeds {} inputs / {} outputs",
        range,
        inputs.len(),
        outputs.len()
    );

    let start = Instant::now();
    let mut stats = ComputeStats {
        samples: range.len(),
        ..ComputeStats::default()
    };

    for i in range {
        let sample = inputs.sample(i);
        match kernel.compute(common, &sample) {
            Ok(output) => outputs.set(i, output, SampleStatus::Ok),
            Err(e) => {
                debug!(index = i, error = %e, "Sample failed");
                stats.failed += 1;
                outputs.set(i, SampleOutput::FILL, SampleStatus::Failed);
            }
        }
    }

    stats.elapsed = start.elapsed();
    if stats.failed > 0 {
        warn!(
            failed = stats.failed,
            samples = stats.samples,
            kernel = kernel.name(),
            "Kernel could not compute every sample"
        );
    }
    stats
}
