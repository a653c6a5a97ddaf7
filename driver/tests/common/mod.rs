//! Fixtures shared by the end-to-end tests

#![allow(dead_code)]

use multi_lstar::job::{
    write_job, CommonParams, Job, JobHeader, OutputColumns, SampleInput, SampleOutput,
    SampleStatus,
};
use multi_lstar::kernel::{KernelError, PhysicsKernel};
use std::path::Path;
use std::time::Duration;

/// A job of `n` samples on field lines L = 3 + i/10
pub fn sample_job(n: usize) -> Job {
    Job {
        header: JobHeader { ntimes: n },
        common: CommonParams {
            kext: 4,
            ..CommonParams::default()
        },
        inputs: (0..n)
            .map(|i| SampleInput {
                iyear: 2017,
                idoy: 250,
                ut: i as f64,
                x1: 3.0 + 0.1 * i as f64,
                x2: 0.5,
                x3: 0.2,
                alpha: 30.0 + (i % 6) as f64 * 10.0,
            })
            .collect(),
    }
}

pub fn write_sample_job(path: &Path, n: usize) -> Job {
    let job = sample_job(n);
    write_job(path, &job).unwrap();
    job
}

/// What a single process computing every sample in order would produce
pub fn expected_outputs(kernel: &dyn PhysicsKernel, job: &Job) -> OutputColumns {
    let mut outputs = OutputColumns::with_len(job.header.ntimes);
    for i in 0..job.header.ntimes {
        match kernel.compute(&job.common, &job.inputs.sample(i)) {
            Ok(out) => outputs.set(i, out, SampleStatus::Ok),
            Err(_) => outputs.set(i, SampleOutput::FILL, SampleStatus::Failed),
        }
    }
    outputs
}

/// Stores the sample's time as Lm and sleeps longer for lower times, so
/// low ranks finish last
pub struct SlowFirstKernel {
    pub ntimes: usize,
}

impl PhysicsKernel for SlowFirstKernel {
    fn compute(
        &self,
        _common: &CommonParams,
        sample: &SampleInput,
    ) -> Result<SampleOutput, KernelError> {
        let remaining = self.ntimes as f64 - sample.ut;
        std::thread::sleep(Duration::from_millis((remaining * 5.0) as u64));
        Ok(SampleOutput {
            lm: sample.ut,
            lstar: sample.ut,
            bmin: 1.0,
            bmir: 1.0,
            j: 0.0,
            hmin: 0.0,
            hmin_lon: 0.0,
        })
    }

    fn name(&self) -> &'static str {
        "slow-first"
    }
}
