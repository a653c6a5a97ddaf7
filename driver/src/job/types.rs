//! In-memory job types
//!
//! Per-sample data is held column-wise, one `Vec` per field, matching the
//! layout of the job and output files. Slices of these column sets are what
//! travel between coordinator and workers.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Number of option flags passed to the field model
pub const NUM_OPTIONS: usize = 5;

/// Number of magnetic-model driver values
pub const NUM_MAGINPUT: usize = 25;

/// Value written for samples the kernel could not compute
pub const FILL_VALUE: f64 = -1.0e31;

/// Job header: the number of samples in every per-sample array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHeader {
    pub ntimes: usize,
}

/// Parameters shared by every sample of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonParams {
    /// External field model selector
    pub kext: i32,
    /// Field model options
    pub options: [i32; NUM_OPTIONS],
    /// Coordinate system of the input positions
    pub sysaxes: i32,
    /// Magnetic model drivers (Kp, Dst, dynamic pressure, ...)
    pub maginput: [f64; NUM_MAGINPUT],
    /// Reference radius for the drift shell computation
    pub r0: f64,
}

impl Default for CommonParams {
    fn default() -> Self {
        Self {
            kext: 0,
            options: [0; NUM_OPTIONS],
            sysaxes: 1,
            maginput: [0.0; NUM_MAGINPUT],
            r0: 1.0,
        }
    }
}

/// One input sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleInput {
    pub iyear: i32,
    pub idoy: i32,
    pub ut: f64,
    pub x1: f64,
    pub x2: f64,
    pub x3: f64,
    pub alpha: f64,
}

/// One output sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOutput {
    pub lm: f64,
    pub lstar: f64,
    pub bmin: f64,
    pub bmir: f64,
    pub j: f64,
    pub hmin: f64,
    pub hmin_lon: f64,
}

impl SampleOutput {
    /// Output written for a failed sample
    pub const FILL: SampleOutput = SampleOutput {
        lm: FILL_VALUE,
        lstar: FILL_VALUE,
        bmin: FILL_VALUE,
        bmir: FILL_VALUE,
        j: FILL_VALUE,
        hmin: FILL_VALUE,
        hmin_lon: FILL_VALUE,
    };
}

/// Whether the kernel produced a result for a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleStatus {
    Ok,
    Failed,
}

/// Column-wise input samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputColumns {
    pub iyear: Vec<i32>,
    pub idoy: Vec<i32>,
    pub ut: Vec<f64>,
    pub x1: Vec<f64>,
    pub x2: Vec<f64>,
    pub x3: Vec<f64>,
    pub alpha: Vec<f64>,
}

impl InputColumns {
    /// Number of samples.
    ///
    /// Column lengths are checked by [`InputColumns::is_consistent`]; this
    /// reports the length of the first column.
    pub fn len(&self) -> usize {
        self.iyear.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when every column has the same length
    pub fn is_consistent(&self) -> bool {
        let n = self.iyear.len();
        [
            self.idoy.len(),
            self.ut.len(),
            self.x1.len(),
            self.x2.len(),
            self.x3.len(),
            self.alpha.len(),
        ]
        .iter()
        .all(|&len| len == n)
    }

    /// Copy out the samples in `range`
    pub fn slice(&self, range: Range<usize>) -> InputColumns {
        InputColumns {
            iyear: self.iyear[range.clone()].to_vec(),
            idoy: self.idoy[range.clone()].to_vec(),
            ut: self.ut[range.clone()].to_vec(),
            x1: self.x1[range.clone()].to_vec(),
            x2: self.x2[range.clone()].to_vec(),
            x3: self.x3[range.clone()].to_vec(),
            alpha: self.alpha[range].to_vec(),
        }
    }

    /// Sample at index `i`
    pub fn sample(&self, i: usize) -> SampleInput {
        SampleInput {
            iyear: self.iyear[i],
            idoy: self.idoy[i],
            ut: self.ut[i],
            x1: self.x1[i],
            x2: self.x2[i],
            x3: self.x3[i],
            alpha: self.alpha[i],
        }
    }

    /// Append one sample
    pub fn push(&mut self, sample: SampleInput) {
        self.iyear.push(sample.iyear);
        self.idoy.push(sample.idoy);
        self.ut.push(sample.ut);
        self.x1.push(sample.x1);
        self.x2.push(sample.x2);
        self.x3.push(sample.x3);
        self.alpha.push(sample.alpha);
    }

    /// Append every sample of `part`
    pub fn append(&mut self, mut part: InputColumns) {
        self.iyear.append(&mut part.iyear);
        self.idoy.append(&mut part.idoy);
        self.ut.append(&mut part.ut);
        self.x1.append(&mut part.x1);
        self.x2.append(&mut part.x2);
        self.x3.append(&mut part.x3);
        self.alpha.append(&mut part.alpha);
    }
}

impl FromIterator<SampleInput> for InputColumns {
    fn from_iter<I: IntoIterator<Item = SampleInput>>(iter: I) -> Self {
        let mut columns = InputColumns::default();
        for sample in iter {
            columns.push(sample);
        }
        columns
    }
}

/// Column-wise output samples with per-sample status
///
/// `status` travels with the columns between processes but is not part of
/// the output file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputColumns {
    pub lm: Vec<f64>,
    pub lstar: Vec<f64>,
    pub bmin: Vec<f64>,
    pub bmir: Vec<f64>,
    pub j: Vec<f64>,
    pub hmin: Vec<f64>,
    pub hmin_lon: Vec<f64>,
    pub status: Vec<SampleStatus>,
}

impl OutputColumns {
    /// `len` samples, all set to the fill value and marked failed until written
    pub fn with_len(len: usize) -> Self {
        Self {
            lm: vec![FILL_VALUE; len],
            lstar: vec![FILL_VALUE; len],
            bmin: vec![FILL_VALUE; len],
            bmir: vec![FILL_VALUE; len],
            j: vec![FILL_VALUE; len],
            hmin: vec![FILL_VALUE; len],
            hmin_lon: vec![FILL_VALUE; len],
            status: vec![SampleStatus::Failed; len],
        }
    }

    pub fn len(&self) -> usize {
        self.lm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when every column (status included) has the same length
    pub fn is_consistent(&self) -> bool {
        let n = self.lm.len();
        [
            self.lstar.len(),
            self.bmin.len(),
            self.bmir.len(),
            self.j.len(),
            self.hmin.len(),
            self.hmin_lon.len(),
            self.status.len(),
        ]
        .iter()
        .all(|&len| len == n)
    }

    /// Write one sample at index `i`
    pub fn set(&mut self, i: usize, output: SampleOutput, status: SampleStatus) {
        self.lm[i] = output.lm;
        self.lstar[i] = output.lstar;
        self.bmin[i] = output.bmin;
        self.bmir[i] = output.bmir;
        self.j[i] = output.j;
        self.hmin[i] = output.hmin;
        self.hmin_lon[i] = output.hmin_lon;
        self.status[i] = status;
    }

    /// Sample at index `i`
    pub fn sample(&self, i: usize) -> SampleOutput {
        SampleOutput {
            lm: self.lm[i],
            lstar: self.lstar[i],
            bmin: self.bmin[i],
            bmir: self.bmir[i],
            j: self.j[i],
            hmin: self.hmin[i],
            hmin_lon: self.hmin_lon[i],
        }
    }

    /// Copy out the samples in `range`
    pub fn slice(&self, range: Range<usize>) -> OutputColumns {
        OutputColumns {
            lm: self.lm[range.clone()].to_vec(),
            lstar: self.lstar[range.clone()].to_vec(),
            bmin: self.bmin[range.clone()].to_vec(),
            bmir: self.bmir[range.clone()].to_vec(),
            j: self.j[range.clone()].to_vec(),
            hmin: self.hmin[range.clone()].to_vec(),
            hmin_lon: self.hmin_lon[range.clone()].to_vec(),
            status: self.status[range].to_vec(),
        }
    }

    /// Overwrite the samples starting at `offset` with `part`
    ///
    /// # Panics
    /// Panics if `part` does not fit at `offset`.
    pub fn place(&mut self, offset: usize, part: &OutputColumns) {
        let range = offset..offset + part.len();
        self.lm[range.clone()].copy_from_slice(&part.lm);
        self.lstar[range.clone()].copy_from_slice(&part.lstar);
        self.bmin[range.clone()].copy_from_slice(&part.bmin);
        self.bmir[range.clone()].copy_from_slice(&part.bmir);
        self.j[range.clone()].copy_from_slice(&part.j);
        self.hmin[range.clone()].copy_from_slice(&part.hmin);
        self.hmin_lon[range.clone()].copy_from_slice(&part.hmin_lon);
        self.status[range].copy_from_slice(&part.status);
    }

    /// Number of samples marked failed
    pub fn failed_count(&self) -> usize {
        self.status
            .iter()
            .filter(|&&s| s == SampleStatus::Failed)
            .count()
    }
}

/// A loaded job: header, common parameters and all input samples
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub header: JobHeader,
    pub common: CommonParams,
    pub inputs: InputColumns,
}
