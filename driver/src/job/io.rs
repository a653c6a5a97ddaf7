//! Binary job and output files
//!
//! Both files are flat sequences of native-endian numbers with no padding.
//!
//! ```text
//! job:    i32 ntimes | i32 kext | i32 options[5] | i32 sysaxes
//!         f64 maginput[25] | f64 R0
//!         i32 iyear[n] | i32 idoy[n] | f64 UT[n] | f64 x1[n] | f64 x2[n]
//!         f64 x3[n] | f64 alpha[n]
//!
//! output: i32 ntimes | f64 Lm[n] | f64 Lstar[n] | f64 Bmin[n] | f64 Bmir[n]
//!         f64 J[n] | f64 hmin[n] | f64 hmin_lon[n]
//! ```
//!
//! Every column is encoded with its own element type, so columns of
//! different widths cannot be mis-sized.

use crate::errors::{DriverError, Result};
use crate::job::types::{
    CommonParams, InputColumns, Job, JobHeader, OutputColumns, SampleStatus, FILL_VALUE,
    NUM_MAGINPUT, NUM_OPTIONS,
};
use bytemuck::Pod;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::mem::size_of;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bytes before the first per-sample column of a job file
const JOB_PREAMBLE_BYTES: usize =
    size_of::<i32>() * (3 + NUM_OPTIONS) + size_of::<f64>() * (NUM_MAGINPUT + 1);

/// Bytes per sample across all input columns
const JOB_BYTES_PER_SAMPLE: usize = size_of::<i32>() * 2 + size_of::<f64>() * 5;

/// Bytes per sample across all output columns
const OUTPUT_BYTES_PER_SAMPLE: usize = size_of::<f64>() * 7;

/// Load a job file
///
/// Fails if the file is missing, unreadable, or shorter than its declared
/// sample count implies.
pub fn load_job(path: &Path) -> Result<Job> {
    let file = File::open(path)
        .map_err(|e| DriverError::io(format!("opening job file {}", path.display()), e))?;
    let file_len = file
        .metadata()
        .map_err(|e| DriverError::io(format!("reading metadata of {}", path.display()), e))?
        .len();
    let mut reader = BufReader::new(file);

    let ntimes = read_count(&mut reader, "ntimes")?;
    let required = (JOB_PREAMBLE_BYTES as u64)
        .saturating_add((ntimes as u64).saturating_mul(JOB_BYTES_PER_SAMPLE as u64));
    if file_len < required {
        return Err(DriverError::io(
            format!("job file {}", path.display()),
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "truncated: {} samples need {} bytes, file has {}",
                    ntimes, required, file_len
                ),
            ),
        ));
    }

    let kext = read_scalar::<i32, _>(&mut reader, "kext")?;
    let mut options = [0i32; NUM_OPTIONS];
    read_into(&mut reader, &mut options[..], "options")?;
    let sysaxes = read_scalar::<i32, _>(&mut reader, "sysaxes")?;
    let mut maginput = [0f64; NUM_MAGINPUT];
    read_into(&mut reader, &mut maginput[..], "maginput")?;
    let r0 = read_scalar::<f64, _>(&mut reader, "R0")?;

    let inputs = InputColumns {
        iyear: read_column(&mut reader, ntimes, "iyear")?,
        idoy: read_column(&mut reader, ntimes, "idoy")?,
        ut: read_column(&mut reader, ntimes, "UT")?,
        x1: read_column(&mut reader, ntimes, "x1")?,
        x2: read_column(&mut reader, ntimes, "x2")?,
        x3: read_column(&mut reader, ntimes, "x3")?,
        alpha: read_column(&mut reader, ntimes, "alpha")?,
    };

    let job = Job {
        header: JobHeader { ntimes },
        common: CommonParams {
            kext,
            options,
            sysaxes,
            maginput,
            r0,
        },
        inputs,
    };

    info!(
        path = %path.display(),
        ntimes,
        kext,
        sysaxes,
        "Job loaded"
    );
    Ok(job)
}

/// Write a job file in the layout [`load_job`] reads
pub fn write_job(path: &Path, job: &Job) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| DriverError::io(format!("creating job file {}", path.display()), e))?;
    let mut writer = BufWriter::new(file);

    write_count(&mut writer, job.inputs.len(), "ntimes")?;
    write_column(&mut writer, &[job.common.kext], "kext")?;
    write_column(&mut writer, &job.common.options[..], "options")?;
    write_column(&mut writer, &[job.common.sysaxes], "sysaxes")?;
    write_column(&mut writer, &job.common.maginput[..], "maginput")?;
    write_column(&mut writer, &[job.common.r0], "R0")?;

    write_column(&mut writer, &job.inputs.iyear, "iyear")?;
    write_column(&mut writer, &job.inputs.idoy, "idoy")?;
    write_column(&mut writer, &job.inputs.ut, "UT")?;
    write_column(&mut writer, &job.inputs.x1, "x1")?;
    write_column(&mut writer, &job.inputs.x2, "x2")?;
    write_column(&mut writer, &job.inputs.x3, "x3")?;
    write_column(&mut writer, &job.inputs.alpha, "alpha")?;

    finish(writer, path)
}

/// Output file opened ahead of the computation
///
/// The coordinator creates this during setup so an unwritable destination
/// is reported before any work is distributed.
#[derive(Debug)]
pub struct OutputFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl OutputFile {
    /// Create (or truncate) the output file
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            DriverError::io(format!("creating output file {}", path.display()), e)
        })?;
        debug!(path = %path.display(), "Output file created");
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the header and all output columns, then sync to disk
    pub fn persist(mut self, outputs: &OutputColumns) -> Result<()> {
        if !outputs.is_consistent() {
            return Err(DriverError::io(
                format!("output file {}", self.path.display()),
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "output columns have different lengths",
                ),
            ));
        }

        write_count(&mut self.writer, outputs.len(), "ntimes")?;
        write_column(&mut self.writer, &outputs.lm, "Lm")?;
        write_column(&mut self.writer, &outputs.lstar, "Lstar")?;
        write_column(&mut self.writer, &outputs.bmin, "Bmin")?;
        write_column(&mut self.writer, &outputs.bmir, "Bmir")?;
        write_column(&mut self.writer, &outputs.j, "J")?;
        write_column(&mut self.writer, &outputs.hmin, "hmin")?;
        write_column(&mut self.writer, &outputs.hmin_lon, "hmin_lon")?;

        finish(self.writer, &self.path)?;
        info!(path = %self.path.display(), ntimes = outputs.len(), "Output persisted");
        Ok(())
    }
}

/// Remove an output file a failed run created
///
/// Failure to remove is logged, not returned; the run already has an error.
pub fn discard_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed output file of failed run"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove output file"),
    }
}

/// Create `path` and write `outputs` to it
pub fn persist_output(path: &Path, outputs: &OutputColumns) -> Result<()> {
    OutputFile::create(path)?.persist(outputs)
}

/// Read an output file back
///
/// Samples holding the fill value in `Lm` are marked failed.
pub fn load_output(path: &Path) -> Result<OutputColumns> {
    let file = File::open(path)
        .map_err(|e| DriverError::io(format!("opening output file {}", path.display()), e))?;
    let file_len = file
        .metadata()
        .map_err(|e| DriverError::io(format!("reading metadata of {}", path.display()), e))?
        .len();
    let mut reader = BufReader::new(file);

    let ntimes = read_count(&mut reader, "ntimes")?;
    let required = (size_of::<i32>() as u64)
        .saturating_add((ntimes as u64).saturating_mul(OUTPUT_BYTES_PER_SAMPLE as u64));
    if file_len < required {
        return Err(DriverError::io(
            format!("output file {}", path.display()),
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "truncated: {} samples need {} bytes, file has {}",
                    ntimes, required, file_len
                ),
            ),
        ));
    }

    let lm: Vec<f64> = read_column(&mut reader, ntimes, "Lm")?;
    let status = lm
        .iter()
        .map(|&v| {
            if v == FILL_VALUE {
                SampleStatus::Failed
            } else {
                SampleStatus::Ok
            }
        })
        .collect();

    Ok(OutputColumns {
        lm,
        lstar: read_column(&mut reader, ntimes, "Lstar")?,
        bmin: read_column(&mut reader, ntimes, "Bmin")?,
        bmir: read_column(&mut reader, ntimes, "Bmir")?,
        j: read_column(&mut reader, ntimes, "J")?,
        hmin: read_column(&mut reader, ntimes, "hmin")?,
        hmin_lon: read_column(&mut reader, ntimes, "hmin_lon")?,
        status,
    })
}

fn read_count<R: Read>(reader: &mut R, field: &'static str) -> Result<usize> {
    let value = read_scalar::<i32, _>(reader, field)?;
    usize::try_from(value).map_err(|_| {
        DriverError::io(
            format!("reading {}", field),
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("negative sample count {}", value),
            ),
        )
    })
}

fn write_count<W: Write>(writer: &mut W, count: usize, field: &'static str) -> Result<()> {
    let value = i32::try_from(count).map_err(|_| {
        DriverError::io(
            format!("writing {}", field),
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} samples do not fit the 32-bit header", count),
            ),
        )
    })?;
    write_column(writer, &[value], field)
}

fn read_scalar<T: Pod, R: Read>(reader: &mut R, field: &'static str) -> Result<T> {
    let mut value = [T::zeroed()];
    read_into(reader, &mut value[..], field)?;
    Ok(value[0])
}

fn read_column<T: Pod, R: Read>(reader: &mut R, len: usize, field: &'static str) -> Result<Vec<T>> {
    let mut column = vec![T::zeroed(); len];
    read_into(reader, &mut column[..], field)?;
    Ok(column)
}

fn read_into<T: Pod, R: Read>(reader: &mut R, out: &mut [T], field: &'static str) -> Result<()> {
    reader
        .read_exact(bytemuck::cast_slice_mut(out))
        .map_err(|e| DriverError::io(format!("reading {}", field), e))
}

fn write_column<T: Pod, W: Write>(writer: &mut W, column: &[T], field: &'static str) -> Result<()> {
    writer
        .write_all(bytemuck::cast_slice(column))
        .map_err(|e| DriverError::io(format!("writing {}", field), e))
}

fn finish(writer: BufWriter<File>, path: &Path) -> Result<()> {
    let file = writer
        .into_inner()
        .map_err(|e| DriverError::io(format!("flushing {}", path.display()), e.into_error()))?;
    file.sync_all()
        .map_err(|e| DriverError::io(format!("syncing {}", path.display()), e))
}
