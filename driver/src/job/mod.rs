//! Job data: the samples to process, the results, and their file formats

pub mod io;
pub mod types;

pub use io::{discard_output, load_job, load_output, persist_output, write_job, OutputFile};
pub use types::{
    CommonParams, InputColumns, Job, JobHeader, OutputColumns, SampleInput, SampleOutput,
    SampleStatus, FILL_VALUE, NUM_MAGINPUT, NUM_OPTIONS,
};
