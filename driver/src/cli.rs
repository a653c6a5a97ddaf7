//! Command line surface
//!
//! Exactly two positional arguments. Only the coordinator parses them;
//! the group size comes from the launcher.

use crate::errors::{DriverError, Result};
use clap::Parser;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Longest accepted path, in bytes
pub const MAX_PATH_BYTES: usize = 2047;

/// Compute Lm, L*, Bmin, Bmir, J and hmin for every sample of a job file
#[derive(Parser, Debug)]
#[command(name = "multi-lstar")]
#[command(about = "Distributed drift-shell computation over a process group", long_about = None)]
#[command(version)]
struct Cli {
    /// Binary job file
    input: PathBuf,

    /// Where to write the results
    output: PathBuf,
}

/// Validated input and output paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl JobPaths {
    /// Parse `args` (program name first)
    ///
    /// A wrong argument count is a configuration error carrying the usage
    /// text.
    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args)
            .map_err(|e| DriverError::Config(e.render().to_string().trim_end().to_string()))?;
        Self::new(cli.input, cli.output)
    }

    pub fn new(input: PathBuf, output: PathBuf) -> Result<Self> {
        check_length("input", &input)?;
        check_length("output", &output)?;
        Ok(Self { input, output })
    }
}

fn check_length(what: &str, path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len > MAX_PATH_BYTES {
        return Err(DriverError::Config(format!(
            "{} path is {} bytes, limit is {}",
            what, len, MAX_PATH_BYTES
        )));
    }
    Ok(())
}
