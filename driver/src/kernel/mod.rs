//! Per-sample drift-shell computation
//!
//! A kernel turns one input sample plus the shared parameters into one
//! output sample. It is pure and sequential; coordinator and workers call it
//! the same way and never look inside.

mod dipole;
#[cfg(feature = "irbem")]
mod irbem;

pub use dipole::DipoleKernel;
#[cfg(feature = "irbem")]
pub use irbem::IrbemKernel;

use crate::job::{CommonParams, SampleInput, SampleOutput};
use thiserror::Error;

/// Why a single sample could not be computed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    /// The sample or the shared parameters are outside the kernel's domain
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The field model produced no drift shell for this sample
    #[error("no solution: {0}")]
    NoSolution(String),
}

/// Pure per-sample transform
pub trait PhysicsKernel: Send + Sync {
    fn compute(
        &self,
        common: &CommonParams,
        sample: &SampleInput,
    ) -> Result<SampleOutput, KernelError>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// The kernel this build computes with
#[cfg(feature = "irbem")]
pub fn default_kernel() -> Box<dyn PhysicsKernel> {
    Box::new(IrbemKernel)
}

/// The kernel this build computes with
#[cfg(not(feature = "irbem"))]
pub fn default_kernel() -> Box<dyn PhysicsKernel> {
    Box::new(DipoleKernel::default())
}
