//! IRBEM `drift_bounce_orbit2_1` binding
//!
//! Build with `--features irbem` and make `libirbem` visible to the linker.

use super::{KernelError, PhysicsKernel};
use crate::job::{CommonParams, SampleInput, SampleOutput, FILL_VALUE, NUM_MAGINPUT};

/// Field-line points IRBEM traces per bounce
const POINTS_PER_LINE: usize = 1000;
/// Field lines IRBEM traces per drift shell
const LINES_PER_SHELL: usize = 25;

#[link(name = "irbem")]
extern "C" {
    fn drift_bounce_orbit2_1_(
        kext: *const i32,
        options: *const i32,
        sysaxes: *const i32,
        iyear: *const i32,
        idoy: *const i32,
        ut: *const f64,
        x1: *const f64,
        x2: *const f64,
        x3: *const f64,
        alpha: *const f64,
        maginput: *const f64,
        r0: *const f64,
        lm: *mut f64,
        lstar: *mut f64,
        blocal: *mut f64,
        bmin: *mut f64,
        bmir: *mut f64,
        j: *mut f64,
        posit: *mut f64,
        ind: *mut i32,
        hmin: *mut f64,
        hmin_lon: *mut f64,
    );
}

/// Kernel backed by the IRBEM Fortran library
#[derive(Debug, Clone, Copy, Default)]
pub struct IrbemKernel;

impl PhysicsKernel for IrbemKernel {
    fn compute(
        &self,
        common: &CommonParams,
        sample: &SampleInput,
    ) -> Result<SampleOutput, KernelError> {
        debug_assert_eq!(common.maginput.len(), NUM_MAGINPUT);

        // Field-line traces are scratch; only the scalar results are kept
        let mut blocal = vec![0.0f64; POINTS_PER_LINE * LINES_PER_SHELL];
        let mut posit = vec![0.0f64; 3 * POINTS_PER_LINE * LINES_PER_SHELL];
        let mut ind = vec![0i32; LINES_PER_SHELL];

        let mut out = SampleOutput::FILL;

        // SAFETY: every pointer refers to a live local or to `common`/`sample`
        // for the duration of the call, and the scratch arrays have the
        // sizes the routine writes.
        unsafe {
            drift_bounce_orbit2_1_(
                &common.kext,
                common.options.as_ptr(),
                &common.sysaxes,
                &sample.iyear,
                &sample.idoy,
                &sample.ut,
                &sample.x1,
                &sample.x2,
                &sample.x3,
                &sample.alpha,
                common.maginput.as_ptr(),
                &common.r0,
                &mut out.lm,
                &mut out.lstar,
                blocal.as_mut_ptr(),
                &mut out.bmin,
                &mut out.bmir,
                &mut out.j,
                posit.as_mut_ptr(),
                ind.as_mut_ptr(),
                &mut out.hmin,
                &mut out.hmin_lon,
            );
        }

        if out.lm == FILL_VALUE {
            return Err(KernelError::NoSolution(format!(
                "IRBEM returned no drift shell for kext {}",
                common.kext
            )));
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "irbem"
    }
}
