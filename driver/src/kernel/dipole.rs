//! Centred-dipole drift shells
//!
//! In a dipole every drift shell is a surface of constant McIlwain L, so
//! L* = Lm and everything follows from the field-line equation
//! `r = L cos²λ` and `B = B0 / r³ · sqrt(1 + 3 sin²λ)`. Positions are taken
//! as Cartesian coordinates in Earth radii with the dipole axis along x3.

use super::{KernelError, PhysicsKernel};
use crate::job::{CommonParams, SampleInput, SampleOutput, FILL_VALUE};
use std::f64::consts::FRAC_PI_2;

/// Equatorial surface field of the dipole (nT)
pub const DIPOLE_B0_NT: f64 = 30_000.0;

/// Mean Earth radius (km)
pub const EARTH_RADIUS_KM: f64 = 6371.2;

// Schulz & Lanzerotti coefficients for the bounce integral approximation
const T0: f64 = 1.3802;
const T1: f64 = 0.7405;

const BISECTION_STEPS: usize = 60;

#[derive(Debug, Clone)]
pub struct DipoleKernel {
    pub b0_nt: f64,
    pub earth_radius_km: f64,
}

impl Default for DipoleKernel {
    fn default() -> Self {
        Self {
            b0_nt: DIPOLE_B0_NT,
            earth_radius_km: EARTH_RADIUS_KM,
        }
    }
}

impl PhysicsKernel for DipoleKernel {
    fn compute(
        &self,
        common: &CommonParams,
        sample: &SampleInput,
    ) -> Result<SampleOutput, KernelError> {
        if !(1..=6).contains(&common.sysaxes) {
            return Err(KernelError::InvalidInput(format!(
                "sysaxes {} is not a Cartesian system",
                common.sysaxes
            )));
        }
        let values = [sample.ut, sample.x1, sample.x2, sample.x3, sample.alpha, common.r0];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(KernelError::InvalidInput("non-finite value".into()));
        }
        if sample.alpha <= 0.0 || sample.alpha >= 180.0 {
            return Err(KernelError::InvalidInput(format!(
                "pitch angle {} outside (0, 180)",
                sample.alpha
            )));
        }

        let r = (sample.x1 * sample.x1 + sample.x2 * sample.x2 + sample.x3 * sample.x3).sqrt();
        if r <= 1.0 {
            return Err(KernelError::InvalidInput(format!(
                "radius {:.3} Re is inside the Earth",
                r
            )));
        }

        let sin_lat = sample.x3 / r;
        let cos2_lat = 1.0 - sin_lat * sin_lat;
        if cos2_lat < 1e-12 {
            return Err(KernelError::NoSolution("position on the dipole axis".into()));
        }

        let lm = r / cos2_lat;
        let blocal = self.b0_nt / r.powi(3) * (1.0 + 3.0 * sin_lat * sin_lat).sqrt();
        let bmin = self.b0_nt / lm.powi(3);

        let sin_alpha = sample.alpha.to_radians().sin();
        let bmir = blocal / (sin_alpha * sin_alpha);

        // sine of the equatorial pitch angle
        let y = (bmin / bmir).sqrt().clamp(0.0, 1.0);

        let mirror_lat = mirror_latitude(y * y);
        let mirror_radius = lm * mirror_lat.cos().powi(2);

        // Particles mirroring below the reference surface have no drift shell
        let lstar = if mirror_radius < common.r0 { FILL_VALUE } else { lm };

        Ok(SampleOutput {
            lm,
            lstar,
            bmin,
            bmir,
            j: lm * bounce_integral(y),
            hmin: (mirror_radius - 1.0) * self.earth_radius_km,
            hmin_lon: sample.x2.atan2(sample.x1).to_degrees().rem_euclid(360.0),
        })
    }

    fn name(&self) -> &'static str {
        "dipole"
    }
}

/// Normalised second invariant Y(y), where y is the sine of the equatorial
/// pitch angle. Y(0) = 2·T0 and Y(1) = 0.
fn bounce_integral(y: f64) -> f64 {
    let y_ln_y = if y > 0.0 { y * y.ln() } else { 0.0 };
    2.0 * T0 * (1.0 - y) + (T0 - T1) * (y_ln_y + 2.0 * y - 2.0 * y.sqrt())
}

/// Latitude where B / Bmin = 1 / ratio along a dipole field line
///
/// `cos⁶λ / sqrt(1 + 3 sin²λ)` falls monotonically from 1 to 0 over
/// [0, π/2], so bisection converges.
fn mirror_latitude(ratio: f64) -> f64 {
    if ratio >= 1.0 {
        return 0.0;
    }

    let shape = |lat: f64| {
        let s = lat.sin();
        lat.cos().powi(6) / (1.0 + 3.0 * s * s).sqrt()
    };

    let (mut lo, mut hi) = (0.0, FRAC_PI_2);
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if shape(mid) > ratio {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}
