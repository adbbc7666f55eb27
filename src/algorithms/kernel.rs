//! Compactly supported radial kernels (Wendland family).

use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

#[inline]
fn lit<T: Float>(v: f64) -> T {
    T::from(v).unwrap_or_else(T::nan)
}

/// Wendland φ_{3,0}(r) = (1 - r)^2_+
pub fn wendland_3_0<T: Float>(r: T) -> T {
    let r = r.abs();
    if r >= T::one() {
        return T::zero();
    }
    (T::one() - r).powi(2)
}

/// Wendland φ_{3,1}(r) = (1 - r)^4_+ (4r + 1)
pub fn wendland_3_1<T: Float>(r: T) -> T {
    let r = r.abs();
    if r >= T::one() {
        return T::zero();
    }
    (T::one() - r).powi(4) * (lit::<T>(4.0) * r + T::one())
}

/// Wendland φ_{3,2}(r) = (1 - r)^6_+ (35r^2 + 18r + 3)
pub fn wendland_3_2<T: Float>(r: T) -> T {
    let r = r.abs();
    if r >= T::one() {
        return T::zero();
    }
    (T::one() - r).powi(6) * (lit::<T>(35.0) * r * r + lit::<T>(18.0) * r + lit::<T>(3.0))
}

/// Radial profile of the kernel, evaluated on distances normalised by the support radius
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelProfile {
    /// C^0, positive definite on R^3
    Wendland30,
    /// C^2, positive definite on R^3
    #[default]
    Wendland31,
    /// C^4, positive definite on R^3
    Wendland32,
}

impl KernelProfile {
    pub fn evaluate<T: Float>(self, r: T) -> T {
        match self {
            KernelProfile::Wendland30 => wendland_3_0(r),
            KernelProfile::Wendland31 => wendland_3_1(r),
            KernelProfile::Wendland32 => wendland_3_2(r),
        }
    }
}

/// Radial kernel Φ(x, y) = φ(|x - y| / δ) / δ with support radius δ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kernel {
    profile: KernelProfile,
    support_radius: f64,
}

impl Kernel {
    pub fn new(profile: KernelProfile, support_radius: f64) -> Result<Self> {
        if !(support_radius > 0.0 && support_radius.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "kernel support radius must be positive and finite, got {}",
                support_radius
            )));
        }
        Ok(Kernel {
            profile,
            support_radius,
        })
    }

    /// Wendland φ_{3,1} kernel with the given support radius
    pub fn wendland(support_radius: f64) -> Result<Self> {
        Self::new(KernelProfile::Wendland31, support_radius)
    }

    pub fn profile(&self) -> KernelProfile {
        self.profile
    }

    pub fn support_radius(&self) -> f64 {
        self.support_radius
    }

    /// Kernel value at a distance
    pub fn eval(&self, distance: f64) -> f64 {
        self.profile.evaluate(distance / self.support_radius) / self.support_radius
    }

    /// Kernel value between two locations of the plane
    pub fn between(&self, a: (f64, f64), b: (f64, f64)) -> f64 {
        self.eval((a.0 - b.0).hypot(a.1 - b.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_wendland_values() {
        assert_relative_eq!(wendland_3_1(0.0_f64), 1.0);
        assert_relative_eq!(wendland_3_1(0.5_f64), 0.0625 * 3.0, epsilon = 1e-12);
        assert_relative_eq!(wendland_3_0(0.5_f64), 0.25, epsilon = 1e-12);
        assert_relative_eq!(wendland_3_2(0.0_f64), 3.0);
        assert_relative_eq!(wendland_3_1(0.5_f32), 0.1875_f32, epsilon = 1e-6);
    }

    #[test]
    fn test_kernel_vanishes_outside_support() {
        let kernel = Kernel::wendland(0.5).unwrap();
        for d in [0.5, 0.50001, 0.7, 3.0, 1e6] {
            assert_eq!(kernel.eval(d), 0.0, "kernel({}) should vanish", d);
        }
    }

    #[test]
    fn test_kernel_strictly_decreasing_inside_support() {
        for profile in [
            KernelProfile::Wendland30,
            KernelProfile::Wendland31,
            KernelProfile::Wendland32,
        ] {
            let kernel = Kernel::new(profile, 0.8).unwrap();
            let mut previous = kernel.eval(0.0);
            assert!(previous > 0.0);
            for step in 1..80 {
                let value = kernel.eval(step as f64 * 0.01);
                assert!(value < previous, "{:?} not decreasing at step {}", profile, step);
                assert!(value > 0.0);
                previous = value;
            }
        }
    }

    #[test]
    fn test_kernel_scaling() {
        let kernel = Kernel::wendland(2.0).unwrap();
        assert_relative_eq!(kernel.eval(0.0), 0.5);
        assert_relative_eq!(
            kernel.between((0.0, 0.0), (0.6, 0.8)),
            kernel.eval(1.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_invalid_radius_rejected() {
        assert!(Kernel::wendland(0.0).is_err());
        assert!(Kernel::wendland(-1.0).is_err());
        assert!(Kernel::wendland(f64::INFINITY).is_err());
    }
}
