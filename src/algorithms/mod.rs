pub mod interpolation;
pub mod karcher;
pub mod kernel;
pub mod naive;
pub mod weights;

pub use interpolation::{max_derivative, Interpolator};
pub use karcher::{KarcherConfig, KarcherMean, MeanEstimate};
pub use kernel::{Kernel, KernelProfile};
pub use naive::{naive_interpolation, NaiveInterpolant};
pub use weights::{LocalSystem, RefinementReport, WeightSolver};
