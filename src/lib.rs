pub mod algorithms;
pub mod core;
pub mod functions;
pub mod manifolds;
pub mod problem;
pub mod sampling;

// Flat re-exports for convenience
pub use core::{
    Error, InterpolationConfig, Manifold, ManifoldSettings, Registry, Result, SolverConfig,
};

// Re-export manifold types
pub use manifolds::{AnyManifold, PositiveReals, Reals, Rotations, Spd};

// Re-export interpolation types
pub use algorithms::{
    max_derivative, naive_interpolation, Interpolator, KarcherConfig, KarcherMean, Kernel,
    KernelProfile, MeanEstimate, WeightSolver,
};
pub use problem::{error_report, ErrorReport, InterpolationProblem};
pub use sampling::{
    Grid, GridParameters, IndexLayout, SampleIndex, SamplePoint, SamplingPointsCollection,
};

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::algorithms::{Interpolator, KarcherMean, Kernel, WeightSolver};
    pub use crate::core::{Error, InterpolationConfig, Manifold, Result};
    pub use crate::manifolds::{PositiveReals, Reals, Rotations, Spd};
    pub use crate::problem::InterpolationProblem;
    pub use crate::sampling::{GridParameters, SampleIndex};
}
