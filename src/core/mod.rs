pub mod config;
pub mod error;
pub mod linalg;
pub mod registry;
pub mod traits;

pub use config::{InterpolationConfig, ManifoldSettings, SolverConfig};
pub use error::{Error, Result};
pub use registry::Registry;
pub use traits::Manifold;
