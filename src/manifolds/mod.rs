pub mod reals;
pub mod registry;
pub mod rotations;
pub mod spd;

pub use reals::{PositiveReals, Reals};
pub use registry::{
    builtin_manifolds, AnyManifold, ManifoldConstructor, ManifoldRegistry, ManifoldVisitor,
};
pub use rotations::Rotations;
pub use spd::Spd;
