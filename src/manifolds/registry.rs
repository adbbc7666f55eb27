//! Selection of a manifold by name.
//!
//! Constructors are resolved from a [`ManifoldRegistry`] into an
//! [`AnyManifold`]; [`AnyManifold::visit`] then hands the concrete geometry to
//! generic code exactly once, so everything downstream is monomorphised.

use crate::core::{Manifold, ManifoldSettings, Registry, Result};
use crate::manifolds::{PositiveReals, Reals, Rotations, Spd};

pub type ManifoldConstructor = fn(&ManifoldSettings) -> Result<AnyManifold>;

pub type ManifoldRegistry = Registry<ManifoldConstructor>;

/// One of the built-in geometries
#[derive(Debug, Clone, Copy)]
pub enum AnyManifold {
    Numbers(Reals),
    PositiveNumbers(PositiveReals),
    Rotations(Rotations),
    Spd(Spd),
}

/// Generic code run against whichever manifold a registry produced
pub trait ManifoldVisitor {
    type Output;

    fn visit<M>(self, manifold: M) -> Self::Output
    where
        M: Manifold + 'static,
        M::Point: 'static;
}

impl AnyManifold {
    pub fn name(&self) -> &'static str {
        match self {
            AnyManifold::Numbers(m) => m.name(),
            AnyManifold::PositiveNumbers(m) => m.name(),
            AnyManifold::Rotations(m) => m.name(),
            AnyManifold::Spd(m) => m.name(),
        }
    }

    pub fn visit<V: ManifoldVisitor>(self, visitor: V) -> V::Output {
        match self {
            AnyManifold::Numbers(m) => visitor.visit(m),
            AnyManifold::PositiveNumbers(m) => visitor.visit(m),
            AnyManifold::Rotations(m) => visitor.visit(m),
            AnyManifold::Spd(m) => visitor.visit(m),
        }
    }
}

fn numbers(_settings: &ManifoldSettings) -> Result<AnyManifold> {
    Ok(AnyManifold::Numbers(Reals::new()))
}

fn positive_numbers(_settings: &ManifoldSettings) -> Result<AnyManifold> {
    Ok(AnyManifold::PositiveNumbers(PositiveReals::new()))
}

fn rotations(settings: &ManifoldSettings) -> Result<AnyManifold> {
    Ok(AnyManifold::Rotations(Rotations::from_settings(settings)?))
}

fn spd(settings: &ManifoldSettings) -> Result<AnyManifold> {
    Ok(AnyManifold::Spd(Spd::from_settings(settings)?))
}

/// Registry holding "numbers", "positive_numbers", "rotations" and "spd"
pub fn builtin_manifolds() -> ManifoldRegistry {
    let mut registry = Registry::new("manifold");
    registry.register("numbers", numbers as ManifoldConstructor);
    registry.register("positive_numbers", positive_numbers as ManifoldConstructor);
    registry.register("rotations", rotations as ManifoldConstructor);
    registry.register("spd", spd as ManifoldConstructor);
    registry
}
