//! Test functions selectable by name, one registry per value type.

use ndarray::{array, Array2};

use crate::core::registry::Registry;
use crate::manifolds::Rotations;

pub type TargetFunction<P> = fn(f64, f64) -> P;

pub type FunctionRegistry<P> = Registry<TargetFunction<P>>;

/// sin(4x) cos(5y)
pub fn numbers(x: f64, y: f64) -> f64 {
    (4.0 * x).sin() * (5.0 * y).cos()
}

/// 5 exp(-x² - y²)
pub fn numbers_gauss(x: f64, y: f64) -> f64 {
    5.0 * (-(x * x) - y * y).exp()
}

pub fn numbers_sin(x: f64, y: f64) -> f64 {
    (2.0 * (x + 0.5)).sin() * (3.0 * (y + 0.5)).cos()
}

pub fn one(_x: f64, _y: f64) -> f64 {
    1.0
}

/// sin x + cos y, raised by 1% on a small rectangle
pub fn anomaly_synthetic(x: f64, y: f64) -> f64 {
    let value = x.sin() + y.cos();
    if 0.1 < x && x < 0.25 && 0.2 < y && y < 0.4 {
        value * 1.01
    } else {
        value
    }
}

pub fn rotations_euler_gauss(x: f64, y: f64) -> Array2<f64> {
    Rotations::from_euler(
        0.5 * (1.0 - (-(x * x)).exp()),
        0.5 * (1.0 - (-(y * y)).exp()),
        0.2 * (2.0 * x * y).cos(),
    )
}

pub fn rotations_euler(x: f64, y: f64) -> Array2<f64> {
    Rotations::from_euler(
        1.2 * (5.0 * x - 0.1).sin(),
        y * y / 2.0 - (3.0 * x).sin(),
        1.5 * (2.0 * x).cos(),
    )
}

pub fn identity3(_x: f64, _y: f64) -> Array2<f64> {
    Array2::eye(3)
}

/// Symmetric positive definite 3x3 field, `z + zᵀ` of a perturbed diagonal
pub fn spd(x: f64, y: f64) -> Array2<f64> {
    let envelope = (0.3 * (2.0 * y).cos().abs() + 0.6) * (-(x * x) - y * y).exp();
    let perturbation = array![[(5.0 * y).sin(), y, x * y], [0.0, 0.0, y * y], [0.0, 0.0, 0.0]];
    let z = (Array2::<f64>::eye(3) * 5.0 + perturbation) * envelope + Array2::<f64>::eye(3) * 0.3;
    &z + &z.t()
}

pub fn scalar_functions() -> FunctionRegistry<f64> {
    let mut registry = Registry::new("function");
    registry.register("numbers", numbers as TargetFunction<f64>);
    registry.register("numbers_gauss", numbers_gauss as TargetFunction<f64>);
    registry.register("numbers_sin", numbers_sin as TargetFunction<f64>);
    registry.register("one", one as TargetFunction<f64>);
    registry.register("anomaly_synthetic", anomaly_synthetic as TargetFunction<f64>);
    registry
}

pub fn rotation_functions() -> FunctionRegistry<Array2<f64>> {
    let mut registry = Registry::new("function");
    registry.register(
        "rotations_euler_gauss",
        rotations_euler_gauss as TargetFunction<Array2<f64>>,
    );
    registry.register("rotations_euler", rotations_euler as TargetFunction<Array2<f64>>);
    registry.register("identity", identity3 as TargetFunction<Array2<f64>>);
    registry
}

pub fn spd_functions() -> FunctionRegistry<Array2<f64>> {
    let mut registry = Registry::new("function");
    registry.register("spd", spd as TargetFunction<Array2<f64>>);
    registry.register("identity", identity3 as TargetFunction<Array2<f64>>);
    registry
}
