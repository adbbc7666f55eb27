//! RBF weights of the sample points.
//!
//! Every node `i` pulls its value into the tangent space at the kernel-weighted
//! Karcher mean `m_i` of its neighbourhood, giving tangent coordinates `t_i`.
//! The weights solve `Σ_j Φ(x_i, x_j) λ_j = t_i` for all nodes, so that
//! `exp(m_i, Σ_j Φ(x_i, x_j) λ_j)` reproduces the sampled values.
//!
//! Each neighbourhood matrix is checked for conditioning once. The coupled
//! system is symmetric positive definite and sparse, and is solved by
//! conjugate gradients over the neighbour lists, one tangent coordinate per
//! column. Weights are only returned and cached once the largest node
//! residual falls below the tolerance.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace, warn};

use crate::algorithms::karcher::KarcherMean;
use crate::core::config::SolverConfig;
use crate::core::error::{Error, Result};
use crate::core::traits::Manifold;
use crate::sampling::cache::{CacheKey, MemoryCache, WeightCache};
use crate::sampling::SampleIndex;

/// Kernel row of one node over its neighbourhood
#[derive(Debug, Clone)]
pub struct LocalSystem {
    /// Node indices of the neighbours, in system order
    pub neighbors: Vec<usize>,
    /// Kernel value between the node and each neighbour
    pub kernel_values: Vec<f64>,
    /// Row of the node itself
    pub center: usize,
    /// Tangent coordinates of the node value at its neighbourhood mean
    pub tangent: DVector<f64>,
    /// Whether the neighbourhood mean converged
    pub base_converged: bool,
    /// Smallest over largest eigenvalue of the neighbourhood kernel matrix
    pub reciprocal_condition: f64,
}

/// Progress of the conjugate gradient iteration
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementReport {
    /// Largest node residual before each iteration, in order
    pub residuals: Vec<f64>,
    pub converged: bool,
}

impl RefinementReport {
    pub fn iterations(&self) -> usize {
        self.residuals.len().saturating_sub(1)
    }

    pub fn final_residual(&self) -> f64 {
        self.residuals.last().copied().unwrap_or(f64::NAN)
    }
}

/// Solves and memoizes the RBF weights of sample points
pub struct WeightSolver {
    config: SolverConfig,
    cache: Box<dyn WeightCache>,
    hits: usize,
    misses: usize,
    last_report: Option<RefinementReport>,
}

impl WeightSolver {
    pub fn new(config: SolverConfig, cache: Box<dyn WeightCache>) -> Self {
        WeightSolver {
            config,
            cache,
            hits: 0,
            misses: 0,
            last_report: None,
        }
    }

    pub fn in_memory(config: SolverConfig) -> Self {
        Self::new(config, Box::new(MemoryCache::new()))
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn cache(&self) -> &dyn WeightCache {
        self.cache.as_ref()
    }

    /// Locations served from the cache and locations solved so far
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }

    /// Report of the most recent solve, if any system was solved
    pub fn last_report(&self) -> Option<&RefinementReport> {
        self.last_report.as_ref()
    }

    /// Weights of the sample points of `index`, one per entry of `locations`
    ///
    /// `locations` must list every sample point of the index. When the cache
    /// holds weights for all of them nothing is solved. A solve that misses
    /// the residual tolerance is an error and leaves the cache untouched.
    pub fn solve<M, S>(
        &mut self,
        manifold: &M,
        index: &S,
        locations: &[(f64, f64)],
    ) -> Result<Vec<DVector<f64>>>
    where
        M: Manifold,
        S: SampleIndex<M::Point> + ?Sized,
    {
        let scope = index.cache_scope();
        let dim = manifold.dim();

        let cached: Option<Vec<DVector<f64>>> = locations
            .iter()
            .map(|&(x, y)| {
                self.cache
                    .get(&CacheKey::new(scope, x, y))
                    .filter(|weights| weights.len() == dim)
                    .map(|weights| DVector::from_vec(weights.to_vec()))
            })
            .collect();
        if let Some(weights) = cached {
            self.hits += locations.len();
            debug!(points = locations.len(), "weights served from cache");
            return Ok(weights);
        }
        self.misses += locations.len();

        let systems = self.local_systems(manifold, index, locations)?;
        let (weights, report) = self.refine(&systems, dim);
        let iterations = report.iterations();
        let residual = report.final_residual();
        let converged = report.converged;
        self.last_report = Some(report);

        if !converged {
            warn!(
                points = locations.len(),
                iterations,
                residual,
                "RBF weight solve did not reach the residual tolerance"
            );
            return Err(Error::NotConverged {
                iterations,
                residual,
                tolerance: self.config.residual_tolerance,
            });
        }
        debug!(points = locations.len(), iterations, "solved RBF weights");

        for (&(x, y), lambda) in locations.iter().zip(&weights) {
            self.cache
                .put(CacheKey::new(scope, x, y), lambda.as_slice().to_vec());
        }
        Ok(weights)
    }

    /// Assemble and check the kernel row of every node
    pub fn local_systems<M, S>(
        &self,
        manifold: &M,
        index: &S,
        locations: &[(f64, f64)],
    ) -> Result<Vec<LocalSystem>>
    where
        M: Manifold,
        S: SampleIndex<M::Point> + ?Sized,
    {
        let mut lookup = HashMap::with_capacity(locations.len());
        for (i, &(x, y)) in locations.iter().enumerate() {
            if lookup.insert(CacheKey::new(0, x, y), i).is_some() {
                return Err(Error::DegenerateSystem {
                    x,
                    y,
                    reason: "two sample points share this location".to_string(),
                });
            }
        }

        locations
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| self.local_system(manifold, index, &lookup, i, x, y))
            .collect()
    }

    fn local_system<M, S>(
        &self,
        manifold: &M,
        index: &S,
        lookup: &HashMap<CacheKey, usize>,
        node: usize,
        x: f64,
        y: f64,
    ) -> Result<LocalSystem>
    where
        M: Manifold,
        S: SampleIndex<M::Point> + ?Sized,
    {
        let found: Vec<_> = index.points_in_radius(x, y).collect();

        let mut neighbors = Vec::with_capacity(found.len());
        for neighbor in &found {
            let (nx, ny) = neighbor.point.location();
            let j = lookup
                .get(&CacheKey::new(0, nx, ny))
                .copied()
                .ok_or_else(|| {
                    Error::InvalidParameter(format!(
                        "sample point ({}, {}) missing from the node list",
                        nx, ny
                    ))
                })?;
            neighbors.push(j);
        }
        let center = neighbors
            .iter()
            .position(|&j| j == node)
            .ok_or_else(|| Error::DegenerateSystem {
                x,
                y,
                reason: "node is not inside its own kernel support".to_string(),
            })?;

        let values: Vec<M::Point> = found.iter().map(|n| n.point.evaluation.clone()).collect();
        let kernel_values: Vec<f64> = found.iter().map(|n| n.kernel_value).collect();
        let mean = KarcherMean::new(self.config.karcher).solve(manifold, &values, &kernel_values)?;
        let v = manifold.log(&mean.point, &values[center])?;
        let tangent = manifold.to_coords(&mean.point, &v);

        let kernel = index.kernel();
        let n = found.len();
        let gram = DMatrix::from_fn(n, n, |a, b| {
            kernel.between(found[a].point.location(), found[b].point.location())
        });
        let reciprocal_condition = reciprocal_condition(&gram);
        if !(reciprocal_condition >= self.config.min_reciprocal_condition) {
            return Err(Error::DegenerateSystem {
                x,
                y,
                reason: format!(
                    "kernel matrix reciprocal condition {:e} below {:e}",
                    reciprocal_condition, self.config.min_reciprocal_condition
                ),
            });
        }
        trace!(x, y, neighbors = n, reciprocal_condition, "checked local kernel system");

        Ok(LocalSystem {
            neighbors,
            kernel_values,
            center,
            tangent,
            base_converged: mean.converged,
            reciprocal_condition,
        })
    }

    /// Conjugate gradients on the coupled kernel system
    ///
    /// Every tangent coordinate is an independent right-hand side and gets its
    /// own step lengths. When the recurrence residual drops below the
    /// tolerance the true residual is recomputed, and the iteration restarts
    /// from it if the two have drifted apart.
    pub fn refine(
        &self,
        systems: &[LocalSystem],
        dim: usize,
    ) -> (Vec<DVector<f64>>, RefinementReport) {
        let n = systems.len();
        let rhs = DMatrix::from_fn(n, dim, |i, c| systems[i].tangent[c]);
        let mut weights = DMatrix::<f64>::zeros(n, dim);
        let mut residual = rhs.clone();
        let mut direction = residual.clone();
        let mut rtr = column_norms_squared(&residual);
        let mut report = RefinementReport {
            residuals: Vec::new(),
            converged: false,
        };

        for iteration in 0..=self.config.max_iterations {
            let mut worst = largest_row_norm(&residual);
            if worst < self.config.residual_tolerance {
                residual = &rhs - apply_kernel(systems, &weights);
                worst = largest_row_norm(&residual);
                if worst < self.config.residual_tolerance {
                    report.residuals.push(worst);
                    report.converged = true;
                    break;
                }
                direction = residual.clone();
                rtr = column_norms_squared(&residual);
            }
            report.residuals.push(worst);
            trace!(iteration, residual = worst, "conjugate gradient");
            if iteration == self.config.max_iterations || !worst.is_finite() {
                break;
            }

            let image = apply_kernel(systems, &direction);
            for c in 0..dim {
                if rtr[c] == 0.0 {
                    continue;
                }
                let curvature = direction.column(c).dot(&image.column(c));
                let alpha = rtr[c] / curvature;
                for i in 0..n {
                    weights[(i, c)] += alpha * direction[(i, c)];
                    residual[(i, c)] -= alpha * image[(i, c)];
                }
                let updated = residual.column(c).norm_squared();
                let beta = updated / rtr[c];
                for i in 0..n {
                    direction[(i, c)] = residual[(i, c)] + beta * direction[(i, c)];
                }
                rtr[c] = updated;
            }
        }

        let weights = (0..n).map(|i| weights.row(i).transpose()).collect();
        (weights, report)
    }

    /// Persist the cached weights
    pub fn close(&mut self) -> Result<()> {
        debug!(
            hits = self.hits,
            misses = self.misses,
            entries = self.cache.len(),
            "closing weight solver"
        );
        self.cache.flush()
    }
}

impl std::fmt::Debug for WeightSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightSolver")
            .field("config", &self.config)
            .field("cached", &self.cache.len())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

/// Smallest over largest eigenvalue magnitude of a symmetric matrix
fn reciprocal_condition(matrix: &DMatrix<f64>) -> f64 {
    let eigenvalues = matrix.symmetric_eigenvalues();
    let largest = eigenvalues.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if largest == 0.0 {
        return 0.0;
    }
    let smallest = eigenvalues.iter().fold(f64::INFINITY, |acc, &v| acc.min(v));
    smallest / largest
}

/// Product of the global kernel matrix with one column per tangent coordinate
fn apply_kernel(systems: &[LocalSystem], columns: &DMatrix<f64>) -> DMatrix<f64> {
    let mut image = DMatrix::zeros(columns.nrows(), columns.ncols());
    for (i, system) in systems.iter().enumerate() {
        for (&j, &k) in system.neighbors.iter().zip(&system.kernel_values) {
            for c in 0..columns.ncols() {
                image[(i, c)] += k * columns[(j, c)];
            }
        }
    }
    image
}

fn column_norms_squared(matrix: &DMatrix<f64>) -> Vec<f64> {
    matrix.column_iter().map(|column| column.norm_squared()).collect()
}

/// Largest residual norm over the nodes
fn largest_row_norm(matrix: &DMatrix<f64>) -> f64 {
    matrix
        .row_iter()
        .map(|row| row.norm())
        .fold(0.0_f64, |acc, norm| if norm.is_nan() || norm > acc { norm } else { acc })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::kernel::Kernel;
    use crate::manifolds::{Reals, Rotations};
    use crate::sampling::cache::FileCache;
    use crate::sampling::{Grid, GridParameters, SamplingContext};
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn real_grid(radius: f64, function: &dyn Fn(f64, f64) -> f64) -> Grid<f64> {
        let ctx = SamplingContext::new(&Reals, Kernel::wendland(radius).unwrap(), function);
        Grid::sample(GridParameters::symmetric(1.0, 0.2), &ctx).unwrap()
    }

    fn locations<P>(grid: &Grid<P>) -> Vec<(f64, f64)> {
        grid.nodes().iter().map(|node| node.location()).collect()
    }

    #[test]
    fn test_weights_reproduce_node_values() {
        let function = |x: f64, y: f64| (4.0 * x).sin() * (5.0 * y).cos();
        let grid = real_grid(0.5, &function);
        let nodes = locations(&grid);
        let mut solver = WeightSolver::in_memory(SolverConfig::default());
        let weights = solver.solve(&Reals, &grid, &nodes).unwrap();
        assert!(solver.last_report().unwrap().converged);

        // Σ_j Φ(x_i, x_j) λ_j = t_i at every node
        let systems = solver.local_systems(&Reals, &grid, &nodes).unwrap();
        for (i, system) in systems.iter().enumerate() {
            let fitted: f64 = system
                .neighbors
                .iter()
                .zip(&system.kernel_values)
                .map(|(&j, &k)| k * weights[j][0])
                .sum();
            assert_relative_eq!(fitted, system.tangent[0], epsilon = 1e-8);
            assert_eq!(system.neighbors[system.center], i);
        }
    }

    #[test]
    fn test_wide_support_reproduces_node_values() {
        // Support radius eight times the node spacing
        let function = |x: f64, y: f64| (4.0 * x).sin() * (5.0 * y).cos();
        let ctx = SamplingContext::new(&Reals, Kernel::wendland(0.8).unwrap(), &function);
        let grid = Grid::sample(GridParameters::symmetric(0.7, 0.1), &ctx).unwrap();
        let nodes = locations(&grid);
        let mut solver = WeightSolver::in_memory(SolverConfig::default());
        let weights = solver.solve(&Reals, &grid, &nodes).unwrap();

        let report = solver.last_report().unwrap();
        assert!(report.converged);
        assert!(report.final_residual() < 1e-9);

        let systems = solver.local_systems(&Reals, &grid, &nodes).unwrap();
        for system in &systems {
            let fitted: f64 = system
                .neighbors
                .iter()
                .zip(&system.kernel_values)
                .map(|(&j, &k)| k * weights[j][0])
                .sum();
            assert_relative_eq!(fitted, system.tangent[0], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_iteration_cap_is_an_error() {
        let grid = real_grid(0.5, &|x: f64, y: f64| x * y);
        let nodes = locations(&grid);
        let mut solver =
            WeightSolver::in_memory(SolverConfig::default().with_max_iterations(1));
        let err = solver.solve(&Reals, &grid, &nodes).unwrap_err();
        assert!(matches!(err, Error::NotConverged { iterations: 1, .. }));

        let report = solver.last_report().unwrap();
        assert!(!report.converged);
        assert_eq!(report.residuals.len(), 2);
        assert!(solver.cache().is_empty());
    }

    #[test]
    fn test_kernel_product_is_symmetric() {
        let grid = real_grid(0.5, &|x: f64, y: f64| x + y);
        let nodes = locations(&grid);
        let solver = WeightSolver::in_memory(SolverConfig::default());
        let systems = solver.local_systems(&Reals, &grid, &nodes).unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        let u = DMatrix::from_fn(nodes.len(), 1, |_, _| rng.gen_range(-1.0..1.0));
        let v = DMatrix::from_fn(nodes.len(), 1, |_, _| rng.gen_range(-1.0..1.0));
        let uav = u.column(0).dot(&apply_kernel(&systems, &v).column(0));
        let vau = v.column(0).dot(&apply_kernel(&systems, &u).column(0));
        assert_relative_eq!(uav, vau, epsilon = 1e-10);
        assert!(u.column(0).dot(&apply_kernel(&systems, &u).column(0)) > 0.0);
    }

    #[test]
    fn test_constant_field_has_zero_weights() {
        let rotations = Rotations::default();
        let constant = Rotations::from_euler(0.3, -0.2, 0.9);
        let function = move |_: f64, _: f64| constant.clone();
        let ctx = SamplingContext::new(&rotations, Kernel::wendland(0.5).unwrap(), &function);
        let grid: Grid<Array2<f64>> =
            Grid::sample(GridParameters::symmetric(1.0, 0.25), &ctx).unwrap();

        let mut solver = WeightSolver::in_memory(SolverConfig::default());
        let weights = solver.solve(&rotations, &grid, &locations(&grid)).unwrap();
        for lambda in &weights {
            assert_eq!(lambda.len(), 3);
            assert!(lambda.amax() < 1e-10);
        }
    }

    #[test]
    fn test_weights_are_memoized() {
        let grid = real_grid(0.5, &|x: f64, y: f64| x - y);
        let nodes = locations(&grid);
        let mut solver = WeightSolver::in_memory(SolverConfig::default());

        let first = solver.solve(&Reals, &grid, &nodes).unwrap();
        let second = solver.solve(&Reals, &grid, &nodes).unwrap();
        assert_eq!(first, second);
        assert_eq!(solver.stats(), (nodes.len(), nodes.len()));
        assert_eq!(solver.cache().len(), nodes.len());
    }

    #[test]
    fn test_weights_persist_through_file_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");
        let grid = real_grid(0.5, &|x: f64, y: f64| x * x + y);
        let nodes = locations(&grid);

        let cache = Box::new(FileCache::open(&path).unwrap());
        let mut solver = WeightSolver::new(SolverConfig::default(), cache);
        let computed = solver.solve(&Reals, &grid, &nodes).unwrap();
        solver.close().unwrap();

        let cache = Box::new(FileCache::open(&path).unwrap());
        let mut reopened = WeightSolver::new(SolverConfig::default(), cache);
        let loaded = reopened.solve(&Reals, &grid, &nodes).unwrap();
        assert_eq!(loaded, computed);
        assert_eq!(reopened.stats(), (nodes.len(), 0));
        assert!(reopened.last_report().is_none());
    }

    #[test]
    fn test_duplicate_locations_are_degenerate() {
        let grid = real_grid(0.5, &|x: f64, _: f64| x);
        let mut nodes = locations(&grid);
        nodes.push(nodes[7]);
        let solver = WeightSolver::in_memory(SolverConfig::default());
        let err = solver.local_systems(&Reals, &grid, &nodes).unwrap_err();
        assert!(matches!(err, Error::DegenerateSystem { .. }));
    }

    #[test]
    fn test_ill_conditioned_system_is_rejected() {
        let grid = real_grid(0.5, &|x: f64, _: f64| x);
        let config = SolverConfig::default().with_min_reciprocal_condition(0.9);
        let mut strict = WeightSolver::in_memory(config);
        let err = strict.solve(&Reals, &grid, &locations(&grid)).unwrap_err();
        assert!(matches!(err, Error::DegenerateSystem { .. }));
        assert!(strict.cache().is_empty());
    }

    #[test]
    fn test_reciprocal_condition() {
        let identity = DMatrix::<f64>::identity(4, 4);
        assert_relative_eq!(reciprocal_condition(&identity), 1.0);

        let diagonal = DMatrix::from_diagonal(&DVector::from_vec(vec![4.0, 1.0, 0.5]));
        assert_relative_eq!(reciprocal_condition(&diagonal), 0.125, epsilon = 1e-12);

        let singular = DMatrix::from_element(3, 3, 1.0);
        assert!(reciprocal_condition(&singular) < 1e-12);
    }
}
