//! Regular sampling grid with constant-time neighbourhood lookup.
//!
//! Nodes are stored in an `ny x nx` array (rows follow y, columns follow x).
//! A radius query maps the location to its cell, scans a padded window of
//! `radius_in_index + 1` cells around it and keeps the nodes where the kernel
//! does not vanish.

use nalgebra::DVector;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::algorithms::kernel::{Kernel, KernelProfile};
use crate::algorithms::weights::WeightSolver;
use crate::core::error::{Error, Result};
use crate::core::traits::Manifold;
use crate::sampling::cache::fingerprint;
use crate::sampling::collection::SamplingContext;
use crate::sampling::{Neighbor, SampleIndex, SamplePoint};

/// Rectangle of the plane and spacing between nodes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridParameters {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    /// Node spacing along both axes
    #[serde(alias = "mesh_norm")]
    pub fill_distance: f64,
}

impl GridParameters {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64, fill_distance: f64) -> Result<Self> {
        let params = GridParameters {
            x_min,
            x_max,
            y_min,
            y_max,
            fill_distance,
        };
        params.validate()?;
        Ok(params)
    }

    /// Square `[-size, size]^2`
    pub fn symmetric(size: f64, fill_distance: f64) -> Self {
        GridParameters {
            x_min: -size,
            x_max: size,
            y_min: -size,
            y_max: size,
            fill_distance,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [self.x_min, self.x_max, self.y_min, self.y_max, self.fill_distance]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(Error::InvalidParameter(format!(
                "grid parameters must be finite: {:?}",
                self
            )));
        }
        if self.x_max <= self.x_min || self.y_max <= self.y_min {
            return Err(Error::InvalidParameter(format!(
                "grid bounds must satisfy min < max: {:?}",
                self
            )));
        }
        if self.fill_distance <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "fill distance must be positive, got {}",
                self.fill_distance
            )));
        }
        Ok(())
    }

    /// Number of nodes along x
    pub fn nx(&self) -> usize {
        axis_len(self.x_max - self.x_min, self.fill_distance)
    }

    /// Number of nodes along y
    pub fn ny(&self) -> usize {
        axis_len(self.y_max - self.y_min, self.fill_distance)
    }

    /// Node abscissas
    pub fn xs(&self) -> Array1<f64> {
        Array1::linspace(self.x_min, self.x_max, self.nx())
    }

    /// Node ordinates
    pub fn ys(&self) -> Array1<f64> {
        Array1::linspace(self.y_min, self.y_max, self.ny())
    }
}

fn axis_len(length: f64, fill_distance: f64) -> usize {
    (length / fill_distance).round() as usize + 1
}

/// How a location's cell maps onto the (row, column) storage
///
/// Storage always has rows along y. `RowIsX` reads the cell indices the other
/// way round, so its search window sits on the transposed cell and only finds
/// every neighbour for queries near the diagonal of a square grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexLayout {
    #[default]
    RowIsY,
    RowIsX,
}

/// Sampling grid carrying function values and RBF weights at every node
#[derive(Debug, Clone)]
pub struct Grid<P> {
    params: GridParameters,
    kernel: Kernel,
    layout: IndexLayout,
    radius_in_index: usize,
    nodes: Array2<SamplePoint<P>>,
    weighted: bool,
}

impl<P: Clone> Grid<P> {
    /// Sample the function on the grid and solve the RBF weights of every node
    pub fn build<M>(
        params: GridParameters,
        ctx: &SamplingContext<'_, M>,
        solver: &mut WeightSolver,
    ) -> Result<Self>
    where
        M: Manifold<Point = P>,
    {
        let mut grid = Self::sample(params, ctx)?;
        let weights = solver.solve(ctx.manifold, &grid, &grid.locations())?;
        grid.assign_weights(&weights)?;

        info!(
            manifold = ctx.manifold.name(),
            nx = params.nx(),
            ny = params.ny(),
            fill_distance = params.fill_distance,
            "built sampling grid"
        );
        Ok(grid)
    }

    /// Evaluate the function at every node, leaving the weights at zero
    pub fn sample<M>(params: GridParameters, ctx: &SamplingContext<'_, M>) -> Result<Self>
    where
        M: Manifold<Point = P>,
    {
        params.validate()?;
        let xs = params.xs();
        let ys = params.ys();
        let (nx, ny) = (xs.len(), ys.len());

        let mut nodes = Vec::with_capacity(nx * ny);
        for &y in ys.iter() {
            for &x in xs.iter() {
                let evaluation = (ctx.function)(x, y);
                ctx.manifold.validate_point(&evaluation)?;
                nodes.push(SamplePoint {
                    x,
                    y,
                    evaluation,
                    lambda: DVector::zeros(ctx.manifold.dim()),
                });
            }
        }
        let nodes = Array2::from_shape_vec((ny, nx), nodes)
            .map_err(|e| Error::InvalidParameter(format!("grid shape: {}", e)))?;

        let radius_in_index = (ctx.kernel.support_radius() / params.fill_distance).ceil() as usize;
        debug!(nx, ny, radius_in_index, "sampled grid nodes");

        Ok(Grid {
            params,
            kernel: ctx.kernel,
            layout: ctx.layout,
            radius_in_index,
            nodes,
            weighted: false,
        })
    }
}

impl<P> Grid<P> {
    pub fn parameters(&self) -> &GridParameters {
        &self.params
    }

    pub fn layout(&self) -> IndexLayout {
        self.layout
    }

    /// Kernel support radius in units of cells
    pub fn radius_in_index(&self) -> usize {
        self.radius_in_index
    }

    /// Nodes as an `ny x nx` array
    pub fn nodes(&self) -> &Array2<SamplePoint<P>> {
        &self.nodes
    }

    pub fn shape(&self) -> (usize, usize) {
        self.nodes.dim()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes whose kernel value at `(x, y)` is non-zero
    ///
    /// Locations outside the grid are allowed; window cells falling outside
    /// the node array are skipped.
    pub fn points_in_radius(&self, x: f64, y: f64) -> impl Iterator<Item = Neighbor<'_, P>> + '_ {
        let h = self.params.fill_distance;
        let cell_x = ((x - self.params.x_min) / h).floor() as i64;
        let cell_y = ((y - self.params.y_min) / h).floor() as i64;
        let (row, col) = match self.layout {
            IndexLayout::RowIsY => (cell_y, cell_x),
            IndexLayout::RowIsX => (cell_x, cell_y),
        };

        let reach = self.radius_in_index as i64 + 1;
        let (rows, cols) = self.nodes.dim();
        let (row_lo, row_hi) = if x.is_finite() && y.is_finite() {
            (row.saturating_sub(reach).max(0), row.saturating_add(reach).min(rows as i64 - 1))
        } else {
            (0, -1)
        };
        let col_lo = col.saturating_sub(reach).max(0);
        let col_hi = col.saturating_add(reach).min(cols as i64 - 1);

        let kernel = self.kernel;
        (row_lo..=row_hi)
            .flat_map(move |r| (col_lo..=col_hi).map(move |c| (r as usize, c as usize)))
            .filter_map(move |(r, c)| {
                let point = &self.nodes[[r, c]];
                let kernel_value = kernel.between((x, y), (point.x, point.y));
                (kernel_value != 0.0).then_some(Neighbor { point, kernel_value })
            })
    }

    /// Function values as an `ny x nx` array
    pub fn evaluations(&self) -> Array2<P>
    where
        P: Clone,
    {
        self.nodes.map(|node| node.evaluation.clone())
    }
}

impl<P> SampleIndex<P> for Grid<P> {
    fn points_in_radius<'a>(
        &'a self,
        x: f64,
        y: f64,
    ) -> Box<dyn Iterator<Item = Neighbor<'a, P>> + 'a>
    where
        P: 'a,
    {
        Box::new(Grid::points_in_radius(self, x, y))
    }

    fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn locations(&self) -> Vec<(f64, f64)> {
        self.nodes.iter().map(SamplePoint::location).collect()
    }

    fn assign_weights(&mut self, weights: &[DVector<f64>]) -> Result<()> {
        if weights.len() != self.nodes.len() {
            return Err(Error::DimensionMismatch {
                expected: self.nodes.len(),
                got: weights.len(),
            });
        }
        for (node, lambda) in self.nodes.iter_mut().zip(weights) {
            node.lambda = lambda.clone();
        }
        self.weighted = true;
        Ok(())
    }

    fn has_weights(&self) -> bool {
        self.weighted
    }

    fn cache_scope(&self) -> u64 {
        let profile = match self.kernel.profile() {
            KernelProfile::Wendland30 => 0.0,
            KernelProfile::Wendland31 => 1.0,
            KernelProfile::Wendland32 => 2.0,
        };
        let layout = match self.layout {
            IndexLayout::RowIsY => 0.0,
            IndexLayout::RowIsX => 1.0,
        };
        fingerprint(
            [
                self.params.x_min,
                self.params.x_max,
                self.params.y_min,
                self.params.y_max,
                self.params.fill_distance,
                self.kernel.support_radius(),
                profile,
                layout,
            ]
            .iter()
            .map(|v| v.to_bits()),
        )
    }
}
