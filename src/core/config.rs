//! Configuration of an interpolation problem.
//!
//! Every struct has a `Default` and `with_*` builders; the whole problem can
//! also be described in JSON and loaded with [`InterpolationConfig::from_json_str`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::algorithms::karcher::KarcherConfig;
use crate::algorithms::kernel::{Kernel, KernelProfile};
use crate::core::error::{Error, Result};
use crate::sampling::grid::{GridParameters, IndexLayout};

/// Parameters handed to manifold constructors resolved from the registry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifoldSettings {
    /// Matrix size for the matrix manifolds
    pub dim: usize,
    /// Largest logarithm residue that is trimmed as floating-point noise
    pub branch_cut_tolerance: f64,
}

impl Default for ManifoldSettings {
    fn default() -> Self {
        Self {
            dim: 3,
            branch_cut_tolerance: 1e-5,
        }
    }
}

impl ManifoldSettings {
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    pub fn with_branch_cut_tolerance(mut self, tolerance: f64) -> Self {
        self.branch_cut_tolerance = tolerance;
        self
    }
}

/// Settings of the RBF weight solver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Local kernel matrices with a smaller reciprocal condition number are rejected
    pub min_reciprocal_condition: f64,
    /// Upper bound on the conjugate gradient iterations of one solve
    pub max_iterations: usize,
    /// Weights are accepted once every node residual is below this
    pub residual_tolerance: f64,
    /// Settings of the Karcher mean used to pick the tangent space
    pub karcher: KarcherConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            min_reciprocal_condition: 1e-14,
            max_iterations: 2000,
            residual_tolerance: 1e-9,
            karcher: KarcherConfig::default(),
        }
    }
}

impl SolverConfig {
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn with_residual_tolerance(mut self, tolerance: f64) -> Self {
        self.residual_tolerance = tolerance;
        self
    }

    pub fn with_min_reciprocal_condition(mut self, rcond: f64) -> Self {
        self.min_reciprocal_condition = rcond;
        self
    }

    pub fn with_karcher(mut self, karcher: KarcherConfig) -> Self {
        self.karcher = karcher;
        self
    }
}

/// One sampling structure of the problem: a registered class and its grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub class: String,
    pub parameters: GridParameters,
}

/// Full description of an interpolation problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Name in the manifold registry
    pub manifold: String,
    /// Name in the function registry
    pub function: String,
    /// Support radius of the kernel
    pub rbf_radius: f64,
    pub kernel: KernelProfile,
    pub layout: IndexLayout,
    pub grids: Vec<GridSpec>,
    pub manifold_settings: ManifoldSettings,
    pub solver: SolverConfig,
    /// Persisted weight cache; in-memory only when absent
    pub cache_path: Option<PathBuf>,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            manifold: "numbers".to_string(),
            function: "numbers".to_string(),
            rbf_radius: 0.5,
            kernel: KernelProfile::default(),
            layout: IndexLayout::default(),
            grids: vec![GridSpec {
                class: "Grid".to_string(),
                parameters: GridParameters::symmetric(1.0, 0.2),
            }],
            manifold_settings: ManifoldSettings::default(),
            solver: SolverConfig::default(),
            cache_path: None,
        }
    }
}

impl InterpolationConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_manifold(mut self, name: impl Into<String>) -> Self {
        self.manifold = name.into();
        self
    }

    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.function = name.into();
        self
    }

    pub fn with_rbf_radius(mut self, radius: f64) -> Self {
        self.rbf_radius = radius;
        self
    }

    pub fn with_kernel(mut self, profile: KernelProfile) -> Self {
        self.kernel = profile;
        self
    }

    pub fn with_layout(mut self, layout: IndexLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Replace the sampling structures
    pub fn with_grids(mut self, grids: Vec<GridSpec>) -> Self {
        self.grids = grids;
        self
    }

    /// Add one sampling structure
    pub fn with_grid(mut self, class: impl Into<String>, parameters: GridParameters) -> Self {
        self.grids.push(GridSpec {
            class: class.into(),
            parameters,
        });
        self
    }

    pub fn with_manifold_settings(mut self, settings: ManifoldSettings) -> Self {
        self.manifold_settings = settings;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Kernel described by the profile and radius
    pub fn kernel(&self) -> Result<Kernel> {
        Kernel::new(self.kernel, self.rbf_radius)
    }

    /// Reject configurations no interpolation problem can be built from
    pub fn validate(&self) -> Result<()> {
        if !(self.rbf_radius > 0.0 && self.rbf_radius.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "rbf_radius must be positive, got {}",
                self.rbf_radius
            )));
        }
        if self.grids.is_empty() {
            return Err(Error::InvalidParameter(
                "at least one sampling grid is required".to_string(),
            ));
        }
        for spec in &self.grids {
            spec.parameters.validate()?;
        }
        if self.manifold_settings.dim == 0 {
            return Err(Error::InvalidParameter(
                "manifold dimension must be positive".to_string(),
            ));
        }
        if self.manifold_settings.branch_cut_tolerance < 0.0 {
            return Err(Error::InvalidParameter(
                "branch_cut_tolerance must be non-negative".to_string(),
            ));
        }
        if !(self.solver.residual_tolerance > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "residual_tolerance must be positive, got {}",
                self.solver.residual_tolerance
            )));
        }
        self.solver.karcher.validate()
    }
}
