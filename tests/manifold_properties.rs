use approx::assert_relative_eq;
use manifold_interp::algorithms::KarcherMean;
use manifold_interp::core::Manifold;
use manifold_interp::manifolds::{PositiveReals, Reals, Rotations, Spd};
use nalgebra::DVector;
use ndarray::Array2;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// =========================================================================
// Helpers
// =========================================================================

fn random_coords(rng: &mut StdRng, dim: usize, scale: f64) -> DVector<f64> {
    DVector::from_fn(dim, |_, _| rng.gen_range(-scale..scale))
}

/// Point reached from `p` along random tangent coordinates
fn nearby<M: Manifold>(manifold: &M, rng: &mut StdRng, p: &M::Point, scale: f64) -> M::Point {
    let coords = random_coords(rng, manifold.dim(), scale);
    let v = manifold.from_coords(p, &coords).unwrap();
    manifold.exp(p, &v).unwrap()
}

fn check_exp_log_roundtrip<M: Manifold>(manifold: &M, rng: &mut StdRng, p: &M::Point) {
    let coords = random_coords(rng, manifold.dim(), 0.8);
    let v = manifold.from_coords(p, &coords).unwrap();
    let q = manifold.exp(p, &v).unwrap();
    assert!(manifold.is_in_manifold(&q), "{}: exp left the manifold", manifold.name());

    let recovered = manifold.to_coords(p, &manifold.log(p, &q).unwrap());
    for (a, b) in coords.iter().zip(recovered.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-8);
    }
    assert_relative_eq!(manifold.distance(p, &q).unwrap(), manifold.norm(p, &v), epsilon = 1e-8);
}

fn check_log_at_self<M: Manifold>(manifold: &M, p: &M::Point) {
    let v = manifold.log(p, p).unwrap();
    assert!(manifold.norm(p, &v) < 1e-7, "{}: log(p, p) is not zero", manifold.name());
}

fn check_metric<M: Manifold>(manifold: &M, rng: &mut StdRng, p: &M::Point) {
    let q = nearby(manifold, rng, p, 0.8);
    let r = nearby(manifold, rng, p, 0.8);

    let pq = manifold.distance(p, &q).unwrap();
    let qp = manifold.distance(&q, p).unwrap();
    assert_relative_eq!(pq, qp, epsilon = 1e-8);

    let pr = manifold.distance(p, &r).unwrap();
    let qr = manifold.distance(&q, &r).unwrap();
    assert!(qr <= pq + pr + 1e-8, "{}: triangle inequality violated", manifold.name());
    assert!(manifold.distance(p, p).unwrap() < 1e-7);
}

fn check_mean<M: Manifold>(manifold: &M, rng: &mut StdRng, p: &M::Point) {
    let values: Vec<M::Point> = (0..4).map(|_| nearby(manifold, rng, p, 0.3)).collect();
    let weights: Vec<f64> = (0..4).map(|_| rng.gen_range(0.1..1.0)).collect();
    let rescaled: Vec<f64> = weights.iter().map(|w| 3.7 * w).collect();

    let mean = manifold.average(&values, &weights).unwrap();
    let mean_rescaled = manifold.average(&values, &rescaled).unwrap();
    assert!(manifold.distance(&mean, &mean_rescaled).unwrap() < 1e-9);

    let single = manifold.average(&values[..1], &[2.0]).unwrap();
    assert!(manifold.distance(&single, &values[0]).unwrap() < 1e-9);
}

fn check_all<M: Manifold>(manifold: &M, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let p = manifold.gen_point(&mut rng);
    assert!(manifold.is_in_manifold(&p));

    check_exp_log_roundtrip(manifold, &mut rng, &p);
    check_log_at_self(manifold, &p);
    check_metric(manifold, &mut rng, &p);
    check_mean(manifold, &mut rng, &p);
}

// =========================================================================
// Property tests over every built-in geometry
// =========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_reals(seed in any::<u64>()) {
        check_all(&Reals, seed);
    }

    #[test]
    fn prop_positive_reals(seed in any::<u64>()) {
        check_all(&PositiveReals, seed);
    }

    #[test]
    fn prop_rotations(seed in any::<u64>()) {
        check_all(&Rotations::new(), seed);
    }

    #[test]
    fn prop_spd(seed in any::<u64>(), n in 1usize..4) {
        check_all(&Spd::new(n), seed);
    }

    #[test]
    fn prop_rotations_with_rounding_drift(seed in any::<u64>(), scale in 0.0f64..1e-4) {
        let rotations = Rotations::new();
        let mut rng = StdRng::seed_from_u64(seed);
        let p = rotations.gen_point(&mut rng);
        let drift = Array2::from_shape_fn((3, 3), |_| rng.gen_range(-scale..=scale));
        let noisy = &p + &drift;
        prop_assume!(rotations.is_in_manifold(&noisy));

        let v = rotations.log(&noisy, &noisy).unwrap();
        prop_assert!(rotations.norm(&noisy, &v) < 1e-10);
        prop_assert!(rotations.distance(&noisy, &noisy).unwrap() < 1e-10);
        prop_assert!(rotations.distance(&p, &noisy).unwrap() < 1e-3);

        let q = nearby(&rotations, &mut rng, &p, 0.8);
        let clean = rotations.distance(&p, &q).unwrap();
        prop_assert!((rotations.distance(&noisy, &q).unwrap() - clean).abs() < 1e-3);
    }

    #[test]
    fn prop_geodesic_endpoints(seed in any::<u64>()) {
        let spd = Spd::new(2);
        let mut rng = StdRng::seed_from_u64(seed);
        let p = spd.gen_point(&mut rng);
        let q = nearby(&spd, &mut rng, &p, 0.8);

        prop_assert!(spd.distance(&spd.geodesic(&p, &q, 0.0).unwrap(), &p).unwrap() < 1e-9);
        prop_assert!(spd.distance(&spd.geodesic(&p, &q, 1.0).unwrap(), &q).unwrap() < 1e-8);
        let halfway = spd.geodesic(&p, &q, 0.5).unwrap();
        let total = spd.distance(&p, &q).unwrap();
        prop_assert!((spd.distance(&p, &halfway).unwrap() - total / 2.0).abs() < 1e-8);
    }
}

// =========================================================================
// Karcher mean of rotations
// =========================================================================

#[test]
fn test_karcher_mean_of_three_rotations() {
    let rotations = Rotations::new();
    let identity: Array2<f64> = Array2::eye(3);

    // Orthogonal unit coordinates scaled to geodesic distance 0.2 from the identity
    let step = 0.2 / 2f64.sqrt();
    let directions = [
        DVector::from_vec(vec![step, 0.0, 0.0]),
        DVector::from_vec(vec![0.0, step, 0.0]),
        DVector::from_vec(vec![0.0, 0.0, step]),
    ];
    let samples: Vec<Array2<f64>> = directions
        .iter()
        .map(|coords| {
            let v = rotations.from_coords(&identity, coords).unwrap();
            rotations.exp(&identity, &v).unwrap()
        })
        .collect();
    for sample in &samples {
        assert_relative_eq!(rotations.distance(&identity, sample).unwrap(), 0.2, epsilon = 1e-12);
    }

    let estimate = KarcherMean::default().solve(&rotations, &samples, &[1.0, 1.0, 1.0]).unwrap();
    assert!(estimate.converged);
    for pair in estimate.residuals.windows(2) {
        assert!(pair[1] <= pair[0], "residuals increased: {:?}", estimate.residuals);
    }

    // The Fréchet mean differs from the exponential of the averaged generators
    // only at third order in the spread
    let averaged = (&directions[0] + &directions[1] + &directions[2]) / 3.0;
    let linearised = rotations
        .exp(&identity, &rotations.from_coords(&identity, &averaged).unwrap())
        .unwrap();
    assert!(rotations.distance(&estimate.point, &linearised).unwrap() < 1e-3);
}

#[test]
fn test_karcher_mean_reports_iteration_cap() {
    let rotations = Rotations::new();
    let samples = vec![
        Rotations::from_euler(0.6, 0.0, 0.0),
        Rotations::from_euler(0.0, -0.7, 0.0),
        Rotations::from_euler(0.0, 0.0, 0.9),
    ];

    let capped = KarcherMean::default()
        .with_max_iterations(1)
        .with_tolerance(1e-14)
        .solve(&rotations, &samples, &[1.0, 2.0, 3.0])
        .unwrap();
    assert!(!capped.converged);
    assert_eq!(capped.iterations, 1);
    assert!(rotations.is_in_manifold(&capped.point));
}

#[test]
fn test_positive_reals_mean_is_geometric() {
    let mean = PositiveReals.average(&[1.0, 4.0, 16.0], &[1.0, 1.0, 1.0]).unwrap();
    assert_relative_eq!(mean, 4.0, epsilon = 1e-12);

    let karcher = KarcherMean::default()
        .with_max_iterations(50)
        .solve(&PositiveReals, &[1.0, 4.0, 16.0], &[1.0, 1.0, 1.0])
        .unwrap();
    assert_relative_eq!(karcher.point, 4.0, epsilon = 1e-8);
}
