//! Random count matrices for tests

use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use scater_types::CountMatrix;

/// Seeded generator so failures are reproducible
pub(crate) fn rng(seed: u64) -> Pcg64Mcg {
    Pcg64Mcg::seed_from_u64(seed)
}

/// Integer-valued count matrix where each entry is non-zero with probability `density`,
/// with values in `[1, 50)`
pub(crate) fn random_counts(rng: &mut impl Rng, rows: usize, cols: usize, density: f64) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |_| {
        if rng.gen_bool(density) {
            rng.gen_range(1..50) as f64
        } else {
            0.0
        }
    })
}

/// The same logical matrix as dense, CSC and CSR
pub(crate) fn layouts(dense: &Array2<f64>) -> Vec<CountMatrix> {
    let d = CountMatrix::Dense(dense.clone());
    let csc = d.to_csc();
    let csr = csc.to_other_storage();
    vec![d, CountMatrix::Sparse(csc), CountMatrix::Sparse(csr)]
}
