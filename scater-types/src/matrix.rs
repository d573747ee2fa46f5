use ndarray::{Array1, Array2};
use sprs::{CsMat, TriMat};
use std::ops::Range;

/// Axis of a feature-barcode matrix. Rows are features, columns are cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatrixAxis {
    /// features
    Rows,
    /// cells / barcodes
    Columns,
}

impl MatrixAxis {
    /// The orthogonal axis
    pub fn other(self) -> MatrixAxis {
        match self {
            MatrixAxis::Rows => MatrixAxis::Columns,
            MatrixAxis::Columns => MatrixAxis::Rows,
        }
    }

    /// Index of the axis in a `[rows, cols]` shape
    pub fn index(self) -> usize {
        match self {
            MatrixAxis::Rows => 0,
            MatrixAxis::Columns => 1,
        }
    }
}

/// Count matrix with features on the rows and cells on the columns. Either a dense
/// array or a compressed sparse matrix in CSR or CSC layout.
#[derive(Clone, Debug, PartialEq)]
pub enum CountMatrix {
    /// dense row-major array
    Dense(Array2<f64>),
    /// compressed sparse matrix
    Sparse(CsMat<f64>),
}

impl From<Array2<f64>> for CountMatrix {
    fn from(arr: Array2<f64>) -> Self {
        CountMatrix::Dense(arr)
    }
}

impl From<CsMat<f64>> for CountMatrix {
    fn from(mat: CsMat<f64>) -> Self {
        CountMatrix::Sparse(mat)
    }
}

impl CountMatrix {
    /// Build a CSC matrix from `(row, col, value)` triplets. Repeated coordinates are summed.
    pub fn from_triplets(shape: (usize, usize), triplets: &[(usize, usize, f64)]) -> CountMatrix {
        let mut tri = TriMat::with_capacity(shape, triplets.len());
        for &(r, c, v) in triplets {
            tri.add_triplet(r, c, v);
        }
        CountMatrix::Sparse(tri.to_csc())
    }

    /// Number of rows (features)
    pub fn rows(&self) -> usize {
        match self {
            CountMatrix::Dense(a) => a.nrows(),
            CountMatrix::Sparse(m) => m.rows(),
        }
    }

    /// Number of columns (cells)
    pub fn cols(&self) -> usize {
        match self {
            CountMatrix::Dense(a) => a.ncols(),
            CountMatrix::Sparse(m) => m.cols(),
        }
    }

    /// Shape in [rows, cols]
    pub fn shape(&self) -> [usize; 2] {
        [self.rows(), self.cols()]
    }

    /// Length of the matrix along `axis`
    pub fn len_of(&self, axis: MatrixAxis) -> usize {
        self.shape()[axis.index()]
    }

    /// Is the matrix stored in a compressed sparse layout
    pub fn is_sparse(&self) -> bool {
        matches!(self, CountMatrix::Sparse(_))
    }

    /// Number of stored entries. For dense matrices this counts the non-zero values.
    pub fn nnz(&self) -> usize {
        match self {
            CountMatrix::Dense(a) => a.iter().filter(|&&v| v != 0.0).count(),
            CountMatrix::Sparse(m) => m.nnz(),
        }
    }

    /// Convert to a dense array
    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            CountMatrix::Dense(a) => a.clone(),
            CountMatrix::Sparse(m) => m.to_dense(),
        }
    }

    /// Convert to a CSC sparse matrix, dropping explicit zeros of dense input
    pub fn to_csc(&self) -> CsMat<f64> {
        match self {
            CountMatrix::Dense(a) => {
                let mut tri = TriMat::new(a.dim());
                for ((r, c), &v) in a.indexed_iter() {
                    if v != 0.0 {
                        tri.add_triplet(r, c, v);
                    }
                }
                tri.to_csc()
            }
            CountMatrix::Sparse(m) if m.is_csc() => m.clone(),
            CountMatrix::Sparse(m) => m.to_other_storage(),
        }
    }

    /// Value at `(row, col)`
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self {
            CountMatrix::Dense(a) => a[(row, col)],
            CountMatrix::Sparse(m) => m.get(row, col).copied().unwrap_or(0.0),
        }
    }

    /// Visit every stored entry whose index along `axis` lies in `range`, calling
    /// `f(row, col, value)`. Dense matrices visit every entry. For a fixed index along
    /// `axis`, entries are visited in ascending order of the other axis, for both dense
    /// and sparse layouts, so accumulations see the same summation order.
    pub fn for_each_in<F>(&self, axis: MatrixAxis, range: Range<usize>, mut f: F)
    where
        F: FnMut(usize, usize, f64),
    {
        match self {
            CountMatrix::Dense(a) => match axis {
                MatrixAxis::Rows => {
                    for r in range {
                        for (c, &v) in a.row(r).iter().enumerate() {
                            f(r, c, v);
                        }
                    }
                }
                MatrixAxis::Columns => {
                    for r in 0..a.nrows() {
                        for c in range.clone() {
                            f(r, c, a[(r, c)]);
                        }
                    }
                }
            },
            CountMatrix::Sparse(m) => {
                let outer_axis = if m.is_csr() {
                    MatrixAxis::Rows
                } else {
                    MatrixAxis::Columns
                };
                let coords = |outer: usize, inner: usize| {
                    if outer_axis == MatrixAxis::Rows {
                        (outer, inner)
                    } else {
                        (inner, outer)
                    }
                };

                if outer_axis == axis {
                    for outer in range {
                        if let Some(vec) = m.outer_view(outer) {
                            for (inner, &v) in vec.iter() {
                                let (r, c) = coords(outer, inner);
                                f(r, c, v);
                            }
                        }
                    }
                } else {
                    for (outer, vec) in m.outer_iterator().enumerate() {
                        let indices = vec.indices();
                        let data = vec.data();
                        let lo = indices.partition_point(|&i| i < range.start);
                        let hi = indices.partition_point(|&i| i < range.end);
                        for k in lo..hi {
                            let (r, c) = coords(outer, indices[k]);
                            f(r, c, data[k]);
                        }
                    }
                }
            }
        }
    }

    /// Visit every stored entry of the matrix
    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(usize, usize, f64),
    {
        self.for_each_in(MatrixAxis::Rows, 0..self.rows(), f)
    }

    /// Sum of each column (total counts per cell)
    pub fn col_sums(&self) -> Array1<f64> {
        let mut sums = Array1::zeros(self.cols());
        self.for_each(|_, c, v| sums[c] += v);
        sums
    }

    /// Sum of each row (total counts per feature)
    pub fn row_sums(&self) -> Array1<f64> {
        let mut sums = Array1::zeros(self.rows());
        self.for_each(|r, _, v| sums[r] += v);
        sums
    }

    /// Mean and (population) variance of each row
    pub fn row_mean_var(&self) -> (Array1<f64>, Array1<f64>) {
        let mut means = Array1::<f64>::zeros(self.rows());
        let mut vars = Array1::<f64>::zeros(self.rows());
        self.for_each(|r, _, v| {
            means[r] += v;
            vars[r] += v * v;
        });

        // V[X] = E[X^2] - E[X]^2
        let m = self.cols() as f64;
        for (mean, var) in means.iter_mut().zip(vars.iter_mut()) {
            *mean /= m;
            *var = (*var / m - mean.powi(2)).max(0.0);
        }
        (means, vars)
    }

    /// Apply `f(value, row, col)` to the stored entries. Sparse matrices keep their
    /// sparsity pattern, so `f` must send 0 to 0 for them.
    pub fn map_stored<F>(&self, f: F) -> CountMatrix
    where
        F: Fn(f64, usize, usize) -> f64,
    {
        match self {
            CountMatrix::Dense(a) => {
                let mut out = a.clone();
                for ((r, c), v) in out.indexed_iter_mut() {
                    *v = f(*v, r, c);
                }
                CountMatrix::Dense(out)
            }
            CountMatrix::Sparse(m) => {
                let mut out = m.clone();
                let csr = out.is_csr();
                for (outer, mut vec) in out.outer_iterator_mut().enumerate() {
                    for (inner, v) in vec.iter_mut() {
                        let (r, c) = if csr { (outer, inner) } else { (inner, outer) };
                        *v = f(*v, r, c);
                    }
                }
                CountMatrix::Sparse(out)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    fn example() -> Array2<f64> {
        array![[1.0, 0.0, 2.0], [0.0, 0.0, 3.0], [4.0, 5.0, 0.0], [0.0, 6.0, 0.0]]
    }

    fn layouts() -> Vec<CountMatrix> {
        let dense = CountMatrix::Dense(example());
        let csc = CountMatrix::Sparse(dense.to_csc());
        let csr = CountMatrix::Sparse(dense.to_csc().to_other_storage());
        vec![dense, csc, csr]
    }

    #[test]
    fn test_shape_and_conversion() {
        for m in layouts() {
            assert_eq!(m.shape(), [4, 3]);
            assert_eq!(m.len_of(MatrixAxis::Columns), 3);
            assert_eq!(m.to_dense(), example());
            assert_eq!(m.nnz(), 6);
            assert_eq!(m.get(2, 1), 5.0);
            assert_eq!(m.get(1, 1), 0.0);
        }
    }

    #[test]
    fn test_for_each_in_restricts_range() {
        for m in layouts() {
            let mut seen = Vec::new();
            m.for_each_in(MatrixAxis::Rows, 1..3, |r, c, v| {
                if v != 0.0 {
                    seen.push((r, c, v));
                }
            });
            seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(seen, vec![(1, 2, 3.0), (2, 0, 4.0), (2, 1, 5.0)]);

            let mut seen = Vec::new();
            m.for_each_in(MatrixAxis::Columns, 2..3, |r, c, v| {
                if v != 0.0 {
                    seen.push((r, c, v));
                }
            });
            seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(seen, vec![(0, 2, 2.0), (1, 2, 3.0)]);
        }
    }

    #[test]
    fn test_sums_and_moments() {
        for m in layouts() {
            assert_eq!(m.col_sums(), array![5.0, 11.0, 5.0]);
            assert_eq!(m.row_sums(), array![3.0, 3.0, 9.0, 6.0]);
            let (means, vars) = m.row_mean_var();
            assert_eq!(means[2], 3.0);
            assert!((vars[2] - (41.0 / 3.0 - 9.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_map_stored_keeps_layout() {
        for m in layouts() {
            let doubled = m.map_stored(|v, _, c| v * (c + 1) as f64);
            assert_eq!(doubled.is_sparse(), m.is_sparse());
            assert_eq!(doubled.get(2, 1), 10.0);
            assert_eq!(doubled.get(0, 2), 6.0);
        }
    }

    #[test]
    fn test_from_triplets_sums_duplicates() {
        let m = CountMatrix::from_triplets((2, 2), &[(0, 1, 1.0), (0, 1, 2.0), (1, 0, 4.0)]);
        assert!(m.is_sparse());
        assert_eq!(m.to_dense(), array![[0.0, 3.0], [4.0, 0.0]]);
    }
}
