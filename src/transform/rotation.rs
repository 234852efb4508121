use std::cmp::Ordering;
use std::path::Path;

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{self, Error, Result};

/// A matrix R passes as a rotation when `max |R'R - I| <= this`.
pub const ORTHOGONALITY_TOLERANCE: f64 = 1e-8;

// ---------------------------------------------------------------------------
// Orthogonality
// ---------------------------------------------------------------------------

/// Whether `r` is an orthogonal `m x m` matrix, within tolerance.
pub fn is_orthogonal(r: ArrayView2<f64>, m: usize) -> bool {
    if r.nrows() != m || r.ncols() != m {
        return false;
    }
    let gram = r.t().dot(&r);
    let mut worst = 0.0f64;
    for i in 0..m {
        for j in 0..m {
            let expected = if i == j { 1.0 } else { 0.0 };
            worst = worst.max((gram[[i, j]] - expected).abs());
        }
    }
    worst <= ORTHOGONALITY_TOLERANCE
}

/// Sample an `m x m` orthogonal matrix, Haar-distributed: a Gaussian matrix
/// QR-decomposed, with each Q column's sign fixed by the matching R diagonal.
pub fn random_orthogonal<R: Rng + ?Sized>(m: usize, rng: &mut R) -> Array2<f64> {
    let gaussian = DMatrix::<f64>::from_fn(m, m, |_, _| rng.sample(StandardNormal));
    let (mut q, r) = gaussian.qr().unpack();
    for j in 0..m {
        if r[(j, j)] < 0.0 {
            q.column_mut(j).neg_mut();
        }
    }
    Array2::from_shape_fn((m, m), |(i, j)| q[(i, j)])
}

// ---------------------------------------------------------------------------
// Artifact I/O – single header row, no row labels
// ---------------------------------------------------------------------------

pub fn write_matrix(path: impl AsRef<Path>, matrix: ArrayView2<f64>) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::WriterBuilder::new()
        .from_path(path)
        .map_err(|e| error::csv(path, e))?;
    let header: Vec<String> = (0..matrix.ncols()).map(|j| j.to_string()).collect();
    writer.write_record(&header).map_err(|e| error::csv(path, e))?;
    for row in matrix.axis_iter(Axis(0)) {
        let record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writer.write_record(&record).map_err(|e| error::csv(path, e))?;
    }
    writer.flush().map_err(|e| error::io(path, e))?;
    Ok(())
}

pub fn read_matrix(path: impl AsRef<Path>) -> Result<Array2<f64>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| error::csv(path, e))?;
    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record.map_err(|e| error::csv(path, e))?,
        None => return Err(error::malformed(path, "missing header row")),
    };
    let n_cols = header.len();

    let mut flat = Vec::new();
    let mut n_rows = 0usize;
    for (offset, record) in records.enumerate() {
        let record = record.map_err(|e| error::csv(path, e))?;
        if record.len() != n_cols {
            return Err(error::malformed(
                path,
                format!("row {offset} has {} fields, header has {n_cols}", record.len()),
            ));
        }
        for cell in record.iter() {
            let value: f64 = cell.trim().parse().map_err(|_| {
                error::malformed(path, format!("row {offset}: {cell:?} is not numeric"))
            })?;
            flat.push(value);
        }
        n_rows += 1;
    }
    Array2::from_shape_vec((n_rows, n_cols), flat).map_err(|e| error::malformed(path, e.to_string()))
}

// ---------------------------------------------------------------------------
// Principal axes
// ---------------------------------------------------------------------------

/// Sample covariance of the rows of `x`, with one delta degree of freedom.
pub fn covariance(x: ArrayView2<f64>) -> Result<Array2<f64>> {
    let n = x.nrows();
    if n < 2 {
        return Err(Error::NotEnoughRows {
            context: "input covariance",
            needed: 2,
            rows: n,
        });
    }
    let Some(mean) = x.mean_axis(Axis(0)) else {
        return Err(Error::NotEnoughRows {
            context: "input covariance",
            needed: 2,
            rows: 0,
        });
    };
    let centered = &x.to_owned() - &mean;
    Ok(centered.t().dot(&centered) / (n as f64 - 1.0))
}

/// Eigendecompose a symmetric covariance: eigenvalues descending, matching
/// unit eigenvectors as the columns of the returned matrix.
pub fn principal_axes(cov: ArrayView2<f64>) -> (Array1<f64>, Array2<f64>) {
    let m = cov.nrows();
    assert_eq!(m, cov.ncols(), "covariance must be square");
    let eigen = SymmetricEigen::new(DMatrix::from_fn(m, m, |i, j| cov[[i, j]]));
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(Ordering::Equal)
    });
    let values = Array1::from_iter(order.iter().map(|&i| eigen.eigenvalues[i]));
    let vectors = Array2::from_shape_fn((m, m), |(i, j)| eigen.eigenvectors[(i, order[j])]);
    (values, vectors)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
