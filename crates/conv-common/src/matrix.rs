//! Dense matrices of `f32` used as targets, kernels and results.

use std::fmt::Write;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ConvError, ConvResult};

/// Row-major matrix of 32-bit floats.
///
/// Serialized as a plain array of rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Matrix(Vec<Vec<f32>>);

impl Matrix {
    /// Create a matrix where every cell equals `value`.
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self(vec![vec![value; cols]; rows])
    }

    /// Create a matrix of independent values drawn uniformly from `[0, 1)`.
    pub fn random<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Self {
        let data = (0..rows)
            .map(|_| (0..cols).map(|_| rng.gen_range(0.0f32..1.0)).collect())
            .collect();
        Self(data)
    }

    /// Build a matrix from a flat row-major list of values.
    ///
    /// Fails if `values.len() != rows * cols`.
    pub fn from_flat(name: &str, rows: usize, cols: usize, values: Vec<f32>) -> ConvResult<Self> {
        let expected = rows * cols;
        if values.len() != expected {
            return Err(ConvError::MatrixShape {
                name: name.to_string(),
                expected,
                actual: values.len(),
            });
        }
        if cols == 0 {
            return Ok(Self(vec![Vec::new(); rows]));
        }
        Ok(Self(values.chunks(cols).map(<[f32]>::to_vec).collect()))
    }

    pub fn rows(&self) -> usize {
        self.0.len()
    }

    /// Number of columns, taken from the first row.
    pub fn cols(&self) -> usize {
        self.0.first().map_or(0, Vec::len)
    }

    /// True when every row has the same length.
    pub fn is_rectangular(&self) -> bool {
        let cols = self.cols();
        self.0.iter().all(|row| row.len() == cols)
    }

    /// Payload size of the cells in bytes (4 per value).
    pub fn byte_size(&self) -> u64 {
        self.0.iter().map(|row| row.len() as u64 * 4).sum()
    }

    pub fn rows_iter(&self) -> impl Iterator<Item = &[f32]> {
        self.0.iter().map(Vec::as_slice)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.0.get(row).and_then(|r| r.get(col)).copied()
    }
}

/// Produce a matrix either filled with `fill_value` or with random cells.
///
/// Uses the thread-local RNG; see [`generate_with_rng`] for a seeded variant.
pub fn generate(rows: usize, cols: usize, random: bool, fill_value: f32) -> Matrix {
    generate_with_rng(rows, cols, random, fill_value, &mut rand::thread_rng())
}

pub fn generate_with_rng<R: Rng>(
    rows: usize,
    cols: usize,
    random: bool,
    fill_value: f32,
    rng: &mut R,
) -> Matrix {
    if random {
        Matrix::random(rows, cols, rng)
    } else {
        Matrix::filled(rows, cols, fill_value)
    }
}

/// Render a matrix as human readable text.
///
/// The output only depends on the label and the cell values.
pub fn format_matrix(label: &str, matrix: &Matrix) -> String {
    let mut out = format!("{} ({} x {})", label, matrix.rows(), matrix.cols());
    for row in matrix.rows_iter() {
        out.push('\n');
        for value in row {
            // Writing into a String cannot fail
            let _ = write!(out, "{:>10.4}", value);
        }
    }
    out
}
