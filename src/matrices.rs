//! Demo workload: pairs of square matrices in, their products out.
//!
//! The text format, shared by input and output:
//! - one matrix row per line, values separated by `", "`
//! - one blank line after each matrix
//! - input pairs two consecutive matrices (A, then B)
//!
//! [`PairReader`] is a [`Source`] of `(A, B)` pairs and [`ProductWriter`]
//! is a [`Sink`] that multiplies each pair and writes the product, so the
//! two ends of a pipeline can read and multiply concurrently.

use std::io::{BufRead, Write};

use thiserror::Error;

use crate::pipeline::{FetchError, Sink, SinkError, Source};

/// Matrix dimension used by the demo binary.
pub const DEMO_DIM: usize = 10;

/// Errors reading or writing matrices in the text format.
#[derive(Debug, Error)]
pub enum MatrixError {
    /// Underlying IO failed.
    #[error("matrix io failed: {0}")]
    Io(#[from] std::io::Error),
    /// A row had the wrong number of values or a non-numeric value.
    #[error("malformed matrix row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },
    /// Input ended in the middle of a matrix or a pair.
    #[error("input truncated mid-{0}")]
    Truncated(&'static str),
}

/// Square `f32` matrix with a compile-time dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<const N: usize> {
    rows: [[f32; N]; N],
}

impl<const N: usize> Matrix<N> {
    /// Builds a matrix from its rows.
    #[must_use]
    pub const fn new(rows: [[f32; N]; N]) -> Self {
        Self { rows }
    }

    /// The identity matrix.
    #[must_use]
    pub fn identity() -> Self {
        let mut rows = [[0.0; N]; N];
        for (i, row) in rows.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self { rows }
    }

    /// Row-major access to the values.
    #[must_use]
    pub const fn rows(&self) -> &[[f32; N]; N] {
        &self.rows
    }

    /// Naive O(N^3) matrix product.
    #[must_use]
    pub fn multiply(&self, rhs: &Self) -> Self {
        let mut out = [[0.0f32; N]; N];
        for (r, out_row) in out.iter_mut().enumerate() {
            for (c, cell) in out_row.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for k in 0..N {
                    acc += self.rows[r][k] * rhs.rows[k][c];
                }
                *cell = acc;
            }
        }
        Self { rows: out }
    }

    /// Renders the matrix in the text format, two decimal places per
    /// value, trailing blank line included.
    #[must_use]
    pub fn to_text(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        for row in &self.rows {
            for (c, value) in row.iter().enumerate() {
                if c > 0 {
                    out.push_str(", ");
                }
                // Writing to a String cannot fail.
                let _ = write!(out, "{value:.2}");
            }
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Streams `(A, B)` matrix pairs from buffered text input.
///
/// Clean EOF at a pair boundary ends the stream; EOF mid-matrix or
/// mid-pair, a short row, and a non-numeric value are all fetch errors -
/// nothing partial is ever produced.
pub struct PairReader<R, const N: usize> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead, const N: usize> PairReader<R, N> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }

    /// Next non-blank line, `None` on EOF.
    fn next_data_line(&mut self) -> Result<Option<String>, MatrixError> {
        for line in self.lines.by_ref() {
            let line = line?;
            self.line_no += 1;
            if !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    fn parse_row(&self, line: &str) -> Result<[f32; N], MatrixError> {
        let mut row = [0.0f32; N];
        let mut fields = line.split(',');
        for (c, slot) in row.iter_mut().enumerate() {
            let field = fields.next().ok_or_else(|| MatrixError::MalformedRow {
                line: self.line_no,
                reason: format!("expected {N} values, found {c}"),
            })?;
            *slot = field.trim().parse().map_err(|_| MatrixError::MalformedRow {
                line: self.line_no,
                reason: format!("not a number: {:?}", field.trim()),
            })?;
        }
        if fields.next().is_some() {
            return Err(MatrixError::MalformedRow {
                line: self.line_no,
                reason: format!("more than {N} values"),
            });
        }
        Ok(row)
    }

    /// Reads one matrix; `Ok(None)` on clean EOF before its first row.
    fn read_matrix(&mut self) -> Result<Option<Matrix<N>>, MatrixError> {
        let mut rows = [[0.0f32; N]; N];
        for (r, row) in rows.iter_mut().enumerate() {
            match self.next_data_line()? {
                Some(line) => *row = self.parse_row(&line)?,
                None if r == 0 => return Ok(None),
                None => return Err(MatrixError::Truncated("matrix")),
            }
        }
        Ok(Some(Matrix::new(rows)))
    }
}

impl<R: BufRead, const N: usize> Source for PairReader<R, N> {
    type Item = (Matrix<N>, Matrix<N>);

    fn fetch_next(&mut self) -> Result<Option<Self::Item>, FetchError> {
        let a = match self.read_matrix().map_err(FetchError::new)? {
            Some(a) => a,
            None => return Ok(None),
        };
        let b = self
            .read_matrix()
            .map_err(FetchError::new)?
            .ok_or_else(|| FetchError::new(MatrixError::Truncated("pair")))?;
        Ok(Some((a, b)))
    }
}

/// Multiplies each `(A, B)` pair and writes the product.
///
/// Each product is rendered in memory and written with a single
/// `write_all`, so the writer needs no extra buffering or final flush.
pub struct ProductWriter<W, const N: usize> {
    writer: W,
}

impl<W: Write, const N: usize> ProductWriter<W, N> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write, const N: usize> Sink for ProductWriter<W, N> {
    type Item = (Matrix<N>, Matrix<N>);

    fn consume(&mut self, (a, b): (Matrix<N>, Matrix<N>)) -> Result<(), SinkError> {
        let product = a.multiply(&b);
        self.writer
            .write_all(product.to_text().as_bytes())
            .map_err(SinkError::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_known_product() {
        let a = Matrix::<2>::new([[1.0, 2.0], [3.0, 4.0]]);
        let b = Matrix::<2>::new([[5.0, 6.0], [7.0, 8.0]]);

        let product = a.multiply(&b);

        assert_eq!(product, Matrix::new([[19.0, 22.0], [43.0, 50.0]]));
    }

    #[test]
    fn test_identity_multiply() {
        let a = Matrix::<3>::new([[1.5, 2.0, 0.25], [3.0, 4.5, 1.0], [0.0, 7.0, 9.75]]);

        assert_eq!(a.multiply(&Matrix::identity()), a);
        assert_eq!(Matrix::identity().multiply(&a), a);
    }

    #[test]
    fn test_to_text_format() {
        let m = Matrix::<2>::new([[1.5, 2.0], [3.25, 4.0]]);

        assert_eq!(m.to_text(), "1.50, 2.00\n3.25, 4.00\n\n");
    }

    #[test]
    fn test_parse_one_pair() {
        let input = "1, 2\n3, 4\n\n5, 6\n7, 8\n";
        let mut reader = PairReader::<_, 2>::new(Cursor::new(input));

        let (a, b) = reader.fetch_next().unwrap().unwrap();
        assert_eq!(a, Matrix::new([[1.0, 2.0], [3.0, 4.0]]));
        assert_eq!(b, Matrix::new([[5.0, 6.0], [7.0, 8.0]]));

        // Clean EOF at a pair boundary ends the stream.
        assert!(reader.fetch_next().unwrap().is_none());
    }

    #[test]
    fn test_parse_round_trips_rendered_text() {
        let m = Matrix::<2>::new([[1.25, -2.0], [30.5, 4.0]]);
        let input = format!("{}{}", m.to_text(), Matrix::<2>::identity().to_text());
        let mut reader = PairReader::<_, 2>::new(Cursor::new(input));

        let (a, b) = reader.fetch_next().unwrap().unwrap();
        assert_eq!(a, m);
        assert_eq!(b, Matrix::identity());
    }

    #[test]
    fn test_unpaired_matrix_is_error() {
        let input = "1, 2\n3, 4\n";
        let mut reader = PairReader::<_, 2>::new(Cursor::new(input));

        assert!(reader.fetch_next().is_err());
    }

    #[test]
    fn test_truncated_matrix_is_error() {
        let input = "1, 2\n";
        let mut reader = PairReader::<_, 2>::new(Cursor::new(input));

        assert!(reader.fetch_next().is_err());
    }

    #[test]
    fn test_non_numeric_value_is_error() {
        let input = "1, x\n3, 4\n\n5, 6\n7, 8\n";
        let mut reader = PairReader::<_, 2>::new(Cursor::new(input));

        assert!(reader.fetch_next().is_err());
    }

    #[test]
    fn test_short_row_is_error() {
        let input = "1\n3, 4\n\n5, 6\n7, 8\n";
        let mut reader = PairReader::<_, 2>::new(Cursor::new(input));

        assert!(reader.fetch_next().is_err());
    }

    #[test]
    fn test_product_writer_renders_product() {
        let a = Matrix::<2>::identity();
        let b = Matrix::<2>::new([[1.5, 2.0], [3.25, 4.0]]);

        let mut buf = Vec::new();
        ProductWriter::<_, 2>::new(&mut buf).consume((a, b)).unwrap();

        assert_eq!(String::from_utf8(buf).unwrap(), "1.50, 2.00\n3.25, 4.00\n\n");
    }
}
