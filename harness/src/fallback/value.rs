use super::{EvalError, EvalResult};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn from_rows(rows: Vec<Vec<f64>>) -> EvalResult<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(EvalError::Shape {
                message: "matrix rows must have the same number of columns".to_string(),
            });
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().copied().map(f).collect(),
        }
    }

    pub fn zip_with(&self, other: &Matrix, f: impl Fn(f64, f64) -> f64) -> EvalResult<Self> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(EvalError::Shape {
                message: format!(
                    "element-wise operation on {}x{} and {}x{}",
                    self.rows, self.cols, other.rows, other.cols
                ),
            });
        }
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| f(*a, *b))
                .collect(),
        })
    }

    pub fn matmul(&self, other: &Matrix) -> EvalResult<Self> {
        if self.cols != other.rows {
            return Err(EvalError::Shape {
                message: format!(
                    "cannot multiply {}x{} by {}x{}",
                    self.rows, self.cols, other.rows, other.cols
                ),
            });
        }
        let mut data = vec![0.0; self.rows * other.cols];
        for i in 0..self.rows {
            for j in 0..other.cols {
                data[i * other.cols + j] = (0..self.cols)
                    .map(|k| self.get(i, k) * other.get(k, j))
                    .sum();
            }
        }
        Ok(Self {
            rows: self.rows,
            cols: other.cols,
            data,
        })
    }

    pub fn transpose(&self) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        for j in 0..self.cols {
            for i in 0..self.rows {
                data.push(self.get(i, j));
            }
        }
        Self {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Matrix(Matrix),
}

impl Value {
    pub fn as_number(&self, context: &str) -> EvalResult<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Matrix(_) => Err(EvalError::Type {
                message: format!("{} expects a number, got a matrix", context),
            }),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "double",
            Value::Matrix(_) => "matrix",
        }
    }

    /// `rows x cols`, with scalars reported as `1x1`.
    pub fn size(&self) -> (usize, usize) {
        match self {
            Value::Number(_) => (1, 1),
            Value::Matrix(m) => (m.rows(), m.cols()),
        }
    }
}

/// Integral values print without a fractional part; everything else uses the
/// shortest representation that round-trips.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Matrix(m) => {
                write!(f, "[")?;
                for i in 0..m.rows() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    let row: Vec<String> = (0..m.cols()).map(|j| format_number(m.get(i, j))).collect();
                    write!(f, "{}", row.join(" "))?;
                }
                write!(f, "]")
            }
        }
    }
}
