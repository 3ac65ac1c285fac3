use nalgebra::DMatrix;

use super::Conditions;

/// One attribute of a condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Scalar metadata. Never packed, never resized.
    Scalar(f64),
    /// Numeric leaf of shape `(rows, columns)`; rows follow the owning node.
    Array(DMatrix<f64>),
    /// Nested condition tree.
    Tree(Conditions),
}

impl Node {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Node::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&DMatrix<f64>> {
        match self {
            Node::Array(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Conditions> {
        match self {
            Node::Tree(c) => Some(c),
            _ => None,
        }
    }
}

impl From<f64> for Node {
    fn from(v: f64) -> Self {
        Node::Scalar(v)
    }
}

impl From<DMatrix<f64>> for Node {
    fn from(m: DMatrix<f64>) -> Self {
        Node::Array(m)
    }
}

impl From<Conditions> for Node {
    fn from(c: Conditions) -> Self {
        Node::Tree(c)
    }
}

/// Resize keeping the leading `min(rows) x min(cols)` block intact.
///
/// New rows and columns repeat the existing ones cyclically, so a `1 x c`
/// seed broadcasts over every collocation point. An empty source pads with
/// zeros.
pub(crate) fn resize_repeating(m: &DMatrix<f64>, rows: usize, cols: usize) -> DMatrix<f64> {
    if m.nrows() == rows && m.ncols() == cols {
        return m.clone();
    }
    if m.is_empty() {
        return DMatrix::zeros(rows, cols);
    }
    let (r0, c0) = m.shape();
    DMatrix::from_fn(rows, cols, |i, j| m[(i % r0, j % c0)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_keeps_leading_block() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let r = resize_repeating(&m, 3, 2);
        assert_eq!(r.shape(), (3, 2));
        assert_eq!(r[(0, 0)], 1.0);
        assert_eq!(r[(1, 1)], 4.0);
        // third row repeats the first
        assert_eq!(r[(2, 0)], 1.0);
        assert_eq!(r[(2, 1)], 2.0);
    }

    #[test]
    fn resize_truncates() {
        let m = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let r = resize_repeating(&m, 2, 1);
        assert_eq!(r.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn single_row_broadcasts() {
        let m = DMatrix::from_element(1, 1, 9.81);
        let r = resize_repeating(&m, 4, 1);
        assert!(r.iter().all(|&v| v == 9.81));
    }

    #[test]
    fn empty_source_pads_with_zeros() {
        let m = DMatrix::<f64>::zeros(0, 0);
        let r = resize_repeating(&m, 2, 3);
        assert_eq!(r, DMatrix::zeros(2, 3));
    }
}
