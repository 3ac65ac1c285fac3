//! Hierarchical, resizable numeric state.
//!
//! A [`Conditions`] tree holds scalar metadata, numeric leaf arrays and
//! nested trees, in declaration order. Every leaf array owned by one node has
//! the same number of rows: one per collocation point, less the node's
//! `row_size_adjustment` for quantities sampled between points.
//!
//! Shape mismatches on assignment are repaired in place with a `warn!` and
//! never fail. Callers that need strict shapes check them before assigning.

pub mod node;
pub mod presets;

use nalgebra::{DMatrix, DVector, Dyn};
use tracing::warn;

use crate::error::ConditionsError;

pub use node::Node;
use node::resize_repeating;

/// Row adjustment that pins a node to one row for any realistic `n`.
pub const SINGLE_ROW: isize = isize::MIN / 2;

#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    /// Last collocation count handed to `expand_rows`, before adjustment.
    size: usize,
    rows: usize,
    row_size_adjustment: isize,
    entries: Vec<(String, Node)>,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            size: 1,
            rows: 1,
            row_size_adjustment: 0,
            entries: Vec::new(),
        }
    }
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node whose leaves carry `n + adjustment` rows after `expand_rows(n)`.
    pub fn with_row_size_adjustment(adjustment: isize) -> Self {
        let mut c = Self {
            row_size_adjustment: adjustment,
            ..Self::default()
        };
        c.rows = adjusted_rows(c.size, adjustment);
        c
    }

    /// A node that keeps a single row whatever the collocation count, for
    /// boundary values such as a segment duration.
    pub fn single_row() -> Self {
        Self::with_row_size_adjustment(SINGLE_ROW)
    }

    /// Fluent leaf declaration: a zero array of `columns` columns.
    pub fn leaf(mut self, name: &str, columns: usize) -> Self {
        let m = DMatrix::zeros(self.rows, columns);
        self.upsert(name, Node::Array(m));
        self
    }

    /// Fluent subtree declaration.
    pub fn subtree(mut self, name: &str, tree: Conditions) -> Self {
        self.upsert(name, Node::Tree(tree));
        self
    }

    /// Fluent scalar declaration.
    pub fn with_scalar(mut self, name: &str, value: f64) -> Self {
        self.upsert(name, Node::Scalar(value));
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn row_size_adjustment(&self) -> isize {
        self.row_size_adjustment
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attributes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    // -----------------------------------------------------------------------
    // Path access
    // -----------------------------------------------------------------------

    pub fn get(&self, path: &str) -> Option<&Node> {
        match path.split_once('.') {
            None => self.local(path),
            Some((head, rest)) => self.local(head)?.as_tree()?.get(rest),
        }
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Node> {
        match path.split_once('.') {
            None => self.local_mut(path),
            Some((head, rest)) => match self.local_mut(head)? {
                Node::Tree(c) => c.get_mut(rest),
                _ => None,
            },
        }
    }

    pub fn child(&self, path: &str) -> Result<&Conditions, ConditionsError> {
        self.node(path)?
            .as_tree()
            .ok_or_else(|| wrong_kind(path, "tree"))
    }

    pub fn child_mut(&mut self, path: &str) -> Result<&mut Conditions, ConditionsError> {
        match self.get_mut(path) {
            Some(Node::Tree(c)) => Ok(c),
            Some(_) => Err(wrong_kind(path, "tree")),
            None => Err(ConditionsError::Missing(path.into())),
        }
    }

    pub fn array(&self, path: &str) -> Result<&DMatrix<f64>, ConditionsError> {
        self.node(path)?
            .as_array()
            .ok_or_else(|| wrong_kind(path, "array"))
    }

    /// Mutable leaf access. Writing through this reference bypasses shape
    /// repair; keep the row count unchanged.
    pub fn array_mut(&mut self, path: &str) -> Result<&mut DMatrix<f64>, ConditionsError> {
        match self.get_mut(path) {
            Some(Node::Array(m)) => Ok(m),
            Some(_) => Err(wrong_kind(path, "array")),
            None => Err(ConditionsError::Missing(path.into())),
        }
    }

    /// First column of a leaf as a vector.
    pub fn column(&self, path: &str) -> Result<DVector<f64>, ConditionsError> {
        self.column_at(path, 0)
    }

    pub fn column_at(&self, path: &str, j: usize) -> Result<DVector<f64>, ConditionsError> {
        let m = self.array(path)?;
        if j >= m.ncols() {
            return Err(wrong_kind(path, "array with enough columns"));
        }
        Ok(m.column(j).into_owned())
    }

    pub fn scalar(&self, path: &str) -> Result<f64, ConditionsError> {
        self.node(path)?
            .as_scalar()
            .ok_or_else(|| wrong_kind(path, "scalar"))
    }

    fn node(&self, path: &str) -> Result<&Node, ConditionsError> {
        self.get(path)
            .ok_or_else(|| ConditionsError::Missing(path.into()))
    }

    // -----------------------------------------------------------------------
    // Assignment
    // -----------------------------------------------------------------------

    /// Assign any node kind at `path`, creating intermediate trees.
    ///
    /// Fails only when an intermediate path component is not a tree.
    pub fn set(&mut self, path: &str, value: impl Into<Node>) -> Result<(), ConditionsError> {
        match value.into() {
            Node::Scalar(v) => self.set_scalar(path, v),
            Node::Array(m) => self.set_array(path, m),
            Node::Tree(c) => self.insert_tree(path, c),
        }
    }

    /// Scalar assignment. An existing leaf array is broadcast-filled.
    pub fn set_scalar(&mut self, path: &str, value: f64) -> Result<(), ConditionsError> {
        let (owner, name) = self.owner_mut(path)?;
        match owner.local_mut(name) {
            Some(Node::Array(m)) => m.fill(value),
            _ => owner.upsert(name, Node::Scalar(value)),
        }
        Ok(())
    }

    /// Array assignment with shape repair.
    ///
    /// - matching rows: stored as given;
    /// - same element count as the existing leaf: reshaped to its shape;
    /// - more rows than the owner: the owner grows to match, unless it is
    ///   pinned to a single row;
    /// - anything else: force-resized to the owner's rows.
    pub fn set_array(&mut self, path: &str, value: DMatrix<f64>) -> Result<(), ConditionsError> {
        let (owner, name) = self.owner_mut(path)?;
        owner.set_local_array(name, value, path);
        Ok(())
    }

    /// A leaf of `columns` columns with every entry equal to `value`.
    pub fn set_filled(
        &mut self,
        path: &str,
        value: f64,
        columns: usize,
    ) -> Result<(), ConditionsError> {
        let (owner, name) = self.owner_mut(path)?;
        let m = DMatrix::from_element(owner.rows, columns, value);
        owner.upsert(name, Node::Array(m));
        Ok(())
    }

    /// Insert (or replace) a subtree. The subtree keeps its own sizing until
    /// the next `expand_rows` on an ancestor.
    pub fn insert_tree(&mut self, path: &str, tree: Conditions) -> Result<(), ConditionsError> {
        let (owner, name) = self.owner_mut(path)?;
        owner.upsert(name, Node::Tree(tree));
        Ok(())
    }

    fn set_local_array(&mut self, name: &str, value: DMatrix<f64>, path: &str) {
        let rows = self.rows;
        let existing_cols = match self.local(name) {
            Some(Node::Array(m)) => Some(m.ncols()),
            _ => None,
        };

        let stored = if value.nrows() == rows {
            if let Some(c) = existing_cols.filter(|&c| c != value.ncols()) {
                warn!(path, from = c, to = value.ncols(), "condition column count changed");
            }
            value
        } else if let Some(c) = existing_cols.filter(|&c| c > 0 && value.len() == rows * c) {
            value.reshape_generic(Dyn(rows), Dyn(c))
        } else if value.nrows() > rows && self.row_size_adjustment > SINGLE_ROW {
            warn!(path, from = rows, to = value.nrows(), "growing condition rows to fit assignment");
            let target = value.nrows() as isize - self.row_size_adjustment;
            self.expand_rows(target.max(1) as usize);
            value
        } else {
            warn!(
                path,
                rows = value.nrows(),
                expected = rows,
                "forcing condition resize; trailing values may be stale"
            );
            let cols = existing_cols.unwrap_or(value.ncols()).max(1);
            resize_repeating(&value, rows, cols)
        };
        self.upsert(name, Node::Array(stored));
    }

    // -----------------------------------------------------------------------
    // Resizing
    // -----------------------------------------------------------------------

    /// Resize this node and every descendant for `n` collocation points.
    ///
    /// Children receive the same `n`, not this node's adjusted row count.
    pub fn expand_rows(&mut self, n: usize) {
        self.size = n;
        self.rows = adjusted_rows(n, self.row_size_adjustment);
        let rows = self.rows;
        for (_, node) in &mut self.entries {
            match node {
                Node::Tree(c) => c.expand_rows(n),
                Node::Array(m) => {
                    let cols = m.ncols();
                    *m = resize_repeating(m, rows, cols);
                }
                Node::Scalar(_) => {}
            }
        }
    }

    /// Resize every leaf in this subtree to `n` columns.
    pub fn expand_columns(&mut self, n: usize) {
        for (_, node) in &mut self.entries {
            match node {
                Node::Tree(c) => c.expand_columns(n),
                Node::Array(m) => {
                    let rows = m.nrows();
                    *m = resize_repeating(m, rows, n);
                }
                Node::Scalar(_) => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Packing
    // -----------------------------------------------------------------------

    /// Flatten every leaf array, depth first in declaration order. Each leaf
    /// contributes its values in column-major order.
    pub fn pack_array(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.packed_len());
        self.pack_into(&mut out);
        out
    }

    pub fn packed_len(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, node)| match node {
                Node::Array(m) => m.len(),
                Node::Tree(c) => c.packed_len(),
                Node::Scalar(_) => 0,
            })
            .sum()
    }

    /// Inverse of [`pack_array`](Self::pack_array). Leaves keep their shapes.
    pub fn unpack_array(&mut self, values: &[f64]) -> Result<(), ConditionsError> {
        let expected = self.packed_len();
        if values.len() != expected {
            return Err(ConditionsError::UnpackLength {
                expected,
                given: values.len(),
            });
        }
        let consumed = self.unpack_from(values);
        debug_assert_eq!(consumed, expected);
        Ok(())
    }

    fn pack_into(&self, out: &mut Vec<f64>) {
        for (_, node) in &self.entries {
            match node {
                Node::Array(m) => out.extend(m.iter()),
                Node::Tree(c) => c.pack_into(out),
                Node::Scalar(_) => {}
            }
        }
    }

    fn unpack_from(&mut self, values: &[f64]) -> usize {
        let mut offset = 0;
        for (_, node) in &mut self.entries {
            match node {
                Node::Array(m) => {
                    let len = m.len();
                    m.as_mut_slice()
                        .copy_from_slice(&values[offset..offset + len]);
                    offset += len;
                }
                Node::Tree(c) => offset += c.unpack_from(&values[offset..]),
                Node::Scalar(_) => {}
            }
        }
        offset
    }

    // -----------------------------------------------------------------------
    // Row extraction
    // -----------------------------------------------------------------------

    /// Copy of collocation row `i` of every leaf as a single-row tree.
    /// Leaves with fewer rows contribute their last row.
    pub fn row(&self, i: usize) -> Conditions {
        let mut out = Conditions::new();
        for (name, node) in &self.entries {
            let copy = match node {
                Node::Scalar(v) => Node::Scalar(*v),
                Node::Tree(c) => Node::Tree(c.row(i)),
                Node::Array(m) if m.nrows() == 0 => Node::Array(DMatrix::zeros(1, m.ncols())),
                Node::Array(m) => {
                    let r = i.min(m.nrows() - 1);
                    Node::Array(DMatrix::from_fn(1, m.ncols(), |_, j| m[(r, j)]))
                }
            };
            out.entries.push((name.clone(), copy));
        }
        out
    }

    /// Final collocation row, as handed to a following segment.
    pub fn last_row(&self) -> Conditions {
        self.row(self.rows.saturating_sub(1))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == name)
    }

    fn local(&self, name: &str) -> Option<&Node> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    fn local_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Replace in place (keeping declaration order) or append.
    fn upsert(&mut self, name: &str, node: Node) {
        match self.position(name) {
            Some(i) => self.entries[i].1 = node,
            None => self.entries.push((name.to_string(), node)),
        }
    }

    /// The tree owning the last path component, created on demand.
    fn owner_mut<'p>(
        &mut self,
        path: &'p str,
    ) -> Result<(&mut Conditions, &'p str), ConditionsError> {
        match path.rsplit_once('.') {
            None => Ok((self, path)),
            Some((parent, name)) => {
                let parts: Vec<&str> = parent.split('.').collect();
                let owner = self.tree_mut_or_create(&parts, path)?;
                Ok((owner, name))
            }
        }
    }

    fn tree_mut_or_create(
        &mut self,
        parts: &[&str],
        path: &str,
    ) -> Result<&mut Conditions, ConditionsError> {
        let Some((first, rest)) = parts.split_first() else {
            return Ok(self);
        };
        let idx = match self.position(first) {
            Some(i) => i,
            None => {
                let mut child = Conditions::new();
                child.expand_rows(self.size);
                self.entries.push((first.to_string(), Node::Tree(child)));
                self.entries.len() - 1
            }
        };
        match &mut self.entries[idx].1 {
            Node::Tree(child) => child.tree_mut_or_create(rest, path),
            _ => Err(wrong_kind(path, "tree")),
        }
    }
}

fn adjusted_rows(n: usize, adjustment: isize) -> usize {
    (n as isize + adjustment).max(1) as usize
}

fn wrong_kind(path: &str, expected: &'static str) -> ConditionsError {
    ConditionsError::WrongKind {
        path: path.into(),
        expected,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
