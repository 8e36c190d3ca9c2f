//! Provides the [`Arr2D`] type, which is the basic data type to deal with 2D arrays,
//! and the [`Field`] trait which must be implemented by any type that shall be used to store
//! data of model variables.
//!
//! Arrays are indexed by `[i, j]` where `i` runs along x and varies fastest in memory.
//! An array may carry a ghost border of one cell. Ghost cells are not part of the
//! [`Shape`] and are only reachable through the signed accessors [`Arr2D::at`] and
//! [`Arr2D::at_mut`], where they sit at index `-1` and `n` of the respective axis.

use std::fmt::Display;
use std::ops::{Index, IndexMut};

use rayon::prelude::*;

/// Type alias for index tuples `[i, j]`
pub type Ix2 = [usize; 2];

/// Array shape, number of points along x and y.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shape(Ix2);

impl Shape {
    pub fn new(nx: usize, ny: usize) -> Self {
        Shape([nx, ny])
    }

    pub fn nx(&self) -> usize {
        self.0[0]
    }

    pub fn ny(&self) -> usize {
        self.0[1]
    }

    /// Return the number of the elements of the array
    pub fn size(&self) -> usize {
        self.0[0] * self.0[1]
    }

    /// Return an iterator over all possible indices of an array with shape `self`.
    pub fn iter(&self) -> Indexer {
        self.into_iter()
    }
}

impl From<Ix2> for Shape {
    fn from(shape: Ix2) -> Self {
        Shape(shape)
    }
}

impl IntoIterator for Shape {
    type Item = Ix2;

    type IntoIter = Indexer;

    fn into_iter(self) -> Self::IntoIter {
        Indexer {
            inner: None,
            shape: self.0,
        }
    }
}

/// Iterates over `[i, j]` with `i` varying fastest.
pub struct Indexer {
    inner: Option<Ix2>,
    shape: Ix2,
}

impl Iterator for Indexer {
    type Item = Ix2;

    fn next(&mut self) -> Option<Self::Item> {
        if self.shape[0] == 0 || self.shape[1] == 0 {
            return None;
        }
        let next = match self.inner {
            None => [0, 0],
            Some([i, j]) if i + 1 < self.shape[0] => [i + 1, j],
            Some([_, j]) => [0, j + 1],
        };
        if next[1] >= self.shape[1] {
            self.inner = Some([self.shape[0], self.shape[1]]);
            None
        } else {
            self.inner = Some(next);
            self.inner
        }
    }
}

/// Trait for array backends.
pub trait Field<I>
where
    Self: Sized + Index<Ix2, Output = I> + IndexMut<Ix2, Output = I>,
{
    /// Create a new field with all elements set to a constant value.
    fn full(item: I, shape: impl Into<Shape>) -> Self;

    /// Return the shape of the array, ghost cells excluded.
    fn shape(&self) -> Shape;
}

/// 2D array with linear contiguous memory layout and an optional ghost border.
///
/// # Examples
/// Create an array, filled with a value.
/// ```
/// use seady_swm::field::{Arr2D, Field};
///
/// let arr = Arr2D::full(1f64, [2, 2]);
///
/// assert_eq!(arr[[0, 0]], 1.0);
/// assert_eq!(arr[[1, 0]], 1.0);
/// assert_eq!(arr[[0, 1]], 1.0);
/// assert_eq!(arr[[1, 1]], 1.0);
/// ```
///
/// Ghost cells are addressed with signed indices.
/// ```
/// use seady_swm::field::Arr2D;
///
/// let mut arr = Arr2D::with_ghosts(0f64, [3, 2]);
/// *arr.at_mut(-1, 0) = 4.0;
/// *arr.at_mut(3, 1) = 2.0;
///
/// assert_eq!(arr.at(-1, 0), 4.0);
/// assert_eq!(arr.at(3, 1), 2.0);
/// assert_eq!(arr.owned_to_vec(), vec![0.0; 6]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Arr2D<I> {
    shape: Shape,
    ghost: usize,
    data: Box<[I]>,
}

impl<I> Arr2D<I> {
    /// Number of ghost layers around the owned block.
    pub fn ghost(&self) -> usize {
        self.ghost
    }

    #[inline]
    fn stride(&self) -> usize {
        self.shape.nx() + 2 * self.ghost
    }

    #[inline]
    fn flatten_index(&self, i: isize, j: isize) -> usize {
        let g = self.ghost as isize;
        debug_assert!(i >= -g && i < self.shape.nx() as isize + g);
        debug_assert!(j >= -g && j < self.shape.ny() as isize + g);
        (j + g) as usize * self.stride() + (i + g) as usize
    }
}

impl<I: Copy> Arr2D<I> {
    /// Create an array with a one cell ghost border around `shape`.
    pub fn with_ghosts(item: I, shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        Arr2D {
            shape,
            ghost: 1,
            data: vec![item; (shape.nx() + 2) * (shape.ny() + 2)].into_boxed_slice(),
        }
    }

    /// Wrap a buffer in i-fastest order without ghost border.
    ///
    /// Returns `None` if the buffer length does not match the shape.
    pub fn from_vec(shape: impl Into<Shape>, data: Vec<I>) -> Option<Self> {
        let shape = shape.into();
        (data.len() == shape.size()).then(|| Arr2D {
            shape,
            ghost: 0,
            data: data.into_boxed_slice(),
        })
    }

    /// Value at a signed local index, ghost cells included.
    #[inline]
    pub fn at(&self, i: isize, j: isize) -> I {
        self.data[self.flatten_index(i, j)]
    }

    /// Mutable reference to a signed local index, ghost cells included.
    #[inline]
    pub fn at_mut(&mut self, i: isize, j: isize) -> &mut I {
        let idx = self.flatten_index(i, j);
        &mut self.data[idx]
    }

    /// Copy of column `i` over the owned rows.
    pub fn column(&self, i: isize) -> Vec<I> {
        (0..self.shape.ny() as isize).map(|j| self.at(i, j)).collect()
    }

    /// Overwrite column `i` over the owned rows.
    pub fn set_column(&mut self, i: isize, values: &[I]) {
        debug_assert_eq!(values.len(), self.shape.ny());
        for (j, &val) in values.iter().enumerate() {
            *self.at_mut(i, j as isize) = val;
        }
    }

    /// Copy of row `j` over the owned columns.
    pub fn row(&self, j: isize) -> Vec<I> {
        let start = self.flatten_index(0, j);
        self.data[start..start + self.shape.nx()].to_vec()
    }

    /// Overwrite row `j` over the owned columns.
    pub fn set_row(&mut self, j: isize, values: &[I]) {
        debug_assert_eq!(values.len(), self.shape.nx());
        let start = self.flatten_index(0, j);
        self.data[start..start + self.shape.nx()].copy_from_slice(values);
    }

    /// Owned block in i-fastest order, ghost cells stripped.
    pub fn owned_to_vec(&self) -> Vec<I> {
        (0..self.shape.ny() as isize)
            .flat_map(|j| self.row(j))
            .collect()
    }

    /// Overwrite the owned block from a buffer in i-fastest order.
    pub fn fill_owned(&mut self, values: &[I]) {
        debug_assert_eq!(values.len(), self.shape.size());
        let nx = self.shape.nx().max(1);
        for (j, row) in values.chunks(nx).enumerate() {
            self.set_row(j as isize, row);
        }
    }

    /// Raw storage, including ghost cells if present.
    pub fn as_slice(&self) -> &[I] {
        &self.data
    }
}

impl<I: Copy + Send + Sync> Arr2D<I> {
    /// Parallel iterator over the owned rows as `(j, row)`.
    ///
    /// Each item covers exactly the owned cells of one row, so the rows can be
    /// written concurrently.
    pub fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = (usize, &mut [I])> + '_ {
        let g = self.ghost;
        let nx = self.shape.nx();
        let ny = self.shape.ny();
        let stride = self.stride();
        self.data
            .par_chunks_mut(stride)
            .skip(g)
            .take(ny)
            .enumerate()
            .map(move |(j, row)| (j, &mut row[g..g + nx]))
    }
}

impl<I: Copy> Index<Ix2> for Arr2D<I> {
    type Output = I;
    #[inline]
    fn index(&self, index: Ix2) -> &I {
        &self.data[self.flatten_index(index[0] as isize, index[1] as isize)]
    }
}

impl<I: Copy> IndexMut<Ix2> for Arr2D<I> {
    #[inline]
    fn index_mut(&mut self, index: Ix2) -> &mut Self::Output {
        let idx = self.flatten_index(index[0] as isize, index[1] as isize);
        &mut self.data[idx]
    }
}

impl<I: Copy> Field<I> for Arr2D<I> {
    fn full(item: I, shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        Arr2D {
            shape,
            ghost: 0,
            data: vec![item; shape.size()].into_boxed_slice(),
        }
    }

    fn shape(&self) -> Shape {
        self.shape
    }
}

impl<I: Display + Copy> Display for Arr2D<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ny = self.shape.ny();
        write!(f, "[")?;
        for j in 0..ny {
            let s = self
                .row(j as isize)
                .iter()
                .map(|i| format!("{}", i))
                .collect::<Vec<_>>()
                .join(",");
            write!(f, "[{}]", s)?;
            if j + 1 != ny {
                write!(f, ",\n ")?;
            }
        }
        write!(f, "]")
    }
}
