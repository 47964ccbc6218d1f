//! The array dataset capability the extraction engine reads through.
//!
//! The engine never touches storage directly. It asks a [`Dataset`] for
//! dimensions, variables and attributes, and for rectangular hyperslabs
//! described by a 0-based `start` and a `count` per dimension.

use crate::metadata::{AttributeValue, Attributes};
use anyhow::{Result, bail};
use log::{debug, warn};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// A dataset dimension together with its coordinate values
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    /// Coordinate values, or `0..len` when the dataset has no coordinate variable
    pub values: Vec<f64>,
    /// Attributes of the coordinate variable
    pub attributes: Attributes,
    pub has_coordinate: bool,
}

impl Dimension {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttributeValue::as_str)
    }

    pub fn units(&self) -> Option<&str> {
        self.attr_str("units")
    }

    pub fn calendar(&self) -> Option<&str> {
        self.attr_str("calendar")
    }
}

/// A data variable and the names of the dimensions it spans, in storage order
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub dimensions: Vec<String>,
    pub attributes: Attributes,
}

impl Variable {
    /// True when both variables span the same dimensions, in any order
    pub fn same_dimensions(&self, other: &[String]) -> bool {
        let mut a: Vec<&str> = self.dimensions.iter().map(String::as_str).collect();
        let mut b: Vec<&str> = other.iter().map(String::as_str).collect();
        a.sort_unstable();
        b.sort_unstable();
        a == b
    }
}

/// What an attribute lookup refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeTarget<'a> {
    Global,
    Variable(&'a str),
}

/// Read access to one open gridded dataset.
pub trait Dataset {
    fn dimensions(&self) -> Result<Vec<Dimension>>;

    fn variables(&self) -> Result<Vec<Variable>>;

    fn attributes(&self, target: AttributeTarget<'_>) -> Result<Attributes>;

    fn attribute(&self, target: AttributeTarget<'_>, name: &str) -> Result<Option<AttributeValue>> {
        Ok(self.attributes(target)?.remove(name))
    }

    /// Read a hyperslab, flattened in row-major order of the variable's dimensions.
    fn read_hyperslab(&self, variable: &str, start: &[usize], count: &[usize]) -> Result<Vec<f64>>;

    /// Release the underlying resources. Called exactly once by [`DatasetGuard`].
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens datasets by path.
pub trait DatasetOpener {
    type Dataset: Dataset;

    fn open(&self, path: &Path) -> Result<Self::Dataset>;
}

/// Owns an open dataset and closes it when dropped.
///
/// Every exit path of an extraction releases the handle. Use
/// [`DatasetGuard::finish`] to observe close errors; a close failing
/// during `Drop` is only logged.
pub struct DatasetGuard<D: Dataset> {
    inner: Option<D>,
    path: PathBuf,
}

impl<D: Dataset> DatasetGuard<D> {
    pub fn new(dataset: D, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Some(dataset),
            path: path.into(),
        }
    }

    pub fn open<O>(opener: &O, path: &Path) -> Result<Self>
    where
        O: DatasetOpener<Dataset = D>,
    {
        let dataset = opener.open(path)?;
        debug!("opened {}", path.display());
        Ok(Self::new(dataset, path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn finish(mut self) -> Result<()> {
        match self.inner.take() {
            Some(mut dataset) => dataset.close(),
            None => Ok(()),
        }
    }
}

impl<D: Dataset> Deref for DatasetGuard<D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.inner.as_ref().expect("dataset used after close")
    }
}

impl<D: Dataset> DerefMut for DatasetGuard<D> {
    fn deref_mut(&mut self) -> &mut D {
        self.inner.as_mut().expect("dataset used after close")
    }
}

impl<D: Dataset> Drop for DatasetGuard<D> {
    fn drop(&mut self) {
        if let Some(mut dataset) = self.inner.take() {
            if let Err(e) = dataset.close() {
                warn!("failed to close '{}': {:#}", self.path.display(), e);
            }
        }
    }
}

/// Check a window against a shape and return the number of elements it covers.
pub fn check_window(shape: &[usize], start: &[usize], count: &[usize]) -> Result<usize> {
    if start.len() != shape.len() || count.len() != shape.len() {
        bail!(
            "window has {} starts and {} counts for {} dimensions",
            start.len(),
            count.len(),
            shape.len()
        );
    }

    for (i, ((&s, &c), &n)) in start.iter().zip(count).zip(shape).enumerate() {
        if c == 0 || s + c > n {
            bail!(
                "dimension {} window {}..{} is outside 0..{}",
                i,
                s,
                s + c,
                n
            );
        }
    }

    Ok(count.iter().product())
}

/// Iterates index tuples inside `counts` in row-major order (last index fastest).
#[derive(Debug, Clone)]
pub struct RowMajor {
    counts: Vec<usize>,
    current: Vec<usize>,
    done: bool,
}

impl RowMajor {
    pub fn new(counts: &[usize]) -> Self {
        Self {
            counts: counts.to_vec(),
            current: vec![0; counts.len()],
            done: counts.contains(&0),
        }
    }
}

impl Iterator for RowMajor {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }

        let item = self.current.clone();

        // Advance like an odometer; a zero-rank tuple yields exactly once.
        let mut dim = self.counts.len();
        loop {
            if dim == 0 {
                self.done = true;
                break;
            }
            dim -= 1;
            self.current[dim] += 1;
            if self.current[dim] < self.counts[dim] {
                break;
            }
            self.current[dim] = 0;
        }

        Some(item)
    }
}

/// Row-major strides for a shape
pub fn c_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}
