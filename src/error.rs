//! Error types for grid extraction.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Errors that stop an extraction.
///
/// Validation variants name the offending input. Partial-data problems
/// (a dropped variable, an unclassified dimension) are logged instead and
/// never show up here.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Query longitudes and latitudes have different lengths.
    #[error("query point lists differ in length: {lon} longitudes, {lat} latitudes")]
    PointLengthMismatch { lon: usize, lat: usize },

    /// Only one half of a longitude/latitude pair was supplied.
    #[error("query points need both longitude and latitude; only {given} was given")]
    PartialPoints { given: &'static str },

    /// Station ids were supplied for some but not all query points.
    #[error("{ids} station ids given for {points} query points")]
    PointIdMismatch { ids: usize, points: usize },

    /// A boundary names a dimension the target variable does not have.
    #[error("boundary dimension '{dimension}' is not a dimension of '{variable}' (available: {available})")]
    UnknownBoundaryDimension {
        dimension: String,
        variable: String,
        available: String,
    },

    /// A boundary range has its endpoints reversed or is not a number.
    #[error("invalid boundary for dimension '{dimension}': {reason}")]
    InvalidBoundary { dimension: String, reason: String },

    /// Point mode was requested but X and Y could not both be identified.
    #[error("dimensions not labelled correctly: point extraction needs exactly one X and one Y dimension, found {found}")]
    AxesNotFound { found: String },

    /// No value of the dimension fell inside the boundary.
    #[error("no values of dimension '{dimension}' fall within [{min}, {max}]")]
    EmptyBoundary {
        dimension: String,
        min: String,
        max: String,
    },

    /// The boundary matched indices that do not form one contiguous run.
    #[error("boundary on dimension '{dimension}' matches non-contiguous indices {indices:?}")]
    NonContiguous {
        dimension: String,
        indices: Vec<usize>,
    },

    /// The requested variable is not in the dataset.
    #[error("variable '{name}' not found (available: {available})")]
    VariableNotFound { name: String, available: String },

    /// The dataset holds nothing that could be extracted.
    #[error("no data variables to extract")]
    NoVariables,

    /// A hyperslab window does not fit the variable's shape.
    #[error("window for '{variable}' is invalid: {reason}")]
    InvalidWindow { variable: String, reason: String },

    /// The file set for a merge is empty.
    #[error("no files matching '*.{extension}' in '{}'", dir.display())]
    NoFiles { dir: PathBuf, extension: String },

    /// A merge was started with an empty file list.
    #[error("no input files to merge")]
    EmptyBatch,

    /// Every file of a merge batch was skipped.
    #[error("all {count} files failed; last error from '{}'", path.display())]
    AllFilesFailed {
        count: usize,
        path: PathBuf,
        #[source]
        source: Box<ExtractError>,
    },

    /// Opening a dataset failed.
    #[error("failed to open dataset '{}'", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Reading from an open dataset failed.
    #[error("failed to read '{variable}'")]
    Read {
        variable: String,
        #[source]
        source: anyhow::Error,
    },

    /// A file in a merge batch failed.
    #[error("extraction failed for '{}'", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: Box<ExtractError>,
    },
}
