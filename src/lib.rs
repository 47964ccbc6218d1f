//! Boundary- and point-sampled extraction of gridded array datasets into
//! flat tables.
//!
//! A [`Dataset`] exposes dimensions, variables and hyperslab reads. [`extract`]
//! classifies the dimensions of the requested variables, plans a window from
//! an optional [`Boundary`], optionally narrows it to the grid cells nearest
//! to [`QueryPoint`]s, and reads every window into a [`Table`].
//! [`extract_many`] does the same for a set of files and stacks the results.

pub mod axis;
pub mod boundary;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod memory;
pub mod merge;
pub mod metadata;
pub mod points;
pub mod store;
pub mod table;
pub mod time;
pub mod window;

// Re-export commonly used types
pub use axis::{Axis, AxisMap};
pub use boundary::{BoundRange, BoundValue, Boundary};
pub use dataset::{AttributeTarget, Dataset, DatasetGuard, DatasetOpener, Dimension, Variable};
pub use error::{ExtractError, Result};
pub use extract::{ExtractOptions, extract, extract_with};
pub use memory::MemoryDataset;
pub use merge::{FileErrorPolicy, extract_many, list_files, source_id};
pub use metadata::{AttributeValue, Attributes};
pub use points::{DistanceMode, QueryPoint, query_points};
pub use store::{ZarrOpener, ZarrStore};
pub use table::{Column, Table, Value};
pub use time::{CalendarDecoder, CfCalendar};
