//! Extraction of one dataset into a result table.

use crate::axis::{Axis, classify_dimensions};
use crate::boundary::{self, Boundary};
use crate::dataset::{AttributeTarget, Dataset, Dimension, Variable};
use crate::error::{ExtractError, Result};
use crate::merge::FileErrorPolicy;
use crate::points::{self, DistanceMode, QueryPoint};
use crate::table::Table;
use crate::time::{CalendarDecoder, CfCalendar};
use crate::window::{ExtractionWindow, matching_variables, read_window};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Options shared by [`extract`] and [`crate::merge::extract_many`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Keep the raw time column next to decoded dates
    pub keep_raw_time: bool,
    /// Attach variable and global attributes to the result
    pub include_metadata: bool,
    pub boundary: Option<Boundary>,
    /// Nearest-cell sampling instead of a grid window
    pub query_points: Option<Vec<QueryPoint>>,
    /// Add the requested coordinates (and station id) to point rows
    pub echo_points: bool,
    pub distance_mode: DistanceMode,
    /// Leading column naming the source file in merged tables
    pub source_id_column: String,
    pub on_file_error: FileErrorPolicy,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            keep_raw_time: true,
            include_metadata: false,
            boundary: None,
            query_points: None,
            echo_points: true,
            distance_mode: DistanceMode::default(),
            source_id_column: "source".to_string(),
            on_file_error: FileErrorPolicy::default(),
        }
    }
}

impl ExtractOptions {
    fn points(&self) -> &[QueryPoint] {
        self.query_points.as_deref().unwrap_or_default()
    }
}

/// Extract `variables` from `dataset`, decoding CF times with [`CfCalendar`].
///
/// An empty `variables` list selects the dataset's data variables.
pub fn extract<D: Dataset + ?Sized>(
    dataset: &D,
    variables: &[String],
    options: &ExtractOptions,
) -> Result<Table> {
    extract_with(dataset, variables, options, &CfCalendar)
}

/// [`extract`] with a caller-supplied calendar decoder
pub fn extract_with<D: Dataset + ?Sized>(
    dataset: &D,
    variables: &[String],
    options: &ExtractOptions,
    decoder: &dyn CalendarDecoder,
) -> Result<Table> {
    let all_variables = dataset.variables().map_err(|source| ExtractError::Read {
        variable: "variable list".to_string(),
        source,
    })?;
    let all_dimensions = dataset.dimensions().map_err(|source| ExtractError::Read {
        variable: "dimension list".to_string(),
        source,
    })?;

    let selected = select_variables(&all_variables, &all_dimensions, variables)?;
    let reference = &selected[0];
    let selected = matching_variables(reference, &selected);

    let dimensions = reference
        .dimensions
        .iter()
        .map(|name| {
            all_dimensions
                .iter()
                .find(|d| &d.name == name)
                .cloned()
                .ok_or_else(|| ExtractError::InvalidWindow {
                    variable: reference.name.clone(),
                    reason: format!("dataset has no dimension '{}'", name),
                })
        })
        .collect::<Result<Vec<Dimension>>>()?;

    let axes = classify_dimensions(&dimensions);
    for (name, axis) in &axes {
        if *axis == Axis::Unknown {
            warn!("could not classify dimension '{}'; it will not be filtered", name);
        }
    }

    let points = options.points();
    let base = boundary::plan(
        &reference.name,
        &dimensions,
        &axes,
        options.boundary.as_ref(),
        !points.is_empty(),
        decoder,
    )?;

    let windows: Vec<ExtractionWindow> = if points.is_empty() {
        vec![base]
    } else {
        points::locate(
            &reference.name,
            &base,
            &axes,
            points,
            options.distance_mode,
            options.echo_points,
        )?
    };
    debug!("reading {} window(s) of '{}'", windows.len(), reference.name);

    let tables = windows
        .iter()
        .map(|w| read_window(dataset, &selected, w, options.keep_raw_time, decoder))
        .collect::<Result<Vec<Table>>>()?;
    let mut table = Table::vstack(tables);

    if options.include_metadata {
        annotate(dataset, &mut table, &selected, &dimensions)?;
    }

    Ok(table)
}

/// Resolve requested variable names, or pick the default data variables
fn select_variables(
    all: &[Variable],
    dimensions: &[Dimension],
    requested: &[String],
) -> Result<Vec<Variable>> {
    if requested.is_empty() {
        let defaults = default_variables(all, dimensions);
        if defaults.is_empty() {
            return Err(ExtractError::NoVariables);
        }
        debug!(
            "no variables requested, using {:?}",
            defaults.iter().map(|v| &v.name).collect::<Vec<_>>()
        );
        return Ok(defaults);
    }

    requested
        .iter()
        .map(|name| {
            all.iter()
                .find(|v| &v.name == name)
                .cloned()
                .ok_or_else(|| ExtractError::VariableNotFound {
                    name: name.clone(),
                    available: all
                        .iter()
                        .map(|v| v.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
        })
        .collect()
}

/// Data variables sharing the dimensions of the largest one.
///
/// Coordinate variables (1-D, named after their dimension) never qualify.
fn default_variables(all: &[Variable], dimensions: &[Dimension]) -> Vec<Variable> {
    let size = |v: &Variable| -> usize {
        v.dimensions
            .iter()
            .map(|name| dimensions.iter().find(|d| &d.name == name).map_or(0, Dimension::len))
            .product()
    };

    let mut candidates: Vec<&Variable> = all
        .iter()
        .filter(|v| !v.dimensions.is_empty())
        .filter(|v| !(v.dimensions.len() == 1 && v.dimensions[0] == v.name))
        .collect();
    candidates.sort_by(|a, b| {
        size(b)
            .cmp(&size(a))
            .then_with(|| b.dimensions.len().cmp(&a.dimensions.len()))
            .then_with(|| a.name.cmp(&b.name))
    });

    let Some(first) = candidates.first() else {
        return Vec::new();
    };
    let mut chosen: Vec<Variable> = candidates
        .iter()
        .filter(|v| v.same_dimensions(&first.dimensions))
        .map(|v| (*v).clone())
        .collect();
    chosen.sort_by(|a, b| a.name.cmp(&b.name));
    chosen
}

/// Attach variable attributes to their columns and global attributes to the table.
pub fn annotate<D: Dataset + ?Sized>(
    dataset: &D,
    table: &mut Table,
    variables: &[Variable],
    dimensions: &[Dimension],
) -> Result<()> {
    for variable in variables {
        let attributes = dataset
            .attributes(AttributeTarget::Variable(&variable.name))
            .map_err(|source| ExtractError::Read {
                variable: variable.name.clone(),
                source,
            })?;
        if let Some(column) = table.column_mut(&variable.name) {
            column.attributes.extend(attributes);
        }
    }

    for dim in dimensions.iter().filter(|d| d.has_coordinate) {
        if let Some(column) = table.column_mut(&dim.name) {
            column.attributes.extend(dim.attributes.clone());
        }
    }

    let global = dataset
        .attributes(AttributeTarget::Global)
        .map_err(|source| ExtractError::Read {
            variable: "global attributes".to_string(),
            source,
        })?;
    table.attributes.extend(global);
    Ok(())
}
