//! Reading one extraction window into a result table.

use crate::axis::Axis;
use crate::dataset::{Dataset, Dimension, RowMajor, Variable, c_strides};
use crate::error::{ExtractError, Result};
use crate::table::{Column, Table, Value};
use crate::time::{CalendarDecoder, decode_time};
use log::warn;

/// The selected index range of one dimension
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionWindow {
    pub dimension: Dimension,
    pub axis: Axis,
    /// 0-based first index
    pub start: usize,
    pub count: usize,
}

impl DimensionWindow {
    /// The whole dimension
    pub fn full(dimension: Dimension, axis: Axis) -> Self {
        let count = dimension.len();
        Self {
            dimension,
            axis,
            start: 0,
            count,
        }
    }

    pub fn name(&self) -> &str {
        &self.dimension.name
    }

    /// Coordinate values of the selected indices
    pub fn values(&self) -> &[f64] {
        &self.dimension.values[self.start..self.start + self.count]
    }
}

/// A rectangular region of the reference variable, in its dimension order,
/// plus scalar columns to attach to every row read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionWindow {
    pub dimensions: Vec<DimensionWindow>,
    pub echo: Vec<(String, Value)>,
}

impl ExtractionWindow {
    pub fn new(dimensions: Vec<DimensionWindow>) -> Self {
        Self {
            dimensions,
            echo: Vec::new(),
        }
    }

    pub fn start(&self) -> Vec<usize> {
        self.dimensions.iter().map(|d| d.start).collect()
    }

    pub fn count(&self) -> Vec<usize> {
        self.dimensions.iter().map(|d| d.count).collect()
    }

    pub fn rows(&self) -> usize {
        self.dimensions.iter().map(|d| d.count).product()
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionWindow> {
        self.dimensions.iter().find(|d| d.name() == name)
    }

    pub fn dimension_mut(&mut self, name: &str) -> Option<&mut DimensionWindow> {
        self.dimensions.iter_mut().find(|d| d.name() == name)
    }
}

/// Keep the variables spanning the same dimensions as `reference`.
///
/// Dimension order may differ; anything else is dropped with a warning.
pub fn matching_variables(reference: &Variable, variables: &[Variable]) -> Vec<Variable> {
    variables
        .iter()
        .filter(|v| {
            let keep = v.same_dimensions(&reference.dimensions);
            if !keep {
                warn!(
                    "dropping '{}': dimensions {:?} differ from '{}' {:?}",
                    v.name, v.dimensions, reference.name, reference.dimensions
                );
            }
            keep
        })
        .cloned()
        .collect()
}

/// Read every variable over one window and flatten it into rows.
///
/// Columns are the window's coordinates (cross-product, last dimension
/// fastest), then one column per variable, then decoded `date`/`datetime`
/// when exactly one time dimension is used, then echoed request columns.
pub fn read_window<D: Dataset + ?Sized>(
    dataset: &D,
    variables: &[Variable],
    window: &ExtractionWindow,
    keep_raw_time: bool,
    decoder: &dyn CalendarDecoder,
) -> Result<Table> {
    let counts = window.count();
    let rows = window.rows();
    let mut table = Table::new();

    for (d, dim) in window.dimensions.iter().enumerate() {
        let values = dim.values();
        let column = RowMajor::new(&counts)
            .map(|idx| Value::Number(values[idx[d]]))
            .collect();
        table.push_column(Column::new(dim.name(), column));
    }

    for variable in variables {
        let values = read_variable(dataset, variable, window)?;
        table.push_column(Column::new(
            variable.name.as_str(),
            values.into_iter().map(Value::Number).collect(),
        ));
    }

    let time_dims: Vec<&DimensionWindow> = window
        .dimensions
        .iter()
        .filter(|d| d.axis == Axis::T)
        .collect();
    if let [time] = time_dims.as_slice() {
        join_time_columns(&mut table, time, keep_raw_time, decoder);
    }

    for (name, value) in &window.echo {
        table.push_derived(Column::constant(name.as_str(), value.clone(), rows));
    }

    Ok(table)
}

/// Hyperslab of one variable, reordered to the window's dimension order
fn read_variable<D: Dataset + ?Sized>(
    dataset: &D,
    variable: &Variable,
    window: &ExtractionWindow,
) -> Result<Vec<f64>> {
    // Position in the window of each of the variable's dimensions
    let order = variable
        .dimensions
        .iter()
        .map(|name| {
            window
                .dimensions
                .iter()
                .position(|d| d.name() == name)
                .ok_or_else(|| ExtractError::InvalidWindow {
                    variable: variable.name.clone(),
                    reason: format!("dimension '{}' is not part of the window", name),
                })
        })
        .collect::<Result<Vec<usize>>>()?;

    let start: Vec<usize> = order.iter().map(|&w| window.dimensions[w].start).collect();
    let count: Vec<usize> = order.iter().map(|&w| window.dimensions[w].count).collect();

    let data = dataset
        .read_hyperslab(&variable.name, &start, &count)
        .map_err(|source| ExtractError::Read {
            variable: variable.name.clone(),
            source,
        })?;

    let rows = window.rows();
    if data.len() != rows {
        return Err(ExtractError::InvalidWindow {
            variable: variable.name.clone(),
            reason: format!("read {} values for {} rows", data.len(), rows),
        });
    }

    if order.iter().enumerate().all(|(i, &w)| i == w) {
        return Ok(data);
    }

    let strides = c_strides(&count);
    Ok(RowMajor::new(&window.count())
        .map(|idx| {
            let offset: usize = order
                .iter()
                .zip(&strides)
                .map(|(&w, stride)| idx[w] * stride)
                .sum();
            data[offset]
        })
        .collect())
}

fn join_time_columns(
    table: &mut Table,
    time: &DimensionWindow,
    keep_raw_time: bool,
    decoder: &dyn CalendarDecoder,
) {
    let raw = time.values();
    let Some(decoded) = decode_time(
        raw,
        time.dimension.units(),
        time.dimension.calendar(),
        decoder,
    ) else {
        return;
    };

    let Some(raw_column) = table.column(time.name()) else {
        return;
    };

    // Join on the raw value; the first match wins for repeated values
    let lookup = |value: &Value| {
        value
            .as_f64()
            .and_then(|v| raw.iter().position(|r| *r == v || (r.is_nan() && v.is_nan())))
    };
    let positions: Vec<Option<usize>> = raw_column.values.iter().map(lookup).collect();

    if !keep_raw_time {
        table.remove_column(time.name());
    }

    let dates = positions
        .iter()
        .map(|p| p.map_or(Value::Null, |i| Value::Date(decoded.dates[i])))
        .collect();
    table.push_derived(Column::new("date", dates));

    if let Some(datetimes) = &decoded.datetimes {
        let values = positions
            .iter()
            .map(|p| p.map_or(Value::Null, |i| Value::DateTime(datetimes[i])))
            .collect();
        table.push_derived(Column::new("datetime", values));
    }
}
