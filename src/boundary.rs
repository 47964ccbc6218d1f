//! Turning boundary constraints into per-dimension index ranges.

use crate::axis::{Axis, AxisMap};
use crate::dataset::Dimension;
use crate::error::{ExtractError, Result};
use crate::time::{CalendarDecoder, days_since_epoch, decode_time};
use crate::window::{DimensionWindow, ExtractionWindow};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One endpoint of a boundary range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundValue {
    Number(f64),
    Date(NaiveDate),
}

impl BoundValue {
    /// Numeric form; dates count days since 1970-01-01
    pub fn as_f64(&self) -> f64 {
        match self {
            BoundValue::Number(n) => *n,
            BoundValue::Date(d) => days_since_epoch(*d),
        }
    }
}

impl fmt::Display for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundValue::Number(n) => write!(f, "{}", n),
            BoundValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<f64> for BoundValue {
    fn from(n: f64) -> Self {
        BoundValue::Number(n)
    }
}

impl From<NaiveDate> for BoundValue {
    fn from(d: NaiveDate) -> Self {
        BoundValue::Date(d)
    }
}

/// Inclusive `[min, max]` constraint on one dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundRange {
    pub min: BoundValue,
    pub max: BoundValue,
}

impl BoundRange {
    pub fn new(min: impl Into<BoundValue>, max: impl Into<BoundValue>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    fn validate(&self, dimension: &str) -> Result<()> {
        let (min, max) = (self.min.as_f64(), self.max.as_f64());
        let reason = if min.is_nan() || max.is_nan() {
            Some("endpoints must be numbers or dates".to_string())
        } else if min > max {
            Some(format!("min {} is greater than max {}", self.min, self.max))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ExtractError::InvalidBoundary {
                dimension: dimension.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// Dimension name to range
pub type Boundary = BTreeMap<String, BoundRange>;

/// Plan the base window of a variable from its dimensions and a boundary.
///
/// `dimensions` are in the variable's storage order and the window keeps
/// that order. With `point_mode`, X and Y keep their full range for the
/// point locator. Unclassified dimensions are never filtered.
pub fn plan(
    variable: &str,
    dimensions: &[Dimension],
    axes: &AxisMap,
    boundary: Option<&Boundary>,
    point_mode: bool,
    decoder: &dyn CalendarDecoder,
) -> Result<ExtractionWindow> {
    let empty = Boundary::new();
    let boundary = boundary.unwrap_or(&empty);

    for (name, range) in boundary {
        if !dimensions.iter().any(|d| &d.name == name) {
            return Err(ExtractError::UnknownBoundaryDimension {
                dimension: name.clone(),
                variable: variable.to_string(),
                available: dimensions
                    .iter()
                    .map(|d| d.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        range.validate(name)?;
    }

    let axis_of = |dim: &Dimension| axes.get(&dim.name).copied().unwrap_or(Axis::Unknown);

    let mut planned: Vec<Option<DimensionWindow>> = vec![None; dimensions.len()];
    let order = Axis::PRIORITY.iter().chain(std::iter::once(&Axis::Unknown));
    for &axis in order {
        for (i, dim) in dimensions.iter().enumerate() {
            if axis_of(dim) != axis {
                continue;
            }

            let range = boundary.get(&dim.name);
            planned[i] = Some(match range {
                _ if point_mode && matches!(axis, Axis::X | Axis::Y) => {
                    DimensionWindow::full(dim.clone(), axis)
                }
                Some(_) if axis == Axis::Unknown => {
                    warn!(
                        "dimension '{}' has no recognised axis; ignoring its boundary",
                        dim.name
                    );
                    DimensionWindow::full(dim.clone(), axis)
                }
                Some(range) => restrict(dim, axis, range, decoder)?,
                None => DimensionWindow::full(dim.clone(), axis),
            });
        }
    }

    Ok(ExtractionWindow::new(planned.into_iter().flatten().collect()))
}

/// Index range of `dim` whose values fall inside `range`
fn restrict(
    dim: &Dimension,
    axis: Axis,
    range: &BoundRange,
    decoder: &dyn CalendarDecoder,
) -> Result<DimensionWindow> {
    let keys = comparison_keys(dim, axis, decoder);
    let (min, max) = (range.min.as_f64(), range.max.as_f64());

    let mut indices: Vec<usize> = keys
        .iter()
        .enumerate()
        .filter(|(_, k)| **k >= min && **k <= max)
        .map(|(i, _)| i)
        .collect();

    if indices.is_empty() && keys.len() == 1 {
        let value = round3(keys[0]);
        if value == round3(min) && value == round3(max) {
            debug!(
                "accepting single value {} of '{}' within rounding of the boundary",
                keys[0], dim.name
            );
            indices.push(0);
        }
    }

    let (Some(&first), Some(&last)) = (indices.first(), indices.last()) else {
        return Err(ExtractError::EmptyBoundary {
            dimension: dim.name.clone(),
            min: range.min.to_string(),
            max: range.max.to_string(),
        });
    };

    if last - first + 1 != indices.len() {
        return Err(ExtractError::NonContiguous {
            dimension: dim.name.clone(),
            indices,
        });
    }

    Ok(DimensionWindow {
        dimension: dim.clone(),
        axis,
        start: first,
        count: indices.len(),
    })
}

/// Values compared against a boundary: decoded days for time, raw otherwise
fn comparison_keys(dim: &Dimension, axis: Axis, decoder: &dyn CalendarDecoder) -> Vec<f64> {
    if axis == Axis::T {
        if let Some(decoded) = decode_time(&dim.values, dim.units(), dim.calendar(), decoder) {
            return decoded.dates.into_iter().map(days_since_epoch).collect();
        }
    }
    dim.values.clone()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
