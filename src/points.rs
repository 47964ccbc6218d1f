//! Nearest-grid-cell lookup for query points.

use crate::axis::{Axis, AxisMap, describe, unique_dimension};
use crate::error::{ExtractError, Result};
use crate::table::Value;
use crate::window::ExtractionWindow;
use log::debug;
use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Column holding the query id in point mode
pub const STATION_COLUMN: &str = "station";

/// A requested location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPoint {
    pub lon: f64,
    pub lat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl QueryPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat, id: None }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Build query points from parallel coordinate lists.
///
/// Both lists missing or empty means grid mode (no points). Ids, when
/// given, must match the number of points.
pub fn query_points(
    lon: Option<&[f64]>,
    lat: Option<&[f64]>,
    ids: Option<&[String]>,
) -> Result<Vec<QueryPoint>> {
    let lon = lon.unwrap_or_default();
    let lat = lat.unwrap_or_default();

    match (lon.is_empty(), lat.is_empty()) {
        (false, true) => return Err(ExtractError::PartialPoints { given: "longitude" }),
        (true, false) => return Err(ExtractError::PartialPoints { given: "latitude" }),
        _ => {}
    }
    if lon.len() != lat.len() {
        return Err(ExtractError::PointLengthMismatch {
            lon: lon.len(),
            lat: lat.len(),
        });
    }

    let ids = ids.unwrap_or_default();
    if !ids.is_empty() && ids.len() != lon.len() {
        return Err(ExtractError::PointIdMismatch {
            ids: ids.len(),
            points: lon.len(),
        });
    }

    Ok(lon
        .iter()
        .zip(lat)
        .enumerate()
        .map(|(i, (&lon, &lat))| QueryPoint {
            lon,
            lat,
            id: ids.get(i).cloned(),
        })
        .collect())
}

/// How distances between coordinates are measured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMode {
    /// Haversine distance in metres
    GreatCircle,
    /// Euclidean distance in coordinate units
    #[default]
    Planar,
}

impl DistanceMode {
    /// Distance between two `(lon, lat)` pairs
    pub fn distance(self, a: (f64, f64), b: (f64, f64)) -> f64 {
        match self {
            DistanceMode::GreatCircle => haversine_distance(a.1, a.0, b.1, b.0, EARTH_RADIUS_M),
            DistanceMode::Planar => (a.0 - b.0).hypot(a.1 - b.1),
        }
    }
}

/// Great-circle distance between two latitude/longitude pairs in degrees
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64, earth_radius: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    earth_radius * c
}

/// Index pair of the grid cell nearest to `point`.
///
/// Candidates run Y-outer, X-inner; the first of equally near cells wins.
/// Cells with a non-finite distance are never chosen.
pub fn nearest_cell(x: &[f64], y: &[f64], point: &QueryPoint, mode: DistanceMode) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for (iy, &lat) in y.iter().enumerate() {
        for (ix, &lon) in x.iter().enumerate() {
            let d = mode.distance((point.lon, point.lat), (lon, lat));
            if !d.is_finite() {
                continue;
            }
            if best.is_none_or(|(_, _, b)| d < b) {
                best = Some((ix, iy, d));
            }
        }
    }
    best.map(|(ix, iy, _)| (ix, iy))
}

/// One window per query point, narrowing X and Y of `base` to the nearest cell.
pub fn locate(
    variable: &str,
    base: &ExtractionWindow,
    axes: &AxisMap,
    points: &[QueryPoint],
    mode: DistanceMode,
    echo: bool,
) -> Result<Vec<ExtractionWindow>> {
    let not_found = || ExtractError::AxesNotFound {
        found: describe(axes),
    };
    let x_name = unique_dimension(axes, Axis::X).ok_or_else(not_found)?;
    let y_name = unique_dimension(axes, Axis::Y).ok_or_else(not_found)?;
    let x = base.dimension(x_name).ok_or_else(not_found)?;
    let y = base.dimension(y_name).ok_or_else(not_found)?;
    let (x_values, y_values) = (&x.dimension.values, &y.dimension.values);

    points
        .iter()
        .map(|point| {
            let (ix, iy) = nearest_cell(x_values, y_values, point, mode).ok_or_else(|| {
                ExtractError::InvalidWindow {
                    variable: variable.to_string(),
                    reason: format!("'{}' and '{}' have no finite coordinates", x_name, y_name),
                }
            })?;
            debug!(
                "point ({}, {}) -> {}[{}], {}[{}]",
                point.lon, point.lat, x_name, ix, y_name, iy
            );

            let mut window = base.clone();
            for (name, index) in [(x_name, ix), (y_name, iy)] {
                if let Some(dim) = window.dimension_mut(name) {
                    dim.start = index;
                    dim.count = 1;
                }
            }

            if echo {
                window.echo.push((format!("{}_point", x_name), Value::Number(point.lon)));
                window.echo.push((format!("{}_point", y_name), Value::Number(point.lat)));
                if let Some(id) = &point.id {
                    window.echo.push((STATION_COLUMN.to_string(), Value::Text(id.clone())));
                }
            }

            Ok(window)
        })
        .collect()
}
