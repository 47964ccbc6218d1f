//! Classify dataset dimensions into axis roles using CF conventions.

use crate::dataset::Dimension;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Semantic role of a dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    T,
    S,
    Unknown,
}

impl Axis {
    /// Order in which axes are planned
    pub const PRIORITY: [Axis; 5] = [Axis::X, Axis::Y, Axis::Z, Axis::T, Axis::S];

    fn from_attr(axis: &str) -> Option<Axis> {
        match axis.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('X') => Some(Axis::X),
            Some('Y') => Some(Axis::Y),
            Some('Z') => Some(Axis::Z),
            Some('T') => Some(Axis::T),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::T => "T",
            Axis::S => "S",
            Axis::Unknown => "?",
        };
        f.write_str(s)
    }
}

/// Dimension name to axis role
pub type AxisMap = BTreeMap<String, Axis>;

/// Classify one dimension from its name and coordinate attributes.
///
/// Dimensions without a coordinate variable are `Unknown`; those with one
/// that matches no heuristic are `S`.
pub fn classify(dim: &Dimension) -> Axis {
    if !dim.has_coordinate {
        return Axis::Unknown;
    }

    let axis_attr = dim.attr_str("axis").and_then(Axis::from_attr);
    let standard_name = dim.attr_str("standard_name");
    let units = dim.units();

    if is_time_coordinate(&dim.name, axis_attr, standard_name, units) {
        Axis::T
    } else if is_vertical_coordinate(&dim.name, axis_attr, standard_name) {
        Axis::Z
    } else if is_latitude_coordinate(&dim.name, axis_attr, standard_name, units) {
        Axis::Y
    } else if is_longitude_coordinate(&dim.name, axis_attr, standard_name, units) {
        Axis::X
    } else {
        axis_attr.unwrap_or(Axis::S)
    }
}

/// Classify the given dimensions, keyed by name
pub fn classify_dimensions<'a, I>(dims: I) -> AxisMap
where
    I: IntoIterator<Item = &'a Dimension>,
{
    dims.into_iter()
        .map(|d| (d.name.clone(), classify(d)))
        .collect()
}

/// The single dimension holding `axis`, or `None` if there are zero or several
pub fn unique_dimension(axes: &AxisMap, axis: Axis) -> Option<&str> {
    let mut found = axes.iter().filter(|(_, a)| **a == axis).map(|(n, _)| n.as_str());
    match (found.next(), found.next()) {
        (Some(name), None) => Some(name),
        _ => None,
    }
}

/// Human-readable listing such as "lon=X, lat=Y"
pub fn describe(axes: &AxisMap) -> String {
    if axes.is_empty() {
        return "no dimensions".to_string();
    }
    axes.iter()
        .map(|(name, axis)| format!("{}={}", name, axis))
        .collect::<Vec<_>>()
        .join(", ")
}

fn starts_with_ignore_ascii_case(s: &str, prefix: &str) -> bool {
    s.get(0..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// `<unit> since <reference>` as used by CF time coordinates
pub fn cf_time_units_looks_ok(units: &str) -> bool {
    let u = units.trim().to_ascii_lowercase();
    let Some((prefix, rest)) = u.split_once(" since ") else {
        return false;
    };

    let rest = rest.trim();
    if rest.is_empty() || !rest.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }

    matches!(
        prefix.trim(),
        "seconds"
            | "second"
            | "minutes"
            | "minute"
            | "hours"
            | "hour"
            | "days"
            | "day"
            | "months"
            | "month"
            | "years"
            | "year"
    )
}

fn is_time_coordinate(
    name: &str,
    axis: Option<Axis>,
    standard_name: Option<&str>,
    units: Option<&str>,
) -> bool {
    if axis == Some(Axis::T) {
        return true;
    }

    if standard_name.is_some_and(|sn| sn.eq_ignore_ascii_case("time")) {
        return true;
    }

    if units.is_some_and(|u| u.trim() == crate::time::JULIAN_DAY_UNITS || cf_time_units_looks_ok(u)) {
        return true;
    }

    axis.is_none() && starts_with_ignore_ascii_case(name, "time")
}

fn standard_name_suggests_vertical(sn: &str) -> bool {
    const VERTICAL: [&str; 9] = [
        "air_pressure",
        "depth",
        "altitude",
        "height",
        "geopotential_height",
        "model_level_number",
        "atmosphere_hybrid_sigma_pressure_coordinate",
        "atmosphere_sigma_coordinate",
        "ocean_sigma_coordinate",
    ];
    VERTICAL.iter().any(|v| sn.eq_ignore_ascii_case(v))
}

fn is_vertical_coordinate(name: &str, axis: Option<Axis>, standard_name: Option<&str>) -> bool {
    if axis == Some(Axis::Z) {
        return true;
    }
    if axis.is_some() {
        return false;
    }

    if standard_name.is_some_and(standard_name_suggests_vertical) {
        return true;
    }

    ["lev", "level", "plev", "depth", "altitude", "height", "z"]
        .iter()
        .any(|n| name.eq_ignore_ascii_case(n))
}

fn is_latitude_coordinate(
    name: &str,
    axis: Option<Axis>,
    standard_name: Option<&str>,
    units: Option<&str>,
) -> bool {
    if standard_name.is_some_and(|sn| sn.eq_ignore_ascii_case("latitude")) {
        return true;
    }
    if units.is_some_and(units_looks_like_latitude) {
        return true;
    }
    if axis.is_some() {
        return axis == Some(Axis::Y);
    }
    ["lat", "latitude", "y"].iter().any(|n| name.eq_ignore_ascii_case(n))
}

fn is_longitude_coordinate(
    name: &str,
    axis: Option<Axis>,
    standard_name: Option<&str>,
    units: Option<&str>,
) -> bool {
    if standard_name.is_some_and(|sn| sn.eq_ignore_ascii_case("longitude")) {
        return true;
    }
    if units.is_some_and(units_looks_like_longitude) {
        return true;
    }
    if axis.is_some() {
        return axis == Some(Axis::X);
    }
    ["lon", "long", "longitude", "x"]
        .iter()
        .any(|n| name.eq_ignore_ascii_case(n))
}

fn units_looks_like_latitude(units: &str) -> bool {
    let u = units.to_ascii_lowercase();
    u.contains("degrees_north") || u.contains("degree_north") || u == "degrees_n"
}

fn units_looks_like_longitude(units: &str) -> bool {
    let u = units.to_ascii_lowercase();
    u.contains("degrees_east") || u.contains("degree_east") || u == "degrees_e"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AttributeValue, Attributes};

    fn dim(name: &str, attrs: &[(&str, &str)]) -> Dimension {
        Dimension {
            name: name.to_string(),
            values: vec![0.0, 1.0],
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), AttributeValue::from(*v)))
                .collect::<Attributes>(),
            has_coordinate: true,
        }
    }

    #[test]
    fn test_cf_time_units_looks_ok() {
        assert!(cf_time_units_looks_ok("days since 1850-01-01"));
        assert!(cf_time_units_looks_ok("hours since 2000-01-01 00:00:00"));
        assert!(cf_time_units_looks_ok("seconds since 1970-01-01T00:00:00Z"));

        assert!(!cf_time_units_looks_ok("days"));
        assert!(!cf_time_units_looks_ok("meters"));
        assert!(!cf_time_units_looks_ok("days since"));
        assert!(!cf_time_units_looks_ok("days since not-a-date"));
    }

    #[test]
    fn test_classify_by_units_and_names() {
        assert_eq!(classify(&dim("longitude", &[("units", "degrees_east")])), Axis::X);
        assert_eq!(classify(&dim("nav_lat", &[("units", "degrees_north")])), Axis::Y);
        assert_eq!(classify(&dim("lon", &[])), Axis::X);
        assert_eq!(classify(&dim("lat", &[])), Axis::Y);
        assert_eq!(classify(&dim("plev", &[("units", "Pa")])), Axis::Z);
        assert_eq!(
            classify(&dim("t", &[("units", "days since 2000-01-01")])),
            Axis::T
        );
        assert_eq!(classify(&dim("day", &[("units", "julian_day")])), Axis::T);
        assert_eq!(classify(&dim("time", &[])), Axis::T);
        assert_eq!(classify(&dim("band", &[])), Axis::S);
    }

    #[test]
    fn test_axis_attribute_wins_over_name() {
        assert_eq!(classify(&dim("rlon", &[("axis", "X")])), Axis::X);
        assert_eq!(classify(&dim("lat", &[("axis", "x")])), Axis::X);
        assert_eq!(classify(&dim("ens", &[("axis", "E")])), Axis::S);
    }

    #[test]
    fn test_missing_coordinate_is_unknown() {
        let mut d = dim("lon", &[]);
        d.has_coordinate = false;
        assert_eq!(classify(&d), Axis::Unknown);
    }

    #[test]
    fn test_unique_dimension() {
        let dims = [dim("lon", &[]), dim("lat", &[]), dim("x", &[])];
        let axes = classify_dimensions(&dims);
        assert_eq!(unique_dimension(&axes, Axis::Y), Some("lat"));
        // Both "lon" and "x" are X
        assert_eq!(unique_dimension(&axes, Axis::X), None);
        assert_eq!(unique_dimension(&axes, Axis::T), None);
        assert_eq!(describe(&axes), "lat=Y, lon=X, x=X");
    }
}
