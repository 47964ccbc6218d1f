use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Attribute key/value pairs, sorted by key.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Represents an attribute value on a variable or on the dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Array(Vec<AttributeValue>),
    Object(BTreeMap<String, AttributeValue>),
    Null,
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

/// A named axis of a Zarr array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayDimension {
    pub name: String,
    pub size: u64,
}

/// Represents a Zarr array
#[derive(Debug, Clone)]
pub struct ZarrArray {
    pub name: String,
    pub path: String,
    pub dtype: String,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub compressor: Option<String>,
    pub fill_value: Option<AttributeValue>,
    pub order: String,
    pub filters: Vec<String>,
    pub dimension_separator: String,
    pub attributes: Attributes,
    pub dimensions: Vec<ArrayDimension>,
}

impl ZarrArray {
    /// Fill value as a number, NaN when unset or not numeric.
    pub fn fill_f64(&self) -> f64 {
        self.fill_value
            .as_ref()
            .and_then(AttributeValue::as_f64)
            .unwrap_or(f64::NAN)
    }
}

/// Dimension information across the entire store
#[derive(Debug, Clone)]
pub struct DimensionInfo {
    pub name: String,
    pub length: u64,
    pub appearances: Vec<(String, u64)>, // (array_path, size) pairs
}

/// Root metadata structure for a Zarr store
#[derive(Debug, Default)]
pub struct ZarrMetadata {
    pub global_attributes: Attributes,
    pub arrays: HashMap<String, ZarrArray>,
    pub dimensions: HashMap<String, DimensionInfo>,
}

impl ZarrMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name every array axis and collect the store-wide dimension table.
    ///
    /// A dimension seen with different sizes keeps the largest one; arrays
    /// that disagree are reported by `inconsistent_dimensions`.
    pub fn infer_dimensions(&mut self) {
        let mut dimension_map: HashMap<String, Vec<(String, u64)>> = HashMap::new();

        for (path, array) in self.arrays.iter_mut() {
            let dim_names = Self::extract_dimension_names(array);
            array.dimensions = array
                .shape
                .iter()
                .zip(dim_names)
                .map(|(&size, name)| ArrayDimension { name, size })
                .collect();

            for dim in &array.dimensions {
                dimension_map
                    .entry(dim.name.clone())
                    .or_default()
                    .push((path.clone(), dim.size));
            }
        }

        self.dimensions = dimension_map
            .into_iter()
            .map(|(name, appearances)| {
                let length = appearances.iter().map(|(_, size)| *size).max().unwrap_or(0);
                let info = DimensionInfo {
                    name: name.clone(),
                    length,
                    appearances,
                };
                (name, info)
            })
            .collect();
    }

    /// Dimensions whose size differs between the arrays using them
    pub fn inconsistent_dimensions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .dimensions
            .values()
            .filter(|info| {
                let sizes: HashSet<u64> = info.appearances.iter().map(|(_, s)| *s).collect();
                sizes.len() > 1
            })
            .map(|info| info.name.as_str())
            .collect();
        names.sort();
        names
    }

    /// Extract dimension names from _ARRAY_DIMENSIONS attribute or generate defaults
    pub fn extract_dimension_names(array: &ZarrArray) -> Vec<String> {
        let named: Vec<String> = match array.attributes.get("_ARRAY_DIMENSIONS") {
            Some(AttributeValue::Array(dims)) => dims
                .iter()
                .filter_map(|val| val.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };

        if named.len() == array.shape.len() {
            named
        } else {
            (0..array.shape.len()).map(|i| format!("dim_{}", i)).collect()
        }
    }

    /// The 1-D array holding coordinate values for a dimension, if any
    pub fn coordinate_array(&self, dim: &str) -> Option<&ZarrArray> {
        self.arrays.values().find(|array| {
            array.name == dim && array.dimensions.len() == 1 && array.dimensions[0].name == dim
        })
    }
}

/// Raw Zarr array metadata from .zarray file
#[derive(Debug, Deserialize)]
pub struct ZArrayMetadata {
    pub zarr_format: u8,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub dtype: String,
    pub compressor: Option<serde_json::Value>,
    pub fill_value: Option<serde_json::Value>,
    pub order: String,
    pub filters: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub dimension_separator: Option<String>,
}

/// Consolidated metadata from .zmetadata file
#[derive(Debug, Deserialize)]
pub struct ConsolidatedMetadata {
    pub zarr_consolidated_format: u8,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(name: &str, shape: Vec<u64>, dims: Option<&[&str]>) -> ZarrArray {
        let mut attributes = Attributes::new();
        if let Some(dims) = dims {
            attributes.insert(
                "_ARRAY_DIMENSIONS".to_string(),
                AttributeValue::Array(dims.iter().map(|d| AttributeValue::from(*d)).collect()),
            );
        }
        ZarrArray {
            name: name.to_string(),
            path: name.to_string(),
            dtype: "<f8".to_string(),
            chunks: shape.clone(),
            shape,
            compressor: None,
            fill_value: None,
            order: "C".to_string(),
            filters: vec![],
            dimension_separator: ".".to_string(),
            attributes,
            dimensions: vec![],
        }
    }

    #[test]
    fn test_extract_dimension_names_with_array_dimensions() {
        let var = array("temperature", vec![10, 20, 30], Some(&["time", "lat", "lon"]));
        assert_eq!(
            ZarrMetadata::extract_dimension_names(&var),
            vec!["time", "lat", "lon"]
        );
    }

    #[test]
    fn test_extract_dimension_names_default() {
        let var = array("data", vec![100, 200], None);
        assert_eq!(
            ZarrMetadata::extract_dimension_names(&var),
            vec!["dim_0", "dim_1"]
        );

        // A dimension list that does not match the rank is ignored
        let var = array("data", vec![100, 200], Some(&["y"]));
        assert_eq!(
            ZarrMetadata::extract_dimension_names(&var),
            vec!["dim_0", "dim_1"]
        );
    }

    #[test]
    fn test_infer_dimensions_and_coordinates() {
        let mut metadata = ZarrMetadata::new();
        metadata.arrays.insert(
            "temp".to_string(),
            array("temp", vec![365, 180, 360], Some(&["time", "lat", "lon"])),
        );
        metadata
            .arrays
            .insert("lat".to_string(), array("lat", vec![180], Some(&["lat"])));
        metadata.infer_dimensions();

        assert_eq!(metadata.dimensions.len(), 3);
        assert_eq!(metadata.dimensions["lat"].length, 180);
        assert_eq!(metadata.dimensions["lat"].appearances.len(), 2);
        assert_eq!(metadata.arrays["temp"].dimensions[2].name, "lon");

        assert!(metadata.coordinate_array("lat").is_some());
        assert!(metadata.coordinate_array("lon").is_none());
        assert!(metadata.inconsistent_dimensions().is_empty());
    }

    #[test]
    fn test_inconsistent_dimension_sizes() {
        let mut metadata = ZarrMetadata::new();
        metadata
            .arrays
            .insert("a".to_string(), array("a", vec![100], Some(&["time"])));
        metadata
            .arrays
            .insert("b".to_string(), array("b", vec![200], Some(&["time"])));
        metadata.infer_dimensions();

        assert_eq!(metadata.dimensions["time"].length, 200);
        assert_eq!(metadata.inconsistent_dimensions(), vec!["time"]);
    }

    #[test]
    fn test_attribute_value_parsing() {
        let attrs: Attributes =
            serde_json::from_str(r#"{"units": "K", "scale": 0.5, "count": 3, "flags": [1, 2]}"#)
                .unwrap();

        assert_eq!(attrs["units"].as_str(), Some("K"));
        assert_eq!(attrs["scale"], AttributeValue::Number(0.5));
        assert_eq!(attrs["count"], AttributeValue::Integer(3));
        assert_eq!(attrs["count"].as_f64(), Some(3.0));
        assert!(matches!(attrs["flags"], AttributeValue::Array(_)));
    }

    #[test]
    fn test_zarr_array_metadata_parsing() {
        let json_data = r#"{
            "zarr_format": 2,
            "shape": [100, 200],
            "chunks": [10, 20],
            "dtype": "<f8",
            "compressor": {"id": "zstd", "level": 3},
            "fill_value": null,
            "order": "C",
            "filters": [{"id": "shuffle"}]
        }"#;

        let metadata: ZArrayMetadata = serde_json::from_str(json_data).unwrap();
        assert_eq!(metadata.zarr_format, 2);
        assert_eq!(metadata.shape, vec![100, 200]);
        assert_eq!(metadata.chunks, vec![10, 20]);
        assert_eq!(metadata.dtype, "<f8");
        assert!(metadata.compressor.is_some());
        assert!(metadata.dimension_separator.is_none());
    }
}
