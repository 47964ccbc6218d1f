use crate::dataset::{
    AttributeTarget, Dataset, DatasetOpener, Dimension, RowMajor, Variable, c_strides, check_window,
};
use crate::metadata::*;
use anyhow::{Context, Result, anyhow, bail};
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use log::{debug, warn};
use std::fs;
use std::io::{self, Cursor};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// A Zarr v2 store on the local filesystem, opened as a [`Dataset`]
pub struct ZarrStore {
    path: PathBuf,
    metadata: ZarrMetadata,
    dimensions: Vec<Dimension>,
    closed: bool,
}

impl ZarrStore {
    /// Open a store directory and load its metadata and coordinate values
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(anyhow!("Path does not exist: {}", path.display()));
        }

        if !path.is_dir() {
            return Err(anyhow!(
                "Path is not a directory: {}. Zarr stores must be directories containing .zarray, .zgroup, or .zmetadata files.",
                path.display()
            ));
        }

        let metadata = Self::load_metadata(&path)?;
        for dim in metadata.inconsistent_dimensions() {
            warn!(
                "dimension '{}' has different sizes across arrays in '{}'",
                dim,
                path.display()
            );
        }

        let mut store = Self {
            path,
            metadata,
            dimensions: Vec::new(),
            closed: false,
        };
        store.dimensions = store.load_dimensions()?;
        Ok(store)
    }

    pub fn metadata(&self) -> &ZarrMetadata {
        &self.metadata
    }

    /// Load metadata from the store, attempting consolidated read first
    fn load_metadata(path: &Path) -> Result<ZarrMetadata> {
        match Self::load_consolidated_metadata(path) {
            Ok(metadata) => {
                debug!("loaded consolidated metadata from {}", path.display());
                Ok(metadata)
            }
            Err(e) => {
                debug!("consolidated metadata not usable ({:#}), scanning hierarchy", e);
                Self::load_hierarchical_metadata(path)
            }
        }
    }

    /// Attempt to load consolidated metadata from .zmetadata file
    fn load_consolidated_metadata(path: &Path) -> Result<ZarrMetadata> {
        let zmetadata_path = path.join(".zmetadata");

        let data = fs::read(&zmetadata_path).with_context(|| {
            format!(
                "No consolidated metadata found at '{}'",
                zmetadata_path.display()
            )
        })?;

        let consolidated: ConsolidatedMetadata = serde_json::from_slice(&data).with_context(|| {
            format!(
                "Invalid consolidated metadata JSON format at '{}'. The file exists but contains malformed JSON.",
                zmetadata_path.display()
            )
        })?;

        let mut metadata = ZarrMetadata::new();
        for (key, value) in &consolidated.metadata {
            if key == ".zattrs" {
                metadata.global_attributes = serde_json::from_value(value.clone()).unwrap_or_default();
            } else if let Some(array_path) = key.strip_suffix("/.zarray") {
                let zarray: ZArrayMetadata = serde_json::from_value(value.clone())
                    .with_context(|| format!("Failed to parse .zarray for {}", array_path))?;

                let attributes = consolidated
                    .metadata
                    .get(&format!("{}/.zattrs", array_path))
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();

                metadata.arrays.insert(
                    array_path.to_string(),
                    array_from_zarray(array_path, zarray, attributes),
                );
            }
        }

        metadata.infer_dimensions();
        Ok(metadata)
    }

    /// Load metadata by scanning the directory tree for .zarray/.zattrs files
    fn load_hierarchical_metadata(path: &Path) -> Result<ZarrMetadata> {
        let mut metadata = ZarrMetadata::new();
        Self::scan_directory(&mut metadata, "", path)?;

        if metadata.arrays.is_empty() {
            return Err(anyhow!(
                "No Zarr arrays found in '{}'. The directory must contain .zarray or .zmetadata files to be a valid Zarr store.",
                path.display()
            ));
        }

        metadata.global_attributes = read_attributes(&path.join(".zattrs"));
        metadata.infer_dimensions();
        Ok(metadata)
    }

    /// Recursively scan directory for Zarr array metadata files
    fn scan_directory(metadata: &mut ZarrMetadata, current_path: &str, fs_path: &Path) -> Result<()> {
        let entries = fs::read_dir(fs_path)
            .with_context(|| format!("Failed to read directory: {}", fs_path.display()))?;

        let mut children = Vec::new();
        for entry in entries.flatten() {
            let filename = entry.file_name().to_string_lossy().to_string();
            if !filename.starts_with('.') && entry.path().is_dir() {
                children.push(filename);
            }
        }
        children.sort();

        let zarray_path = fs_path.join(".zarray");
        if !current_path.is_empty() && zarray_path.exists() {
            let array_data = fs::read(&zarray_path).with_context(|| {
                format!("Failed to read .zarray for '{}' at '{}'", current_path, zarray_path.display())
            })?;

            let zarray: ZArrayMetadata = serde_json::from_slice(&array_data).with_context(|| {
                format!(
                    "Invalid .zarray JSON format for '{}' at '{}'. The file exists but contains malformed JSON.",
                    current_path,
                    zarray_path.display()
                )
            })?;

            let attributes = read_attributes(&fs_path.join(".zattrs"));
            metadata.arrays.insert(
                current_path.to_string(),
                array_from_zarray(current_path, zarray, attributes),
            );

            // Chunk directories ("0/0") below an array are not child nodes
            return Ok(());
        }

        for child in children {
            let child_path = if current_path.is_empty() {
                child.clone()
            } else {
                format!("{}/{}", current_path, child)
            };
            Self::scan_directory(metadata, &child_path, &fs_path.join(&child))?;
        }

        Ok(())
    }

    /// Build engine dimensions, reading coordinate arrays where they exist
    fn load_dimensions(&self) -> Result<Vec<Dimension>> {
        let mut names: Vec<&String> = self.metadata.dimensions.keys().collect();
        names.sort();

        let mut dimensions = Vec::with_capacity(names.len());
        for name in names {
            let length = self.metadata.dimensions[name].length as usize;

            let dimension = match self.metadata.coordinate_array(name) {
                Some(coord) if coord.shape[0] as usize == length => {
                    let values = self
                        .read_array_subset_f64(coord, &[0..coord.shape[0]])
                        .with_context(|| format!("Failed to read coordinate variable '{}'", coord.path))?;
                    Dimension {
                        name: name.clone(),
                        values,
                        attributes: public_attributes(&coord.attributes),
                        has_coordinate: true,
                    }
                }
                _ => Dimension {
                    name: name.clone(),
                    values: (0..length).map(|i| i as f64).collect(),
                    attributes: Attributes::new(),
                    has_coordinate: false,
                },
            };
            dimensions.push(dimension);
        }

        Ok(dimensions)
    }

    fn array(&self, name: &str) -> Result<&ZarrArray> {
        self.metadata.arrays.get(name).ok_or_else(|| {
            let mut keys: Vec<&String> = self.metadata.arrays.keys().collect();
            keys.sort();
            anyhow!(
                "Variable '{}' not found in store. Available variables: {}",
                name,
                keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
            )
        })
    }

    /// Read a rectangular subset of an array as f64, row-major
    pub fn read_array_subset_f64(&self, array: &ZarrArray, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        self.read_with_zarrs(array, ranges).or_else(|e| {
            debug!("zarrs could not read '{}' ({:#}), trying raw chunks", array.path, e);
            self.read_uncompressed_subset(array, ranges)
        })
    }

    /// Read through the zarrs crate, which handles codecs and chunk grids
    fn read_with_zarrs(&self, array: &ZarrArray, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        use zarrs::array::Array;
        use zarrs::array_subset::ArraySubset;
        use zarrs::storage::store::FilesystemStore;

        let store = FilesystemStore::new(&self.path)
            .map_err(|e| anyhow!("Failed to create zarrs FilesystemStore: {}", e))?;

        let array_path = format!("/{}", array.path);
        let zarr_array = Array::open(std::sync::Arc::new(store), &array_path)
            .map_err(|e| anyhow!("Failed to open array '{}': {}", array_path, e))?;

        let subset = ArraySubset::new_with_ranges(ranges);
        let array_bytes = zarr_array
            .retrieve_array_subset(&subset)
            .map_err(|e| anyhow!("Failed to read array data: {}", e))?;

        let bytes: &[u8] = match &array_bytes {
            zarrs::array::ArrayBytes::Variable(data, _offsets) => data.as_ref(),
            zarrs::array::ArrayBytes::Fixed(data) => data.as_ref(),
        };

        // zarrs hands back decoded elements in native (little-endian) order
        decode_elements::<LittleEndian>(bytes, dtype_kind(&array.dtype)?)
    }

    /// Read uncompressed, unfiltered C-order chunks straight from disk.
    ///
    /// Chunks that do not exist on disk read as the array's fill value.
    fn read_uncompressed_subset(&self, array: &ZarrArray, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        if let Some(compressor) = &array.compressor {
            bail!(
                "Variable '{}' uses compression ('{}'), which could not be handled by the zarrs crate.",
                array.path,
                compressor
            );
        }
        if !array.filters.is_empty() || array.order != "C" {
            bail!(
                "Variable '{}' uses filters or Fortran order, which raw chunk reading does not support.",
                array.path
            );
        }

        let shape: Vec<usize> = array.shape.iter().map(|&n| n as usize).collect();
        let chunks: Vec<usize> = array.chunks.iter().map(|&n| n as usize).collect();
        let start: Vec<usize> = ranges.iter().map(|r| r.start as usize).collect();
        let count: Vec<usize> = ranges.iter().map(|r| (r.end - r.start) as usize).collect();
        let n = check_window(&shape, &start, &count)?;
        if chunks.len() != shape.len() || chunks.contains(&0) {
            bail!("Variable '{}' has an invalid chunk shape {:?}", array.path, chunks);
        }

        let kind = dtype_kind(&array.dtype)?;
        let big_endian = array.dtype.starts_with('>');
        let out_strides = c_strides(&count);
        let chunk_strides = c_strides(&chunks);
        let mut out = vec![array.fill_f64(); n];

        let first_chunk: Vec<usize> = start.iter().zip(&chunks).map(|(s, c)| s / c).collect();
        let chunk_counts: Vec<usize> = start
            .iter()
            .zip(&count)
            .zip(&chunks)
            .zip(&first_chunk)
            .map(|(((s, n), c), first)| (s + n - 1) / c - first + 1)
            .collect();

        for offset in RowMajor::new(&chunk_counts) {
            let chunk_index: Vec<usize> = offset.iter().zip(&first_chunk).map(|(o, f)| o + f).collect();
            let values = match self.read_chunk(array, &chunk_index) {
                Ok(bytes) => {
                    if big_endian {
                        decode_elements::<BigEndian>(&bytes, kind)?
                    } else {
                        decode_elements::<LittleEndian>(&bytes, kind)?
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to read chunk {:?} of '{}'", chunk_index, array.path)
                    });
                }
            };

            // Intersection of this chunk with the requested window
            let origin: Vec<usize> = chunk_index.iter().zip(&chunks).map(|(i, c)| i * c).collect();
            let lo: Vec<usize> = origin.iter().zip(&start).map(|(o, s)| *o.max(s)).collect();
            let hi: Vec<usize> = origin
                .iter()
                .zip(&chunks)
                .zip(start.iter().zip(&count))
                .map(|((o, c), (s, n))| (o + c).min(s + n))
                .collect();
            let extent: Vec<usize> = lo.iter().zip(&hi).map(|(l, h)| h - l).collect();

            for local in RowMajor::new(&extent) {
                let mut src = 0;
                let mut dst = 0;
                for d in 0..local.len() {
                    let global = lo[d] + local[d];
                    src += (global - origin[d]) * chunk_strides[d];
                    dst += (global - start[d]) * out_strides[d];
                }
                let value = values.get(src).copied().ok_or_else(|| {
                    anyhow!("Chunk {:?} of '{}' is shorter than its chunk shape", chunk_index, array.path)
                })?;
                out[dst] = value;
            }
        }

        Ok(out)
    }

    fn read_chunk(&self, array: &ZarrArray, chunk_index: &[usize]) -> io::Result<Vec<u8>> {
        let key = if chunk_index.is_empty() {
            "0".to_string()
        } else {
            chunk_index
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(&array.dimension_separator)
        };

        let mut chunk_path = self.path.join(&array.path);
        for part in key.split('/') {
            chunk_path.push(part);
        }
        fs::read(chunk_path)
    }
}

impl Dataset for ZarrStore {
    fn dimensions(&self) -> Result<Vec<Dimension>> {
        Ok(self.dimensions.clone())
    }

    fn variables(&self) -> Result<Vec<Variable>> {
        let mut variables: Vec<Variable> = self
            .metadata
            .arrays
            .values()
            .map(|array| Variable {
                name: array.path.clone(),
                dimensions: array.dimensions.iter().map(|d| d.name.clone()).collect(),
                attributes: public_attributes(&array.attributes),
            })
            .collect();
        variables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(variables)
    }

    fn attributes(&self, target: AttributeTarget<'_>) -> Result<Attributes> {
        match target {
            AttributeTarget::Global => Ok(self.metadata.global_attributes.clone()),
            AttributeTarget::Variable(name) => Ok(public_attributes(&self.array(name)?.attributes)),
        }
    }

    fn read_hyperslab(&self, variable: &str, start: &[usize], count: &[usize]) -> Result<Vec<f64>> {
        if self.closed {
            bail!("store '{}' is closed", self.path.display());
        }

        let array = self.array(variable)?;
        let shape: Vec<usize> = array.shape.iter().map(|&n| n as usize).collect();
        check_window(&shape, start, count)
            .with_context(|| format!("Invalid window for variable '{}'", variable))?;

        let ranges: Vec<Range<u64>> = start
            .iter()
            .zip(count)
            .map(|(&s, &c)| s as u64..(s + c) as u64)
            .collect();
        self.read_array_subset_f64(array, &ranges)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        debug!("closed {}", self.path.display());
        Ok(())
    }
}

/// Opens Zarr stores for the multi-file merger
#[derive(Debug, Clone, Copy, Default)]
pub struct ZarrOpener;

impl DatasetOpener for ZarrOpener {
    type Dataset = ZarrStore;

    fn open(&self, path: &Path) -> Result<ZarrStore> {
        ZarrStore::open(path)
    }
}

fn array_from_zarray(path: &str, zarray: ZArrayMetadata, attributes: Attributes) -> ZarrArray {
    let name = path.split('/').next_back().unwrap_or(path).to_string();

    let compressor = zarray
        .compressor
        .as_ref()
        .and_then(|c| c.get("id"))
        .and_then(|id| id.as_str())
        .map(|s| s.to_string());

    let filters = zarray
        .filters
        .as_ref()
        .map(|f| {
            f.iter()
                .filter_map(|filter| filter.get("id").and_then(|id| id.as_str().map(|s| s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let fill_value = zarray
        .fill_value
        .as_ref()
        .map(|fv| serde_json::from_value(fv.clone()).unwrap_or(AttributeValue::Null));

    ZarrArray {
        name,
        path: path.to_string(),
        dtype: zarray.dtype,
        shape: zarray.shape,
        chunks: zarray.chunks,
        compressor,
        fill_value,
        order: zarray.order,
        filters,
        dimension_separator: zarray.dimension_separator.unwrap_or_else(|| ".".to_string()),
        attributes,
        dimensions: Vec::new(),
    }
}

/// Read an optional .zattrs file
fn read_attributes(path: &Path) -> Attributes {
    match fs::read(path) {
        Ok(data) => serde_json::from_slice(&data).unwrap_or_else(|e| {
            warn!("ignoring malformed attributes in '{}': {}", path.display(), e);
            Attributes::new()
        }),
        Err(_) => Attributes::new(),
    }
}

/// Attributes without the Zarr-internal dimension list
fn public_attributes(attributes: &Attributes) -> Attributes {
    attributes
        .iter()
        .filter(|(k, _)| k.as_str() != "_ARRAY_DIMENSIONS")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Strip the byte-order marker from a Zarr v2 dtype ("<f8" -> "f8")
fn dtype_kind(dtype: &str) -> Result<&str> {
    let kind = dtype.trim_start_matches(['<', '>', '|', '=']);
    match kind {
        "f8" | "f4" | "i8" | "i4" | "i2" | "i1" | "u8" | "u4" | "u2" | "u1" => Ok(kind),
        _ => Err(anyhow!("Unsupported dtype for numeric data: {}", dtype)),
    }
}

fn decode_elements<B: ByteOrder>(bytes: &[u8], kind: &str) -> Result<Vec<f64>> {
    let width = kind[1..]
        .parse::<usize>()
        .map_err(|_| anyhow!("Unsupported dtype kind: {}", kind))?;
    let n = bytes.len() / width;
    let mut reader = Cursor::new(bytes);
    let mut data = Vec::with_capacity(n);

    for _ in 0..n {
        let value = match kind {
            "f8" => reader.read_f64::<B>()?,
            "f4" => reader.read_f32::<B>()? as f64,
            "i8" => reader.read_i64::<B>()? as f64,
            "i4" => reader.read_i32::<B>()? as f64,
            "i2" => reader.read_i16::<B>()? as f64,
            "i1" => reader.read_i8()? as f64,
            "u8" => reader.read_u64::<B>()? as f64,
            "u4" => reader.read_u32::<B>()? as f64,
            "u2" => reader.read_u16::<B>()? as f64,
            "u1" => reader.read_u8()? as f64,
            other => bail!("Unsupported dtype kind: {}", other),
        };
        data.push(value);
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use tempfile::TempDir;

    fn write_array(root: &Path, name: &str, zarray: &str, zattrs: &str, chunks: &[(&str, Vec<f64>)]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(".zarray"), zarray).unwrap();
        fs::write(dir.join(".zattrs"), zattrs).unwrap();
        for (key, values) in chunks {
            let mut bytes = Vec::new();
            for v in values {
                bytes.write_f64::<LittleEndian>(*v).unwrap();
            }
            fs::write(dir.join(key), bytes).unwrap();
        }
    }

    #[test]
    fn test_dtype_kind() {
        assert_eq!(dtype_kind("<f8").unwrap(), "f8");
        assert_eq!(dtype_kind("|u1").unwrap(), "u1");
        assert!(dtype_kind("|S10").is_err());
    }

    #[test]
    fn test_decode_elements_both_orders() {
        let mut le = Vec::new();
        le.write_i16::<LittleEndian>(-3).unwrap();
        le.write_i16::<LittleEndian>(7).unwrap();
        assert_eq!(decode_elements::<LittleEndian>(&le, "i2").unwrap(), vec![-3.0, 7.0]);

        let mut be = Vec::new();
        be.write_f32::<BigEndian>(1.5).unwrap();
        assert_eq!(decode_elements::<BigEndian>(&be, "f4").unwrap(), vec![1.5]);
    }

    #[test]
    fn test_raw_chunk_subset_across_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(".zgroup"), r#"{"zarr_format": 2}"#).unwrap();

        // 4x4 array split into 2x2 chunks, values 0..16 row-major
        let zarray = r#"{"zarr_format": 2, "shape": [4, 4], "chunks": [2, 2], "dtype": "<f8",
            "compressor": null, "fill_value": -1.0, "order": "C", "filters": null}"#;
        let chunk = |r0: usize, c0: usize| -> Vec<f64> {
            let mut v = Vec::new();
            for r in r0..r0 + 2 {
                for c in c0..c0 + 2 {
                    v.push((r * 4 + c) as f64);
                }
            }
            v
        };
        write_array(
            root,
            "grid",
            zarray,
            r#"{"_ARRAY_DIMENSIONS": ["y", "x"]}"#,
            &[("0.0", chunk(0, 0)), ("0.1", chunk(0, 2)), ("1.0", chunk(2, 0))],
        );

        let store = ZarrStore::open(root).unwrap();
        let array = store.metadata().arrays["grid"].clone();

        let data = store.read_uncompressed_subset(&array, &[1..3, 1..4]).unwrap();
        // Chunk (1,1) is missing and reads as the fill value
        assert_eq!(data, vec![5.0, 6.0, 7.0, 9.0, 10.0, -1.0]);
    }

    #[test]
    fn test_open_reads_coordinates_and_attributes() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(".zgroup"), r#"{"zarr_format": 2}"#).unwrap();
        fs::write(root.join(".zattrs"), r#"{"title": "unit test"}"#).unwrap();

        let lon = r#"{"zarr_format": 2, "shape": [3], "chunks": [3], "dtype": "<f8",
            "compressor": null, "fill_value": null, "order": "C", "filters": null}"#;
        write_array(
            root,
            "lon",
            lon,
            r#"{"_ARRAY_DIMENSIONS": ["lon"], "units": "degrees_east"}"#,
            &[("0", vec![10.0, 20.0, 30.0])],
        );
        let temp = r#"{"zarr_format": 2, "shape": [3, 2], "chunks": [3, 2], "dtype": "<f8",
            "compressor": null, "fill_value": null, "order": "C", "filters": null}"#;
        write_array(
            root,
            "temp",
            temp,
            r#"{"_ARRAY_DIMENSIONS": ["lon", "band"], "units": "K"}"#,
            &[("0.0", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])],
        );

        let mut store = ZarrStore::open(root).unwrap();
        let dims = store.dimensions().unwrap();
        let lon = dims.iter().find(|d| d.name == "lon").unwrap();
        assert_eq!(lon.values, vec![10.0, 20.0, 30.0]);
        assert_eq!(lon.units(), Some("degrees_east"));

        let band = dims.iter().find(|d| d.name == "band").unwrap();
        assert!(!band.has_coordinate);
        assert_eq!(band.values, vec![0.0, 1.0]);

        let attrs = store.attributes(AttributeTarget::Variable("temp")).unwrap();
        assert!(!attrs.contains_key("_ARRAY_DIMENSIONS"));
        assert_eq!(
            store.attribute(AttributeTarget::Global, "title").unwrap(),
            Some(AttributeValue::from("unit test"))
        );

        assert_eq!(
            store.read_hyperslab("temp", &[1, 0], &[2, 1]).unwrap(),
            vec![3.0, 5.0]
        );

        store.close().unwrap();
        assert!(store.read_hyperslab("temp", &[0, 0], &[1, 1]).is_err());
    }

    #[test]
    fn test_open_rejects_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let err = ZarrStore::open(temp_dir.path()).err().unwrap();
        assert!(err.to_string().contains("No Zarr arrays found"));
    }
}
