//! In-memory gridded datasets.

use crate::dataset::{
    AttributeTarget, Dataset, Dimension, RowMajor, Variable, c_strides, check_window,
};
use crate::metadata::{AttributeValue, Attributes};
use anyhow::{Result, anyhow, bail};

#[derive(Debug, Clone)]
struct MemoryVariable {
    variable: Variable,
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// A dataset held entirely in memory, with C-order data buffers.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    dimensions: Vec<Dimension>,
    variables: Vec<MemoryVariable>,
    global_attributes: Attributes,
    closed: bool,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dimension with coordinate values and coordinate attributes.
    pub fn with_dimension<I, K>(mut self, name: &str, values: Vec<f64>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, AttributeValue)>,
        K: Into<String>,
    {
        self.dimensions.push(Dimension {
            name: name.to_string(),
            values,
            attributes: attributes.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            has_coordinate: true,
        });
        self
    }

    /// Add a dimension that has no coordinate variable.
    pub fn with_bare_dimension(mut self, name: &str, len: usize) -> Self {
        self.dimensions.push(Dimension {
            name: name.to_string(),
            values: (0..len).map(|i| i as f64).collect(),
            attributes: Attributes::new(),
            has_coordinate: false,
        });
        self
    }

    /// Add a variable. `data` is row-major over `dims`.
    pub fn with_variable<I, K>(
        mut self,
        name: &str,
        dims: &[&str],
        data: Vec<f64>,
        attributes: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, AttributeValue)>,
        K: Into<String>,
    {
        let shape = dims
            .iter()
            .map(|d| {
                self.dimensions
                    .iter()
                    .find(|dim| dim.name == *d)
                    .map(Dimension::len)
                    .ok_or_else(|| anyhow!("variable '{}' uses unknown dimension '{}'", name, d))
            })
            .collect::<Result<Vec<usize>>>()?;

        let expected: usize = shape.iter().product();
        if data.len() != expected {
            bail!(
                "variable '{}' has {} values but its shape {:?} needs {}",
                name,
                data.len(),
                shape,
                expected
            );
        }

        self.variables.push(MemoryVariable {
            variable: Variable {
                name: name.to_string(),
                dimensions: dims.iter().map(|d| d.to_string()).collect(),
                attributes: attributes.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            },
            shape,
            data,
        });
        Ok(self)
    }

    pub fn with_global_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.global_attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn variable(&self, name: &str) -> Result<&MemoryVariable> {
        self.variables
            .iter()
            .find(|v| v.variable.name == name)
            .ok_or_else(|| anyhow!("variable '{}' not found", name))
    }
}

impl Dataset for MemoryDataset {
    fn dimensions(&self) -> Result<Vec<Dimension>> {
        Ok(self.dimensions.clone())
    }

    fn variables(&self) -> Result<Vec<Variable>> {
        Ok(self.variables.iter().map(|v| v.variable.clone()).collect())
    }

    fn attributes(&self, target: AttributeTarget<'_>) -> Result<Attributes> {
        match target {
            AttributeTarget::Global => Ok(self.global_attributes.clone()),
            AttributeTarget::Variable(name) => {
                if let Ok(var) = self.variable(name) {
                    return Ok(var.variable.attributes.clone());
                }
                self.dimensions
                    .iter()
                    .find(|d| d.name == name)
                    .map(|d| d.attributes.clone())
                    .ok_or_else(|| anyhow!("variable '{}' not found", name))
            }
        }
    }

    fn read_hyperslab(&self, variable: &str, start: &[usize], count: &[usize]) -> Result<Vec<f64>> {
        if self.closed {
            bail!("dataset is closed");
        }

        let var = self.variable(variable)?;
        let n = check_window(&var.shape, start, count)?;
        let strides = c_strides(&var.shape);

        let mut out = Vec::with_capacity(n);
        for idx in RowMajor::new(count) {
            let offset: usize = idx
                .iter()
                .zip(start)
                .zip(&strides)
                .map(|((i, s), stride)| (i + s) * stride)
                .sum();
            out.push(var.data[offset]);
        }
        Ok(out)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> MemoryDataset {
        MemoryDataset::new()
            .with_dimension("lon", vec![10.0, 20.0, 30.0], [("units", "degrees_east".into())])
            .with_dimension("lat", vec![40.0, 50.0], [("units", "degrees_north".into())])
            .with_variable(
                "temp",
                &["lon", "lat"],
                vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
                [("units", AttributeValue::from("K"))],
            )
            .unwrap()
    }

    #[test]
    fn test_hyperslab_is_row_major() {
        let ds = grid();
        assert_eq!(
            ds.read_hyperslab("temp", &[1, 0], &[1, 2]).unwrap(),
            vec![3.0, 4.0]
        );
        assert_eq!(
            ds.read_hyperslab("temp", &[0, 1], &[3, 1]).unwrap(),
            vec![2.0, 4.0, 6.0]
        );
    }

    #[test]
    fn test_bad_shapes_are_rejected() {
        let result = MemoryDataset::new()
            .with_dimension("x", vec![0.0, 1.0], Vec::<(String, AttributeValue)>::new())
            .with_variable("v", &["x"], vec![1.0], Vec::<(String, AttributeValue)>::new());
        assert!(result.is_err());

        let ds = grid();
        assert!(ds.read_hyperslab("temp", &[2, 0], &[2, 1]).is_err());
        assert!(ds.read_hyperslab("missing", &[0, 0], &[1, 1]).is_err());
    }

    #[test]
    fn test_attributes_for_coordinates_and_globals() {
        let ds = grid().with_global_attribute("title", "test grid");
        let lon = ds.attributes(AttributeTarget::Variable("lon")).unwrap();
        assert_eq!(lon["units"].as_str(), Some("degrees_east"));
        assert_eq!(
            ds.attribute(AttributeTarget::Global, "title").unwrap(),
            Some(AttributeValue::from("test grid"))
        );
    }

    #[test]
    fn test_closed_dataset_refuses_reads() {
        let mut ds = grid();
        ds.close().unwrap();
        assert!(ds.is_closed());
        assert!(ds.read_hyperslab("temp", &[0, 0], &[1, 1]).is_err());
    }
}
