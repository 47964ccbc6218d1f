//! Column-oriented result tables.

use crate::metadata::Attributes;
use arrow_array::{ArrayRef, RecordBatch, RecordBatchOptions, StringArray};
use arrow_csv::WriterBuilder;
use arrow_schema::{ArrowError, DataType, Field, Schema};
use chrono::{NaiveDate, NaiveDateTime};
use log::warn;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// One cell of a result table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
    #[serde(serialize_with = "serialize_date")]
    Date(NaiveDate),
    #[serde(serialize_with = "serialize_datetime")]
    DateTime(NaiveDateTime),
}

fn serialize_date<S: serde::Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&date.format("%Y-%m-%d"))
}

fn serialize_datetime<S: serde::Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&dt.format("%Y-%m-%d %H:%M:%S"))
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// A named column with column-level annotations
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
    pub attributes: Attributes,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
            attributes: Attributes::new(),
        }
    }

    /// A column repeating one value
    pub fn constant(name: impl Into<String>, value: Value, rows: usize) -> Self {
        Self::new(name, vec![value; rows])
    }

    pub fn numbers(&self) -> Vec<Option<f64>> {
        self.values.iter().map(Value::as_f64).collect()
    }
}

/// Rows of extracted values, stored by column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    /// Table-level annotations (global dataset attributes)
    pub attributes: Attributes,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Append a column, replacing any column with the same name
    pub fn push_column(&mut self, column: Column) {
        debug_assert!(
            self.columns.is_empty() || column.values.len() == self.num_rows(),
            "column '{}' has {} rows, table has {}",
            column.name,
            column.values.len(),
            self.num_rows()
        );
        match self.columns.iter().position(|c| c.name == column.name) {
            Some(i) => self.columns[i] = column,
            None => self.columns.push(column),
        }
    }

    /// Append a generated column without touching existing data.
    ///
    /// If the name is taken the column gets the first free `<name>_<n>`
    /// instead. Returns the name actually used.
    pub fn push_derived(&mut self, mut column: Column) -> String {
        column.name = self.free_name(&column.name);
        let name = column.name.clone();
        self.push_column(column);
        name
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let i = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(i))
    }

    /// Insert a constant column in front of all others, renamed like
    /// [`Table::push_derived`] when `name` is taken.
    pub fn prepend_column(&mut self, name: &str, value: Value) -> String {
        let rows = self.num_rows();
        let name = self.free_name(name);
        self.columns.insert(0, Column::constant(name.as_str(), value, rows));
        name
    }

    fn free_name(&self, name: &str) -> String {
        if self.column(name).is_none() {
            return name.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", name, n);
            if self.column(&candidate).is_none() {
                warn!("column '{}' already exists, writing '{}' instead", name, candidate);
                return candidate;
            }
            n += 1;
        }
    }

    pub fn row(&self, index: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[index]).collect()
    }

    /// Stack tables vertically over the union of their columns.
    ///
    /// Columns keep the order in which they are first seen; cells missing from
    /// a table are `Null`. Annotations come from the first table carrying them.
    pub fn vstack(tables: Vec<Table>) -> Table {
        let mut out = Table::new();
        let mut total = 0;

        for table in tables {
            let rows = table.num_rows();
            for (key, value) in table.attributes {
                out.attributes.entry(key).or_insert(value);
            }

            for column in &mut out.columns {
                if !table.columns.iter().any(|c| c.name == column.name) {
                    column.values.extend(std::iter::repeat_n(Value::Null, rows));
                }
            }

            for column in table.columns {
                match out.columns.iter_mut().find(|c| c.name == column.name) {
                    Some(existing) => {
                        existing.values.extend(column.values);
                        for (key, value) in column.attributes {
                            existing.attributes.entry(key).or_insert(value);
                        }
                    }
                    None => {
                        let mut values = vec![Value::Null; total];
                        values.extend(column.values);
                        out.columns.push(Column {
                            name: column.name,
                            values,
                            attributes: column.attributes,
                        });
                    }
                }
            }

            total += rows;
        }

        out
    }

    /// The table as one record batch of text columns.
    ///
    /// Cells hold the [`Value`] display form; `Null` becomes an arrow null.
    pub fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(c.name.as_str(), DataType::Utf8, true))
            .collect();
        let arrays: Vec<ArrayRef> = self
            .columns
            .iter()
            .map(|c| {
                let cells: StringArray = c
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Null => None,
                        v => Some(v.to_string()),
                    })
                    .collect();
                Arc::new(cells) as ArrayRef
            })
            .collect();

        let options = RecordBatchOptions::new().with_row_count(Some(self.num_rows()));
        RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)
    }

    /// Write the table as CSV with a header row
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ArrowError> {
        let batch = self.to_record_batch()?;
        let mut csv_writer = WriterBuilder::new().with_header(true).build(writer);
        csv_writer.write(&batch)
    }

    /// Records plus annotations as a JSON document
    pub fn to_json(&self) -> JsonValue {
        let rows: Vec<JsonValue> = (0..self.num_rows())
            .map(|i| {
                let record: Map<String, JsonValue> = self
                    .columns
                    .iter()
                    .map(|c| {
                        let value = serde_json::to_value(&c.values[i]).unwrap_or(JsonValue::Null);
                        (c.name.clone(), value)
                    })
                    .collect();
                JsonValue::Object(record)
            })
            .collect();

        let column_attributes: Map<String, JsonValue> = self
            .columns
            .iter()
            .filter(|c| !c.attributes.is_empty())
            .map(|c| {
                let attrs = serde_json::to_value(&c.attributes).unwrap_or(JsonValue::Null);
                (c.name.clone(), attrs)
            })
            .collect();

        json!({
            "columns": self.column_names(),
            "rows": rows,
            "attributes": self.attributes,
            "column_attributes": column_attributes,
        })
    }
}
