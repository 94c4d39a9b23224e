//! In-memory tabular result: ordered column names plus rows of equal width.

use crate::error::{QueryError, Result};
use crate::value::{Field, Value};
use serde_json::{Map, Value as Json};

pub type Row = Vec<Value>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    schema: Vec<Field>,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl ResultSet {
    /// Build from a schema and rows. Every row must be exactly as wide as the schema.
    pub fn new(schema: Vec<Field>, rows: Vec<Row>) -> Result<Self> {
        let width = schema.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(QueryError::transport(format!(
                "row {i} has {} values but the schema has {width} columns",
                row.len()
            )));
        }
        let columns = schema.iter().map(|f| f.name.clone()).collect();
        Ok(Self { schema, columns, rows })
    }

    pub fn columns(&self) -> &[String] { &self.columns }
    pub fn schema(&self) -> &[Field] { &self.schema }
    pub fn rows(&self) -> &[Row] { &self.rows }
    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }
    pub fn width(&self) -> usize { self.columns.len() }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, top to bottom.
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// One JSON object per row, keyed by column name.
    pub fn records(&self) -> impl Iterator<Item = Json> + '_ {
        self.rows.iter().map(move |row| {
            let mut obj = Map::with_capacity(self.columns.len());
            for (c, v) in self.columns.iter().zip(row) {
                obj.insert(c.clone(), v.to_json());
            }
            Json::Object(obj)
        })
    }

    /// Hand off `(rows, columns)` to a consumer.
    pub fn into_parts(self) -> (Vec<Row>, Vec<String>) {
        (self.rows, self.columns)
    }
}
