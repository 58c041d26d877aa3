//! In-memory result tables.
//!
//! A [`ResultTable`] is an ordered list of typed columns plus rows whose
//! width always matches the column list. Rows can be viewed as ordered
//! records ([`Row`]) that serialize to JSON objects in column order.

use std::collections::HashMap;
use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Errors raised by table manipulation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TableError {
    #[error("Row has {found} values, table has {expected} columns")]
    RowWidth { expected: usize, found: usize },
    #[error("Missing column: {0}")]
    MissingColumn(String),
    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),
}

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell. Text is parsed, NaN is treated as absent.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Value::Int(v) => *v as f64,
            Value::Float(v) => *v,
            Value::Text(s) => s.trim().parse().ok()?,
            Value::Null | Value::Bool(_) => return None,
        };
        (!value.is_nan()).then_some(value)
    }

    /// Key used to compare identifiers across tables that may type them
    /// differently (e.g. `long` on one side, `char` on the other).
    pub fn join_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(v) => Some(v.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => {
                Some((*v as i64).to_string())
            }
            Value::Float(v) => Some(v.to_string()),
            Value::Text(s) => Some(s.trim().to_string()),
        }
    }

    /// Natural column type for this value.
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(DataType::Boolean),
            Value::Int(_) => Some(DataType::Long),
            Value::Float(_) => Some(DataType::Double),
            Value::Text(_) => Some(DataType::Char),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            Value::Float(_) => serializer.serialize_none(),
            Value::Text(v) => serializer.serialize_str(v),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Column storage types, named after their VOTable datatypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Boolean,
    Long,
    Double,
    Char,
}

impl DataType {
    pub fn votable_name(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Long => "long",
            DataType::Double => "double",
            DataType::Char => "char",
        }
    }

    /// Maps any VOTable datatype onto the storage type used for its values.
    pub fn from_votable(name: &str) -> Self {
        match name {
            "boolean" => DataType::Boolean,
            "bit" | "unsignedByte" | "short" | "int" | "long" => DataType::Long,
            "float" | "double" => DataType::Double,
            _ => DataType::Char,
        }
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
    /// Unit string as declared by the service, if any.
    pub unit: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Self {
            name: name.into(),
            datatype,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// One row as an ordered column-name to value record.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<(String, Value)>);

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Ordered columns and rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// Create an empty table with the given columns.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let mut seen = std::collections::HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at `row` in column `name`.
    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let index = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[index])
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Result<Vec<&Value>, TableError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))?;
        Ok(self.rows.iter().map(|r| &r[index]).collect())
    }

    /// Append a column; `values` must have one entry per row.
    pub fn append_column(&mut self, column: Column, values: Vec<Value>) -> Result<(), TableError> {
        if self.column_index(&column.name).is_some() {
            return Err(TableError::DuplicateColumn(column.name));
        }
        if values.len() != self.rows.len() {
            return Err(TableError::RowWidth {
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        self.columns.push(column);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// New table holding only `names`, in that order.
    pub fn select(&self, names: &[&str]) -> Result<ResultTable, TableError> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| TableError::MissingColumn(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut selected = ResultTable::new(
            indices.iter().map(|&i| self.columns[i].clone()).collect(),
        )?;
        selected.rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(selected)
    }

    /// Move the named columns to the front, in the given order. Names that
    /// are absent are skipped; all other columns keep their relative order.
    pub fn reorder_front(&mut self, leading: &[&str]) {
        let mut order: Vec<usize> = Vec::with_capacity(self.columns.len());
        for name in leading {
            if let Some(i) = self.column_index(name) {
                if !order.contains(&i) {
                    order.push(i);
                }
            }
        }
        for i in 0..self.columns.len() {
            if !order.contains(&i) {
                order.push(i);
            }
        }

        self.columns = order.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            *row = order.iter().map(|&i| row[i].clone()).collect();
        }
    }

    /// Left join `right` onto this table on `key`.
    ///
    /// Every left row is kept: once per matching right row, or once with
    /// null right-hand columns when nothing matches. Right-hand columns
    /// whose names collide with left columns get a `_2` suffix.
    pub fn left_join(&self, right: &ResultTable, key: &str) -> Result<ResultTable, TableError> {
        let left_key = self
            .column_index(key)
            .ok_or_else(|| TableError::MissingColumn(key.to_string()))?;
        let right_key = right
            .column_index(key)
            .ok_or_else(|| TableError::MissingColumn(key.to_string()))?;

        let right_indices: Vec<usize> = (0..right.columns.len()).filter(|&i| i != right_key).collect();

        let mut columns = self.columns.clone();
        for &i in &right_indices {
            let mut column = right.columns[i].clone();
            if self.column_index(&column.name).is_some() {
                column.name = format!("{}_2", column.name);
            }
            columns.push(column);
        }

        let mut matches: HashMap<String, Vec<usize>> = HashMap::new();
        for (row_index, row) in right.rows.iter().enumerate() {
            if let Some(k) = row[right_key].join_key() {
                matches.entry(k).or_default().push(row_index);
            }
        }

        let mut joined = ResultTable::new(columns)?;
        for row in &self.rows {
            let matched = row[left_key]
                .join_key()
                .and_then(|k| matches.get(&k))
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            if matched.is_empty() {
                let mut out = row.clone();
                out.extend(std::iter::repeat(Value::Null).take(right_indices.len()));
                joined.rows.push(out);
            } else {
                for &r in matched {
                    let mut out = row.clone();
                    out.extend(right_indices.iter().map(|&i| right.rows[r][i].clone()));
                    joined.rows.push(out);
                }
            }
        }
        Ok(joined)
    }

    /// Rows as ordered records.
    pub fn records(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|row| {
                Row(self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.name.clone(), v.clone()))
                    .collect())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultTable {
        let mut table = ResultTable::new(vec![
            Column::new("ra", DataType::Double).with_unit("deg"),
            Column::new("gaia_id", DataType::Long),
            Column::new("name", DataType::Char),
        ])
        .unwrap();
        table
            .push_row(vec![10.5.into(), 1_i64.into(), "a".into()])
            .unwrap();
        table
            .push_row(vec![20.0.into(), 2_i64.into(), Value::Null])
            .unwrap();
        table
    }

    #[test]
    fn test_push_row_rejects_wrong_width() {
        let mut table = sample();
        let err = table.push_row(vec![1.0.into()]).unwrap_err();
        assert_eq!(
            err,
            TableError::RowWidth {
                expected: 3,
                found: 1
            }
        );
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let result = ResultTable::new(vec![
            Column::new("a", DataType::Long),
            Column::new("a", DataType::Double),
        ]);
        assert_eq!(result.unwrap_err(), TableError::DuplicateColumn("a".into()));
    }

    #[test]
    fn test_reorder_front_keeps_relative_order() {
        let mut table = sample();
        table.reorder_front(&["gaia_id", "missing"]);
        assert_eq!(table.column_names(), vec!["gaia_id", "ra", "name"]);
        assert_eq!(table.rows()[0][0], Value::Int(1));
        assert_eq!(table.rows()[0][1], Value::Float(10.5));
    }

    #[test]
    fn test_left_join_keeps_unmatched_and_duplicates_multi_matches() {
        let left = sample();
        let mut right = ResultTable::new(vec![
            Column::new("simbad_id", DataType::Char),
            Column::new("gaia_id", DataType::Char),
            Column::new("name", DataType::Char),
        ])
        .unwrap();
        right
            .push_row(vec!["HD 1".into(), "1".into(), "x".into()])
            .unwrap();
        right
            .push_row(vec!["HD 1b".into(), "1".into(), "y".into()])
            .unwrap();

        let joined = left.left_join(&right, "gaia_id").unwrap();
        assert_eq!(
            joined.column_names(),
            vec!["ra", "gaia_id", "name", "simbad_id", "name_2"]
        );
        assert_eq!(joined.num_rows(), 3);
        assert_eq!(joined.value(0, "simbad_id"), Some(&Value::from("HD 1")));
        assert_eq!(joined.value(1, "simbad_id"), Some(&Value::from("HD 1b")));
        assert_eq!(joined.value(2, "gaia_id"), Some(&Value::Int(2)));
        assert_eq!(joined.value(2, "simbad_id"), Some(&Value::Null));
    }

    #[test]
    fn test_records_serialize_in_column_order() {
        let json = serde_json::to_string(&sample().records()[1]).unwrap();
        assert_eq!(json, r#"{"ra":20.0,"gaia_id":2,"name":null}"#);
    }

    #[test]
    fn test_value_numeric_views() {
        assert_eq!(Value::from(" 4.5 ").as_f64(), Some(4.5));
        assert_eq!(Value::Float(f64::NAN).as_f64(), None);
        assert_eq!(Value::Float(42.0).join_key(), Some("42".to_string()));
        assert_eq!(Value::Null.join_key(), None);
    }
}
