//! Named vectors backed by a dense matrix.
//!
//! A [`VectorContainer`] maps the field names of one model role (inputs,
//! states, outputs, events) to matrix rows. One column is a single
//! simulation; several columns are a batch of simulations stepped together.

use crate::error::{PmError, PmResult};
use nalgebra::DMatrix;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Add, Index, IndexMut};
use std::sync::Arc;

/// Ordered, unique field names with an index built once at construction.
#[derive(Debug, Clone)]
pub struct FieldSet {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

/// Shared handle to a field schema.
pub type Fields = Arc<FieldSet>;

impl FieldSet {
    /// Build a field set, rejecting duplicate names.
    pub fn new<I, S>(names: I) -> PmResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(PmError::DuplicateField {
                    field: name.clone(),
                });
            }
        }
        Ok(Self { names, index })
    }

    /// Build a shared field set.
    pub fn shared<I, S>(names: I) -> PmResult<Fields>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names).map(Arc::new)
    }

    /// Shared field set from names known at build time. Repeated names keep their first position.
    pub fn fixed(names: &[&str]) -> Fields {
        let mut unique: Vec<String> = Vec::with_capacity(names.len());
        let mut index = HashMap::with_capacity(names.len());
        for name in names {
            if !index.contains_key(*name) {
                index.insert(name.to_string(), unique.len());
                unique.push(name.to_string());
            }
        }
        Arc::new(Self {
            names: unique,
            index,
        })
    }

    /// Empty schema (e.g. a model without inputs).
    pub fn empty() -> Fields {
        Arc::new(Self {
            names: Vec::new(),
            index: HashMap::new(),
        })
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    fn joined(&self) -> String {
        self.names.join(", ")
    }
}

impl PartialEq for FieldSet {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

/// Value of one field: a scalar in scalar mode, a row in vectorized mode.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(f64),
    Row(Vec<f64>),
}

/// Named vector (or batch of vectors) backed by a `DMatrix`.
///
/// Rows follow the field order of the schema; cloning copies the matrix.
#[derive(Debug, Clone)]
pub struct VectorContainer {
    fields: Fields,
    matrix: DMatrix<f64>,
}

impl VectorContainer {
    /// All-zero container with `n_cols` instances.
    pub fn zeros(fields: &Fields, n_cols: usize) -> Self {
        Self {
            fields: Arc::clone(fields),
            matrix: DMatrix::zeros(fields.len(), n_cols),
        }
    }

    /// Scalar-mode container from values in field order.
    pub fn from_column(fields: &Fields, values: &[f64]) -> PmResult<Self> {
        if values.len() != fields.len() {
            return Err(PmError::ShapeMismatch {
                what: "column length",
                expected: fields.len(),
                actual: values.len(),
            });
        }
        Ok(Self {
            fields: Arc::clone(fields),
            matrix: DMatrix::from_column_slice(fields.len(), 1, values),
        })
    }

    /// Container from a raw matrix with one row per field.
    pub fn from_matrix(fields: &Fields, matrix: DMatrix<f64>) -> PmResult<Self> {
        if matrix.nrows() != fields.len() {
            return Err(PmError::ShapeMismatch {
                what: "matrix rows",
                expected: fields.len(),
                actual: matrix.nrows(),
            });
        }
        Ok(Self {
            fields: Arc::clone(fields),
            matrix,
        })
    }

    /// Scalar-mode container from a mapping.
    ///
    /// Fields missing from the mapping are NaN; names outside the schema are ignored.
    pub fn from_pairs<'a, I>(fields: &Fields, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut matrix = DMatrix::from_element(fields.len(), 1, f64::NAN);
        for (name, value) in pairs {
            if let Some(i) = fields.index_of(name) {
                matrix[(i, 0)] = value;
            }
        }
        Self {
            fields: Arc::clone(fields),
            matrix,
        }
    }

    /// Container from a JSON value.
    ///
    /// Accepts an object (field -> number, null, or array for vectorized rows),
    /// an array of numbers (one column in field order), or an array of arrays
    /// (one row per field).
    pub fn from_json(fields: &Fields, value: &serde_json::Value) -> PmResult<Self> {
        use serde_json::Value;

        match value {
            Value::Object(map) => {
                let mut rows: Vec<(usize, Vec<f64>)> = Vec::with_capacity(map.len());
                let mut n_cols = 1;
                for (name, v) in map {
                    let Some(i) = fields.index_of(name) else {
                        continue;
                    };
                    let row = json_row(v)?;
                    if row.len() > 1 {
                        n_cols = row.len();
                    }
                    rows.push((i, row));
                }
                let mut matrix = DMatrix::from_element(fields.len(), n_cols, f64::NAN);
                for (i, row) in rows {
                    match row.len() {
                        1 => matrix.row_mut(i).fill(row[0]),
                        n if n == n_cols => {
                            for (j, v) in row.into_iter().enumerate() {
                                matrix[(i, j)] = v;
                            }
                        }
                        n => {
                            return Err(PmError::ShapeMismatch {
                                what: "vectorized row length",
                                expected: n_cols,
                                actual: n,
                            });
                        }
                    }
                }
                Self::from_matrix(fields, matrix)
            }
            Value::Array(items) if items.iter().all(Value::is_array) => {
                let rows = items.iter().map(json_row).collect::<PmResult<Vec<_>>>()?;
                let n_cols = rows.first().map_or(1, Vec::len);
                if let Some(bad) = rows.iter().find(|r| r.len() != n_cols) {
                    return Err(PmError::ShapeMismatch {
                        what: "matrix row length",
                        expected: n_cols,
                        actual: bad.len(),
                    });
                }
                let flat: Vec<f64> = rows.into_iter().flatten().collect();
                Self::from_matrix(fields, DMatrix::from_row_slice(items.len(), n_cols, &flat))
            }
            Value::Array(_) => Self::from_column(fields, &json_row(value)?),
            other => Err(PmError::UnsupportedData {
                type_name: json_type_name(other).to_string(),
            }),
        }
    }

    /// Re-lay `other` onto `fields`, matching by name (missing fields are NaN).
    pub fn coerce(fields: &Fields, other: &VectorContainer) -> Self {
        if other.fields == *fields {
            return other.clone();
        }
        let n_cols = other.n_cols();
        let mut matrix = DMatrix::from_element(fields.len(), n_cols, f64::NAN);
        for (i, name) in fields.iter().enumerate() {
            if let Some(j) = other.fields.index_of(name) {
                matrix.set_row(i, &other.matrix.row(j));
            }
        }
        Self {
            fields: Arc::clone(fields),
            matrix,
        }
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn keys(&self) -> &[String] {
        self.fields.names()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of simulation instances held.
    pub fn n_cols(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn is_vectorized(&self) -> bool {
        self.matrix.ncols() > 1
    }

    pub fn is_finite(&self) -> bool {
        self.matrix.iter().all(|v| v.is_finite())
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn matrix_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.matrix
    }

    /// Field value: scalar in scalar mode, row in vectorized mode.
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        let i = self.fields.index_of(name)?;
        if self.is_vectorized() {
            Some(FieldValue::Row(self.matrix.row(i).iter().copied().collect()))
        } else {
            self.matrix.get((i, 0)).copied().map(FieldValue::Scalar)
        }
    }

    /// Value of a field in the first column.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        let i = self.fields.index_of(name)?;
        self.matrix.get((i, 0)).copied()
    }

    /// Set a field, broadcasting across all columns.
    pub fn set(&mut self, name: &str, value: f64) -> PmResult<()> {
        let i = self.require(name)?;
        self.matrix.row_mut(i).fill(value);
        Ok(())
    }

    /// Set a field row, one value per column.
    pub fn set_row(&mut self, name: &str, values: &[f64]) -> PmResult<()> {
        let i = self.require(name)?;
        if values.len() != self.n_cols() {
            return Err(PmError::ShapeMismatch {
                what: "row length",
                expected: self.n_cols(),
                actual: values.len(),
            });
        }
        for (j, v) in values.iter().enumerate() {
            self.matrix[(i, j)] = *v;
        }
        Ok(())
    }

    /// Column-0 values in field order.
    pub fn values(&self) -> Vec<f64> {
        if self.matrix.ncols() == 0 {
            return Vec::new();
        }
        self.matrix.column(0).iter().copied().collect()
    }

    /// `(field, value)` pairs of the first column.
    pub fn items(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.fields
            .iter()
            .enumerate()
            .map(move |(i, name)| (name, self.matrix.get((i, 0)).copied().unwrap_or(f64::NAN)))
    }

    /// Merge `other` by field name: shared fields are overwritten, unseen fields appended.
    pub fn update(&mut self, other: &VectorContainer) -> PmResult<()> {
        for (j, name) in other.fields.iter().enumerate() {
            let row: Vec<f64> = other.matrix.row(j).iter().copied().collect();
            let row = self.broadcast(row)?;
            match self.fields.index_of(name) {
                Some(i) => {
                    for (c, v) in row.into_iter().enumerate() {
                        self.matrix[(i, c)] = v;
                    }
                }
                None => self.push_row(name, &row)?,
            }
        }
        Ok(())
    }

    /// Append a new field with the same value in every column.
    pub fn insert(&mut self, name: &str, value: f64) -> PmResult<()> {
        if self.contains(name) {
            return Err(PmError::DuplicateField {
                field: name.to_string(),
            });
        }
        let row = vec![value; self.n_cols()];
        self.push_row(name, &row)
    }

    /// Remove a field and its row, returning the removed value(s).
    pub fn remove(&mut self, name: &str) -> PmResult<FieldValue> {
        let removed = self.get(name).ok_or_else(|| PmError::UnknownField {
            field: name.to_string(),
        })?;
        let i = self.require(name)?;
        let matrix = std::mem::replace(&mut self.matrix, DMatrix::zeros(0, 0));
        self.matrix = matrix.remove_row(i);
        self.fields = FieldSet::shared(self.fields.iter().filter(|n| *n != name))?;
        Ok(removed)
    }

    /// Linear combination `self + scale * other`; fields must match.
    pub fn add_scaled(&self, other: &VectorContainer, scale: f64) -> PmResult<Self> {
        if self.fields != other.fields {
            return Err(PmError::FieldMismatch {
                expected: self.fields.joined(),
                actual: other.fields.joined(),
            });
        }
        if self.matrix.shape() != other.matrix.shape() {
            return Err(PmError::ShapeMismatch {
                what: "container columns",
                expected: self.n_cols(),
                actual: other.n_cols(),
            });
        }
        Ok(Self {
            fields: Arc::clone(&self.fields),
            matrix: &self.matrix + &other.matrix * scale,
        })
    }

    fn require(&self, name: &str) -> PmResult<usize> {
        self.fields.index_of(name).ok_or_else(|| PmError::UnknownField {
            field: name.to_string(),
        })
    }

    fn broadcast(&self, row: Vec<f64>) -> PmResult<Vec<f64>> {
        let n = self.n_cols();
        match row.len() {
            len if len == n => Ok(row),
            1 => Ok(vec![row[0]; n]),
            len => Err(PmError::ShapeMismatch {
                what: "container columns",
                expected: n,
                actual: len,
            }),
        }
    }

    fn push_row(&mut self, name: &str, row: &[f64]) -> PmResult<()> {
        let fields = FieldSet::shared(self.fields.iter().chain(std::iter::once(name)))?;
        let n = self.matrix.nrows();
        let matrix = std::mem::replace(&mut self.matrix, DMatrix::zeros(0, 0));
        let mut matrix = matrix.insert_row(n, f64::NAN);
        for (c, v) in row.iter().enumerate() {
            matrix[(n, c)] = *v;
        }
        self.matrix = matrix;
        self.fields = fields;
        Ok(())
    }
}

fn json_row(value: &serde_json::Value) -> PmResult<Vec<f64>> {
    use serde_json::Value;

    match value {
        Value::Number(n) => Ok(vec![n.as_f64().unwrap_or(f64::NAN)]),
        Value::Null => Ok(vec![f64::NAN]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Number(n) => Ok(n.as_f64().unwrap_or(f64::NAN)),
                Value::Null => Ok(f64::NAN),
                other => Err(PmError::UnsupportedData {
                    type_name: json_type_name(other).to_string(),
                }),
            })
            .collect(),
        other => Err(PmError::UnsupportedData {
            type_name: json_type_name(other).to_string(),
        }),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Index<&str> for VectorContainer {
    type Output = f64;

    /// # Panics
    /// Panics if the field is unknown or the container has no columns.
    fn index(&self, name: &str) -> &f64 {
        match self.fields.index_of(name) {
            Some(i) => &self.matrix[(i, 0)],
            None => panic!("unknown field {name}"),
        }
    }
}

impl IndexMut<&str> for VectorContainer {
    fn index_mut(&mut self, name: &str) -> &mut f64 {
        match self.fields.index_of(name) {
            Some(i) => &mut self.matrix[(i, 0)],
            None => panic!("unknown field {name}"),
        }
    }
}

impl Add for &VectorContainer {
    type Output = VectorContainer;

    /// # Panics
    /// Panics if the two containers have different fields or shapes.
    fn add(self, rhs: &VectorContainer) -> VectorContainer {
        match self.add_scaled(rhs, 1.0) {
            Ok(sum) => sum,
            Err(e) => panic!("cannot add containers: {e}"),
        }
    }
}

impl PartialEq for VectorContainer {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields && self.matrix == other.matrix
    }
}

impl PartialEq<BTreeMap<String, f64>> for VectorContainer {
    fn eq(&self, other: &BTreeMap<String, f64>) -> bool {
        !self.is_vectorized()
            && self.len() == other.len()
            && self
                .items()
                .all(|(name, v)| other.get(name).is_some_and(|o| *o == v))
    }
}

impl PartialEq<HashMap<String, f64>> for VectorContainer {
    fn eq(&self, other: &HashMap<String, f64>) -> bool {
        !self.is_vectorized()
            && self.len() == other.len()
            && self
                .items()
                .all(|(name, v)| other.get(name).is_some_and(|o| *o == v))
    }
}

impl fmt::Display for VectorContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, name) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let row: Vec<f64> = self.matrix.row(i).iter().copied().collect();
            match row.as_slice() {
                [v] => write!(f, "{name}: {v}")?,
                _ => write!(f, "{name}: {row:?}")?,
            }
        }
        write!(f, "}}")
    }
}
