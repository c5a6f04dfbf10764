//! Model parameter mapping.
//!
//! Parameters are owned by a model instance and mutated in place during
//! fitting. Nested groups are addressed with dotted paths (`"x0.v"`).
//! A [`Parameters`] value is not synchronized; fitting one model from
//! several threads at once is not supported.

use crate::error::{PmError, PmResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(f64),
    Vector(Vec<f64>),
    Nested(Parameters),
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Scalar(v)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        ParamValue::Vector(v)
    }
}

impl From<Parameters> for ParamValue {
    fn from(v: Parameters) -> Self {
        ParamValue::Nested(v)
    }
}

/// Ordered mapping of parameter name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    values: BTreeMap<String, ParamValue>,
}

/// Frozen copy of a parameter mapping, restored with [`Parameters::restore`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSnapshot(Parameters);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// Insert or replace a top-level value.
    pub fn insert(&mut self, name: &str, value: impl Into<ParamValue>) -> Option<ParamValue> {
        self.values.insert(name.to_string(), value.into())
    }

    /// Look up a value by dotted path.
    pub fn get(&self, path: &str) -> Option<&ParamValue> {
        match path.split_once('.') {
            None => self.values.get(path),
            Some((head, rest)) => match self.values.get(head)? {
                ParamValue::Nested(inner) => inner.get(rest),
                _ => None,
            },
        }
    }

    fn get_mut(&mut self, path: &str) -> Option<&mut ParamValue> {
        match path.split_once('.') {
            None => self.values.get_mut(path),
            Some((head, rest)) => match self.values.get_mut(head)? {
                ParamValue::Nested(inner) => inner.get_mut(rest),
                _ => None,
            },
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Scalar value at `path`.
    pub fn scalar(&self, path: &str) -> PmResult<f64> {
        match self.get(path) {
            Some(ParamValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(PmError::NotScalar {
                name: path.to_string(),
            }),
            None => Err(PmError::UnknownParameter {
                name: path.to_string(),
            }),
        }
    }

    /// Overwrite an existing scalar. Unknown or non-scalar paths are left untouched.
    pub fn set_scalar(&mut self, path: &str, value: f64) -> PmResult<()> {
        match self.get_mut(path) {
            Some(ParamValue::Scalar(v)) => {
                *v = value;
                Ok(())
            }
            Some(_) => Err(PmError::NotScalar {
                name: path.to_string(),
            }),
            None => Err(PmError::UnknownParameter {
                name: path.to_string(),
            }),
        }
    }

    /// Top-level names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overlay every value of `other`, replacing whole entries.
    pub fn merge(&mut self, other: &Parameters) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot(self.clone())
    }

    pub fn restore(&mut self, snapshot: &ParamSnapshot) {
        *self = snapshot.0.clone();
    }
}

impl ParamSnapshot {
    pub fn parameters(&self) -> &Parameters {
        &self.0
    }
}
