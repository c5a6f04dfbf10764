//! Run data and nested-shape normalization.
//!
//! `times`, `inputs` and `outputs` arrive as [`Data`] trees of uniform depth:
//! a leaf level holds one run (numbers for times, sample containers for
//! inputs and outputs), and every level above it holds sequences of runs.
//! [`normalize`] walks the three trees together and flattens them into a
//! list of [`Run`]s before any numeric work begins. At each level the checks
//! run in order: type, equal length, then leaf detection driven by `times`.

use crate::error::{EstimateError, EstimateResult};
use pm_core::{Fields, PmResult, VectorContainer};
use pm_sim::{Series, SimError, SimulationResult};
use std::fmt;

/// Dynamic value for one of the `times`/`inputs`/`outputs` arguments.
#[derive(Clone, Debug, PartialEq)]
pub enum Data {
    Number(f64),
    Sample(VectorContainer),
    Seq(Vec<Data>),
    Text(String),
    Bool(bool),
    Null,
}

impl Data {
    pub fn type_name(&self) -> &'static str {
        match self {
            Data::Number(_) => "number",
            Data::Sample(_) => "sample container",
            Data::Seq(_) => "sequence",
            Data::Text(_) => "str",
            Data::Bool(_) => "bool",
            Data::Null => "null",
        }
    }

    /// Convert JSON, laying objects onto `fields`.
    pub fn from_json(value: &serde_json::Value, fields: &Fields) -> PmResult<Self> {
        use serde_json::Value;
        Ok(match value {
            Value::Null => Data::Null,
            Value::Bool(b) => Data::Bool(*b),
            Value::Number(n) => Data::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Data::Text(s.clone()),
            Value::Array(items) => Data::Seq(
                items
                    .iter()
                    .map(|v| Data::from_json(v, fields))
                    .collect::<PmResult<_>>()?,
            ),
            Value::Object(_) => Data::Sample(VectorContainer::from_json(fields, value)?),
        })
    }
}

impl From<f64> for Data {
    fn from(v: f64) -> Self {
        Data::Number(v)
    }
}

impl From<VectorContainer> for Data {
    fn from(v: VectorContainer) -> Self {
        Data::Sample(v)
    }
}

impl From<Vec<f64>> for Data {
    fn from(v: Vec<f64>) -> Self {
        Data::Seq(v.into_iter().map(Data::Number).collect())
    }
}

impl From<&[f64]> for Data {
    fn from(v: &[f64]) -> Self {
        Data::Seq(v.iter().copied().map(Data::Number).collect())
    }
}

impl From<Vec<VectorContainer>> for Data {
    fn from(v: Vec<VectorContainer>) -> Self {
        Data::Seq(v.into_iter().map(Data::Sample).collect())
    }
}

impl From<&[VectorContainer]> for Data {
    fn from(v: &[VectorContainer]) -> Self {
        Data::Seq(v.iter().cloned().map(Data::Sample).collect())
    }
}

impl From<Vec<Data>> for Data {
    fn from(v: Vec<Data>) -> Self {
        Data::Seq(v)
    }
}

impl From<Vec<Vec<f64>>> for Data {
    fn from(v: Vec<Vec<f64>>) -> Self {
        Data::Seq(v.into_iter().map(Data::from).collect())
    }
}

impl From<Vec<Vec<VectorContainer>>> for Data {
    fn from(v: Vec<Vec<VectorContainer>>) -> Self {
        Data::Seq(v.into_iter().map(Data::from).collect())
    }
}

impl TryFrom<&Series> for Data {
    type Error = SimError;

    /// Materializes lazy series.
    fn try_from(series: &Series) -> Result<Self, Self::Error> {
        Ok(Data::from(series.to_vec()?))
    }
}

/// Index path into a nested run structure. Empty at the top level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataLocation(Vec<usize>);

impl DataLocation {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    fn child(&self, i: usize) -> Self {
        let mut path = self.0.clone();
        path.push(i);
        Self(path)
    }

    /// `" at data location (i, j)"`, or nothing at the top level.
    pub fn suffix(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!(" at data location {self}")
        }
    }
}

impl From<Vec<usize>> for DataLocation {
    fn from(v: Vec<usize>) -> Self {
        Self(v)
    }
}

impl fmt::Display for DataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (k, i) in self.0.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{i}")?;
        }
        write!(f, ")")
    }
}

/// One observed trajectory, as submitted by the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct RunData {
    pub times: Data,
    pub inputs: Data,
    pub outputs: Data,
}

impl RunData {
    pub fn new(times: impl Into<Data>, inputs: impl Into<Data>, outputs: impl Into<Data>) -> Self {
        Self {
            times: times.into(),
            inputs: inputs.into(),
            outputs: outputs.into(),
        }
    }

    /// Times, inputs and outputs of a simulation.
    pub fn from_result(result: &SimulationResult) -> EstimateResult<Self> {
        Ok(Self {
            times: Data::from(result.times()),
            inputs: Data::try_from(result.inputs())?,
            outputs: Data::try_from(result.outputs())?,
        })
    }

    pub fn normalize(&self) -> EstimateResult<Vec<Run>> {
        normalize(&self.times, &self.inputs, &self.outputs)
    }
}

/// One flattened leaf run.
#[derive(Clone, Debug, PartialEq)]
pub struct Run {
    pub times: Vec<f64>,
    pub inputs: Vec<VectorContainer>,
    pub outputs: Vec<VectorContainer>,
    pub location: DataLocation,
}

impl Run {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn duration(&self) -> (f64, f64) {
        let t0 = self.times.first().copied().unwrap_or(0.0);
        let t_end = self.times.last().copied().unwrap_or(t0);
        (t0, t_end)
    }
}

/// Flatten nested `times`/`inputs`/`outputs` into leaf runs.
pub fn normalize(times: &Data, inputs: &Data, outputs: &Data) -> EstimateResult<Vec<Run>> {
    let mut runs = Vec::new();
    walk(times, inputs, outputs, &DataLocation::root(), &mut runs)?;
    Ok(runs)
}

fn as_seq<'a>(
    d: &'a Data,
    arg: &'static str,
    location: &DataLocation,
) -> EstimateResult<&'a [Data]> {
    match d {
        Data::Seq(items) => Ok(items),
        other => Err(EstimateError::DataType {
            arg,
            expected: "a sequence",
            type_name: other.type_name(),
            location: location.clone(),
        }),
    }
}

fn walk(
    times: &Data,
    inputs: &Data,
    outputs: &Data,
    location: &DataLocation,
    runs: &mut Vec<Run>,
) -> EstimateResult<()> {
    let ts = as_seq(times, "times", location)?;
    let us = as_seq(inputs, "inputs", location)?;
    let zs = as_seq(outputs, "outputs", location)?;

    if ts.len() != us.len() || ts.len() != zs.len() {
        return Err(EstimateError::LengthMismatch {
            times: ts.len(),
            inputs: us.len(),
            outputs: zs.len(),
            location: location.clone(),
        });
    }

    let is_leaf = !matches!(ts.first(), Some(Data::Seq(_)));
    if is_leaf {
        return leaf(ts, us, zs, location, runs);
    }

    for (i, ((t, u), z)) in ts.iter().zip(us).zip(zs).enumerate() {
        let here = location.child(i);
        for (d, arg) in [(t, "times"), (u, "inputs"), (z, "outputs")] {
            match d {
                Data::Seq(_) => {}
                Data::Number(_) | Data::Sample(_) => {
                    return Err(EstimateError::Ragged { location: here });
                }
                other => {
                    return Err(EstimateError::DataType {
                        arg,
                        expected: "a sequence",
                        type_name: other.type_name(),
                        location: here,
                    });
                }
            }
        }
        walk(t, u, z, &here, runs)?;
    }
    Ok(())
}

fn leaf(
    ts: &[Data],
    us: &[Data],
    zs: &[Data],
    location: &DataLocation,
    runs: &mut Vec<Run>,
) -> EstimateResult<()> {
    if ts.len() < 2 {
        return Err(EstimateError::MinPoints {
            location: location.clone(),
        });
    }

    let mut run = Run {
        times: Vec::with_capacity(ts.len()),
        inputs: Vec::with_capacity(ts.len()),
        outputs: Vec::with_capacity(ts.len()),
        location: location.clone(),
    };
    for (i, ((t, u), z)) in ts.iter().zip(us).zip(zs).enumerate() {
        let here = location.child(i);
        match t {
            Data::Number(v) => run.times.push(*v),
            other => return Err(element_error(other, "times", "a number", here)),
        }
        run.inputs.push(sample(u, "inputs", &here)?);
        run.outputs.push(sample(z, "outputs", &here)?);
    }
    runs.push(run);
    Ok(())
}

fn sample(d: &Data, arg: &'static str, here: &DataLocation) -> EstimateResult<VectorContainer> {
    match d {
        Data::Sample(v) => Ok(v.clone()),
        other => Err(element_error(other, arg, "a sample container", here.clone())),
    }
}

/// Sequences inside a leaf mean the trees are nested unevenly.
fn element_error(
    d: &Data,
    arg: &'static str,
    expected: &'static str,
    location: DataLocation,
) -> EstimateError {
    match d {
        Data::Seq(_) => EstimateError::Ragged { location },
        other => EstimateError::DataType {
            arg,
            expected,
            type_name: other.type_name(),
            location,
        },
    }
}
