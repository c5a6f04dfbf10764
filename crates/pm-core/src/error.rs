use thiserror::Error;

pub type PmResult<T> = Result<T, PmError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PmError {
    #[error("Duplicate field name: {field}")]
    DuplicateField { field: String },

    #[error("Unknown field: {field}")]
    UnknownField { field: String },

    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Field mismatch: expected [{expected}], got [{actual}]")]
    FieldMismatch { expected: String, actual: String },

    #[error("Data must be a mapping or matrix, not {type_name}")]
    UnsupportedData { type_name: String },

    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("Parameter {name} is not a scalar")]
    NotScalar { name: String },
}
