use crate::value::Value;
use thiserror::Error;

/// Failures that surface as text inside the rendered output.
///
/// The `Display` form of each variant is the exact text written into the
/// output, so downstream snapshots can rely on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InlineError {
    #[error("[Error: unknown {0}()]")]
    UnknownFunction(String),

    #[error("[Error: {name}() needs {needed} args]")]
    TooFewArgs { name: String, needed: usize },

    #[error("[Error: use #each for arrays]")]
    ArrayInterpolation,

    #[error("[Error: cannot render object]")]
    ObjectInterpolation,

    #[error("[Error: #each needs array]")]
    EachNeedsArray,

    #[error("[Error: #each missing 'as']")]
    EachMissingAs,

    #[error("[Error: unknown block #{0}]")]
    UnknownBlock(String),

    #[error("[Error: nesting too deep]")]
    TooDeep,

    #[error("[Error: template too large]")]
    TemplateTooLarge,
}

impl From<InlineError> for Value {
    fn from(err: InlineError) -> Self {
        Value::String(err.to_string())
    }
}

/// Rejected function registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid function name {0:?}: expected letters, digits or '_'")]
    InvalidName(String),
}

/// Failure to load render data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("invalid JSON data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("render data must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
