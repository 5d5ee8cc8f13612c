use thiserror::Error;

/// Errors converting raw strings/tokens into leaf types.
///
/// Derived using [`thiserror::Error`]; the higher-level `ascore::Error`
/// wraps this variant with `#[snafu(context(false))]` so callers see one
/// error enum regardless of which layer failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsingError {
    #[error("invalid access right: `{0}`")]
    InvalidAccessRight(String),
    #[error("invalid tri-state value: `{0}`")]
    InvalidTristate(String),
    #[error("{0}")]
    Custom(String),
}
