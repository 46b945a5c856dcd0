use thiserror::Error;

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown {kind} '{value}' (expected one of: {expected})")]
    UnknownValue {
        kind: &'static str,
        value: String,
        expected: String,
    },

    #[error("search query must not be empty")]
    EmptyQuery,

    #[error("{0} must be at least 1")]
    NonPositive(&'static str),
}

impl ProtocolError {
    pub(crate) fn unknown(kind: &'static str, value: &str, expected: &[&str]) -> Self {
        Self::UnknownValue {
            kind,
            value: value.to_string(),
            expected: expected.join(", "),
        }
    }
}
