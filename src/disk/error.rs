use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("line {line}: malformed {field} '{value}'")]
    MalformedSize {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: file '{file}' not found in any include path")]
    MissingFile { line: usize, file: String },

    #[error("requested image size {requested_kb}K is smaller than required {required_kb}K")]
    SizeMismatch { required_kb: u64, requested_kb: u64 },

    #[error("image size {requested_kb}K exceeds the largest supported image ({max_kb}K)")]
    ImageTooLarge { requested_kb: u64, max_kb: u64 },

    #[error("line {line}: {reason}")]
    InvalidSpec { line: usize, reason: String },
}

pub type PlanResult<T> = std::result::Result<T, PlanError>;
