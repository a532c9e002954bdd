use thiserror::Error;

use crate::types::PrimitiveType;

pub type Result<T> = std::result::Result<T, EvalError>;

/// Every failure the evaluator can report. Nothing is retried; the first error
/// aborts the whole evaluation, including any nested subcomputations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A well-formed opcode / element type pairing the evaluator does not handle.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
    /// A runtime contract violation (mismatched shapes, bad predicates, loop limits).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The caller asked for something that can't be evaluated in isolation.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),
    /// A state the graph builder should have made unreachable.
    #[error("Internal: {0}")]
    Internal(String),
}

impl EvalError {
    pub fn unhandled_type(ty: PrimitiveType) -> Self {
        EvalError::Unimplemented(format!("unhandled primitive type: {ty}"))
    }

    pub fn unsupported_type(op_name: &str, instruction: &str, ty: PrimitiveType) -> Self {
        EvalError::Unimplemented(format!(
            "{op_name}: unsupported element type {ty} (instruction {instruction})"
        ))
    }

    pub fn is_unimplemented(&self) -> bool {
        matches!(self, EvalError::Unimplemented(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, EvalError::InvalidArgument(_))
    }

    pub fn is_failed_precondition(&self) -> bool {
        matches!(self, EvalError::FailedPrecondition(_))
    }

    pub fn message(&self) -> &str {
        match self {
            EvalError::Unimplemented(m)
            | EvalError::InvalidArgument(m)
            | EvalError::FailedPrecondition(m)
            | EvalError::Internal(m) => m,
        }
    }
}

/// Bail out with an invalid argument error.
#[macro_export]
macro_rules! invalid_argument {
    ($($arg:tt)*) => {
        return Err($crate::error::EvalError::InvalidArgument(format!($($arg)*)))
    };
}

/// Bail out with an unimplemented error.
#[macro_export]
macro_rules! unimplemented_err {
    ($($arg:tt)*) => {
        return Err($crate::error::EvalError::Unimplemented(format!($($arg)*)))
    };
}
