use thiserror::Error;

use super::lambda::Position;

pub type VmResult<T> = Result<T, VmError>;

/// Runtime failure raised by the interpreter, a callable or the stack.
///
/// Type mismatches, undefined calls and arithmetic faults are ordinary
/// runtime errors a host may catch. Bounds, label and stack-depth faults mean
/// the executing lambda is malformed; [`VmError::is_fatal`] reports those.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },

    #[error("call to undefined function")]
    UndefinedCall,

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("integer overflow in {op}")]
    IntegerOverflow { op: &'static str },

    #[error("label offset {offset} is outside program bounds 0..{len}")]
    LabelOutOfBounds { offset: isize, len: usize },

    #[error("labels belong to different programs")]
    LabelMismatch,

    #[error("label refers to a program that no longer exists")]
    DanglingLabel,

    #[error("{what} index {index} out of bounds (len {len})")]
    IndexOutOfBounds { what: &'static str, index: usize, len: usize },

    #[error("stack depth exceeded limit of {limit}")]
    StackOverflow { limit: usize },

    #[error("stack underflow")]
    StackUnderflow,

    #[error("call depth exceeded limit of {limit}")]
    CallDepthExceeded { limit: usize },

    #[error("malformed lambda: {0}")]
    MalformedLambda(String),

    #[error("execution interrupted")]
    Interrupted,

    #[error(transparent)]
    Native(#[from] anyhow::Error),

    /// Carries its inner error in the message rather than as a `source`, so
    /// error chains do not print it twice.
    #[error("{pos}: {inner}")]
    Located { pos: Position, inner: Box<VmError> },
}

impl VmError {
    pub fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        VmError::TypeMismatch { expected, found }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        VmError::MalformedLambda(message.into())
    }

    /// The underlying error with any position annotation stripped.
    pub fn kind(&self) -> &VmError {
        match self {
            VmError::Located { inner, .. } => inner.kind(),
            other => other,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            VmError::Located { pos, .. } => Some(pos),
            _ => None,
        }
    }

    /// Internal-consistency faults that abort the run rather than surface as
    /// a user-level runtime error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            VmError::LabelOutOfBounds { .. }
                | VmError::LabelMismatch
                | VmError::DanglingLabel
                | VmError::IndexOutOfBounds { .. }
                | VmError::StackOverflow { .. }
                | VmError::StackUnderflow
                | VmError::CallDepthExceeded { .. }
                | VmError::MalformedLambda(_)
        )
    }

    /// Attach a source position unless one is already attached or the
    /// position is unknown. The innermost call wins.
    pub fn located(self, pos: Position) -> Self {
        if matches!(self, VmError::Located { .. }) || !pos.is_known() {
            return self;
        }
        VmError::Located {
            pos,
            inner: Box::new(self),
        }
    }
}
