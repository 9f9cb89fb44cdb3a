use std::fmt;

/// Errors raised while lowering a parsed program to bytecode.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// An AST node with no compilation rule (should not occur for a
    /// well-formed parse, but the compiler must handle `Error` nodes and
    /// stray `Block` statements without panicking).
    NotImplemented(&'static str),
    UnresolvedIdentifier(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::NotImplemented(node) => write!(f, "{} type not implemented.", node),
            CompileError::UnresolvedIdentifier(name) => write!(f, "Cannot resolve identifier {}", name),
        }
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while executing bytecode.
#[derive(Debug, Clone, PartialEq)]
pub enum VmError {
    ArityMismatch { want: usize, got: usize },
    NotCallable,
    ArithmeticTypeError,
    DivisionByZero,
    IndexTypeError,
    StackOverflow,
    /// A builtin returned its error as a string value; surfaced verbatim.
    Builtin(String),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::ArityMismatch { want, got } =>
                write!(f, "wrong number of args: want {}, got {}", want, got),
            VmError::NotCallable => write!(f, "Error attempting to call non-function"),
            VmError::ArithmeticTypeError => write!(f, "Cannot find arithmetic function for input types."),
            VmError::DivisionByZero => write!(f, "Division by zero"),
            VmError::IndexTypeError => write!(f, "Index operator not implemented for input types"),
            VmError::StackOverflow => write!(f, "Stack Overflow"),
            VmError::Builtin(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for VmError {}

pub type VmResult<T> = Result<T, VmError>;

/// Top-level error returned by `run()`, unifying the three failure phases.
#[derive(Debug, Clone, PartialEq)]
pub enum TamarinError {
    /// A lex or parse failure; carries the underlying message verbatim.
    Syntax(String),
    Compile(CompileError),
    Runtime(VmError),
}

impl fmt::Display for TamarinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TamarinError::Syntax(msg) => write!(f, "{}", msg),
            TamarinError::Compile(e) => write!(f, "{}", e),
            TamarinError::Runtime(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TamarinError {}

impl From<CompileError> for TamarinError {
    fn from(e: CompileError) -> Self {
        TamarinError::Compile(e)
    }
}

impl From<VmError> for TamarinError {
    fn from(e: VmError) -> Self {
        TamarinError::Runtime(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_message() {
        assert_eq!(
            VmError::ArityMismatch { want: 2, got: 1 }.to_string(),
            "wrong number of args: want 2, got 1"
        );
    }

    #[test]
    fn test_non_callable_message() {
        assert_eq!(VmError::NotCallable.to_string(), "Error attempting to call non-function");
    }

    #[test]
    fn test_unresolved_identifier_message() {
        assert_eq!(
            CompileError::UnresolvedIdentifier("foo".to_string()).to_string(),
            "Cannot resolve identifier foo"
        );
    }

    #[test]
    fn test_builtin_error_is_surfaced_verbatim() {
        assert_eq!(
            VmError::Builtin("wrong number of args: need 1".to_string()).to_string(),
            "wrong number of args: need 1"
        );
    }
}
