use std::fmt;

/// What class of fatal condition aborted execution.
///
/// None of these are recoverable from within the executing program; the
/// distinction exists for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmErrorKind {
    /// Failed cast, null dereference, out-of-bounds access, unresolved
    /// dispatch target, native lookup/arity failure, stale reference.
    Verify,
    /// Call-depth recursion limit exceeded.
    Resource,
    /// Corrupt or invalid module: unknown opcode, malformed instruction,
    /// bad pool index, operand-stack misuse.
    Program,
}

/// The single abort outcome of the virtual machine.
///
/// Rendered as `message (in function: line N)`; the line is -1 until the
/// first `new_line` instruction of the frame executes.
#[derive(Debug)]
pub struct VmError {
    pub kind: VmErrorKind,
    pub message: String,
    pub function: Option<String>,
    pub line: Option<i32>,
}

impl VmError {
    /// An error with no frame context (raised outside any frame, or where
    /// the original diagnostic carried none).
    pub fn bare(kind: VmErrorKind, message: impl Into<String>) -> Self {
        VmError {
            kind,
            message: message.into(),
            function: None,
            line: None,
        }
    }

    pub fn in_frame(
        kind: VmErrorKind,
        message: impl Into<String>,
        function: impl Into<String>,
        line: i32,
    ) -> Self {
        VmError {
            kind,
            message: message.into(),
            function: Some(function.into()),
            line: Some(line),
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        match (&self.function, self.line) {
            (Some(function), Some(line)) => write!(f, " (in {}: line {})", function, line),
            (Some(function), None) => write!(f, " (in {})", function),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for VmError {}
