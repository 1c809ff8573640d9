use std::fmt;

/// Errors surfaced while decoding and executing a pickle stream.
///
/// All are fatal to the current run; the machine fails fast on the first
/// violation and reports the byte offset of the offending instruction.
#[derive(Debug, PartialEq)]
pub enum DecodeError {
    /// Truncated buffer, unrecognized opcode byte, or an operand that
    /// cannot be parsed.
    MalformedStream { offset: u64, reason: String },
    /// An opcode popped from an empty operand stack.
    StackUnderflow { offset: u64 },
    /// `pop_mark` (or a span-consuming opcode) without a pending `mark`.
    MarkStackEmpty { offset: u64 },
    /// The value on the stack is not the kind the opcode expects.
    TypeMismatch {
        offset: u64,
        expected: &'static str,
        found: &'static str,
    },
    /// `binget`/`get` referenced a memo slot that was never stored.
    UnknownMemoKey { offset: u64, key: u64 },
    /// Report serialization error.
    Json(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MalformedStream { offset, reason } => {
                write!(f, "malformed stream at offset {offset}: {reason}")
            }
            DecodeError::StackUnderflow { offset } => {
                write!(f, "stack underflow at offset {offset}")
            }
            DecodeError::MarkStackEmpty { offset } => {
                write!(f, "no mark pending at offset {offset}")
            }
            DecodeError::TypeMismatch {
                offset,
                expected,
                found,
            } => {
                write!(f, "type mismatch at offset {offset}: expected {expected}, found {found}")
            }
            DecodeError::UnknownMemoKey { offset, key } => {
                write!(f, "unknown memo key {key} at offset {offset}")
            }
            DecodeError::Json(msg) => write!(f, "JSON error: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Json(err.to_string())
    }
}

/// Errors from the assembler (mnemonic text → bytes). Both variants carry
/// the 1-based source line of the offending statement.
#[derive(Debug, PartialEq)]
pub enum AsmError {
    UnknownMnemonic { line: usize, mnemonic: String },
    OperandFormat { line: usize, reason: String },
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmError::UnknownMnemonic { line, mnemonic } => {
                write!(f, "unknown mnemonic '{mnemonic}' on line {line}")
            }
            AsmError::OperandFormat { line, reason } => {
                write!(f, "bad operand on line {line}: {reason}")
            }
        }
    }
}

impl std::error::Error for AsmError {}
