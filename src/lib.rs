//! Tracer for the pickle stack-machine bytecode (protocols 0-2).
//!
//! Executing a pickle normally materializes Python objects; this crate
//! instead emulates the machine and reports what the stream *did*: the
//! final operand stack, the memo table, and a trace of every value an
//! explicit `pop`/`pop_mark` discarded. Values consumed while building
//! lists, dicts and tuples are absorbed into their containers and never
//! show up in that trace. A line-oriented assembler provides the inverse
//! transform for building test streams.

mod asm;
mod decode;
mod error;
mod machine;
pub mod opcodes;
mod report;
mod types;

pub use asm::assemble;
pub use decode::{Decoder, Instruction, Operand};
pub use error::{AsmError, DecodeError};
pub use machine::{trace_pickle, Machine, MachineSnapshot};
pub use report::{report_to_json, report_to_string};
pub use types::{PickleKind, PickleValue};

/// Execute a pickle byte stream and render the compact JSON report.
pub fn trace_to_json(data: &[u8]) -> Result<String, DecodeError> {
    let snap = machine::trace_pickle(data)?;
    report::report_to_string(&snap)
}
