use std::collections::BTreeMap;

use num_bigint::BigInt;
use tracing::{debug, trace};

use crate::decode::{Decoder, Instruction};
use crate::error::DecodeError;
use crate::opcodes::*;
use crate::types::{PickleKind, PickleValue};

const MAX_LONG_DIGITS: usize = 10_000;

/// Final observable state of one decode run: operand stack, pop-history
/// trace and memo table. Composites inside are shared handles, so the same
/// container may be reachable from all three fields.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineSnapshot {
    /// Operand stack, bottom first (the reporter renders it top first).
    pub stack: Vec<PickleValue>,
    /// Values removed by explicit discard opcodes, in machine order (the
    /// reporter renders most-recently-removed first).
    pub popstack: Vec<PickleValue>,
    /// Memo table; iteration is ascending by key.
    pub memo: BTreeMap<u64, PickleValue>,
}

/// Execute a pickle byte stream until `stop` or end of stream and return
/// the final machine state. Bytes after `stop` are not examined.
pub fn trace_pickle(data: &[u8]) -> Result<MachineSnapshot, DecodeError> {
    let mut decoder = Decoder::new(data);
    let mut machine = Machine::new();
    while let Some(ins) = decoder.next_instruction()? {
        trace!(
            offset = ins.offset,
            op = mnemonic(ins.op).unwrap_or("?"),
            "exec"
        );
        if !machine.exec(ins)? {
            break;
        }
    }
    Ok(machine.into_snapshot())
}

/// The pickle stack machine. One instance per decode run; no state
/// survives across runs.
pub struct Machine {
    stack: Vec<PickleValue>,
    /// Stack segments saved by `mark`; the live segment is `stack`.
    /// Restoring a segment is the index-free equivalent of popping a
    /// saved stack length.
    metastack: Vec<Vec<PickleValue>>,
    memo: BTreeMap<u64, PickleValue>,
    popstack: Vec<PickleValue>,
    proto: Option<u8>,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(16),
            metastack: Vec::with_capacity(4),
            memo: BTreeMap::new(),
            popstack: Vec::new(),
            proto: None,
        }
    }

    /// Protocol version announced by the first `proto`, if any. Advisory.
    pub fn proto(&self) -> Option<u8> {
        self.proto
    }

    pub fn into_snapshot(self) -> MachineSnapshot {
        MachineSnapshot {
            stack: self.stack,
            popstack: self.popstack,
            memo: self.memo,
        }
    }

    /// Apply one instruction. Returns `Ok(false)` once `stop` executes.
    pub fn exec(&mut self, ins: Instruction) -> Result<bool, DecodeError> {
        let Instruction { op, arg, offset } = ins;
        match op {
            STOP => return Ok(false),
            PROTO => {
                let ver = arg.uint(offset)?;
                if self.proto.is_none() {
                    self.proto = Some(ver as u8);
                }
            }
            FRAME => {} // prefetch hint only

            // -- Stack manipulation --
            MARK => {
                let old_stack = std::mem::take(&mut self.stack);
                self.metastack.push(old_stack);
            }
            POP => {
                let val = self.pop(offset)?;
                self.popstack.push(val);
            }
            POP_MARK => {
                let items = self.pop_mark(offset)?;
                self.popstack.extend(items);
            }
            DUP => {
                // shares the handle, not a deep copy
                let val = self.peek(offset)?.clone();
                self.stack.push(val);
            }

            // -- None, Bool --
            NONE => self.push(offset, PickleKind::None),
            NEWTRUE => self.push(offset, PickleKind::Bool(true)),
            NEWFALSE => self.push(offset, PickleKind::Bool(false)),

            // -- Integers --
            BININT | BININT1 | BININT2 => {
                let val = arg.int(offset)?;
                self.push(offset, PickleKind::Int(val));
            }
            INT => {
                let text = arg.into_text(offset)?;
                let s = text.trim();
                // INT can encode booleans too: "00" = False, "01" = True
                if s == "00" {
                    self.push(offset, PickleKind::Bool(false));
                } else if s == "01" {
                    self.push(offset, PickleKind::Bool(true));
                } else {
                    let val: i64 = s.parse().map_err(|e| DecodeError::MalformedStream {
                        offset,
                        reason: format!("int parse: {e}"),
                    })?;
                    self.push(offset, PickleKind::Int(val));
                }
            }
            LONG => {
                let text = arg.into_text(offset)?;
                let s = text.trim().trim_end_matches('L');
                if s.len() > MAX_LONG_DIGITS {
                    return Err(DecodeError::MalformedStream {
                        offset,
                        reason: "long value too large".to_string(),
                    });
                }
                let val: BigInt = s.parse().map_err(|e| DecodeError::MalformedStream {
                    offset,
                    reason: format!("long parse: {e}"),
                })?;
                self.push_big(offset, val);
            }
            LONG1 | LONG4 => {
                let val = arg.into_big(offset)?;
                self.push_big(offset, val);
            }

            // -- Floats --
            BINFLOAT => {
                let val = arg.float(offset)?;
                self.push(offset, PickleKind::Float(val));
            }
            FLOAT => {
                let text = arg.into_text(offset)?;
                let val: f64 = text.trim().parse().map_err(|e| DecodeError::MalformedStream {
                    offset,
                    reason: format!("float parse: {e}"),
                })?;
                self.push(offset, PickleKind::Float(val));
            }

            // -- Strings --
            STRING => {
                let text = arg.into_text(offset)?;
                let s = text.trim();
                // STRING values are repr'd: strip quotes
                let inner = if (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
                    || (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
                {
                    &s[1..s.len() - 1]
                } else {
                    s
                };
                self.push(offset, PickleKind::Str(inner.to_string()));
            }
            UNICODE | BINUNICODE | SHORT_BINUNICODE | BINSTRING | SHORT_BINSTRING => {
                let text = arg.into_text(offset)?;
                self.push(offset, PickleKind::Str(text));
            }

            // -- Lists --
            EMPTY_LIST => self.stack.push(PickleValue::new_list(offset, Vec::new())),
            LIST => {
                let items = self.pop_mark(offset)?;
                self.stack.push(PickleValue::new_list(offset, items));
            }
            APPEND => {
                let val = self.pop(offset)?;
                let items = self.top_list(offset)?;
                items.borrow_mut().push(val);
            }
            APPENDS => {
                let span = self.pop_mark(offset)?;
                let items = self.top_list(offset)?;
                items.borrow_mut().extend(span);
            }

            // -- Dicts --
            EMPTY_DICT => self.stack.push(PickleValue::new_dict(offset, Vec::new())),
            DICT => {
                let span = self.pop_mark(offset)?;
                let pairs = span_to_pairs(span, offset)?;
                self.stack.push(PickleValue::new_dict(offset, pairs));
            }
            SETITEM => {
                let val = self.pop(offset)?;
                let key = self.pop(offset)?;
                let pairs = self.top_dict(offset)?;
                pairs.borrow_mut().push((key, val));
            }
            SETITEMS => {
                let span = self.pop_mark(offset)?;
                let new_pairs = span_to_pairs(span, offset)?;
                let pairs = self.top_dict(offset)?;
                pairs.borrow_mut().extend(new_pairs);
            }

            // -- Tuples --
            EMPTY_TUPLE => self.stack.push(PickleValue::new_tuple(offset, Vec::new())),
            TUPLE => {
                let items = self.pop_mark(offset)?;
                self.stack.push(PickleValue::new_tuple(offset, items));
            }
            TUPLE1 => {
                let a = self.pop(offset)?;
                self.stack.push(PickleValue::new_tuple(offset, vec![a]));
            }
            TUPLE2 => {
                let b = self.pop(offset)?;
                let a = self.pop(offset)?;
                self.stack.push(PickleValue::new_tuple(offset, vec![a, b]));
            }
            TUPLE3 => {
                let c = self.pop(offset)?;
                let b = self.pop(offset)?;
                let a = self.pop(offset)?;
                self.stack
                    .push(PickleValue::new_tuple(offset, vec![a, b, c]));
            }

            // -- Memo --
            BINPUT | LONG_BINPUT => {
                let key = arg.uint(offset)?;
                self.memo_put(key, offset)?;
            }
            PUT => {
                let key = self.parse_memo_key(arg.into_text(offset)?, offset)?;
                self.memo_put(key, offset)?;
            }
            MEMOIZE => {
                let key = self.memo.len() as u64;
                self.memo_put(key, offset)?;
            }
            BINGET | LONG_BINGET => {
                let key = arg.uint(offset)?;
                self.memo_get(key, offset)?;
            }
            GET => {
                let key = self.parse_memo_key(arg.into_text(offset)?, offset)?;
                self.memo_get(key, offset)?;
            }

            _ => {
                // the decoder only emits table opcodes, so this is a
                // table/machine skew
                return Err(DecodeError::MalformedStream {
                    offset,
                    reason: format!("unhandled opcode 0x{op:02x}"),
                });
            }
        }
        Ok(true)
    }

    // -- Stack operations --

    fn push(&mut self, offset: u64, kind: PickleKind) {
        self.stack.push(PickleValue::new(offset, kind));
    }

    fn push_big(&mut self, offset: u64, val: BigInt) {
        match i64::try_from(&val) {
            Ok(v) => self.push(offset, PickleKind::Int(v)),
            Err(_) => self.push(offset, PickleKind::BigInt(val)),
        }
    }

    fn pop(&mut self, offset: u64) -> Result<PickleValue, DecodeError> {
        self.stack
            .pop()
            .ok_or(DecodeError::StackUnderflow { offset })
    }

    fn peek(&self, offset: u64) -> Result<&PickleValue, DecodeError> {
        self.stack
            .last()
            .ok_or(DecodeError::StackUnderflow { offset })
    }

    /// Pop everything above the last `mark`, in original bottom-to-top
    /// order, restoring the saved segment as the live stack.
    fn pop_mark(&mut self, offset: u64) -> Result<Vec<PickleValue>, DecodeError> {
        let prev = self
            .metastack
            .pop()
            .ok_or(DecodeError::MarkStackEmpty { offset })?;
        Ok(std::mem::replace(&mut self.stack, prev))
    }

    fn top_list(&mut self, offset: u64) -> Result<crate::types::SharedList, DecodeError> {
        let top = self.peek(offset)?;
        match &top.kind {
            PickleKind::List(items) => Ok(items.clone()),
            other => Err(DecodeError::TypeMismatch {
                offset,
                expected: "PY_LIST",
                found: other.type_name(),
            }),
        }
    }

    fn top_dict(&mut self, offset: u64) -> Result<crate::types::SharedDict, DecodeError> {
        let top = self.peek(offset)?;
        match &top.kind {
            PickleKind::Dict(pairs) => Ok(pairs.clone()),
            other => Err(DecodeError::TypeMismatch {
                offset,
                expected: "PY_DICT",
                found: other.type_name(),
            }),
        }
    }

    // -- Memo operations --

    fn parse_memo_key(&self, text: String, offset: u64) -> Result<u64, DecodeError> {
        text.trim()
            .parse()
            .map_err(|e| DecodeError::MalformedStream {
                offset,
                reason: format!("memo index parse: {e}"),
            })
    }

    /// Store the current stack top under `key`. The stored value is the
    /// same shared handle, not a copy; re-storing a key overwrites it
    /// (last write wins).
    fn memo_put(&mut self, key: u64, offset: u64) -> Result<(), DecodeError> {
        let val = self.peek(offset)?.clone();
        debug!(key, offset, "memo put");
        self.memo.insert(key, val);
        Ok(())
    }

    fn memo_get(&mut self, key: u64, offset: u64) -> Result<(), DecodeError> {
        let val = self
            .memo
            .get(&key)
            .cloned()
            .ok_or(DecodeError::UnknownMemoKey { offset, key })?;
        self.stack.push(val);
        Ok(())
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

/// Group a flat span [k1, v1, k2, v2, ...] into pairs, preserving the
/// original bottom-to-top order.
fn span_to_pairs(
    span: Vec<PickleValue>,
    offset: u64,
) -> Result<Vec<(PickleValue, PickleValue)>, DecodeError> {
    if span.len() % 2 != 0 {
        return Err(DecodeError::MalformedStream {
            offset,
            reason: "odd number of items for dict".to_string(),
        });
    }
    let mut pairs = Vec::with_capacity(span.len() / 2);
    let mut iter = span.into_iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        pairs.push((k, v));
    }
    Ok(pairs)
}
