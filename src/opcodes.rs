/// Pickle protocol opcodes (protocols 0-2, plus the few later opcodes the
/// machine understands).
///
/// Reference: Python pickletools.py

// -- Protocol 0/1 (text-based, legacy) --
pub const MARK: u8 = b'('; // push special markobject on stack
pub const STOP: u8 = b'.'; // every pickle ends with STOP
pub const POP: u8 = b'0'; // discard topmost stack item
pub const POP_MARK: u8 = b'1'; // discard stack top through topmost markobject
pub const DUP: u8 = b'2'; // duplicate top stack item
pub const FLOAT: u8 = b'F'; // push float; decimal string argument
pub const INT: u8 = b'I'; // push integer or bool
pub const LONG: u8 = b'L'; // push long; decimal string argument
pub const NONE: u8 = b'N'; // push None
pub const STRING: u8 = b'S'; // push string; NL-terminated repr'd argument
pub const UNICODE: u8 = b'V'; // push Unicode string; NL-terminated UTF-8
pub const APPEND: u8 = b'a'; // append stack top to list below it
pub const DICT: u8 = b'd'; // build a dict from stack items
pub const EMPTY_DICT: u8 = b'}'; // push empty dict
pub const APPENDS: u8 = b'e'; // extend list on stack by topmost slice
pub const GET: u8 = b'g'; // push item from memo by string index
pub const LIST: u8 = b'l'; // build list from topmost stack slice
pub const EMPTY_LIST: u8 = b']'; // push empty list
pub const PUT: u8 = b'p'; // store stack top in memo by string index
pub const SETITEM: u8 = b's'; // add key+value pair to dict
pub const TUPLE: u8 = b't'; // build tuple from topmost stack slice
pub const EMPTY_TUPLE: u8 = b')'; // push empty tuple
pub const SETITEMS: u8 = b'u'; // modify dict by adding topmost key+value pairs

// -- Protocol 1 (binary) --
pub const BININT: u8 = b'J'; // push 4-byte signed int
pub const BININT1: u8 = b'K'; // push 1-byte unsigned int
pub const BININT2: u8 = b'M'; // push 2-byte unsigned int
pub const BINSTRING: u8 = b'T'; // push string; counted binary string
pub const SHORT_BINSTRING: u8 = b'U'; // push string; counted binary string <= 255 bytes
pub const BINUNICODE: u8 = b'X'; // push Unicode string; counted UTF-8 string
pub const BINGET: u8 = b'h'; // push item from memo by 1-byte index
pub const LONG_BINGET: u8 = b'j'; // push item from memo by 4-byte index
pub const BINPUT: u8 = b'q'; // store stack top in memo by 1-byte index
pub const LONG_BINPUT: u8 = b'r'; // store stack top in memo by 4-byte index
pub const BINFLOAT: u8 = b'G'; // push float; binary 8-byte big-endian IEEE

// -- Protocol 2 --
pub const PROTO: u8 = 0x80; // identify pickle protocol
pub const TUPLE1: u8 = 0x85; // build 1-tuple from top of stack
pub const TUPLE2: u8 = 0x86; // build 2-tuple from top two stack items
pub const TUPLE3: u8 = 0x87; // build 3-tuple from top three stack items
pub const NEWTRUE: u8 = 0x88; // push True
pub const NEWFALSE: u8 = 0x89; // push False
pub const LONG1: u8 = 0x8a; // push long from < 256 bytes
pub const LONG4: u8 = 0x8b; // push really big long

// -- Protocol 4 (subset) --
pub const SHORT_BINUNICODE: u8 = 0x8c; // 1-byte length unicode
pub const MEMOIZE: u8 = 0x94; // store top in memo (auto-incrementing key)
pub const FRAME: u8 = 0x95; // prefetch hint, no machine effect

/// Wire shape of an opcode's operand. One table drives both the decoder
/// (which reads operands) and the assembler (which writes them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgShape {
    /// Opcode byte only.
    None,
    /// 1-byte unsigned integer.
    U8,
    /// 2-byte little-endian unsigned integer.
    U16Le,
    /// 4-byte little-endian signed integer.
    I32Le,
    /// 4-byte little-endian unsigned integer.
    U32Le,
    /// 8-byte little-endian unsigned integer.
    U64Le,
    /// 8-byte big-endian IEEE-754 double.
    F64Be,
    /// Newline-terminated text.
    Line,
    /// 1-byte length prefix, then that many UTF-8 bytes.
    Str1,
    /// 4-byte little-endian unsigned length prefix, then UTF-8 bytes.
    Str4,
    /// 4-byte little-endian *signed* length prefix (negative rejected).
    Str4Signed,
    /// 1-byte count, then a little-endian signed big integer.
    Long1,
    /// 4-byte little-endian signed count (negative rejected).
    Long4,
}

/// Operand shape for a known opcode, `None` for an unrecognized byte.
pub fn arg_shape(op: u8) -> Option<ArgShape> {
    let shape = match op {
        MARK | STOP | POP | POP_MARK | DUP | NONE | NEWTRUE | NEWFALSE | EMPTY_LIST
        | EMPTY_DICT | EMPTY_TUPLE | LIST | DICT | TUPLE | TUPLE1 | TUPLE2 | TUPLE3 | APPEND
        | APPENDS | SETITEM | SETITEMS | MEMOIZE => ArgShape::None,
        PROTO | BININT1 | BINPUT | BINGET => ArgShape::U8,
        BININT2 => ArgShape::U16Le,
        BININT => ArgShape::I32Le,
        LONG_BINPUT | LONG_BINGET => ArgShape::U32Le,
        FRAME => ArgShape::U64Le,
        BINFLOAT => ArgShape::F64Be,
        INT | LONG | FLOAT | STRING | UNICODE | PUT | GET => ArgShape::Line,
        SHORT_BINUNICODE | SHORT_BINSTRING => ArgShape::Str1,
        BINUNICODE => ArgShape::Str4,
        BINSTRING => ArgShape::Str4Signed,
        LONG1 => ArgShape::Long1,
        LONG4 => ArgShape::Long4,
        _ => return Option::None,
    };
    Some(shape)
}

/// Mnemonic table, shared by the assembler and diagnostics.
/// Names match Python's pickletools, lowercased.
pub const MNEMONICS: &[(&str, u8)] = &[
    ("mark", MARK),
    ("stop", STOP),
    ("pop", POP),
    ("pop_mark", POP_MARK),
    ("dup", DUP),
    ("float", FLOAT),
    ("int", INT),
    ("long", LONG),
    ("none", NONE),
    ("string", STRING),
    ("unicode", UNICODE),
    ("append", APPEND),
    ("dict", DICT),
    ("empty_dict", EMPTY_DICT),
    ("appends", APPENDS),
    ("get", GET),
    ("list", LIST),
    ("empty_list", EMPTY_LIST),
    ("put", PUT),
    ("setitem", SETITEM),
    ("tuple", TUPLE),
    ("empty_tuple", EMPTY_TUPLE),
    ("setitems", SETITEMS),
    ("binint", BININT),
    ("binint1", BININT1),
    ("binint2", BININT2),
    ("binstring", BINSTRING),
    ("short_binstring", SHORT_BINSTRING),
    ("binunicode", BINUNICODE),
    ("binget", BINGET),
    ("long_binget", LONG_BINGET),
    ("binput", BINPUT),
    ("long_binput", LONG_BINPUT),
    ("binfloat", BINFLOAT),
    ("proto", PROTO),
    ("tuple1", TUPLE1),
    ("tuple2", TUPLE2),
    ("tuple3", TUPLE3),
    ("newtrue", NEWTRUE),
    ("newfalse", NEWFALSE),
    ("long1", LONG1),
    ("long4", LONG4),
    ("short_binunicode", SHORT_BINUNICODE),
    ("memoize", MEMOIZE),
    ("frame", FRAME),
];

/// Opcode byte for a mnemonic, if known.
pub fn from_mnemonic(name: &str) -> Option<u8> {
    MNEMONICS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, op)| *op)
}

/// Mnemonic for an opcode byte, if known.
pub fn mnemonic(op: u8) -> Option<&'static str> {
    MNEMONICS.iter().find(|(_, o)| *o == op).map(|(n, _)| *n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonic_roundtrip() {
        for (name, op) in MNEMONICS {
            assert_eq!(from_mnemonic(name), Some(*op));
            assert_eq!(mnemonic(*op), Some(*name));
        }
    }

    #[test]
    fn test_every_mnemonic_has_a_shape() {
        for (name, op) in MNEMONICS {
            assert!(arg_shape(*op).is_some(), "no shape for {name}");
        }
    }

    #[test]
    fn test_unknown_opcode_has_no_shape() {
        assert_eq!(arg_shape(0xff), None);
        assert_eq!(arg_shape(b'?'), None);
    }
}
