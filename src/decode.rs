use crate::error::DecodeError;
use crate::opcodes::{self, ArgShape};
use num_bigint::BigInt;

/// One decoded instruction. `offset` is the position of the opcode byte
/// itself; any value the machine produces for this instruction carries it.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: u8,
    pub arg: Operand,
    pub offset: u64,
}

/// A decoded operand. Numeric widths and endianness are resolved here;
/// text operands (`int`, `float`, `long`, ...) stay textual and are
/// interpreted by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Uint(u64),
    Int(i64),
    Float(f64),
    Str(String),
    Big(BigInt),
}

impl Operand {
    pub(crate) fn uint(&self, offset: u64) -> Result<u64, DecodeError> {
        match self {
            Operand::Uint(v) => Ok(*v),
            _ => Err(wrong_operand(offset)),
        }
    }

    pub(crate) fn int(&self, offset: u64) -> Result<i64, DecodeError> {
        match self {
            Operand::Int(v) => Ok(*v),
            Operand::Uint(v) => Ok(*v as i64),
            _ => Err(wrong_operand(offset)),
        }
    }

    pub(crate) fn float(&self, offset: u64) -> Result<f64, DecodeError> {
        match self {
            Operand::Float(v) => Ok(*v),
            _ => Err(wrong_operand(offset)),
        }
    }

    pub(crate) fn into_text(self, offset: u64) -> Result<String, DecodeError> {
        match self {
            Operand::Str(s) => Ok(s),
            _ => Err(wrong_operand(offset)),
        }
    }

    pub(crate) fn into_big(self, offset: u64) -> Result<BigInt, DecodeError> {
        match self {
            Operand::Big(v) => Ok(v),
            _ => Err(wrong_operand(offset)),
        }
    }
}

fn wrong_operand(offset: u64) -> DecodeError {
    DecodeError::MalformedStream {
        offset,
        reason: "operand has unexpected shape".to_string(),
    }
}

/// Streaming instruction decoder: one instruction per call, driven by the
/// operand-shape table in [`opcodes`].
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    /// Start offset of the instruction currently being decoded, attached
    /// to any error raised while reading its operand.
    start: u64,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            start: 0,
        }
    }

    /// Current read position.
    pub fn offset(&self) -> u64 {
        self.pos as u64
    }

    /// Decode the next instruction, or `Ok(None)` at end of stream.
    pub fn next_instruction(&mut self) -> Result<Option<Instruction>, DecodeError> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        self.start = self.pos as u64;
        let op = self.read_u8()?;
        let shape = opcodes::arg_shape(op).ok_or_else(|| DecodeError::MalformedStream {
            offset: self.start,
            reason: format!("unrecognized opcode 0x{op:02x}"),
        })?;
        let arg = self.read_arg(shape)?;
        Ok(Some(Instruction {
            op,
            arg,
            offset: self.start,
        }))
    }

    fn read_arg(&mut self, shape: ArgShape) -> Result<Operand, DecodeError> {
        let arg = match shape {
            ArgShape::None => Operand::None,
            ArgShape::U8 => Operand::Uint(self.read_u8()? as u64),
            ArgShape::U16Le => Operand::Uint(self.read_u16()? as u64),
            ArgShape::I32Le => Operand::Int(self.read_i32()? as i64),
            ArgShape::U32Le => Operand::Uint(self.read_u32()? as u64),
            ArgShape::U64Le => Operand::Uint(self.read_u64()?),
            ArgShape::F64Be => {
                let bytes = self.read_bytes(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                Operand::Float(f64::from_be_bytes(buf))
            }
            ArgShape::Line => {
                let line = self.read_line()?;
                Operand::Str(self.utf8(line)?)
            }
            ArgShape::Str1 => {
                let n = self.read_u8()? as usize;
                let bytes = self.read_bytes(n)?;
                Operand::Str(self.utf8(bytes)?)
            }
            ArgShape::Str4 => {
                let n = self.read_u32()? as usize;
                let bytes = self.read_bytes(n)?;
                Operand::Str(self.utf8(bytes)?)
            }
            ArgShape::Str4Signed => {
                let n = self.read_i32()?;
                if n < 0 {
                    return Err(self.malformed("negative string length"));
                }
                let bytes = self.read_bytes(n as usize)?;
                Operand::Str(self.utf8(bytes)?)
            }
            ArgShape::Long1 => {
                let n = self.read_u8()? as usize;
                let bytes = self.read_bytes(n)?;
                Operand::Big(BigInt::from_signed_bytes_le(bytes))
            }
            ArgShape::Long4 => {
                let n = self.read_i32()?;
                if n < 0 {
                    return Err(self.malformed("negative long length"));
                }
                let bytes = self.read_bytes(n as usize)?;
                Operand::Big(BigInt::from_signed_bytes_le(bytes))
            }
        };
        Ok(arg)
    }

    // -- Reading primitives --

    fn malformed(&self, reason: &str) -> DecodeError {
        DecodeError::MalformedStream {
            offset: self.start,
            reason: reason.to_string(),
        }
    }

    fn utf8(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| self.malformed("invalid UTF-8 in string operand"))
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.pos >= self.data.len() {
            return Err(self.malformed("truncated stream"));
        }
        let val = self.data[self.pos];
        self.pos += 1;
        Ok(val)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.data.len() {
            return Err(self.malformed("truncated stream"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_bytes(2)?;
        let mut buf = [0u8; 2];
        buf.copy_from_slice(bytes);
        Ok(u16::from_le_bytes(buf))
    }

    fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_line(&mut self) -> Result<&'a [u8], DecodeError> {
        let start = self.pos;
        while self.pos < self.data.len() {
            if self.data[self.pos] == b'\n' {
                let line = &self.data[start..self.pos];
                self.pos += 1; // skip newline
                return Ok(line);
            }
            self.pos += 1;
        }
        Err(self.malformed("unterminated text operand"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    fn decode_all(data: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
        let mut decoder = Decoder::new(data);
        let mut out = Vec::new();
        while let Some(ins) = decoder.next_instruction()? {
            out.push(ins);
        }
        Ok(out)
    }

    #[test]
    fn test_decode_proto_and_binint1() {
        let ins = decode_all(b"\x80\x02K\x2a.").unwrap();
        assert_eq!(
            ins,
            vec![
                Instruction {
                    op: PROTO,
                    arg: Operand::Uint(2),
                    offset: 0
                },
                Instruction {
                    op: BININT1,
                    arg: Operand::Uint(42),
                    offset: 2
                },
                Instruction {
                    op: STOP,
                    arg: Operand::None,
                    offset: 4
                },
            ]
        );
    }

    #[test]
    fn test_decode_binint_is_signed() {
        let ins = decode_all(b"J\xff\xff\xff\xff").unwrap();
        assert_eq!(ins[0].arg, Operand::Int(-1));
    }

    #[test]
    fn test_decode_binunicode() {
        let ins = decode_all(b"X\x05\x00\x00\x00hello").unwrap();
        assert_eq!(ins[0].arg, Operand::Str("hello".to_string()));
        assert_eq!(ins[0].offset, 0);
    }

    #[test]
    fn test_decode_float_line() {
        let ins = decode_all(b"F1.2\n").unwrap();
        assert_eq!(ins[0].arg, Operand::Str("1.2".to_string()));
    }

    #[test]
    fn test_decode_binfloat_big_endian() {
        let mut data = vec![BINFLOAT];
        data.extend_from_slice(&1.5f64.to_be_bytes());
        let ins = decode_all(&data).unwrap();
        assert_eq!(ins[0].arg, Operand::Float(1.5));
    }

    #[test]
    fn test_decode_long1() {
        let ins = decode_all(b"\x8a\x01\x2a").unwrap();
        assert_eq!(ins[0].arg, Operand::Big(BigInt::from(42)));
    }

    #[test]
    fn test_truncated_operand_reports_opcode_offset() {
        // BINUNICODE claims 5 bytes, stream has 2
        let err = decode_all(b"NX\x05\x00\x00\x00he").unwrap_err();
        assert_eq!(
            err,
            DecodeError::MalformedStream {
                offset: 1,
                reason: "truncated stream".to_string()
            }
        );
    }

    #[test]
    fn test_unrecognized_opcode() {
        let err = decode_all(b"\x80\x02\xff").unwrap_err();
        match err {
            DecodeError::MalformedStream { offset, reason } => {
                assert_eq!(offset, 2);
                assert!(reason.contains("0xff"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_negative_binstring_length() {
        let err = decode_all(b"T\xff\xff\xff\xff").unwrap_err();
        match err {
            DecodeError::MalformedStream { reason, .. } => {
                assert!(reason.contains("negative"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = decode_all(b"X\x02\x00\x00\x00\xff\xfe").unwrap_err();
        match err {
            DecodeError::MalformedStream { reason, .. } => {
                assert!(reason.contains("UTF-8"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
