use num_bigint::BigInt;

use crate::error::AsmError;
use crate::opcodes::{self, ArgShape};

/// Assemble line-oriented mnemonic source into the exact byte stream the
/// decoder consumes. One statement per line: `mnemonic [operand]`, with
/// `#` comment lines and blank lines skipped. Operands are decimal or
/// `0x`-prefixed integers, double-quoted strings (`\"` and `\\` escapes),
/// or decimal floats.
pub fn assemble(source: &str) -> Result<Vec<u8>, AsmError> {
    let mut buf = Vec::with_capacity(256);
    for (idx, raw) in source.lines().enumerate() {
        assemble_line(&mut buf, idx + 1, raw)?;
    }
    Ok(buf)
}

fn assemble_line(buf: &mut Vec<u8>, line: usize, raw: &str) -> Result<(), AsmError> {
    let text = raw.trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(());
    }
    let (mnem, rest) = match text.split_once(char::is_whitespace) {
        Some((m, r)) => (m, r.trim()),
        None => (text, ""),
    };
    let op = opcodes::from_mnemonic(mnem).ok_or_else(|| AsmError::UnknownMnemonic {
        line,
        mnemonic: mnem.to_string(),
    })?;
    // the mnemonic table only lists opcodes the shape table covers
    let shape = opcodes::arg_shape(op).unwrap_or(ArgShape::None);
    buf.push(op);
    encode_arg(buf, line, shape, rest)
}

fn encode_arg(buf: &mut Vec<u8>, line: usize, shape: ArgShape, rest: &str) -> Result<(), AsmError> {
    let fail = |reason: String| AsmError::OperandFormat { line, reason };
    match shape {
        ArgShape::None => {
            if !rest.is_empty() {
                return Err(fail(format!("unexpected operand '{rest}'")));
            }
        }
        ArgShape::U8 => {
            let v = parse_int(rest).map_err(fail)?;
            let v = u8::try_from(v).map_err(|_| fail(format!("'{rest}' out of u8 range")))?;
            buf.push(v);
        }
        ArgShape::U16Le => {
            let v = parse_int(rest).map_err(fail)?;
            let v = u16::try_from(v).map_err(|_| fail(format!("'{rest}' out of u16 range")))?;
            buf.extend_from_slice(&v.to_le_bytes());
        }
        ArgShape::I32Le => {
            let v = parse_int(rest).map_err(fail)?;
            let v = i32::try_from(v).map_err(|_| fail(format!("'{rest}' out of i32 range")))?;
            buf.extend_from_slice(&v.to_le_bytes());
        }
        ArgShape::U32Le => {
            let v = parse_int(rest).map_err(fail)?;
            let v = u32::try_from(v).map_err(|_| fail(format!("'{rest}' out of u32 range")))?;
            buf.extend_from_slice(&v.to_le_bytes());
        }
        ArgShape::U64Le => {
            let v = parse_uint(rest).map_err(fail)?;
            buf.extend_from_slice(&v.to_le_bytes());
        }
        ArgShape::F64Be => {
            let text = operand_text(rest).map_err(fail)?;
            let v: f64 = text
                .trim()
                .parse()
                .map_err(|e| fail(format!("float operand: {e}")))?;
            buf.extend_from_slice(&v.to_be_bytes());
        }
        ArgShape::Line => {
            let text = operand_text(rest).map_err(fail)?;
            if text.contains('\n') {
                return Err(fail("text operand may not contain a newline".to_string()));
            }
            buf.extend_from_slice(text.as_bytes());
            buf.push(b'\n');
        }
        ArgShape::Str1 => {
            let text = parse_quoted(rest).map_err(fail)?;
            let n = u8::try_from(text.len())
                .map_err(|_| fail("string longer than 255 bytes".to_string()))?;
            buf.push(n);
            buf.extend_from_slice(text.as_bytes());
        }
        ArgShape::Str4 => {
            let text = parse_quoted(rest).map_err(fail)?;
            let n = u32::try_from(text.len())
                .map_err(|_| fail("string too long".to_string()))?;
            buf.extend_from_slice(&n.to_le_bytes());
            buf.extend_from_slice(text.as_bytes());
        }
        ArgShape::Str4Signed => {
            let text = parse_quoted(rest).map_err(fail)?;
            let n = i32::try_from(text.len())
                .map_err(|_| fail("string too long".to_string()))?;
            buf.extend_from_slice(&n.to_le_bytes());
            buf.extend_from_slice(text.as_bytes());
        }
        ArgShape::Long1 => {
            let v = parse_big(rest).map_err(fail)?;
            let bytes = v.to_signed_bytes_le();
            let n = u8::try_from(bytes.len())
                .map_err(|_| fail("long payload longer than 255 bytes".to_string()))?;
            buf.push(n);
            buf.extend_from_slice(&bytes);
        }
        ArgShape::Long4 => {
            let v = parse_big(rest).map_err(fail)?;
            let bytes = v.to_signed_bytes_le();
            let n = i32::try_from(bytes.len())
                .map_err(|_| fail("long payload too long".to_string()))?;
            buf.extend_from_slice(&n.to_le_bytes());
            buf.extend_from_slice(&bytes);
        }
    }
    Ok(())
}

/// Quoted operands yield their unescaped content; anything else is taken
/// verbatim.
fn operand_text(rest: &str) -> Result<String, String> {
    if rest.starts_with('"') {
        parse_quoted(rest)
    } else {
        Ok(rest.to_string())
    }
}

fn parse_int(s: &str) -> Result<i64, String> {
    let (neg, body) = match s.strip_prefix('-') {
        Some(b) => (true, b),
        None => (false, s),
    };
    let val = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else {
        body.parse::<i64>()
    }
    .map_err(|e| format!("integer operand '{s}': {e}"))?;
    Ok(if neg { -val } else { val })
}

fn parse_uint(s: &str) -> Result<u64, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse::<u64>()
    }
    .map_err(|e| format!("integer operand '{s}': {e}"))
}

fn parse_big(s: &str) -> Result<BigInt, String> {
    s.parse::<BigInt>()
        .map_err(|e| format!("integer operand '{s}': {e}"))
}

fn parse_quoted(s: &str) -> Result<String, String> {
    let mut chars = s.chars();
    if chars.next() != Some('"') {
        return Err(format!("expected quoted string, got '{s}'"));
    }
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('\\') => match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(c) => return Err(format!("unsupported escape '\\{c}'")),
                None => return Err("unterminated escape".to_string()),
            },
            Some('"') => break,
            Some(c) => out.push(c),
            None => return Err("unterminated string".to_string()),
        }
    }
    if chars.next().is_some() {
        return Err("trailing characters after string".to_string());
    }
    Ok(out)
}
