use std::rc::Rc;

use serde_json::{Map, Number, Value};

use crate::error::DecodeError;
use crate::machine::MachineSnapshot;
use crate::types::{PickleKind, PickleValue};

/// Render a snapshot as the structured report: `stack` top-first,
/// `popstack` most-recently-removed first, `memo` ascending by key.
pub fn report_to_json(snap: &MachineSnapshot) -> Value {
    let mut path = Vec::new();
    let mut root = Map::new();
    root.insert(
        "stack".to_string(),
        Value::Array(
            snap.stack
                .iter()
                .rev()
                .map(|v| value_to_json(v, &mut path))
                .collect(),
        ),
    );
    root.insert(
        "popstack".to_string(),
        Value::Array(
            snap.popstack
                .iter()
                .rev()
                .map(|v| value_to_json(v, &mut path))
                .collect(),
        ),
    );
    root.insert(
        "memo".to_string(),
        Value::Array(
            snap.memo
                .iter()
                .map(|(key, val)| {
                    let mut entry = Map::new();
                    entry.insert("index".to_string(), Value::Number(Number::from(*key)));
                    entry.insert("value".to_string(), value_to_json(val, &mut path));
                    Value::Object(entry)
                })
                .collect(),
        ),
    );
    Value::Object(root)
}

/// Compact JSON text of the report. This rendering is a byte-for-byte
/// contract; field order and the float format below are deliberate.
pub fn report_to_string(snap: &MachineSnapshot) -> Result<String, DecodeError> {
    Ok(serde_json::to_string(&report_to_json(snap))?)
}

fn value_to_json(val: &PickleValue, path: &mut Vec<*const ()>) -> Value {
    let mut obj = Map::new();
    obj.insert("offset".to_string(), Value::Number(Number::from(val.offset)));
    obj.insert(
        "type".to_string(),
        Value::String(val.kind.type_name().to_string()),
    );
    obj.insert("value".to_string(), kind_to_json(&val.kind, path));
    Value::Object(obj)
}

fn kind_to_json(kind: &PickleKind, path: &mut Vec<*const ()>) -> Value {
    match kind {
        PickleKind::None => Value::Null,
        PickleKind::Bool(b) => Value::Bool(*b),
        PickleKind::Int(i) => Value::Number(Number::from(*i)),
        PickleKind::BigInt(bi) => number_from_text(&bi.to_string()),
        // Fixed six fractional digits. Not a rounding bug.
        PickleKind::Float(f) if f.is_finite() => number_from_text(&format!("{f:.6}")),
        PickleKind::Float(_) => Value::Null,
        // The quotes are part of the reported payload, not JSON escaping.
        PickleKind::Str(s) => Value::String(format!("\"{s}\"")),
        PickleKind::List(items) => {
            let ptr = Rc::as_ptr(items) as *const ();
            if path.contains(&ptr) {
                return Value::Null; // self-referential container
            }
            path.push(ptr);
            let out = items
                .borrow()
                .iter()
                .map(|v| value_to_json(v, path))
                .collect();
            path.pop();
            Value::Array(out)
        }
        PickleKind::Tuple(items) => {
            let ptr = Rc::as_ptr(items) as *const ();
            if path.contains(&ptr) {
                return Value::Null;
            }
            path.push(ptr);
            let out = items.iter().map(|v| value_to_json(v, path)).collect();
            path.pop();
            Value::Array(out)
        }
        PickleKind::Dict(pairs) => {
            let ptr = Rc::as_ptr(pairs) as *const ();
            if path.contains(&ptr) {
                return Value::Null;
            }
            path.push(ptr);
            let out = pairs
                .borrow()
                .iter()
                .map(|(k, v)| Value::Array(vec![value_to_json(k, path), value_to_json(v, path)]))
                .collect();
            path.pop();
            Value::Array(out)
        }
    }
}

/// A literal JSON number token. With serde_json's `arbitrary_precision`
/// the text survives serialization verbatim, which is how `1.200000`
/// stays six-digit and big integers stay exact.
fn number_from_text(text: &str) -> Value {
    text.parse::<Number>().map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;
    use crate::machine::trace_pickle;

    fn render(src: &str) -> String {
        report_to_string(&trace_pickle(&assemble(src).unwrap()).unwrap()).unwrap()
    }

    // Golden renderings, pinned byte-for-byte.

    #[test]
    fn test_report_binint1() {
        assert_eq!(
            render("proto 1\nbinint1 42\nbinint1 43\nstop"),
            r#"{"stack":[{"offset":4,"type":"PY_INT","value":43},{"offset":2,"type":"PY_INT","value":42}],"popstack":[],"memo":[]}"#
        );
    }

    #[test]
    fn test_report_pop() {
        assert_eq!(
            render("proto 2\nbinint1 42\npop\nstop"),
            r#"{"stack":[],"popstack":[{"offset":2,"type":"PY_INT","value":42}],"memo":[]}"#
        );
    }

    #[test]
    fn test_report_pop_mark() {
        assert_eq!(
            render("proto 2\nmark\nbinint1 42\nbinint1 43\nbinint1 44\nbinint1 45\npop_mark\nstop"),
            r#"{"stack":[],"popstack":[{"offset":9,"type":"PY_INT","value":45},{"offset":7,"type":"PY_INT","value":44},{"offset":5,"type":"PY_INT","value":43},{"offset":3,"type":"PY_INT","value":42}],"memo":[]}"#
        );
    }

    #[test]
    fn test_report_bool() {
        assert_eq!(
            render("proto 2\nnewtrue\nstop"),
            r#"{"stack":[{"offset":2,"type":"PY_BOOL","value":true}],"popstack":[],"memo":[]}"#
        );
    }

    #[test]
    fn test_report_setitems() {
        assert_eq!(
            render(
                "proto 0x2\nempty_dict\nmark\nbinunicode \"test_key\"\nnewtrue\n\
                 binunicode \"testkey2\"\nnewfalse\nsetitems\nstop"
            ),
            r#"{"stack":[{"offset":2,"type":"PY_DICT","value":[[{"offset":4,"type":"PY_STR","value":"\"test_key\""},{"offset":17,"type":"PY_BOOL","value":true}],[{"offset":18,"type":"PY_STR","value":"\"testkey2\""},{"offset":31,"type":"PY_BOOL","value":false}]]}],"popstack":[],"memo":[]}"#
        );
    }

    #[test]
    fn test_report_none() {
        assert_eq!(
            render("proto 0x2\nnone\nstop"),
            r#"{"stack":[{"offset":2,"type":"PY_NONE","value":null}],"popstack":[],"memo":[]}"#
        );
    }

    #[test]
    fn test_report_memo_list_is_stack_list() {
        assert_eq!(
            render("proto 2\nempty_list\nbinput 1\nbinint1 42\nappend\npop\nbinget 1\nstop"),
            r#"{"stack":[{"offset":2,"type":"PY_LIST","value":[{"offset":5,"type":"PY_INT","value":42}]}],"popstack":[{"offset":2,"type":"PY_LIST","value":[{"offset":5,"type":"PY_INT","value":42}]}],"memo":[{"index":1,"value":{"offset":2,"type":"PY_LIST","value":[{"offset":5,"type":"PY_INT","value":42}]}}]}"#
        );
    }

    #[test]
    fn test_report_float_fixed_six_digits() {
        assert_eq!(
            render("proto 2\nfloat \"1.2\"\nstop"),
            r#"{"stack":[{"offset":2,"type":"PY_FLOAT","value":1.200000}],"popstack":[],"memo":[]}"#
        );
    }

    #[test]
    fn test_report_binfloat() {
        assert_eq!(
            render("proto 2\nbinfloat 1.2\nstop"),
            r#"{"stack":[{"offset":2,"type":"PY_FLOAT","value":1.200000}],"popstack":[],"memo":[]}"#
        );
    }

    #[test]
    fn test_report_many_memos() {
        assert_eq!(
            render(
                "proto 2\nmark\nbinint1 1\nbinput 1\nbinint1 2\nbinput 2\nbinint1 3\nbinput 3\n\
                 binint1 4\nbinput 4\npop_mark\nbinget 2\nbinget 4\nstop"
            ),
            r#"{"stack":[{"offset":15,"type":"PY_INT","value":4},{"offset":7,"type":"PY_INT","value":2}],"popstack":[{"offset":15,"type":"PY_INT","value":4},{"offset":11,"type":"PY_INT","value":3},{"offset":7,"type":"PY_INT","value":2},{"offset":3,"type":"PY_INT","value":1}],"memo":[{"index":1,"value":{"offset":3,"type":"PY_INT","value":1}},{"index":2,"value":{"offset":7,"type":"PY_INT","value":2}},{"index":3,"value":{"offset":11,"type":"PY_INT","value":3}},{"index":4,"value":{"offset":15,"type":"PY_INT","value":4}}]}"#
        );
    }

    // Additional rendering contracts.

    #[test]
    fn test_report_mutation_after_sharing_is_visible_everywhere() {
        // the list is shared with the memo before the second append
        let out = render(
            "proto 2\nempty_list\nbinput 0\nbinint1 1\nappend\nbinget 0\npop\nbinint1 2\nappend\nstop",
        );
        let rendered: Value = serde_json::from_str(&out).unwrap();
        let stack_list = &rendered["stack"][0]["value"];
        let pop_list = &rendered["popstack"][0]["value"];
        let memo_list = &rendered["memo"][0]["value"]["value"];
        assert_eq!(stack_list.as_array().unwrap().len(), 2);
        assert_eq!(stack_list, pop_list);
        assert_eq!(stack_list, memo_list);
    }

    #[test]
    fn test_report_self_referential_list_terminates() {
        let out = render("proto 2\nempty_list\ndup\nappend\nstop");
        assert_eq!(
            out,
            r#"{"stack":[{"offset":2,"type":"PY_LIST","value":[{"offset":2,"type":"PY_LIST","value":null}]}],"popstack":[],"memo":[]}"#
        );
    }

    #[test]
    fn test_report_tuple_and_big_int() {
        let out = render("proto 2\nbinint1 1\nlong 123456789012345678901234567890\ntuple2\nstop");
        assert_eq!(
            out,
            r#"{"stack":[{"offset":36,"type":"PY_TUPLE","value":[{"offset":2,"type":"PY_INT","value":1},{"offset":4,"type":"PY_INT","value":123456789012345678901234567890}]}],"popstack":[],"memo":[]}"#
        );
    }

    #[test]
    fn test_report_non_finite_float_is_null() {
        let mut data = assemble("proto 2").unwrap();
        data.push(crate::opcodes::BINFLOAT);
        data.extend_from_slice(&f64::NAN.to_be_bytes());
        data.push(crate::opcodes::STOP);
        let out = report_to_string(&trace_pickle(&data).unwrap()).unwrap();
        assert_eq!(
            out,
            r#"{"stack":[{"offset":2,"type":"PY_FLOAT","value":null}],"popstack":[],"memo":[]}"#
        );
    }
}
