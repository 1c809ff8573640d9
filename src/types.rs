use num_bigint::BigInt;
use std::cell::RefCell;
use std::rc::Rc;

/// A list container shared between every path that can reach it.
pub type SharedList = Rc<RefCell<Vec<PickleValue>>>;
/// An ordered-pairs dict container, shared like [`SharedList`].
pub type SharedDict = Rc<RefCell<Vec<(PickleValue, PickleValue)>>>;

/// A value produced by the pickle machine, tagged with the byte offset of
/// the opcode that created it. The offset is assigned once and never
/// recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct PickleValue {
    pub offset: u64,
    pub kind: PickleKind,
}

/// The value variants the machine builds.
///
/// Scalars are immutable and freely duplicated. Lists and dicts are shared
/// mutable containers: cloning a `PickleValue` clones the `Rc` handle, so
/// the operand stack, the memo and the pop history all observe in-place
/// mutation (`append`, `setitems`) through the one shared instance.
#[derive(Debug, Clone, PartialEq)]
pub enum PickleKind {
    None,
    Bool(bool),
    Int(i64),
    BigInt(BigInt),
    Float(f64),
    Str(String),
    List(SharedList),
    Tuple(Rc<Vec<PickleValue>>),
    Dict(SharedDict),
}

impl PickleValue {
    pub fn new(offset: u64, kind: PickleKind) -> Self {
        Self { offset, kind }
    }

    /// A fresh shared list container.
    pub fn new_list(offset: u64, items: Vec<PickleValue>) -> Self {
        Self::new(offset, PickleKind::List(Rc::new(RefCell::new(items))))
    }

    /// A fresh shared dict container; pairs keep insertion order.
    pub fn new_dict(offset: u64, pairs: Vec<(PickleValue, PickleValue)>) -> Self {
        Self::new(offset, PickleKind::Dict(Rc::new(RefCell::new(pairs))))
    }

    pub fn new_tuple(offset: u64, items: Vec<PickleValue>) -> Self {
        Self::new(offset, PickleKind::Tuple(Rc::new(items)))
    }
}

impl PickleKind {
    /// The type tag used in reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            PickleKind::None => "PY_NONE",
            PickleKind::Bool(_) => "PY_BOOL",
            PickleKind::Int(_) | PickleKind::BigInt(_) => "PY_INT",
            PickleKind::Float(_) => "PY_FLOAT",
            PickleKind::Str(_) => "PY_STR",
            PickleKind::List(_) => "PY_LIST",
            PickleKind::Tuple(_) => "PY_TUPLE",
            PickleKind::Dict(_) => "PY_DICT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_list_storage() {
        let list = PickleValue::new_list(2, vec![]);
        let alias = list.clone();
        if let PickleKind::List(items) = &list.kind {
            items.borrow_mut().push(PickleValue::new(5, PickleKind::Int(42)));
        }
        if let PickleKind::List(items) = &alias.kind {
            assert_eq!(items.borrow().len(), 1);
        } else {
            panic!("expected list");
        }
        assert_eq!(list, alias);
    }

    #[test]
    fn test_scalars_compare_by_value() {
        let a = PickleValue::new(3, PickleKind::Int(1));
        let b = PickleValue::new(3, PickleKind::Int(1));
        assert_eq!(a, b);
        assert_ne!(a, PickleValue::new(4, PickleKind::Int(1)));
    }
}
