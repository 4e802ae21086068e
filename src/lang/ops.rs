//! Operator semantics.

use std::cmp::Ordering;

use super::ast::{BinOp, CmpOp, UnaryOp};
use super::exception::{EvalResult, Exception};
use super::value::Value;

fn unsupported(op: &str, left: &Value, right: &Value) -> Exception {
    Exception::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        left.type_name(),
        right.type_name()
    ))
}

/// Numeric operands after int/float coercion.
enum Numbers {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numbers(left: &Value, right: &Value) -> Option<Numbers> {
    match (left.as_int(), right.as_int()) {
        (Some(a), Some(b)) => Some(Numbers::Ints(a, b)),
        _ => match (left.as_float(), right.as_float()) {
            (Some(a), Some(b)) => Some(Numbers::Floats(a, b)),
            _ => None,
        },
    }
}

fn checked(result: Option<i64>) -> EvalResult<Value> {
    result.map(Value::Int).ok_or_else(Exception::overflow)
}

/// Element count of `count` repetitions of `len` items of `T`.
///
/// Fails with `MemoryError` when the result could never be allocated.
fn repeated_len<T>(len: usize, count: i64) -> EvalResult<usize> {
    let count = usize::try_from(count.max(0)).map_err(|_| Exception::memory())?;
    let total = len.checked_mul(count).ok_or_else(Exception::memory)?;
    let bytes = total
        .checked_mul(std::mem::size_of::<T>().max(1))
        .ok_or_else(Exception::memory)?;
    if bytes > isize::MAX as usize {
        return Err(Exception::memory());
    }
    Ok(total)
}

/// Repeat a sequence `count` times; negative counts give an empty result.
fn repeat<T: Clone>(items: &[T], count: i64) -> EvalResult<Vec<T>> {
    let total = repeated_len::<T>(items.len(), count)?;
    let mut out = Vec::new();
    if total == 0 {
        return Ok(out);
    }
    out.try_reserve_exact(total)
        .map_err(|_| Exception::memory())?;
    for _ in 0..count {
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn repeat_str(text: &str, count: i64) -> EvalResult<String> {
    let total = repeated_len::<u8>(text.len(), count)?;
    let mut out = String::new();
    if total == 0 {
        return Ok(out);
    }
    out.try_reserve_exact(total)
        .map_err(|_| Exception::memory())?;
    for _ in 0..count {
        out.push_str(text);
    }
    Ok(out)
}

pub fn binary(op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match op {
        BinOp::Add => add(left, right),
        BinOp::Sub => match numbers(left, right) {
            Some(Numbers::Ints(a, b)) => checked(a.checked_sub(b)),
            Some(Numbers::Floats(a, b)) => Ok(Value::Float(a - b)),
            None => Err(unsupported("-", left, right)),
        },
        BinOp::Mul => multiply(left, right),
        BinOp::Div => match numbers(left, right) {
            Some(Numbers::Ints(a, b)) => {
                if b == 0 {
                    return Err(Exception::zero_division("division by zero"));
                }
                Ok(Value::Float(a as f64 / b as f64))
            }
            Some(Numbers::Floats(a, b)) => {
                if b == 0.0 {
                    return Err(Exception::zero_division("float division by zero"));
                }
                Ok(Value::Float(a / b))
            }
            None => Err(unsupported("/", left, right)),
        },
        BinOp::FloorDiv => match numbers(left, right) {
            Some(Numbers::Ints(a, b)) => {
                if b == 0 {
                    return Err(Exception::zero_division(
                        "integer division or modulo by zero",
                    ));
                }
                let q = a.checked_div(b).ok_or_else(Exception::overflow)?;
                if a % b != 0 && ((a < 0) != (b < 0)) {
                    Ok(Value::Int(q - 1))
                } else {
                    Ok(Value::Int(q))
                }
            }
            Some(Numbers::Floats(a, b)) => {
                if b == 0.0 {
                    return Err(Exception::zero_division("float floor division by zero"));
                }
                Ok(Value::Float((a / b).floor()))
            }
            None => Err(unsupported("//", left, right)),
        },
        BinOp::Mod => match numbers(left, right) {
            Some(Numbers::Ints(a, b)) => {
                if b == 0 {
                    return Err(Exception::zero_division(
                        "integer division or modulo by zero",
                    ));
                }
                let r = a.checked_rem(b).unwrap_or(0);
                if r != 0 && ((r < 0) != (b < 0)) {
                    Ok(Value::Int(r + b))
                } else {
                    Ok(Value::Int(r))
                }
            }
            Some(Numbers::Floats(a, b)) => {
                if b == 0.0 {
                    return Err(Exception::zero_division("float modulo"));
                }
                let r = a % b;
                if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                    Ok(Value::Float(r + b))
                } else {
                    Ok(Value::Float(r))
                }
            }
            None => Err(unsupported("%", left, right)),
        },
        BinOp::Pow => power(left, right),
    }
}

fn add(left: &Value, right: &Value) -> EvalResult<Value> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Value::str(joined))
        }
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => match numbers(left, right) {
            Some(Numbers::Ints(a, b)) => checked(a.checked_add(b)),
            Some(Numbers::Floats(a, b)) => Ok(Value::Float(a + b)),
            None => Err(unsupported("+", left, right)),
        },
    }
}

fn multiply(left: &Value, right: &Value) -> EvalResult<Value> {
    let sequence_times = |seq: &Value, count: i64| -> EvalResult<Value> {
        match seq {
            Value::Str(s) => Ok(Value::str(repeat_str(s, count)?)),
            Value::List(items) => Ok(Value::list(repeat(&items.borrow(), count)?)),
            Value::Tuple(items) => Ok(Value::tuple(repeat(items, count)?)),
            _ => Err(unsupported("*", left, right)),
        }
    };

    match (left, right) {
        (Value::Str(_) | Value::List(_) | Value::Tuple(_), count) if count.as_int().is_some() => {
            sequence_times(left, count.as_int().unwrap_or(0))
        }
        (count, Value::Str(_) | Value::List(_) | Value::Tuple(_)) if count.as_int().is_some() => {
            sequence_times(right, count.as_int().unwrap_or(0))
        }
        _ => match numbers(left, right) {
            Some(Numbers::Ints(a, b)) => checked(a.checked_mul(b)),
            Some(Numbers::Floats(a, b)) => Ok(Value::Float(a * b)),
            None => Err(unsupported("*", left, right)),
        },
    }
}

fn power(left: &Value, right: &Value) -> EvalResult<Value> {
    match numbers(left, right) {
        Some(Numbers::Ints(base, exp)) if exp >= 0 => match base {
            0 | 1 => Ok(Value::Int(if exp == 0 { 1 } else { base })),
            -1 => Ok(Value::Int(if exp % 2 == 0 { 1 } else { -1 })),
            _ => {
                let exp = u32::try_from(exp).map_err(|_| Exception::overflow())?;
                checked(base.checked_pow(exp))
            }
        },
        Some(Numbers::Ints(base, exp)) => float_power(base as f64, exp as f64),
        Some(Numbers::Floats(base, exp)) => float_power(base, exp),
        None => Err(unsupported("** or pow()", left, right)),
    }
}

fn float_power(base: f64, exp: f64) -> EvalResult<Value> {
    if base == 0.0 && exp < 0.0 {
        return Err(Exception::zero_division(
            "0.0 cannot be raised to a negative power",
        ));
    }
    if base < 0.0 && exp.fract() != 0.0 {
        return Err(Exception::value("math domain error"));
    }
    let result = base.powf(exp);
    if result.is_infinite() && base.is_finite() && exp.is_finite() {
        return Err(Exception::new(
            super::ExceptionKind::OverflowError,
            "numerical result out of range",
        ));
    }
    Ok(Value::Float(result))
}

pub fn unary(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    match (op, operand) {
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, other) if other.as_int().is_some() => {
            checked(other.as_int().and_then(i64::checked_neg))
        }
        (UnaryOp::Pos, other) if other.as_int().is_some() => {
            Ok(Value::Int(other.as_int().unwrap_or(0)))
        }
        (op, other) => Err(Exception::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            other.type_name()
        ))),
    }
}

/// Membership test for `in` / `not in`.
pub fn contains(container: &Value, item: &Value) -> EvalResult<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(&**needle)),
            other => Err(Exception::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| v.equals(item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| v.equals(item))),
        Value::Dict(dict) => {
            item.check_hashable()?;
            Ok(dict.borrow().contains_key(item))
        }
        other => Err(Exception::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub fn compare(op: CmpOp, left: &Value, right: &Value) -> EvalResult<bool> {
    let ordered = |accept: fn(Ordering) -> bool| -> EvalResult<bool> {
        Ok(left.compare(right, op.symbol())?.map(accept).unwrap_or(false))
    };
    match op {
        CmpOp::Eq => Ok(left.equals(right)),
        CmpOp::NotEq => Ok(!left.equals(right)),
        CmpOp::Lt => ordered(|o| o == Ordering::Less),
        CmpOp::Le => ordered(|o| o != Ordering::Greater),
        CmpOp::Gt => ordered(|o| o == Ordering::Greater),
        CmpOp::Ge => ordered(|o| o != Ordering::Less),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => Ok(!contains(right, left)?),
        CmpOp::Is => Ok(left.is_same(right)),
        CmpOp::IsNot => Ok(!left.is_same(right)),
    }
}

/// Resolve a possibly negative sequence index.
pub fn normalize_index(index: &Value, len: usize, what: &str) -> EvalResult<usize> {
    let Some(i) = index.as_int() else {
        return Err(Exception::type_error(format!(
            "{} indices must be integers, not {}",
            what,
            index.type_name()
        )));
    };
    let len = len as i64;
    let resolved = if i < 0 { i + len } else { i };
    if resolved < 0 || resolved >= len {
        return Err(Exception::index(format!("{} index out of range", what)));
    }
    Ok(resolved as usize)
}

/// `value[index]`
pub fn subscript(value: &Value, index: &Value) -> EvalResult<Value> {
    match value {
        Value::List(items) => {
            let items = items.borrow();
            let i = normalize_index(index, items.len(), "list")?;
            Ok(items[i].clone())
        }
        Value::Tuple(items) => {
            let i = normalize_index(index, items.len(), "tuple")?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let count = s.chars().count();
            let i = normalize_index(index, count, "string")?;
            Ok(Value::str(s.chars().nth(i).map(String::from).unwrap_or_default()))
        }
        Value::Dict(dict) => {
            index.check_hashable()?;
            dict.borrow()
                .get(index)
                .cloned()
                .ok_or_else(|| Exception::key(index.repr()))
        }
        other => Err(Exception::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `value[index] = item`
pub fn store_subscript(value: &Value, index: &Value, item: Value) -> EvalResult<()> {
    match value {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index, items.len(), "list assignment")?;
            items[i] = item;
            Ok(())
        }
        Value::Dict(dict) => {
            index.check_hashable()?;
            dict.borrow_mut().insert(index.clone(), item);
            Ok(())
        }
        other => Err(Exception::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `del value[index]`
pub fn delete_subscript(value: &Value, index: &Value) -> EvalResult<()> {
    match value {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index, items.len(), "list assignment")?;
            items.remove(i);
            Ok(())
        }
        Value::Dict(dict) => {
            index.check_hashable()?;
            dict.borrow_mut()
                .remove(index)
                .map(|_| ())
                .ok_or_else(|| Exception::key(index.repr()))
        }
        other => Err(Exception::type_error(format!(
            "'{}' object does not support item deletion",
            other.type_name()
        ))),
    }
}

/// Materialize an iterable into its items.
pub fn iterate(value: &Value) -> EvalResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Tuple(items) => Ok(items.to_vec()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::str(String::from(c))).collect()),
        Value::Dict(dict) => Ok(dict.borrow().keys().cloned().collect()),
        other => Err(Exception::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::ExceptionKind;

    fn int(n: i64) -> Value {
        Value::Int(n)
    }

    #[test]
    fn test_floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(binary(BinOp::FloorDiv, &int(7), &int(2)).unwrap(), int(3));
        assert_eq!(binary(BinOp::FloorDiv, &int(-7), &int(2)).unwrap(), int(-4));
        assert_eq!(binary(BinOp::Mod, &int(-7), &int(2)).unwrap(), int(1));
        assert_eq!(binary(BinOp::Mod, &int(7), &int(-2)).unwrap(), int(-1));
        assert_eq!(
            binary(BinOp::Mod, &Value::Float(-1.5), &Value::Float(1.0)).unwrap(),
            Value::Float(0.5)
        );
    }

    #[test]
    fn test_true_division_returns_float() {
        assert_eq!(
            binary(BinOp::Div, &int(1), &int(2)).unwrap(),
            Value::Float(0.5)
        );
        let err = binary(BinOp::Div, &int(1), &int(0)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::ZeroDivisionError);
        assert_eq!(err.message, "division by zero");
    }

    #[test]
    fn test_overflow_is_reported() {
        let err = binary(BinOp::Mul, &int(i64::MAX), &int(2)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::OverflowError);
        let err = binary(BinOp::Pow, &int(10), &int(40)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::OverflowError);
        let err = unary(UnaryOp::Neg, &int(i64::MIN)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::OverflowError);
    }

    #[test]
    fn test_power() {
        assert_eq!(binary(BinOp::Pow, &int(2), &int(10)).unwrap(), int(1024));
        assert_eq!(
            binary(BinOp::Pow, &int(2), &int(-1)).unwrap(),
            Value::Float(0.5)
        );
        assert_eq!(binary(BinOp::Pow, &int(-1), &int(i64::MAX)).unwrap(), int(-1));
        let err = binary(BinOp::Pow, &int(0), &int(-1)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::ZeroDivisionError);
    }

    #[test]
    fn test_sequence_ops() {
        assert_eq!(
            binary(BinOp::Add, &Value::str("ab"), &Value::str("cd")).unwrap(),
            Value::str("abcd")
        );
        assert_eq!(
            binary(BinOp::Mul, &int(3), &Value::str("ab")).unwrap(),
            Value::str("ababab")
        );
        assert_eq!(
            binary(BinOp::Mul, &Value::list(vec![int(1)]), &int(-2)).unwrap(),
            Value::list(vec![])
        );
        let err = binary(BinOp::Add, &int(1), &Value::str("a")).unwrap_err();
        assert_eq!(
            err.message,
            "unsupported operand type(s) for +: 'int' and 'str'"
        );
    }

    #[test]
    fn test_huge_repetition_raises_memory_error() {
        let big = binary(BinOp::Pow, &int(10), &int(18)).unwrap();
        for seq in [Value::list(vec![int(0)]), Value::str("a"), Value::tuple(vec![int(1)])] {
            let err = binary(BinOp::Mul, &seq, &big).unwrap_err();
            assert_eq!(err.kind, ExceptionKind::MemoryError);
        }
        let err = binary(BinOp::Mul, &big, &Value::str("ab")).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::MemoryError);

        // nothing to repeat, nothing to allocate
        assert_eq!(
            binary(BinOp::Mul, &Value::list(vec![]), &big).unwrap(),
            Value::list(vec![])
        );
        assert_eq!(binary(BinOp::Mul, &Value::str(""), &big).unwrap(), Value::str(""));
    }

    #[test]
    fn test_subscript() {
        let list = Value::list(vec![int(10), int(20), int(30)]);
        assert_eq!(subscript(&list, &int(-1)).unwrap(), int(30));
        let err = subscript(&list, &int(3)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::IndexError);
        assert_eq!(subscript(&Value::str("héllo"), &int(1)).unwrap(), Value::str("é"));

        let err = subscript(&int(1), &int(0)).unwrap_err();
        assert_eq!(err.message, "'int' object is not subscriptable");
    }

    #[test]
    fn test_store_and_delete_subscript() {
        let list = Value::list(vec![int(1), int(2)]);
        store_subscript(&list, &int(0), int(5)).unwrap();
        delete_subscript(&list, &int(1)).unwrap();
        assert_eq!(list, Value::list(vec![int(5)]));

        let tuple = Value::tuple(vec![int(1)]);
        let err = store_subscript(&tuple, &int(0), int(2)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::TypeError);
    }

    #[test]
    fn test_membership() {
        assert!(contains(&Value::str("hello"), &Value::str("ell")).unwrap());
        assert!(contains(&Value::list(vec![int(1), int(2)]), &Value::Float(2.0)).unwrap());
        assert!(contains(&int(1), &int(1)).is_err());
        assert!(contains(&Value::str("a"), &int(1)).is_err());
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(CmpOp::Lt, &int(1), &int(2)).unwrap());
        assert!(!compare(CmpOp::Lt, &Value::Float(f64::NAN), &int(2)).unwrap());
        assert!(compare(CmpOp::Is, &Value::None, &Value::None).unwrap());
        let a = Value::list(vec![]);
        assert!(compare(CmpOp::Is, &a, &a.clone()).unwrap());
        assert!(compare(CmpOp::IsNot, &a, &Value::list(vec![])).unwrap());
        assert!(compare(CmpOp::Lt, &int(1), &Value::None).is_err());
    }
}
