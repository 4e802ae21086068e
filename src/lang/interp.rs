//! Tree-walking evaluation against a persistent namespace.

use std::collections::HashMap;

use super::ast::{BinOp, BoolOp, Constant, Expr, Stmt, Target};
use super::builtins::Builtin;
use super::exception::{EvalResult, Exception};
use super::ops;
use super::parser::{parse_expression, parse_program};
use super::value::{Dict, Value};

/// Name bindings that outlive a single statement.
///
/// Lookups fall back to builtins, which user bindings may shadow.
#[derive(Debug, Default)]
pub struct Namespace {
    globals: HashMap<String, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals
            .get(name)
            .cloned()
            .or_else(|| Builtin::lookup(name).map(Value::Builtin))
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.globals.remove(name)
    }

    /// Number of user bindings.
    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        self.get(name).ok_or_else(|| Exception::undefined(name))
    }
}

/// Parse `source` as a single expression and evaluate it.
pub fn evaluate(source: &str, namespace: &mut Namespace) -> EvalResult<Value> {
    let expr = parse_expression(source)?;
    eval_expr(&expr, namespace)
}

/// Parse `source` as a statement sequence and run it for effect.
///
/// Statements before a failing one keep their effects.
pub fn execute(source: &str, namespace: &mut Namespace) -> EvalResult<()> {
    for stmt in parse_program(source)? {
        exec_stmt(&stmt, namespace)?;
    }
    Ok(())
}

pub fn exec_stmt(stmt: &Stmt, namespace: &mut Namespace) -> EvalResult<()> {
    match stmt {
        Stmt::Expr(expr) => {
            eval_expr(expr, namespace)?;
        }
        Stmt::Assign { targets, value } => {
            let value = eval_expr(value, namespace)?;
            for target in targets {
                assign(target, value.clone(), namespace)?;
            }
        }
        Stmt::AugAssign { target, op, value } => match target {
            Target::Name(name) => {
                let current = namespace.lookup(name)?;
                let operand = eval_expr(value, namespace)?;
                let updated = augmented(*op, &current, &operand)?;
                namespace.set(name.clone(), updated);
            }
            Target::Subscript { value: container, index } => {
                let container = eval_expr(container, namespace)?;
                let index = eval_expr(index, namespace)?;
                let current = ops::subscript(&container, &index)?;
                let operand = eval_expr(value, namespace)?;
                let updated = augmented(*op, &current, &operand)?;
                ops::store_subscript(&container, &index, updated)?;
            }
            Target::Unpack(_) => {
                return Err(Exception::syntax(
                    "illegal expression for augmented assignment",
                ))
            }
        },
        Stmt::Delete(targets) => {
            for target in targets {
                delete(target, namespace)?;
            }
        }
        Stmt::Pass => {}
    }
    Ok(())
}

/// `+=` on a list extends it in place; everything else rebinds.
fn augmented(op: BinOp, current: &Value, operand: &Value) -> EvalResult<Value> {
    if let (BinOp::Add, Value::List(items)) = (op, current) {
        let extra = ops::iterate(operand)?;
        items.borrow_mut().extend(extra);
        return Ok(current.clone());
    }
    ops::binary(op, current, operand)
}

fn assign(target: &Target, value: Value, namespace: &mut Namespace) -> EvalResult<()> {
    match target {
        Target::Name(name) => {
            namespace.set(name.clone(), value);
            Ok(())
        }
        Target::Subscript {
            value: container,
            index,
        } => {
            let container = eval_expr(container, namespace)?;
            let index = eval_expr(index, namespace)?;
            ops::store_subscript(&container, &index, value)
        }
        Target::Unpack(targets) => {
            let items = ops::iterate(&value).map_err(|_| {
                Exception::type_error(format!(
                    "cannot unpack non-iterable {} object",
                    value.type_name()
                ))
            })?;
            if items.len() != targets.len() {
                let message = if items.len() > targets.len() {
                    format!("too many values to unpack (expected {})", targets.len())
                } else {
                    format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )
                };
                return Err(Exception::value(message));
            }
            for (target, item) in targets.iter().zip(items) {
                assign(target, item, namespace)?;
            }
            Ok(())
        }
    }
}

fn delete(target: &Target, namespace: &mut Namespace) -> EvalResult<()> {
    match target {
        Target::Name(name) => namespace
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Exception::undefined(name)),
        Target::Subscript {
            value: container,
            index,
        } => {
            let container = eval_expr(container, namespace)?;
            let index = eval_expr(index, namespace)?;
            ops::delete_subscript(&container, &index)
        }
        Target::Unpack(targets) => {
            for target in targets {
                delete(target, namespace)?;
            }
            Ok(())
        }
    }
}

pub fn eval_expr(expr: &Expr, namespace: &Namespace) -> EvalResult<Value> {
    match expr {
        Expr::Constant(constant) => Ok(match constant {
            Constant::None => Value::None,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(n) => Value::Int(*n),
            Constant::Float(f) => Value::Float(*f),
            Constant::Str(s) => Value::str(s.as_str()),
        }),
        Expr::Name(name) => namespace.lookup(name),
        Expr::List(items) => Ok(Value::list(eval_all(items, namespace)?)),
        Expr::Tuple(items) => Ok(Value::tuple(eval_all(items, namespace)?)),
        Expr::Dict(entries) => {
            let mut dict = Dict::new();
            for (key, value) in entries {
                let key = eval_expr(key, namespace)?;
                key.check_hashable()?;
                let value = eval_expr(value, namespace)?;
                dict.insert(key, value);
            }
            Ok(Value::dict(dict))
        }
        Expr::Unary { op, operand } => ops::unary(*op, &eval_expr(operand, namespace)?),
        Expr::Arith { first, rest } => {
            let mut acc = eval_expr(first, namespace)?;
            for (op, operand) in rest {
                let operand = eval_expr(operand, namespace)?;
                acc = ops::binary(*op, &acc, &operand)?;
            }
            Ok(acc)
        }
        Expr::Power { base, exponent } => {
            let base = eval_expr(base, namespace)?;
            let exponent = eval_expr(exponent, namespace)?;
            ops::binary(BinOp::Pow, &base, &exponent)
        }
        Expr::Bool { op, values } => {
            let mut last = Value::None;
            for operand in values {
                last = eval_expr(operand, namespace)?;
                let short_circuit = match op {
                    BoolOp::And => !last.is_truthy(),
                    BoolOp::Or => last.is_truthy(),
                };
                if short_circuit {
                    break;
                }
            }
            Ok(last)
        }
        Expr::Not(operand) => Ok(Value::Bool(!eval_expr(operand, namespace)?.is_truthy())),
        Expr::Compare { first, rest } => {
            let mut left = eval_expr(first, namespace)?;
            for (op, right) in rest {
                let right = eval_expr(right, namespace)?;
                if !ops::compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::Conditional { test, body, orelse } => {
            if eval_expr(test, namespace)?.is_truthy() {
                eval_expr(body, namespace)
            } else {
                eval_expr(orelse, namespace)
            }
        }
        Expr::Call { func, args } => {
            let func = eval_expr(func, namespace)?;
            let args = eval_all(args, namespace)?;
            match func {
                Value::Builtin(builtin) => builtin.call(args),
                other => Err(Exception::type_error(format!(
                    "'{}' object is not callable",
                    other.type_name()
                ))),
            }
        }
        Expr::Subscript { value, index } => {
            let value = eval_expr(value, namespace)?;
            let index = eval_expr(index, namespace)?;
            ops::subscript(&value, &index)
        }
    }
}

fn eval_all(exprs: &[Expr], namespace: &Namespace) -> EvalResult<Vec<Value>> {
    exprs.iter().map(|e| eval_expr(e, namespace)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::ExceptionKind;

    fn eval(source: &str, ns: &mut Namespace) -> Value {
        evaluate(source, ns).unwrap()
    }

    #[test]
    fn test_arithmetic() {
        let mut ns = Namespace::new();
        assert_eq!(eval("1 + 1", &mut ns), Value::Int(2));
        assert_eq!(eval("2 ** 3 ** 2", &mut ns), Value::Int(512));
        assert_eq!(eval("-2 ** 2", &mut ns), Value::Int(-4));
        assert_eq!(eval("7 // 2 + 7 % 2", &mut ns), Value::Int(4));
        assert_eq!(eval("1 / 4", &mut ns), Value::Float(0.25));
    }

    #[test]
    fn test_assignment_persists() {
        let mut ns = Namespace::new();
        execute("x = 5", &mut ns).unwrap();
        assert_eq!(eval("x", &mut ns), Value::Int(5));
        execute("x += 1; y = x * 2", &mut ns).unwrap();
        assert_eq!(eval("(x, y)", &mut ns), Value::tuple(vec![Value::Int(6), Value::Int(12)]));
    }

    #[test]
    fn test_undefined_name() {
        let mut ns = Namespace::new();
        let err = evaluate("missing + 1", &mut ns).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::NameError);
        assert_eq!(err.message, "name 'missing' is not defined");
    }

    #[test]
    fn test_partial_effects_survive_failure() {
        let mut ns = Namespace::new();
        let err = execute("a = 1; b = 1 / 0; c = 3", &mut ns).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::ZeroDivisionError);
        assert_eq!(eval("a", &mut ns), Value::Int(1));
        assert!(evaluate("c", &mut ns).is_err());
    }

    #[test]
    fn test_list_aliasing() {
        let mut ns = Namespace::new();
        execute("a = [1]; b = a; b += [2]; b[0] = 9", &mut ns).unwrap();
        assert_eq!(eval("a", &mut ns), Value::list(vec![Value::Int(9), Value::Int(2)]));
        assert_eq!(eval("a is b", &mut ns), Value::Bool(true));
    }

    #[test]
    fn test_dicts() {
        let mut ns = Namespace::new();
        execute("d = {'a': 1}\nd['b'] = 2\nd['a'] += 10\ndel d['b']", &mut ns).unwrap();
        assert_eq!(eval("d", &mut ns).repr(), "{'a': 11}");
        let err = evaluate("d['zz']", &mut ns).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::KeyError);
        assert_eq!(err.message, "'zz'");
        let err = evaluate("{[1]: 2}", &mut ns).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::TypeError);
    }

    #[test]
    fn test_unpacking() {
        let mut ns = Namespace::new();
        execute("a, b = 1, 2; a, b = b, a", &mut ns).unwrap();
        assert_eq!(eval("[a, b]", &mut ns), Value::list(vec![Value::Int(2), Value::Int(1)]));
        let err = execute("a, b = [1, 2, 3]", &mut ns).unwrap_err();
        assert_eq!(err.message, "too many values to unpack (expected 2)");
    }

    #[test]
    fn test_boolean_operators_return_operands() {
        let mut ns = Namespace::new();
        assert_eq!(eval("0 or 'x'", &mut ns), Value::str("x"));
        assert_eq!(eval("[] and missing", &mut ns), Value::list(vec![]));
        assert_eq!(eval("not 0", &mut ns), Value::Bool(true));
        assert_eq!(eval("1 < 2 < 3", &mut ns), Value::Bool(true));
        assert_eq!(eval("3 > 2 > 2", &mut ns), Value::Bool(false));
        assert_eq!(eval("'yes' if 2 in [1, 2] else 'no'", &mut ns), Value::str("yes"));
    }

    #[test]
    fn test_builtins_and_shadowing() {
        let mut ns = Namespace::new();
        assert_eq!(eval("len('abc') + sum(range(4))", &mut ns), Value::Int(9));
        execute("len = 3", &mut ns).unwrap();
        let err = evaluate("len('abc')", &mut ns).unwrap_err();
        assert_eq!(err.message, "'int' object is not callable");
        execute("del len", &mut ns).unwrap();
        assert_eq!(eval("len('abc')", &mut ns), Value::Int(3));
    }

    #[test]
    fn test_long_operator_chains() {
        let mut ns = Namespace::new();
        let sum = format!("1{}", "+1".repeat(200_000));
        assert_eq!(eval(&sum, &mut ns), Value::Int(200_001));

        let mixed = format!("10{}", " - 1 * 2 // 2".repeat(50_000));
        assert_eq!(eval(&mixed, &mut ns), Value::Int(10 - 50_000));

        let ands = format!("1{}", " and 1".repeat(100_000));
        assert_eq!(eval(&ands, &mut ns), Value::Int(1));
        let ors = format!("0{} or 'x'", " or 0".repeat(100_000));
        assert_eq!(eval(&ors, &mut ns), Value::str("x"));
    }

    #[test]
    fn test_del_unknown_name() {
        let mut ns = Namespace::new();
        let err = execute("del nothing", &mut ns).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::NameError);
    }
}
