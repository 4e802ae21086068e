//! Builtin functions.

use std::cmp::Ordering;
use std::io::Write;

use super::ast::BinOp;
use super::exception::{EvalResult, Exception};
use super::ops;
use super::value::{Dict, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Abs,
    Bool,
    Dict,
    Float,
    Int,
    Len,
    List,
    Max,
    Min,
    Print,
    Range,
    Repr,
    Round,
    Sorted,
    Str,
    Sum,
    Tuple,
    Type,
}

impl Builtin {
    pub const ALL: [Builtin; 18] = [
        Builtin::Abs,
        Builtin::Bool,
        Builtin::Dict,
        Builtin::Float,
        Builtin::Int,
        Builtin::Len,
        Builtin::List,
        Builtin::Max,
        Builtin::Min,
        Builtin::Print,
        Builtin::Range,
        Builtin::Repr,
        Builtin::Round,
        Builtin::Sorted,
        Builtin::Str,
        Builtin::Sum,
        Builtin::Tuple,
        Builtin::Type,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::Bool => "bool",
            Builtin::Dict => "dict",
            Builtin::Float => "float",
            Builtin::Int => "int",
            Builtin::Len => "len",
            Builtin::List => "list",
            Builtin::Max => "max",
            Builtin::Min => "min",
            Builtin::Print => "print",
            Builtin::Range => "range",
            Builtin::Repr => "repr",
            Builtin::Round => "round",
            Builtin::Sorted => "sorted",
            Builtin::Str => "str",
            Builtin::Sum => "sum",
            Builtin::Tuple => "tuple",
            Builtin::Type => "type",
        }
    }

    pub fn lookup(name: &str) -> Option<Builtin> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn call(self, args: Vec<Value>) -> EvalResult<Value> {
        match self {
            Builtin::Abs => {
                let [x] = exactly(self, args)?;
                match x {
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    other => match other.as_int() {
                        Some(n) => n.checked_abs().map(Value::Int).ok_or_else(Exception::overflow),
                        None => Err(bad_operand(self, &other)),
                    },
                }
            }
            Builtin::Bool => {
                let x = at_most_one(self, args)?;
                Ok(Value::Bool(x.map(|v| v.is_truthy()).unwrap_or(false)))
            }
            Builtin::Dict => match at_most_one(self, args)? {
                None => Ok(Value::dict(Dict::new())),
                Some(Value::Dict(dict)) => Ok(Value::dict(dict.borrow().clone())),
                Some(iterable) => {
                    let mut dict = Dict::new();
                    for (i, pair) in ops::iterate(&iterable)?.into_iter().enumerate() {
                        let items = ops::iterate(&pair)?;
                        let [key, value]: [Value; 2] = items.try_into().map_err(|items: Vec<Value>| {
                            Exception::value(format!(
                                "dictionary update sequence element #{} has length {}; 2 is required",
                                i,
                                items.len()
                            ))
                        })?;
                        key.check_hashable()?;
                        dict.insert(key, value);
                    }
                    Ok(Value::dict(dict))
                }
            },
            Builtin::Float => match at_most_one(self, args)? {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => parse_float(&s)
                    .map(Value::Float)
                    .ok_or_else(|| {
                        Exception::value(format!(
                            "could not convert string to float: {}",
                            Value::Str(s.clone()).repr()
                        ))
                    }),
                Some(other) => other
                    .as_float()
                    .map(Value::Float)
                    .ok_or_else(|| bad_argument(self, "a string or a number", &other)),
            },
            Builtin::Int => match at_most_one(self, args)? {
                None => Ok(Value::Int(0)),
                Some(Value::Float(f)) => {
                    if f.is_nan() {
                        Err(Exception::value("cannot convert float NaN to integer"))
                    } else if f.is_infinite() || f.trunc().abs() >= 9.223_372_036_854_775_808e18 {
                        Err(Exception::overflow())
                    } else {
                        Ok(Value::Int(f.trunc() as i64))
                    }
                }
                Some(Value::Str(s)) => s
                    .trim()
                    .replace('_', "")
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| {
                        Exception::value(format!(
                            "invalid literal for int() with base 10: {}",
                            Value::Str(s.clone()).repr()
                        ))
                    }),
                Some(other) => other
                    .as_int()
                    .map(Value::Int)
                    .ok_or_else(|| bad_argument(self, "a string or a number", &other)),
            },
            Builtin::Len => {
                let [x] = exactly(self, args)?;
                let len = match &x {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => items.borrow().len(),
                    Value::Tuple(items) => items.len(),
                    Value::Dict(dict) => dict.borrow().len(),
                    other => {
                        return Err(Exception::type_error(format!(
                            "object of type '{}' has no len()",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Int(len as i64))
            }
            Builtin::List => match at_most_one(self, args)? {
                None => Ok(Value::list(Vec::new())),
                Some(iterable) => Ok(Value::list(ops::iterate(&iterable)?)),
            },
            Builtin::Tuple => match at_most_one(self, args)? {
                None => Ok(Value::tuple(Vec::new())),
                Some(Value::Tuple(items)) => Ok(Value::Tuple(items)),
                Some(iterable) => Ok(Value::tuple(ops::iterate(&iterable)?)),
            },
            Builtin::Max => extreme(self, args, Ordering::Greater),
            Builtin::Min => extreme(self, args, Ordering::Less),
            Builtin::Print => {
                let line = args
                    .iter()
                    .map(Value::to_display)
                    .collect::<Vec<_>>()
                    .join(" ");
                // stdout carries the protocol
                let _ = writeln!(std::io::stderr(), "{}", line);
                Ok(Value::None)
            }
            Builtin::Range => range(args),
            Builtin::Repr => {
                let [x] = exactly(self, args)?;
                Ok(Value::str(x.repr()))
            }
            Builtin::Round => round(args),
            Builtin::Sorted => {
                let [iterable] = exactly(self, args)?;
                let mut items = ops::iterate(&iterable)?;
                sort(&mut items)?;
                Ok(Value::list(items))
            }
            Builtin::Str => Ok(Value::str(
                at_most_one(self, args)?
                    .map(|v| v.to_display())
                    .unwrap_or_default(),
            )),
            Builtin::Sum => {
                if args.is_empty() || args.len() > 2 {
                    return Err(arity(self, "1 or 2", args.len()));
                }
                let mut args = args.into_iter();
                let iterable = args.next().unwrap_or(Value::None);
                let start = args.next().unwrap_or(Value::Int(0));
                if let Value::Str(_) = start {
                    return Err(Exception::type_error(
                        "sum() can't sum strings [use ''.join(seq) instead]",
                    ));
                }
                ops::iterate(&iterable)?
                    .iter()
                    .try_fold(start, |total, item| ops::binary(BinOp::Add, &total, item))
            }
            Builtin::Type => {
                let [x] = exactly(self, args)?;
                Ok(Value::str(x.type_name()))
            }
        }
    }
}

fn arity(builtin: Builtin, expected: &str, got: usize) -> Exception {
    Exception::type_error(format!(
        "{}() takes {} argument(s) ({} given)",
        builtin.name(),
        expected,
        got
    ))
}

fn bad_operand(builtin: Builtin, value: &Value) -> Exception {
    Exception::type_error(format!(
        "bad operand type for {}(): '{}'",
        builtin.name(),
        value.type_name()
    ))
}

fn bad_argument(builtin: Builtin, expected: &str, value: &Value) -> Exception {
    Exception::type_error(format!(
        "{}() argument must be {}, not '{}'",
        builtin.name(),
        expected,
        value.type_name()
    ))
}

fn exactly<const N: usize>(builtin: Builtin, args: Vec<Value>) -> EvalResult<[Value; N]> {
    let got = args.len();
    args.try_into()
        .map_err(|_| arity(builtin, &N.to_string(), got))
}

fn at_most_one(builtin: Builtin, args: Vec<Value>) -> EvalResult<Option<Value>> {
    if args.len() > 1 {
        return Err(arity(builtin, "at most 1", args.len()));
    }
    Ok(args.into_iter().next())
}

fn parse_float(text: &str) -> Option<f64> {
    let text = text.trim().replace('_', "");
    match text.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        "nan" | "+nan" | "-nan" => Some(f64::NAN),
        _ => text.parse::<f64>().ok().filter(|f| f.is_finite()),
    }
}

/// `max`/`min`: a single iterable or two or more positional arguments.
fn extreme(builtin: Builtin, args: Vec<Value>, keep: Ordering) -> EvalResult<Value> {
    let items = match args.len() {
        0 => return Err(arity(builtin, "at least 1", 0)),
        1 => ops::iterate(&args[0])?,
        _ => args,
    };
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return Err(Exception::value(format!(
            "{}() arg is an empty sequence",
            builtin.name()
        )));
    };
    let op = if keep == Ordering::Greater { ">" } else { "<" };
    for item in iter {
        if item.compare(&best, op)? == Some(keep) {
            best = item;
        }
    }
    Ok(best)
}

fn range(args: Vec<Value>) -> EvalResult<Value> {
    let ints = args
        .iter()
        .map(|v| {
            v.as_int().ok_or_else(|| {
                Exception::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            })
        })
        .collect::<EvalResult<Vec<i64>>>()?;

    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(arity(Builtin::Range, "1 to 3", ints.len())),
    };
    if step == 0 {
        return Err(Exception::value("range() arg 3 must not be zero"));
    }

    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let len = if step > 0 && start < stop {
        (stop - start - 1) / step + 1
    } else if step < 0 && start > stop {
        (start - stop - 1) / -step + 1
    } else {
        0
    };

    let len = usize::try_from(len).map_err(|_| Exception::memory())?;
    let mut items = Vec::new();
    items
        .try_reserve_exact(len)
        .map_err(|_| Exception::memory())?;
    // every element lies between start and stop, so it fits in i64
    items.extend((0..len).map(|i| Value::Int((start + step * i as i128) as i64)));
    Ok(Value::list(items))
}

/// Round half to even.
fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        rounded
    }
}

fn round(args: Vec<Value>) -> EvalResult<Value> {
    let (number, digits) = match args.as_slice() {
        [number] => (number.clone(), None),
        [number, Value::None] => (number.clone(), None),
        [number, digits] => {
            let digits = digits.as_int().ok_or_else(|| {
                Exception::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    digits.type_name()
                ))
            })?;
            (number.clone(), Some(digits))
        }
        _ => return Err(arity(Builtin::Round, "1 or 2", args.len())),
    };

    match (&number, digits) {
        (Value::Float(f), None) => {
            if !f.is_finite() {
                return Err(Exception::overflow());
            }
            let rounded = round_half_even(*f);
            if rounded.abs() >= 9.223_372_036_854_775_808e18 {
                return Err(Exception::overflow());
            }
            Ok(Value::Int(rounded as i64))
        }
        (Value::Float(f), Some(digits)) => {
            let digits = digits.clamp(-308, 308) as i32;
            let scale = 10f64.powi(digits);
            let scaled = f * scale;
            if !scaled.is_finite() {
                return Ok(Value::Float(*f));
            }
            Ok(Value::Float(round_half_even(scaled) / scale))
        }
        (other, _) => match other.as_int() {
            Some(n) => Ok(Value::Int(n)),
            None => Err(Exception::type_error(format!(
                "type {} doesn't define __round__ method",
                other.type_name()
            ))),
        },
    }
}

/// Stable bottom-up merge sort that stops at the first failed comparison.
///
/// `slice::sort_by` requires a total order, which mixed or NaN values do
/// not provide.
fn sort(items: &mut Vec<Value>) -> EvalResult<()> {
    let len = items.len();
    let mut run = std::mem::take(items);
    let mut width = 1;

    while width < len {
        let mut merged = Vec::with_capacity(len);
        for start in (0..len).step_by(2 * width) {
            let mid = (start + width).min(len);
            let end = (start + 2 * width).min(len);
            let (mut i, mut j) = (start, mid);
            while i < mid && j < end {
                if run[j].compare(&run[i], "<")? == Some(Ordering::Less) {
                    merged.push(run[j].clone());
                    j += 1;
                } else {
                    merged.push(run[i].clone());
                    i += 1;
                }
            }
            merged.extend_from_slice(&run[i..mid]);
            merged.extend_from_slice(&run[j..end]);
        }
        run = merged;
        width *= 2;
    }

    *items = run;
    Ok(())
}
