//! Tree-walking evaluation of compiled formulas.

use crate::error::FormulaError;
use crate::{BinOp, CmpOp, Expr, Function};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

/// A runtime value inside a formula.
///
/// `None` is the distinguished "unset" value cooperative parameters take
/// before both sides agree: it compares unequal to every string, and any
/// arithmetic touching it fails that formula (callers catch and zero the
/// delta).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Num(f64),
    Str(String),
    None,
    List(Vec<Value>),
}

impl Value {
    /// Python-style truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Num(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::None => false,
            Value::List(items) => !items.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Num(_) => "number",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::None => "none",
            Value::List(_) => "list",
        }
    }
}

/// Name resolution for evaluation.
///
/// Implemented for the std map types so callers can pass whatever scope map
/// they already hold (including `FxHashMap`, which is a `HashMap` with a
/// different hasher).
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl<S: BuildHasher> Scope for HashMap<String, Value, S> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Scope for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Round half to even, the source language's `round()`.
///
/// `round(2.5) == 2`, `round(-4.5) == -4`, `round(3.5) == 4`.
pub fn round_half_even(x: f64) -> f64 {
    let floor = x.floor();
    let diff = x - floor;
    if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

fn as_number(v: &Value, operation: &'static str) -> Result<f64, FormulaError> {
    match v {
        Value::Num(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::None => Err(FormulaError::NoneOperand { operation }),
        other => Err(FormulaError::TypeMismatch {
            operation,
            operand: other.type_name().to_string(),
        }),
    }
}

fn finite(n: f64, operation: &'static str) -> Result<f64, FormulaError> {
    if n.is_finite() {
        Ok(n)
    } else {
        Err(FormulaError::NonFinite { operation })
    }
}

/// Equality across values: numbers and bools compare numerically, strings
/// compare as strings, `None` equals only `None`, everything else is
/// unequal. Never an error.
fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Num(_) | Value::Bool(_), Value::Num(_) | Value::Bool(_)) => {
            let x = as_number(a, "==").unwrap_or(f64::NAN);
            let y = as_number(b, "==").unwrap_or(f64::NAN);
            x == y
        }
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::None, Value::None) => true,
        _ => false,
    }
}

fn value_cmp(a: &Value, b: &Value) -> Result<std::cmp::Ordering, FormulaError> {
    match (a, b) {
        (Value::Num(_) | Value::Bool(_), Value::Num(_) | Value::Bool(_)) => {
            let x = as_number(a, "comparison")?;
            let y = as_number(b, "comparison")?;
            x.partial_cmp(&y).ok_or(FormulaError::NonFinite {
                operation: "comparison",
            })
        }
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (other, _) => Err(FormulaError::TypeMismatch {
            operation: "comparison",
            operand: other.type_name().to_string(),
        }),
    }
}

pub(crate) fn eval_expr(expr: &Expr, scope: &dyn Scope) -> Result<Value, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(Value::Num(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(item, scope)?);
            }
            Ok(Value::List(out))
        }
        Expr::Name(name) => scope
            .lookup(name)
            .cloned()
            .ok_or_else(|| FormulaError::UnknownName { name: name.clone() }),
        Expr::Neg(operand) => {
            let n = as_number(&eval_expr(operand, scope)?, "negation")?;
            Ok(Value::Num(-n))
        }
        Expr::Not(operand) => Ok(Value::Bool(!eval_expr(operand, scope)?.truthy())),
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, scope),
        Expr::Compare { op, lhs, rhs } => {
            let a = eval_expr(lhs, scope)?;
            let b = eval_expr(rhs, scope)?;
            let result = match op {
                CmpOp::Eq => value_eq(&a, &b),
                CmpOp::Ne => !value_eq(&a, &b),
                CmpOp::Lt => value_cmp(&a, &b)?.is_lt(),
                CmpOp::Le => value_cmp(&a, &b)?.is_le(),
                CmpOp::Gt => value_cmp(&a, &b)?.is_gt(),
                CmpOp::Ge => value_cmp(&a, &b)?.is_ge(),
                CmpOp::In => match &b {
                    Value::List(items) => items.iter().any(|item| value_eq(&a, item)),
                    other => {
                        return Err(FormulaError::TypeMismatch {
                            operation: "membership",
                            operand: other.type_name().to_string(),
                        })
                    }
                },
            };
            Ok(Value::Bool(result))
        }
        Expr::Conditional { cond, then, orelse } => {
            if eval_expr(cond, scope)?.truthy() {
                eval_expr(then, scope)
            } else {
                eval_expr(orelse, scope)
            }
        }
        Expr::Call { function, args } => eval_call(*function, args, scope),
    }
}

fn eval_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    scope: &dyn Scope,
) -> Result<Value, FormulaError> {
    // `and`/`or` short-circuit and return an operand, Python-style.
    match op {
        BinOp::And => {
            let a = eval_expr(lhs, scope)?;
            return if a.truthy() { eval_expr(rhs, scope) } else { Ok(a) };
        }
        BinOp::Or => {
            let a = eval_expr(lhs, scope)?;
            return if a.truthy() { Ok(a) } else { eval_expr(rhs, scope) };
        }
        _ => {}
    }

    let (operation, a, b) = match op {
        BinOp::Add => ("addition", lhs, rhs),
        BinOp::Sub => ("subtraction", lhs, rhs),
        BinOp::Mul => ("multiplication", lhs, rhs),
        BinOp::Div => ("division", lhs, rhs),
        BinOp::Pow => ("exponentiation", lhs, rhs),
        BinOp::And | BinOp::Or => unreachable!(),
    };
    let x = as_number(&eval_expr(a, scope)?, operation)?;
    let y = as_number(&eval_expr(b, scope)?, operation)?;
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
        BinOp::Pow => x.powf(y),
        BinOp::And | BinOp::Or => unreachable!(),
    };
    Ok(Value::Num(finite(result, operation)?))
}

fn eval_call(
    function: Function,
    args: &[Expr],
    scope: &dyn Scope,
) -> Result<Value, FormulaError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_expr(arg, scope)?);
    }

    let unary = |values: &[Value]| -> Result<f64, FormulaError> {
        match values {
            [v] => as_number(v, function.name()),
            _ => Err(FormulaError::Arity {
                function: function.name(),
                expected: "1",
                got: values.len(),
            }),
        }
    };

    let result = match function {
        Function::Round => round_half_even(unary(&values)?),
        Function::Int => match &values[..] {
            [Value::Num(n)] => n.trunc(),
            [Value::Bool(b)] => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            [other] => {
                return Err(FormulaError::TypeMismatch {
                    operation: "int",
                    operand: other.type_name().to_string(),
                })
            }
            _ => {
                return Err(FormulaError::Arity {
                    function: "int",
                    expected: "1",
                    got: values.len(),
                })
            }
        },
        Function::Abs => unary(&values)?.abs(),
        Function::Sqrt => {
            let n = unary(&values)?;
            if n < 0.0 {
                return Err(FormulaError::Domain {
                    function: "sqrt",
                    argument: n,
                });
            }
            n.sqrt()
        }
        Function::Log => {
            let n = unary(&values)?;
            if n <= 0.0 {
                return Err(FormulaError::Domain {
                    function: "log",
                    argument: n,
                });
            }
            n.ln()
        }
        Function::Exp => finite(unary(&values)?.exp(), "exp")?,
        Function::Tanh => unary(&values)?.tanh(),
        Function::Min | Function::Max => {
            let numbers = spread_numbers(&values, function.name())?;
            let fold = if function == Function::Min {
                f64::min
            } else {
                f64::max
            };
            numbers
                .into_iter()
                .reduce(fold)
                .ok_or(FormulaError::Arity {
                    function: function.name(),
                    expected: "at least 1",
                    got: 0,
                })?
        }
        Function::Mean => {
            let numbers = spread_numbers(&values, "mean")?;
            if numbers.is_empty() {
                return Err(FormulaError::Arity {
                    function: "mean",
                    expected: "at least 1",
                    got: 0,
                });
            }
            numbers.iter().sum::<f64>() / numbers.len() as f64
        }
    };
    Ok(Value::Num(finite(result, function.name())?))
}

/// Flatten call arguments to numbers, unwrapping a single list argument
/// (`min(a, b)` and `mean([a, b])` both work).
fn spread_numbers(values: &[Value], operation: &'static str) -> Result<Vec<f64>, FormulaError> {
    let items: &[Value] = match values {
        [Value::List(items)] => items,
        other => other,
    };
    items.iter().map(|v| as_number(v, operation)).collect()
}

/// Coerce an evaluated value to an integer delta: truncation toward zero
/// for numbers, 0/1 for booleans, error otherwise.
pub(crate) fn to_delta(value: Value) -> Result<i64, FormulaError> {
    match value {
        Value::Num(n) => {
            let t = n.trunc();
            if t >= i64::MIN as f64 && t <= i64::MAX as f64 {
                Ok(t as i64)
            } else {
                Err(FormulaError::NonFinite { operation: "delta" })
            }
        }
        Value::Bool(b) => Ok(if b { 1 } else { 0 }),
        other => Err(FormulaError::TypeMismatch {
            operation: "delta",
            operand: other.type_name().to_string(),
        }),
    }
}
