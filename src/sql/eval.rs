//! Expression evaluation over stored rows.

use std::cmp::Ordering;

use serde_json::Value;

use super::ast::{BinaryOperator, Expr, UnaryOperator};
use super::error::{EvalError, EvalResult};

/// A row addressed by column name.
pub struct RowView<'a> {
    names: &'a [String],
    values: &'a [Value],
}

impl<'a> RowView<'a> {
    pub fn new(names: &'a [String], values: &'a [Value]) -> Self {
        Self { names, values }
    }

    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.names
            .iter()
            .position(|name| name == column)
            .and_then(|idx| self.values.get(idx))
    }
}

/// Evaluate an expression against a row.
pub fn evaluate(expr: &Expr, row: &RowView<'_>) -> EvalResult<Value> {
    match expr {
        Expr::Column(name) => row
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::ColumnNotFound(name.clone())),

        Expr::Literal(lit) => Ok(lit.to_json()),

        Expr::BinaryOp { left, op, right } => {
            let l = evaluate(left, row)?;
            let r = evaluate(right, row)?;
            eval_binary_op(&l, *op, &r)
        }

        Expr::UnaryOp { op, expr } => {
            let v = evaluate(expr, row)?;
            Ok(eval_unary_op(*op, &v))
        }

        Expr::IsNull { expr, negated } => {
            let is_null = evaluate(expr, row)?.is_null();
            Ok(Value::Bool(is_null != *negated))
        }

        Expr::InList { expr, list, negated } => {
            let v = evaluate(expr, row)?;
            let mut found = false;
            for item in list {
                if values_equal(&v, &evaluate(item, row)?) {
                    found = true;
                    break;
                }
            }
            Ok(Value::Bool(found != *negated))
        }

        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let v = evaluate(expr, row)?;
            let l = evaluate(low, row)?;
            let h = evaluate(high, row)?;
            let in_range = matches!(compare_values(&v, &l), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare_values(&v, &h), Some(Ordering::Less | Ordering::Equal));
            Ok(Value::Bool(in_range != *negated))
        }

        Expr::Like { expr, pattern, negated } => {
            let v = evaluate(expr, row)?;
            let matched = v.as_str().map(|s| like_match(s, pattern)).unwrap_or(false);
            Ok(Value::Bool(matched != *negated))
        }

        Expr::Nested(inner) => evaluate(inner, row),
    }
}

/// Evaluate a WHERE clause, returning true if the row matches.
pub fn matches_filter(expr: &Expr, row: &RowView<'_>) -> EvalResult<bool> {
    Ok(value_to_bool(&evaluate(expr, row)?))
}

fn eval_binary_op(left: &Value, op: BinaryOperator, right: &Value) -> EvalResult<Value> {
    let cmp = || compare_values(left, right);
    match op {
        BinaryOperator::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOperator::NotEq => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOperator::Lt => Ok(Value::Bool(cmp() == Some(Ordering::Less))),
        BinaryOperator::LtEq => Ok(Value::Bool(matches!(cmp(), Some(Ordering::Less | Ordering::Equal)))),
        BinaryOperator::Gt => Ok(Value::Bool(cmp() == Some(Ordering::Greater))),
        BinaryOperator::GtEq => Ok(Value::Bool(matches!(cmp(), Some(Ordering::Greater | Ordering::Equal)))),

        BinaryOperator::And => Ok(Value::Bool(value_to_bool(left) && value_to_bool(right))),
        BinaryOperator::Or => Ok(Value::Bool(value_to_bool(left) || value_to_bool(right))),

        BinaryOperator::Plus => Ok(eval_arithmetic(left, right, |a, b| a + b)),
        BinaryOperator::Minus => Ok(eval_arithmetic(left, right, |a, b| a - b)),
        BinaryOperator::Multiply => Ok(eval_arithmetic(left, right, |a, b| a * b)),
        BinaryOperator::Divide => {
            if value_to_f64(right) == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(eval_arithmetic(left, right, |a, b| a / b))
            }
        }
        BinaryOperator::Modulo => Ok(eval_arithmetic(left, right, |a, b| a % b)),

        BinaryOperator::Concat => Ok(Value::String(format!(
            "{}{}",
            value_to_string(left),
            value_to_string(right)
        ))),
    }
}

fn eval_unary_op(op: UnaryOperator, value: &Value) -> Value {
    match op {
        UnaryOperator::Not => Value::Bool(!value_to_bool(value)),
        UnaryOperator::Minus => match value.as_i64() {
            Some(n) => Value::Number((-n).into()),
            None => float_value(-value_to_f64(value)),
        },
        UnaryOperator::Plus => value.clone(),
    }
}

fn eval_arithmetic<F>(left: &Value, right: &Value, f: F) -> Value
where
    F: Fn(f64, f64) -> f64,
{
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    let result = f(value_to_f64(left), value_to_f64(right));

    // integer in, integer out when the result is whole
    if left.is_i64() && right.is_i64() && result.fract() == 0.0 {
        Value::Number((result as i64).into())
    } else {
        float_value(result)
    }
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// SQL-style equality: null equals nothing, numbers compare by value.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Order two values of the same kind; `None` for nulls or mixed kinds.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Some(x.cmp(&y));
            }
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn value_to_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn value_to_f64(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        _ => v.to_string(),
    }
}

/// SQL LIKE: `%` matches any run, `_` a single character.
fn like_match(s: &str, pattern: &str) -> bool {
    let s: Vec<char> = s.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    match_like(&s, &p)
}

fn match_like(s: &[char], p: &[char]) -> bool {
    match p.split_first() {
        None => s.is_empty(),
        Some(('%', rest)) => (0..=s.len()).any(|i| match_like(&s[i..], rest)),
        Some(('_', rest)) => !s.is_empty() && match_like(&s[1..], rest),
        Some((c, rest)) => s.first() == Some(c) && match_like(&s[1..], rest),
    }
}
