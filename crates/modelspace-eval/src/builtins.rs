//! Builtin functions, reachable when a called name is not in the namespace.
//!
//! Builtins receive their arguments unevaluated so `IF`, `AND` and `OR` can
//! short-circuit. Names are matched case-insensitively.

use modelspace_common::{ModelError, ModelResult, Value};
use modelspace_parse::Argument;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::interpreter::{Interpreter, to_text};

pub(crate) type BuiltinFn = fn(&mut Interpreter<'_, '_>, &[Argument]) -> ModelResult<Value>;

static BUILTINS: Lazy<FxHashMap<&'static str, BuiltinFn>> = Lazy::new(|| {
    let mut m: FxHashMap<&'static str, BuiltinFn> = FxHashMap::default();
    m.insert("IF", if_fn);
    m.insert("AND", and_fn);
    m.insert("OR", or_fn);
    m.insert("NOT", not_fn);
    m.insert("SUM", sum_fn);
    m.insert("MIN", min_fn);
    m.insert("MAX", max_fn);
    m.insert("ABS", abs_fn);
    m.insert("LEN", len_fn);
    m.insert("SELF", self_fn);
    m
});

pub(crate) fn get(name: &str) -> Option<BuiltinFn> {
    BUILTINS.get(name.to_ascii_uppercase().as_str()).copied()
}

/// Names of every builtin, uppercase.
pub fn builtin_names() -> Vec<&'static str> {
    let mut names: Vec<_> = BUILTINS.keys().copied().collect();
    names.sort_unstable();
    names
}

fn check_args<'a>(
    name: &str,
    args: &'a [Argument],
    min: usize,
    max: Option<usize>,
) -> ModelResult<&'a [Argument]> {
    if args.iter().any(|a| a.name.is_some()) {
        return Err(ModelError::arity(format!(
            "{name}() takes no named arguments"
        )));
    }
    if args.len() < min || max.is_some_and(|m| args.len() > m) {
        let expected = match max {
            Some(m) if m == min => format!("{min}"),
            Some(m) => format!("{min} to {m}"),
            None => format!("at least {min}"),
        };
        return Err(ModelError::arity(format!(
            "{name}() takes {expected} arguments but {} were given",
            args.len()
        )));
    }
    Ok(args)
}

fn if_fn(interp: &mut Interpreter<'_, '_>, args: &[Argument]) -> ModelResult<Value> {
    let args = check_args("IF", args, 2, Some(3))?;
    if interp.evaluate_ast(&args[0].value)?.is_truthy() {
        interp.evaluate_ast(&args[1].value)
    } else {
        match args.get(2) {
            Some(arg) => interp.evaluate_ast(&arg.value),
            None => Ok(Value::Bool(false)),
        }
    }
}

fn and_fn(interp: &mut Interpreter<'_, '_>, args: &[Argument]) -> ModelResult<Value> {
    for arg in check_args("AND", args, 1, None)? {
        if !interp.evaluate_ast(&arg.value)?.is_truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn or_fn(interp: &mut Interpreter<'_, '_>, args: &[Argument]) -> ModelResult<Value> {
    for arg in check_args("OR", args, 1, None)? {
        if interp.evaluate_ast(&arg.value)?.is_truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn not_fn(interp: &mut Interpreter<'_, '_>, args: &[Argument]) -> ModelResult<Value> {
    let args = check_args("NOT", args, 1, Some(1))?;
    Ok(Value::Bool(!interp.evaluate_ast(&args[0].value)?.is_truthy()))
}

/// Evaluate every argument and flatten arrays one level deep or more.
fn numeric_args(
    name: &str,
    interp: &mut Interpreter<'_, '_>,
    args: &[Argument],
) -> ModelResult<Vec<Value>> {
    fn flatten(name: &str, v: Value, out: &mut Vec<Value>) -> ModelResult<()> {
        match v {
            Value::Array(items) => {
                for item in items {
                    flatten(name, item, out)?;
                }
            }
            Value::Empty => {}
            v @ (Value::Int(_) | Value::Number(_) | Value::Bool(_)) => out.push(v),
            other => {
                return Err(ModelError::type_error(format!(
                    "{name}() cannot use a '{}' value",
                    other.type_name()
                )));
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    for arg in check_args(name, args, 0, None)? {
        let v = interp.evaluate_ast(&arg.value)?;
        flatten(name, v, &mut out)?;
    }
    Ok(out)
}

fn sum_fn(interp: &mut Interpreter<'_, '_>, args: &[Argument]) -> ModelResult<Value> {
    let values = numeric_args("SUM", interp, args)?;
    let mut int_sum: Option<i64> = Some(0);
    let mut float_sum = 0.0;
    for v in &values {
        int_sum = match (int_sum, v) {
            (Some(acc), Value::Int(i)) => acc.checked_add(*i),
            _ => None,
        };
        float_sum += v.as_number().unwrap_or(0.0);
    }
    Ok(int_sum.map(Value::Int).unwrap_or(Value::Number(float_sum)))
}

fn extremum(
    name: &str,
    interp: &mut Interpreter<'_, '_>,
    args: &[Argument],
    pick_new: fn(f64, f64) -> bool,
) -> ModelResult<Value> {
    let values = numeric_args(name, interp, args)?;
    let mut best: Option<(f64, Value)> = None;
    for v in values {
        let n = v.as_number().unwrap_or(0.0);
        match &best {
            Some((current, _)) if !pick_new(n, *current) => {}
            _ => best = Some((n, v)),
        }
    }
    Ok(best.map(|(_, v)| v).unwrap_or(Value::Int(0)))
}

fn min_fn(interp: &mut Interpreter<'_, '_>, args: &[Argument]) -> ModelResult<Value> {
    extremum("MIN", interp, args, |new, cur| new < cur)
}

fn max_fn(interp: &mut Interpreter<'_, '_>, args: &[Argument]) -> ModelResult<Value> {
    extremum("MAX", interp, args, |new, cur| new > cur)
}

fn abs_fn(interp: &mut Interpreter<'_, '_>, args: &[Argument]) -> ModelResult<Value> {
    let args = check_args("ABS", args, 1, Some(1))?;
    match interp.evaluate_ast(&args[0].value)? {
        Value::Int(i) => Ok(i
            .checked_abs()
            .map(Value::Int)
            .unwrap_or(Value::Number((i as f64).abs()))),
        Value::Number(n) => Ok(Value::Number(n.abs())),
        other => Err(ModelError::type_error(format!(
            "ABS() cannot use a '{}' value",
            other.type_name()
        ))),
    }
}

fn len_fn(interp: &mut Interpreter<'_, '_>, args: &[Argument]) -> ModelResult<Value> {
    let args = check_args("LEN", args, 1, Some(1))?;
    let n = match interp.evaluate_ast(&args[0].value)? {
        Value::Array(items) => items.len(),
        Value::Text(s) => s.chars().count(),
        other => to_text(&other).chars().count(),
    };
    Ok(Value::Int(n as i64))
}

fn self_fn(interp: &mut Interpreter<'_, '_>, args: &[Argument]) -> ModelResult<Value> {
    check_args("SELF", args, 0, Some(0))?;
    Ok(Value::Space(interp.context().current_space()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(get("sum").is_some());
        assert!(get("If").is_some());
        assert!(get("VLOOKUP").is_none());
    }

    #[test]
    fn names_are_sorted() {
        let names = builtin_names();
        assert_eq!(names.first(), Some(&"ABS"));
        assert!(names.contains(&"SELF"));
    }
}
