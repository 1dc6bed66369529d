use std::cmp::Ordering;

use modelspace_common::{ErrorKind, ModelError, ModelResult, Value};
use modelspace_parse::{ASTNode, ASTNodeType, Argument};

use crate::builtins;
use crate::traits::FormulaContext;

/// Tree-walking evaluator for expression formulas.
///
/// `locals` are the bound parameters of the formula being evaluated; they
/// shadow namespace names, which in turn shadow builtins.
pub struct Interpreter<'a, 'c> {
    ctx: &'a mut (dyn FormulaContext + 'c),
    locals: &'a [(&'a str, Value)],
}

impl<'a, 'c> Interpreter<'a, 'c> {
    pub fn new(ctx: &'a mut (dyn FormulaContext + 'c), locals: &'a [(&'a str, Value)]) -> Self {
        Self { ctx, locals }
    }

    pub fn context(&mut self) -> &mut (dyn FormulaContext + 'c) {
        &mut *self.ctx
    }

    fn local(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    pub fn evaluate_ast(&mut self, node: &ASTNode) -> ModelResult<Value> {
        match &node.node_type {
            ASTNodeType::Literal(v) => Ok(v.clone()),
            ASTNodeType::Name(name) => match self.local(name) {
                Some(v) => Ok(v.clone()),
                None => self.ctx.lookup(name),
            },
            ASTNodeType::Attribute { target, name } => {
                let target = self.evaluate_ast(target)?;
                self.ctx.attr(&target, name)
            }
            ASTNodeType::Call { callee, args } => self.eval_call(node, callee, args),
            ASTNodeType::Index { target, args } => self.eval_index(target, args),
            ASTNodeType::UnaryOp { op, expr } => self.eval_unary(op, expr),
            ASTNodeType::BinaryOp { op, left, right } => self.eval_binary(op, left, right),
            ASTNodeType::Array(items) => items
                .iter()
                .map(|item| self.evaluate_ast(item))
                .collect::<ModelResult<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /* ===================  calls  =================== */
    fn eval_call(
        &mut self,
        node: &ASTNode,
        callee: &ASTNode,
        args: &[Argument],
    ) -> ModelResult<Value> {
        let target = match callee.as_name() {
            Some(name) => match self.local(name) {
                Some(v) => v.clone(),
                None if name.eq_ignore_ascii_case("LAMBDA") => {
                    return Err(ModelError::Formula {
                        message: "LAMBDA is only allowed at the top of a formula".to_string(),
                        position: node.position().unwrap_or(0),
                    });
                }
                None => match self.ctx.lookup(name) {
                    Ok(v) => v,
                    Err(e) if e.kind() == ErrorKind::Lookup => match builtins::get(name) {
                        Some(builtin) => return builtin(self, args),
                        None => return Err(e),
                    },
                    Err(e) => return Err(e),
                },
            },
            None => self.evaluate_ast(callee)?,
        };

        let (positional, named) = self.eval_arguments(args)?;
        self.ctx.call(&target, &positional, &named)
    }

    fn eval_index(&mut self, target: &ASTNode, args: &[Argument]) -> ModelResult<Value> {
        let target = self.evaluate_ast(target)?;
        let (positional, named) = self.eval_arguments(args)?;
        match target {
            Value::Array(items) => {
                let index = match (positional.as_slice(), named.is_empty()) {
                    ([i], true) => i.as_int(),
                    _ => None,
                };
                let Some(index) = index else {
                    return Err(ModelError::type_error("array index must be one integer"));
                };
                usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .ok_or_else(|| ModelError::type_error(format!("index {index} out of range")))
            }
            space @ Value::Space(_) => self.ctx.call(&space, &positional, &named),
            other => Err(ModelError::type_error(format!(
                "'{}' value is not indexable",
                other.type_name()
            ))),
        }
    }

    /// Evaluate call arguments into positional values and `(name, value)` pairs.
    pub(crate) fn eval_arguments(
        &mut self,
        args: &[Argument],
    ) -> ModelResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut positional = Vec::with_capacity(args.len());
        let mut named = Vec::new();
        for arg in args {
            let value = self.evaluate_ast(&arg.value)?;
            match &arg.name {
                Some(name) => named.push((name.clone(), value)),
                None if !named.is_empty() => {
                    return Err(ModelError::arity(
                        "positional argument follows named argument",
                    ));
                }
                None => positional.push(value),
            }
        }
        Ok((positional, named))
    }

    /* ===================  unary ops  =================== */
    fn eval_unary(&mut self, op: &str, expr: &ASTNode) -> ModelResult<Value> {
        let v = self.evaluate_ast(expr)?;
        match (op, v) {
            ("+", v @ (Value::Int(_) | Value::Number(_))) => Ok(v),
            ("-", Value::Int(i)) => Ok(i
                .checked_neg()
                .map(Value::Int)
                .unwrap_or(Value::Number(-(i as f64)))),
            ("-", Value::Number(n)) => Ok(Value::Number(-n)),
            (op, v) => Err(ModelError::type_error(format!(
                "bad operand type for unary {op}: {}",
                v.type_name()
            ))),
        }
    }

    /* ===================  binary ops  =================== */
    fn eval_binary(&mut self, op: &str, left: &ASTNode, right: &ASTNode) -> ModelResult<Value> {
        let l = self.evaluate_ast(left)?;
        let r = self.evaluate_ast(right)?;

        match op {
            "=" | "<>" | ">" | "<" | ">=" | "<=" => compare(op, &l, &r),
            "+" => numeric_binary(op, l, r, i64::checked_add, |a, b| a + b),
            "-" => numeric_binary(op, l, r, i64::checked_sub, |a, b| a - b),
            "*" => numeric_binary(op, l, r, i64::checked_mul, |a, b| a * b),
            "/" => {
                let (a, b) = numbers(op, &l, &r)?;
                if b == 0.0 {
                    return Err(ModelError::type_error("division by zero"));
                }
                Ok(Value::Number(a / b))
            }
            "^" => {
                let (a, b) = numbers(op, &l, &r)?;
                Ok(Value::Number(a.powf(b)))
            }
            "&" => Ok(Value::Text(format!("{}{}", to_text(&l), to_text(&r)))),
            _ => Err(ModelError::unsupported(format!("binary operator '{op}'"))),
        }
    }
}

/* ---------- helpers ---------- */

fn operand_error(op: &str, l: &Value, r: &Value) -> ModelError {
    ModelError::type_error(format!(
        "unsupported operand types for {op}: {} and {}",
        l.type_name(),
        r.type_name()
    ))
}

fn numbers(op: &str, l: &Value, r: &Value) -> ModelResult<(f64, f64)> {
    match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(operand_error(op, l, r)),
    }
}

/// Integer arithmetic stays integral until it overflows.
fn numeric_binary<I, F>(op: &str, l: Value, r: Value, int_op: I, float_op: F) -> ModelResult<Value>
where
    I: Fn(i64, i64) -> Option<i64>,
    F: Fn(f64, f64) -> f64,
{
    if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
        if let Some(v) = int_op(*a, *b) {
            return Ok(Value::Int(v));
        }
    }
    let (a, b) = numbers(op, &l, &r)?;
    Ok(Value::Number(float_op(a, b)))
}

pub(crate) fn to_text(v: &Value) -> String {
    match v {
        Value::Text(s) => s.clone(),
        Value::Empty => String::new(),
        other => other.to_string(),
    }
}

fn ordering(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Text(_), _) | (_, Value::Text(_)) => None,
        _ => match (l.as_number(), r.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    }
}

fn compare(op: &str, l: &Value, r: &Value) -> ModelResult<Value> {
    let ord = ordering(l, r);
    let result = match op {
        "=" => ord.map_or(l == r, |o| o == Ordering::Equal),
        "<>" => ord.map_or(l != r, |o| o != Ordering::Equal),
        _ => {
            let Some(o) = ord else {
                return Err(operand_error(op, l, r));
            };
            match op {
                ">" => o == Ordering::Greater,
                "<" => o == Ordering::Less,
                ">=" => o != Ordering::Less,
                _ => o != Ordering::Greater,
            }
        }
    };
    Ok(Value::Bool(result))
}
