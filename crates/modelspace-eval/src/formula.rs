//! Formulas: the evaluable units attached to cells and parametrized spaces.

use std::fmt;
use std::sync::Arc;

use modelspace_common::{ArgKey, ModelError, ModelResult, Value};
use modelspace_parse::{FormulaAst, parse_formula};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::interpreter::Interpreter;
use crate::traits::{Evaluable, FormulaContext};

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// Ordered parameter list of a formula.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Self {
        Self { params }
    }

    /// Signature of positional parameters without defaults.
    pub fn positional<S: AsRef<str>>(names: &[S]) -> Self {
        Self::new(names.iter().map(|n| Param::new(n.as_ref())).collect())
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    /// Bind positional and named arguments into one value per parameter.
    pub fn bind(
        &self,
        callee: &str,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> ModelResult<ArgKey> {
        if args.len() > self.params.len() {
            return Err(ModelError::arity(format!(
                "{callee}() takes {} arguments but {} were given",
                self.params.len(),
                args.len()
            )));
        }

        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        for (slot, arg) in slots.iter_mut().zip(args) {
            *slot = Some(arg.clone());
        }

        for (name, value) in kwargs {
            let Some(pos) = self.params.iter().position(|p| &p.name == name) else {
                return Err(ModelError::arity(format!(
                    "{callee}() got an unexpected argument '{name}'"
                )));
            };
            if slots[pos].is_some() {
                return Err(ModelError::arity(format!(
                    "{callee}() got multiple values for argument '{name}'"
                )));
            }
            slots[pos] = Some(value.clone());
        }

        slots
            .into_iter()
            .zip(&self.params)
            .map(|(slot, param)| {
                slot.or_else(|| param.default.clone()).ok_or_else(|| {
                    ModelError::arity(format!(
                        "{callee}() missing argument '{}'",
                        param.name
                    ))
                })
            })
            .collect()
    }
}

/// Handle of a formula in the model's formula table.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaId(u32);

impl FormulaId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }
}

/// The persistent description of a formula, enough to re-link it on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormulaSource {
    /// Expression text, parsed again on restore.
    Expr(String),
    /// Name of a native formula, looked up in a [`FormulaRegistry`].
    Native(String),
}

/// A formula ready to attach to a cells or a space.
#[derive(Clone)]
pub struct Formula {
    source: FormulaSource,
    unit: Arc<dyn Evaluable>,
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula")
            .field("source", &self.source)
            .field("signature", self.unit.signature())
            .finish()
    }
}

impl Formula {
    /// Parse an expression formula, e.g. `=x * 2` or `=LAMBDA(t, rate := 0.1, t * rate)`.
    pub fn expr(text: &str) -> ModelResult<Self> {
        let unit = ExprFormula::parse(text)?;
        Ok(Self {
            source: FormulaSource::Expr(text.to_string()),
            unit: Arc::new(unit),
        })
    }

    /// Wrap a native closure. `name` identifies it in a [`FormulaRegistry`]
    /// when the model is restored.
    pub fn native<F>(name: impl Into<String>, signature: Signature, func: F) -> Self
    where
        F: Fn(&mut dyn FormulaContext, &[Value]) -> ModelResult<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            source: FormulaSource::Native(name),
            unit: Arc::new(NativeFormula {
                signature,
                func: Box::new(func),
            }),
        }
    }

    /// Formula returning `NONE` for every argument, used for cells whose
    /// values are all supplied from outside.
    pub fn blank<S: AsRef<str>>(params: &[S]) -> ModelResult<Self> {
        if params.is_empty() {
            return Self::expr("=NONE");
        }
        let decl: Vec<String> = params
            .iter()
            .map(|p| format!("{} := NONE", p.as_ref()))
            .collect();
        Self::expr(&format!("=LAMBDA({}, NONE)", decl.join(", ")))
    }

    pub fn source(&self) -> &FormulaSource {
        &self.source
    }

    pub fn signature(&self) -> &Signature {
        self.unit.signature()
    }

    pub(crate) fn into_parts(self) -> (FormulaSource, Arc<dyn Evaluable>) {
        (self.source, self.unit)
    }

    pub(crate) fn unit(&self) -> Arc<dyn Evaluable> {
        Arc::clone(&self.unit)
    }
}

/// Formula parsed from expression text.
struct ExprFormula {
    signature: Signature,
    ast: FormulaAst,
}

impl ExprFormula {
    fn parse(text: &str) -> ModelResult<Self> {
        let ast = parse_formula(text)?;
        let signature = Signature::new(
            ast.params
                .iter()
                .map(|p| Param {
                    name: p.name.clone(),
                    default: p.default.clone(),
                })
                .collect(),
        );
        Ok(Self { signature, ast })
    }
}

impl Evaluable for ExprFormula {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn evaluate(&self, ctx: &mut dyn FormulaContext, args: &[Value]) -> ModelResult<Value> {
        let locals: Vec<(&str, Value)> = self
            .signature
            .names()
            .zip(args.iter().cloned())
            .collect();
        Interpreter::new(ctx, &locals).evaluate_ast(&self.ast.body)
    }
}

type NativeFn = dyn Fn(&mut dyn FormulaContext, &[Value]) -> ModelResult<Value> + Send + Sync;

struct NativeFormula {
    signature: Signature,
    func: Box<NativeFn>,
}

impl Evaluable for NativeFormula {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn evaluate(&self, ctx: &mut dyn FormulaContext, args: &[Value]) -> ModelResult<Value> {
        (self.func)(ctx, args)
    }
}

/// Native formulas by name, consulted when a saved model is loaded.
#[derive(Default, Clone)]
pub struct FormulaRegistry {
    natives: FxHashMap<String, Formula>,
}

impl FormulaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native formula under its own name. Expression formulas
    /// need no registration and are ignored.
    pub fn register(&mut self, formula: &Formula) {
        if let FormulaSource::Native(name) = &formula.source {
            self.natives.insert(name.clone(), formula.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Formula> {
        self.natives.get(name)
    }

    pub fn len(&self) -> usize {
        self.natives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.natives.is_empty()
    }

    /// Rebuild the evaluable unit for a stored source.
    pub(crate) fn link(&self, source: &FormulaSource) -> ModelResult<Arc<dyn Evaluable>> {
        match source {
            FormulaSource::Expr(text) => Ok(Arc::new(ExprFormula::parse(text)?)),
            FormulaSource::Native(name) => self.get(name).map(Formula::unit).ok_or_else(|| {
                ModelError::Restore(format!("native formula '{name}' is not registered"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> Signature {
        Signature::new(vec![Param::new("a"), Param::with_default("b", 10)])
    }

    #[test]
    fn binds_positional_named_and_default() {
        let key = sig().bind("f", &[Value::Int(1)], &[]).unwrap();
        assert_eq!(key.as_slice(), &[Value::Int(1), Value::Int(10)]);

        let key = sig()
            .bind("f", &[], &[("b".into(), Value::Int(2)), ("a".into(), Value::Int(1))])
            .unwrap();
        assert_eq!(key.as_slice(), &[Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn bind_errors_are_arity() {
        let s = sig();
        for err in [
            s.bind("f", &[], &[]).unwrap_err(),
            s.bind("f", &[1.into(), 2.into(), 3.into()], &[]).unwrap_err(),
            s.bind("f", &[1.into()], &[("a".into(), 1.into())]).unwrap_err(),
            s.bind("f", &[1.into()], &[("zz".into(), 1.into())]).unwrap_err(),
        ] {
            assert_eq!(err.kind(), modelspace_common::ErrorKind::Arity);
        }
    }

    #[test]
    fn blank_formula_defaults_every_param_to_none() {
        let f = Formula::blank(&["x", "y"]).unwrap();
        let names: Vec<&str> = f.signature().names().collect();
        assert_eq!(names, vec!["x", "y"]);
        assert!(f.signature().params().iter().all(|p| p.default == Some(Value::Empty)));
    }

    #[test]
    fn registry_links_natives_by_name() {
        let mut reg = FormulaRegistry::new();
        let f = Formula::native("one", Signature::default(), |_, _| Ok(Value::Int(1)));
        reg.register(&f);
        assert!(reg.link(&FormulaSource::Native("one".into())).is_ok());
        let err = reg
            .link(&FormulaSource::Native("two".into()))
            .err()
            .unwrap();
        assert_eq!(err.kind(), modelspace_common::ErrorKind::Restore);
    }
}
