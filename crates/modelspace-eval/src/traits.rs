use modelspace_common::{ModelResult, SpaceId, Value};

use crate::formula::Signature;

/// The evaluation context handed to every formula invocation.
///
/// Free names resolve against the *currently evaluating* space, so an
/// inherited formula sees the namespace of the space it was copied into.
pub trait FormulaContext {
    /// Resolve a free name in the current space's namespace.
    fn lookup(&mut self, name: &str) -> ModelResult<Value>;

    /// Resolve `target.name`; `target` must be a space.
    fn attr(&mut self, target: &Value, name: &str) -> ModelResult<Value>;

    /// Call a cells, or fetch a parametrized child of a space.
    fn call(
        &mut self,
        target: &Value,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> ModelResult<Value>;

    fn current_space(&self) -> SpaceId;
}

/// A unit of computation with a declared signature.
///
/// `args` are already bound: one value per signature parameter, in order.
pub trait Evaluable: Send + Sync {
    fn signature(&self) -> &Signature;

    fn evaluate(&self, ctx: &mut dyn FormulaContext, args: &[Value]) -> ModelResult<Value>;
}
