//! The root container: arenas, top-level spaces, globals and the evaluation
//! stack.

use std::collections::BTreeMap;
use std::sync::Arc;

use modelspace_common::{
    ArgKey, CellsId, ModelError, ModelResult, SpaceId, Value, format_args_key,
};
use serde::{Deserialize, Serialize};

use super::ModelConfig;
use super::cells::CellsImpl;
use super::lazy::{LazyGraph, NodeData, NodeId, NodeKind};
use super::space::{AutoNamer, SpaceImpl, check_identifier};
use super::trace::{DependencyTrace, ResultKey, TraceKey};
use crate::formula::{Formula, FormulaId, FormulaSource};
use crate::traits::{Evaluable, FormulaContext};

/// Stack left before a nested evaluation switches to a fresh segment.
const STACK_RED_ZONE: usize = 512 * 1024;
const STACK_SEGMENT: usize = 4 * 1024 * 1024;

/// A formula table entry. The unit is re-linked after a load.
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct FormulaSlot {
    pub source: FormulaSource,
    #[serde(skip)]
    pub unit: Option<Arc<dyn Evaluable>>,
}

impl std::fmt::Debug for FormulaSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormulaSlot")
            .field("source", &self.source)
            .field("linked", &self.unit.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum FrameTarget {
    Cells(ResultKey),
    Params,
}

/// One entry of the evaluation stack.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub space: SpaceId,
    pub target: FrameTarget,
}

/// A model: the root of a tree of spaces.
///
/// All spaces, cells and lazy nodes live in arenas owned here and are
/// addressed by handle. Reads take `&mut self` because they may recompute
/// stale lazy nodes and fill result caches.
#[derive(Debug, Serialize, Deserialize)]
pub struct Model {
    pub(crate) name: String,
    pub(crate) config: ModelConfig,
    pub(crate) graph: LazyGraph,
    pub(crate) spaces: Vec<Option<SpaceImpl>>,
    pub(crate) cells: Vec<Option<CellsImpl>>,
    pub(crate) formulas: Vec<FormulaSlot>,
    pub(crate) top_spaces: BTreeMap<String, SpaceId>,
    pub(crate) global_refs: NodeId,
    pub(crate) space_namer: AutoNamer,
    pub(crate) trace: DependencyTrace,
    #[serde(skip)]
    pub(crate) call_stack: Vec<Frame>,
}

impl Model {
    pub fn new(name: &str) -> Self {
        Self::with_config(name, ModelConfig::default())
    }

    pub fn with_config(name: &str, config: ModelConfig) -> Self {
        let mut graph = LazyGraph::new();
        let global_refs = graph.add_source(NodeData::new());
        Self {
            name: name.to_string(),
            config,
            graph,
            spaces: Vec::new(),
            cells: Vec::new(),
            formulas: Vec::new(),
            top_spaces: BTreeMap::new(),
            global_refs,
            space_namer: AutoNamer::default(),
            trace: DependencyTrace::new(),
            call_stack: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn graph(&self) -> &LazyGraph {
        &self.graph
    }

    /* ===================  arena access  =================== */

    pub(crate) fn space_impl(&self, id: SpaceId) -> ModelResult<&SpaceImpl> {
        self.spaces
            .get(id.as_index())
            .and_then(Option::as_ref)
            .ok_or_else(|| ModelError::stale(format!("{id} has been removed")))
    }

    pub(crate) fn space_impl_mut(&mut self, id: SpaceId) -> ModelResult<&mut SpaceImpl> {
        self.spaces
            .get_mut(id.as_index())
            .and_then(Option::as_mut)
            .ok_or_else(|| ModelError::stale(format!("{id} has been removed")))
    }

    pub(crate) fn cells_impl(&self, id: CellsId) -> ModelResult<&CellsImpl> {
        self.cells
            .get(id.as_index())
            .and_then(Option::as_ref)
            .ok_or_else(|| ModelError::stale(format!("{id} has been removed")))
    }

    pub(crate) fn cells_impl_mut(&mut self, id: CellsId) -> ModelResult<&mut CellsImpl> {
        self.cells
            .get_mut(id.as_index())
            .and_then(Option::as_mut)
            .ok_or_else(|| ModelError::stale(format!("{id} has been removed")))
    }

    pub fn contains_space(&self, id: SpaceId) -> bool {
        self.space_impl(id).is_ok()
    }

    pub fn contains_cells(&self, id: CellsId) -> bool {
        self.cells_impl(id).is_ok()
    }

    /* ===================  formula table  =================== */

    pub(crate) fn add_formula(&mut self, formula: Formula) -> FormulaId {
        let (source, unit) = formula.into_parts();
        let id = FormulaId::new(self.formulas.len() as u32);
        self.formulas.push(FormulaSlot {
            source,
            unit: Some(unit),
        });
        id
    }

    pub(crate) fn formula_unit(&self, id: FormulaId) -> ModelResult<Arc<dyn Evaluable>> {
        self.formulas
            .get(id.as_index())
            .and_then(|slot| slot.unit.clone())
            .ok_or_else(|| ModelError::Restore(format!("formula {id:?} is not linked")))
    }

    pub(crate) fn formula_source(&self, id: FormulaId) -> Option<&FormulaSource> {
        self.formulas.get(id.as_index()).map(|slot| &slot.source)
    }

    /* ===================  lazy graph  =================== */

    /// Bring `id` and everything it reads up to date.
    pub(crate) fn refresh(&mut self, id: NodeId) -> ModelResult<()> {
        if !self.graph.is_dirty(id) {
            return Ok(());
        }
        for source in self.graph.sources(id) {
            self.refresh(source)?;
        }

        let data = match self.graph.kind(id) {
            None | Some(NodeKind::Source) => return Ok(()),
            Some(NodeKind::Layered) => {
                let mut merged = NodeData::new();
                for source in self.graph.sources(id) {
                    if let Some(data) = self.graph.data(source) {
                        merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                }
                merged
            }
            Some(NodeKind::Inheritable { space, kind }) => self.inheritable_members(space, kind)?,
            Some(NodeKind::Derived { space, kind }) => {
                #[cfg(feature = "tracing")]
                let _span = tracing::debug_span!("derive", space = %space, kind = ?kind).entered();
                self.synthesize_derived(id, space, kind)?
            }
        };
        self.graph.store(id, data);
        Ok(())
    }

    /// Refresh a node and return a copy of its data.
    pub(crate) fn node_data(&mut self, id: NodeId) -> ModelResult<NodeData> {
        self.refresh(id)?;
        Ok(self.graph.data(id).cloned().unwrap_or_default())
    }

    /// Invalidate `node`, its observers, and every result that read any of
    /// them.
    pub(crate) fn touch(&mut self, node: NodeId, skip_self: bool) {
        let affected = self.graph.mark_dirty(node, skip_self);
        #[cfg(feature = "tracing")]
        tracing::trace!(node = ?node, affected = affected.len(), "invalidate");
        for id in affected {
            self.invalidate_readers(TraceKey::Node(id));
        }
    }

    /// Clear every cached result that depended on `key`, transitively.
    pub(crate) fn invalidate_readers(&mut self, key: TraceKey) {
        let mut pending = vec![key];
        while let Some(key) = pending.pop() {
            for reader in self.trace.take_readers(&key) {
                self.trace.forget(&reader);
                if let Ok(cells) = self.cells_impl_mut(reader.cells) {
                    cells.data.remove(&reader.args);
                }
                pending.push(TraceKey::Result(reader));
            }
        }
    }

    /* ===================  evaluation  =================== */

    /// Record a read against the result currently being computed.
    pub(crate) fn record_read(&mut self, key: TraceKey) {
        if let Some(Frame {
            target: FrameTarget::Cells(reader),
            ..
        }) = self.call_stack.last()
        {
            let reader = reader.clone();
            self.trace.record(key, reader);
        }
    }

    pub(crate) fn check_depth(&self) -> ModelResult<()> {
        if self.call_stack.len() < self.config.max_depth {
            return Ok(());
        }
        let trace = self
            .call_stack
            .iter()
            .map(|frame| match &frame.target {
                FrameTarget::Cells(rk) => format!(
                    "{}{}",
                    self.cells_fullname(rk.cells),
                    format_args_key(&rk.args)
                ),
                FrameTarget::Params => format!("{}[...]", self.fullname(frame.space)),
            })
            .collect();
        Err(ModelError::DeepReference {
            max_depth: self.config.max_depth,
            trace,
        })
    }

    /// Run `unit` with `space` as the current space and `frame` on the stack.
    pub(crate) fn run_frame(
        &mut self,
        unit: &dyn Evaluable,
        frame: Frame,
        args: &ArgKey,
    ) -> ModelResult<Value> {
        self.check_depth()?;
        let space = frame.space;
        self.call_stack.push(frame);
        // One formula level costs a dozen native frames; grow the stack in
        // segments so `max_depth` is reached before the thread's stack ends.
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || {
            let mut scope = Scope { model: self, space };
            unit.evaluate(&mut scope, args)
        });
        self.call_stack.pop();
        result
    }

    /// Spaces currently being evaluated, innermost last.
    pub fn evaluation_stack(&self) -> Vec<SpaceId> {
        self.call_stack.iter().map(|f| f.space).collect()
    }

    /// Resolve `name` in the merged namespace of `space`.
    pub fn get(&mut self, space: SpaceId, name: &str) -> ModelResult<Value> {
        let namespace = self.space_impl(space)?.nodes.namespace;
        self.refresh(namespace)?;
        self.record_read(TraceKey::Node(namespace));
        match self.graph.data(namespace).and_then(|d| d.get(name)) {
            Some(v) => Ok(v.clone()),
            None => Err(ModelError::lookup(name, self.fullname(space))),
        }
    }

    /* ===================  globals  =================== */

    /// Set a model-level reference, visible from every space below its own
    /// members.
    pub fn set_global(&mut self, name: &str, value: impl Into<Value>) -> ModelResult<()> {
        check_identifier(name)?;
        if let Some(node) = self.graph.get_mut(self.global_refs) {
            node.data.insert(name.to_string(), value.into());
        }
        self.touch(self.global_refs, false);
        Ok(())
    }

    pub fn remove_global(&mut self, name: &str) -> ModelResult<Value> {
        let removed = self
            .graph
            .get_mut(self.global_refs)
            .and_then(|node| node.data.remove(name));
        match removed {
            Some(v) => {
                self.touch(self.global_refs, false);
                Ok(v)
            }
            None => Err(ModelError::lookup(name, self.name.clone())),
        }
    }

    pub fn globals(&self) -> NodeData {
        self.graph.data(self.global_refs).cloned().unwrap_or_default()
    }

    /* ===================  names  =================== */

    /// Dotted path of a space, starting with the model name.
    pub fn fullname(&self, space: SpaceId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(space);
        while let Some(id) = current {
            match self.space_impl(id) {
                Ok(s) => {
                    parts.push(s.name.clone());
                    current = s.parent;
                }
                Err(_) => {
                    parts.push(id.to_string());
                    break;
                }
            }
        }
        parts.push(self.name.clone());
        parts.reverse();
        parts.join(".")
    }

    pub fn cells_fullname(&self, cells: CellsId) -> String {
        match self.cells_impl(cells) {
            Ok(c) => format!("{}.{}", self.fullname(c.space), c.name),
            Err(_) => cells.to_string(),
        }
    }

    pub fn top_space(&self, name: &str) -> Option<SpaceId> {
        self.top_spaces.get(name).copied()
    }

    /// Top-level spaces in name order.
    pub fn top_spaces(&self) -> Vec<(String, SpaceId)> {
        self.top_spaces
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect()
    }

    /// Resolve a dotted name such as `Model1.Space1.foo` or `Space1.foo`.
    pub fn get_object(&mut self, dotted: &str) -> ModelResult<Value> {
        let mut parts = dotted.split('.').peekable();
        if parts.peek() == Some(&self.name.as_str()) {
            parts.next();
        }
        let Some(first) = parts.next() else {
            return Err(ModelError::lookup(dotted, self.name.clone()));
        };
        let mut current = match self.top_spaces.get(first) {
            Some(id) => Value::Space(*id),
            None => {
                let globals = self.globals();
                match globals.get(first) {
                    Some(v) => v.clone(),
                    None => return Err(ModelError::lookup(first, self.name.clone())),
                }
            }
        };
        for part in parts {
            let Value::Space(space) = current else {
                return Err(ModelError::type_error(format!(
                    "'{}' value has no member '{part}'",
                    current.type_name()
                )));
            };
            current = self.get(space, part)?;
        }
        Ok(current)
    }
}

/// The [`FormulaContext`] of one formula invocation.
pub(crate) struct Scope<'m> {
    pub model: &'m mut Model,
    pub space: SpaceId,
}

impl FormulaContext for Scope<'_> {
    fn lookup(&mut self, name: &str) -> ModelResult<Value> {
        self.model.get(self.space, name)
    }

    fn attr(&mut self, target: &Value, name: &str) -> ModelResult<Value> {
        match target {
            Value::Space(space) => self.model.get(*space, name),
            other => Err(ModelError::type_error(format!(
                "'{}' value has no member '{name}'",
                other.type_name()
            ))),
        }
    }

    fn call(
        &mut self,
        target: &Value,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> ModelResult<Value> {
        match target {
            Value::Cells(cells) => self.model.call_with(*cells, args, kwargs),
            Value::Space(space) => self.model.get_child(*space, args, kwargs).map(Value::Space),
            other => Err(ModelError::type_error(format!(
                "'{}' value is not callable",
                other.type_name()
            ))),
        }
    }

    fn current_space(&self) -> SpaceId {
        self.space
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelspace_common::ErrorKind;

    #[test]
    fn globals_are_checked_and_removable() {
        let mut m = Model::new("M");
        m.set_global("rate", 0.5).unwrap();
        assert_eq!(m.globals().get("rate"), Some(&Value::Number(0.5)));
        assert_eq!(m.set_global("1x", 1).unwrap_err().kind(), ErrorKind::Name);
        assert_eq!(m.remove_global("rate").unwrap(), Value::Number(0.5));
        assert_eq!(m.remove_global("rate").unwrap_err().kind(), ErrorKind::Lookup);
    }

    #[test]
    fn stale_handles_error() {
        let m = Model::new("M");
        assert_eq!(
            m.space_impl(SpaceId::new(9)).unwrap_err().kind(),
            ErrorKind::Stale
        );
        assert!(!m.contains_cells(CellsId::new(0)));
    }
}
