//! Spaces: creation, naming, member views, parametrized children and
//! teardown.

use modelspace_common::{ArgKey, CellsId, ModelError, ModelResult, SpaceId, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::lazy::{LazyGraph, NodeData, NodeId, NodeKind};
use super::model::{Frame, FrameTarget, Model};
use super::mro::linearize;
use crate::formula::{Formula, FormulaId};

/// The three kinds of space members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    Cells,
    Spaces,
    Refs,
}

impl MemberKind {
    pub const ALL: [MemberKind; 3] = [MemberKind::Cells, MemberKind::Spaces, MemberKind::Refs];

    pub(crate) fn index(self) -> usize {
        match self {
            MemberKind::Cells => 0,
            MemberKind::Spaces => 1,
            MemberKind::Refs => 2,
        }
    }
}

/// How a space came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpaceOrigin {
    /// Created explicitly; listed among its parent's own spaces.
    Own,
    /// Synthesized from a base space's own child.
    Derived,
    /// Built by the parent's parameter formula for one argument tuple.
    Dynamic,
}

/// Lazy nodes making up one space.
///
/// ```text
/// self_cells ─┐                       ┌─> derived[k] ─┐
/// self_spaces ├─> self_members ──> inheritable[k]     ├─> cells/spaces/refs ─> namespace
/// self_refs  ─┘   (of every space        (k = kind)   │
/// arguments ──────  in the mro)                       ┘
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SpaceNodes {
    pub self_cells: NodeId,
    pub self_spaces: NodeId,
    pub self_refs: NodeId,
    pub arguments: NodeId,
    pub self_members: NodeId,
    pub inheritable: [NodeId; 3],
    pub derived: [NodeId; 3],
    pub cells: NodeId,
    pub spaces: NodeId,
    pub refs: NodeId,
    pub namespace: NodeId,
}

impl SpaceNodes {
    pub fn own(&self, kind: MemberKind) -> NodeId {
        match kind {
            MemberKind::Cells => self.self_cells,
            MemberKind::Spaces => self.self_spaces,
            MemberKind::Refs => self.self_refs,
        }
    }

    pub fn derived(&self, kind: MemberKind) -> NodeId {
        self.derived[kind.index()]
    }

    pub fn members(&self, kind: MemberKind) -> NodeId {
        match kind {
            MemberKind::Cells => self.cells,
            MemberKind::Spaces => self.spaces,
            MemberKind::Refs => self.refs,
        }
    }

    pub fn all(&self) -> Vec<NodeId> {
        let mut out = vec![
            self.self_cells,
            self.self_spaces,
            self.self_refs,
            self.arguments,
            self.self_members,
        ];
        out.extend(self.inheritable);
        out.extend(self.derived);
        out.extend([self.cells, self.spaces, self.refs, self.namespace]);
        out
    }

    /// Allocate the nodes of space `id`. `mro_members` are the
    /// `self_members` nodes of its bases, in linearization order.
    fn allocate(
        graph: &mut LazyGraph,
        id: SpaceId,
        mro_members: &[NodeId],
        global_refs: NodeId,
        arguments: NodeData,
    ) -> Self {
        let self_cells = graph.add_source(NodeData::new());
        let self_spaces = graph.add_source(NodeData::new());
        let self_refs = graph.add_source(NodeData::new());
        let arguments = graph.add_source(arguments);
        let self_members = graph.add_node(NodeKind::Layered, &[self_cells, self_spaces, self_refs]);

        let inheritable = MemberKind::ALL.map(|kind| {
            let node = graph.add_node(NodeKind::Inheritable { space: id, kind }, &[self_members]);
            for &base in mro_members {
                graph.add_observer(base, node);
            }
            node
        });
        let derived = MemberKind::ALL.map(|kind| {
            graph.add_node(
                NodeKind::Derived { space: id, kind },
                &[inheritable[kind.index()]],
            )
        });

        let cells = graph.add_node(NodeKind::Layered, &[derived[0], self_cells]);
        let spaces = graph.add_node(NodeKind::Layered, &[derived[1], self_spaces]);
        let refs = graph.add_node(NodeKind::Layered, &[derived[2], self_refs, arguments]);
        let namespace = graph.add_node(NodeKind::Layered, &[global_refs, cells, spaces, refs]);

        Self {
            self_cells,
            self_spaces,
            self_refs,
            arguments,
            self_members,
            inheritable,
            derived,
            cells,
            spaces,
            refs,
            namespace,
        }
    }
}

/// Counter behind auto-generated names such as `Cells1`, `Space2`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct AutoNamer {
    count: u32,
}

impl AutoNamer {
    pub fn next_name(&mut self, prefix: &str, taken: impl Fn(&str) -> bool) -> String {
        loop {
            self.count += 1;
            let name = format!("{prefix}{}", self.count);
            if !taken(&name) {
                return name;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SpaceImpl {
    pub name: String,
    pub parent: Option<SpaceId>,
    pub origin: SpaceOrigin,
    pub direct_bases: Vec<SpaceId>,
    /// Linearization, self first.
    pub mro: Vec<SpaceId>,
    pub nodes: SpaceNodes,
    pub param_formula: Option<FormulaId>,
    pub param_spaces: FxHashMap<ArgKey, SpaceId>,
    pub cells_namer: AutoNamer,
    pub space_namer: AutoNamer,
    pub dynamic_namer: AutoNamer,
}

/// Construction options for [`Model::new_space`].
#[derive(Debug, Clone, Default)]
pub struct SpaceOptions {
    pub name: Option<String>,
    pub bases: Vec<SpaceId>,
    pub formula: Option<Formula>,
}

impl SpaceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_base(mut self, base: SpaceId) -> Self {
        self.bases.push(base);
        self
    }

    pub fn with_bases(mut self, bases: impl IntoIterator<Item = SpaceId>) -> Self {
        self.bases.extend(bases);
        self
    }

    /// Parameter formula used by [`Model::get_child`].
    pub fn with_formula(mut self, formula: Formula) -> Self {
        self.formula = Some(formula);
        self
    }
}

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("identifier regex must compile"));

const RESERVED: [&str; 4] = ["TRUE", "FALSE", "NONE", "LAMBDA"];

/// Reject names that cannot be written in a formula.
pub(crate) fn check_identifier(name: &str) -> ModelResult<()> {
    if !IDENTIFIER.is_match(name) {
        return Err(ModelError::name(format!("'{name}' is not a valid name")));
    }
    if RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return Err(ModelError::name(format!("'{name}' is a reserved word")));
    }
    Ok(())
}

impl Model {
    /* ===================  creation  =================== */

    /// Create a space at the top of the model (`parent` is `None`) or as an
    /// own child of `parent`.
    pub fn new_space(
        &mut self,
        parent: Option<SpaceId>,
        options: SpaceOptions,
    ) -> ModelResult<SpaceId> {
        let name = match (options.name, parent) {
            (Some(name), Some(p)) => {
                self.check_new_name(p, &name)?;
                name
            }
            (Some(name), None) => {
                check_identifier(&name)?;
                if self.top_spaces.contains_key(&name) {
                    return Err(ModelError::name(format!("space '{name}' already exists")));
                }
                name
            }
            (None, Some(p)) => {
                let taken = self.own_names(p)?;
                let prefix = self.config.space_prefix.clone();
                self.space_impl_mut(p)?
                    .space_namer
                    .next_name(&prefix, |n| taken.iter().any(|t| t == n))
            }
            (None, None) => {
                let top = &self.top_spaces;
                self.space_namer
                    .next_name(&self.config.space_prefix, |n| top.contains_key(n))
            }
        };

        let param_formula = options.formula.map(|f| self.add_formula(f));
        let id = self.create_space(
            parent,
            &name,
            options.bases,
            param_formula,
            SpaceOrigin::Own,
            NodeData::new(),
        )?;

        match parent {
            Some(p) => {
                let node = self.space_impl(p)?.nodes.self_spaces;
                if let Some(n) = self.graph.get_mut(node) {
                    n.data.insert(name, Value::Space(id));
                }
                self.touch(node, false);
            }
            None => {
                self.top_spaces.insert(name, id);
            }
        }
        Ok(id)
    }

    /// Allocate a space and its nodes. Registration with the parent is left
    /// to the caller since it depends on `origin`.
    pub(crate) fn create_space(
        &mut self,
        parent: Option<SpaceId>,
        name: &str,
        bases: Vec<SpaceId>,
        param_formula: Option<FormulaId>,
        origin: SpaceOrigin,
        arguments: NodeData,
    ) -> ModelResult<SpaceId> {
        for base in &bases {
            self.space_impl(*base)?;
        }
        let id = SpaceId::new(self.spaces.len() as u32);
        let mut mro = vec![id];
        mro.extend(linearize(&bases, |b| Ok(self.space_impl(b)?.mro.clone()))?);

        let mro_members = mro[1..]
            .iter()
            .map(|b| self.space_impl(*b).map(|s| s.nodes.self_members))
            .collect::<ModelResult<Vec<_>>>()?;
        let nodes = SpaceNodes::allocate(
            &mut self.graph,
            id,
            &mro_members,
            self.global_refs,
            arguments,
        );

        #[cfg(feature = "tracing")]
        tracing::debug!(space = %id, name, origin = ?origin, bases = bases.len(), "create space");

        self.spaces.push(Some(SpaceImpl {
            name: name.to_string(),
            parent,
            origin,
            direct_bases: bases,
            mro,
            nodes,
            param_formula,
            param_spaces: FxHashMap::default(),
            cells_namer: AutoNamer::default(),
            space_namer: AutoNamer::default(),
            dynamic_namer: AutoNamer::default(),
        }));
        Ok(id)
    }

    /// Names of own members and bound arguments of `space`.
    pub(crate) fn own_names(&self, space: SpaceId) -> ModelResult<Vec<String>> {
        let nodes = &self.space_impl(space)?.nodes;
        let mut names = Vec::new();
        for node in [nodes.self_cells, nodes.self_spaces, nodes.self_refs, nodes.arguments] {
            if let Some(data) = self.graph.data(node) {
                names.extend(data.keys().cloned());
            }
        }
        Ok(names)
    }

    /// A new own member may override a derived one but not another own
    /// member or a bound argument.
    pub(crate) fn check_new_name(&self, space: SpaceId, name: &str) -> ModelResult<()> {
        check_identifier(name)?;
        if self.own_names(space)?.iter().any(|n| n == name) {
            return Err(ModelError::name(format!(
                "'{name}' already exists in {}",
                self.fullname(space)
            )));
        }
        Ok(())
    }

    /* ===================  names  =================== */

    /// Assign `value` to `name` in `space`.
    ///
    /// A reference is created or updated; a cells without parameters takes
    /// the value as its only result. Parametrized cells and spaces cannot be
    /// assigned to.
    pub fn set_name(
        &mut self,
        space: SpaceId,
        name: &str,
        value: impl Into<Value>,
    ) -> ModelResult<()> {
        let value = value.into();
        let nodes = self.space_impl(space)?.nodes.clone();
        let namespace = self.node_data(nodes.namespace)?;
        let refs = self.node_data(nodes.refs)?;

        match namespace.get(name) {
            Some(Value::Cells(cells)) if !refs.contains_key(name) => {
                let cells = *cells;
                if !self.has_single_value(cells)? {
                    return Err(ModelError::name(format!(
                        "cannot assign a value to parametrized cells '{name}'"
                    )));
                }
                self.set_value(cells, &[], value)
            }
            Some(Value::Space(_)) if !refs.contains_key(name) => Err(ModelError::unsupported(
                format!("cannot assign to space '{name}'"),
            )),
            _ => {
                let own_refs = self.graph.data(nodes.self_refs);
                if !own_refs.is_some_and(|d| d.contains_key(name)) {
                    self.check_new_name(space, name)?;
                }
                if let Some(node) = self.graph.get_mut(nodes.self_refs) {
                    node.data.insert(name.to_string(), value);
                }
                self.touch(nodes.self_refs, false);
                Ok(())
            }
        }
    }

    /// Delete an own cells, own reference, own space or derived member.
    pub fn del_name(&mut self, space: SpaceId, name: &str) -> ModelResult<()> {
        let nodes = self.space_impl(space)?.nodes.clone();
        let own = |graph: &LazyGraph, node: NodeId| {
            graph.data(node).and_then(|d| d.get(name)).cloned()
        };

        if let Some(Value::Cells(cells)) = own(&self.graph, nodes.self_cells) {
            return self.remove_cells(cells);
        }
        if own(&self.graph, nodes.self_refs).is_some() {
            if let Some(node) = self.graph.get_mut(nodes.self_refs) {
                node.data.remove(name);
            }
            self.touch(nodes.self_refs, false);
            return Ok(());
        }
        if own(&self.graph, nodes.self_spaces).is_some() {
            return self.remove_space(Some(space), name);
        }
        if self.remove_derived(space, name)? {
            return Ok(());
        }
        Err(ModelError::lookup(name, self.fullname(space)))
    }

    /// Delete a derived member in place. The name stays deleted until the
    /// inheritable set of `space` changes for another reason.
    ///
    /// Returns `false` when `name` is not a derived member.
    pub fn remove_derived(&mut self, space: SpaceId, name: &str) -> ModelResult<bool> {
        let nodes = self.space_impl(space)?.nodes.clone();
        for kind in MemberKind::ALL {
            let node = nodes.derived(kind);
            self.refresh(node)?;
            let removed = self
                .graph
                .get_mut(node)
                .and_then(|n| n.data.remove(name));
            let Some(removed) = removed else {
                continue;
            };
            match removed {
                Value::Cells(cells) if kind == MemberKind::Cells => self.free_cells(cells),
                Value::Space(child) if kind == MemberKind::Spaces => self.detach_space(child)?,
                _ => {}
            }
            self.touch(node, true);
            return Ok(true);
        }
        Ok(false)
    }

    /// Re-deriving a deleted member is not supported.
    pub fn revert_derived(&mut self, space: SpaceId, name: &str) -> ModelResult<()> {
        Err(ModelError::unsupported(format!(
            "cannot revert deletion of derived member '{name}' in {}",
            self.fullname(space)
        )))
    }

    /* ===================  parametrized children  =================== */

    /// Attach a parameter formula. A space takes at most one.
    pub fn set_param_formula(&mut self, space: SpaceId, formula: Formula) -> ModelResult<()> {
        if self.space_impl(space)?.param_formula.is_some() {
            return Err(ModelError::name(format!(
                "{} already has a parameter formula",
                self.fullname(space)
            )));
        }
        let id = self.add_formula(formula);
        let parent = {
            let s = self.space_impl_mut(space)?;
            s.param_formula = Some(id);
            s.parent
        };
        // Derived copies of this space carry the formula too
        if let Some(parent) = parent {
            let node = self.space_impl(parent)?.nodes.self_spaces;
            self.touch(node, false);
        }
        Ok(())
    }

    pub fn has_params(&self, space: SpaceId) -> ModelResult<bool> {
        Ok(self.space_impl(space)?.param_formula.is_some())
    }

    /// The child of `space` for one argument tuple, built on first request
    /// and memoized by argument value.
    pub fn get_child(
        &mut self,
        space: SpaceId,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> ModelResult<SpaceId> {
        let Some(formula) = self.space_impl(space)?.param_formula else {
            return Err(ModelError::type_error(format!(
                "{} is not parametrized",
                self.fullname(space)
            )));
        };
        let unit = self.formula_unit(formula)?;
        let key = unit.signature().bind(&self.fullname(space), args, kwargs)?;

        if let Some(child) = self.space_impl(space)?.param_spaces.get(&key) {
            return Ok(*child);
        }

        let frame = Frame {
            space,
            target: FrameTarget::Params,
        };
        let bases = match self.run_frame(&*unit, frame, &key)? {
            Value::Empty => vec![space],
            Value::Space(base) => vec![base],
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_space().ok_or_else(|| {
                        ModelError::type_error("parameter formula must return spaces")
                    })
                })
                .collect::<ModelResult<Vec<_>>>()?,
            other => {
                return Err(ModelError::type_error(format!(
                    "parameter formula returned a '{}' value",
                    other.type_name()
                )));
            }
        };

        let arguments: NodeData = unit
            .signature()
            .names()
            .map(str::to_string)
            .zip(key.iter().cloned())
            .collect();
        let prefix = self.config.dynamic_prefix.clone();
        let name = self
            .space_impl_mut(space)?
            .dynamic_namer
            .next_name(&prefix, |_| false);

        #[cfg(feature = "tracing")]
        tracing::debug!(parent = %space, name = %name, "create parametrized child");

        let child = self.create_space(
            Some(space),
            &name,
            bases,
            None,
            SpaceOrigin::Dynamic,
            arguments,
        )?;
        self.space_impl_mut(space)?.param_spaces.insert(key, child);
        Ok(child)
    }

    /// Memoized children in creation order.
    pub fn dynamic_spaces(&self, space: SpaceId) -> ModelResult<Vec<(ArgKey, SpaceId)>> {
        let mut out: Vec<_> = self
            .space_impl(space)?
            .param_spaces
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        out.sort_by_key(|(_, id)| *id);
        Ok(out)
    }

    /* ===================  views  =================== */

    pub fn own_members(&self, space: SpaceId, kind: MemberKind) -> ModelResult<NodeData> {
        let node = self.space_impl(space)?.nodes.own(kind);
        Ok(self.graph.data(node).cloned().unwrap_or_default())
    }

    pub fn derived_members(&mut self, space: SpaceId, kind: MemberKind) -> ModelResult<NodeData> {
        let node = self.space_impl(space)?.nodes.derived(kind);
        self.node_data(node)
    }

    /// Own and derived members of one kind; own members win.
    pub fn members(&mut self, space: SpaceId, kind: MemberKind) -> ModelResult<NodeData> {
        let node = self.space_impl(space)?.nodes.members(kind);
        self.node_data(node)
    }

    /// The merged namespace formulas in `space` resolve names against.
    pub fn namespace(&mut self, space: SpaceId) -> ModelResult<NodeData> {
        let node = self.space_impl(space)?.nodes.namespace;
        self.node_data(node)
    }

    /// Arguments bound to a parametrized child.
    pub fn arguments(&self, space: SpaceId) -> ModelResult<NodeData> {
        let node = self.space_impl(space)?.nodes.arguments;
        Ok(self.graph.data(node).cloned().unwrap_or_default())
    }

    pub fn mro(&self, space: SpaceId) -> ModelResult<Vec<SpaceId>> {
        Ok(self.space_impl(space)?.mro.clone())
    }

    pub fn direct_bases(&self, space: SpaceId) -> ModelResult<Vec<SpaceId>> {
        Ok(self.space_impl(space)?.direct_bases.clone())
    }

    pub fn space_name(&self, space: SpaceId) -> ModelResult<&str> {
        Ok(&self.space_impl(space)?.name)
    }

    pub fn parent(&self, space: SpaceId) -> ModelResult<Option<SpaceId>> {
        Ok(self.space_impl(space)?.parent)
    }

    pub fn origin(&self, space: SpaceId) -> ModelResult<SpaceOrigin> {
        Ok(self.space_impl(space)?.origin)
    }

    /* ===================  removal  =================== */

    /// Remove an own space by name; `parent` is `None` for top-level spaces.
    ///
    /// Fails with `Unsupported` while a space outside the removed subtree
    /// still lists one of its spaces as a direct base. Derived copies are
    /// rebuilt by their parent and dynamic children are dropped from their
    /// parent's cache.
    pub fn remove_space(&mut self, parent: Option<SpaceId>, name: &str) -> ModelResult<()> {
        let id = match parent {
            Some(p) => {
                let node = self.space_impl(p)?.nodes.self_spaces;
                match self.graph.data(node).and_then(|d| d.get(name)) {
                    Some(Value::Space(id)) => *id,
                    _ => return Err(ModelError::lookup(name, self.fullname(p))),
                }
            }
            None => match self.top_spaces.get(name) {
                Some(id) => *id,
                None => return Err(ModelError::lookup(name, self.name.clone())),
            },
        };

        let doomed = self.subtree(id);
        let mut dynamic = Vec::new();
        for (index, slot) in self.spaces.iter().enumerate() {
            let Some(s) = slot else { continue };
            let sid = SpaceId::new(index as u32);
            if doomed.contains(&sid) || !s.direct_bases.iter().any(|b| doomed.contains(b)) {
                continue;
            }
            match s.origin {
                SpaceOrigin::Derived => {}
                SpaceOrigin::Dynamic => dynamic.push(sid),
                SpaceOrigin::Own => {
                    return Err(ModelError::unsupported(format!(
                        "cannot remove {}: {} inherits from it",
                        self.fullname(id),
                        self.fullname(sid)
                    )));
                }
            }
        }

        for child in dynamic {
            self.drop_dynamic(child)?;
        }
        match parent {
            Some(p) => {
                let node = self.space_impl(p)?.nodes.self_spaces;
                if let Some(n) = self.graph.get_mut(node) {
                    n.data.remove(name);
                }
                self.touch(node, false);
            }
            None => {
                self.top_spaces.remove(name);
            }
        }
        self.detach_space(id)
    }

    /// `id` and every space below it: own, derived and dynamic children.
    fn subtree(&self, id: SpaceId) -> FxHashSet<SpaceId> {
        let mut found = FxHashSet::default();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let Ok(s) = self.space_impl(next) else { continue };
            if !found.insert(next) {
                continue;
            }
            pending.extend(s.param_spaces.values().copied());
            for node in [s.nodes.self_spaces, s.nodes.derived(MemberKind::Spaces)] {
                if let Some(data) = self.graph.data(node) {
                    pending.extend(data.values().filter_map(Value::as_space));
                }
            }
        }
        found
    }

    /// Forget a memoized dynamic child; the next request rebuilds it.
    fn drop_dynamic(&mut self, child: SpaceId) -> ModelResult<()> {
        let Some(parent) = self.space_impl(child).ok().and_then(|s| s.parent) else {
            return Ok(());
        };
        if let Ok(p) = self.space_impl_mut(parent) {
            p.param_spaces.retain(|_, c| *c != child);
        }
        self.detach_space(child)
    }

    /// Tear a space down with everything below it. Its nodes leave the
    /// graph, its cells are freed and its handle becomes stale.
    pub(crate) fn detach_space(&mut self, id: SpaceId) -> ModelResult<()> {
        let (nodes, dynamic) = {
            let s = self.space_impl(id)?;
            (s.nodes.clone(), s.param_spaces.values().copied().collect::<Vec<_>>())
        };

        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("detach space", space = %id).entered();

        let mut children = dynamic;
        let mut cells: Vec<CellsId> = Vec::new();
        for node in [nodes.self_spaces, nodes.derived(MemberKind::Spaces)] {
            if let Some(data) = self.graph.data(node) {
                children.extend(data.values().filter_map(Value::as_space));
            }
        }
        for node in [nodes.self_cells, nodes.derived(MemberKind::Cells)] {
            if let Some(data) = self.graph.data(node) {
                cells.extend(data.values().filter_map(Value::as_cells));
            }
        }

        for child in children {
            if self.contains_space(child) {
                self.detach_space(child)?;
            }
        }
        for c in cells {
            self.free_cells(c);
        }
        for node in nodes.all() {
            self.touch(node, false);
        }
        for node in nodes.all() {
            self.graph.remove_node(node);
        }
        self.spaces[id.as_index()] = None;
        Ok(())
    }
}
