//! Inheritance: which members a space may inherit, and the derived members
//! synthesized from them.

use modelspace_common::{ModelResult, SpaceId, Value};

use super::lazy::{NodeData, NodeId};
use super::model::Model;
use super::space::{MemberKind, SpaceOrigin};

impl Model {
    /// Members of `kind` that `space` inherits.
    ///
    /// Walks the linearization from the most basic space towards `space`,
    /// folding in each base's own members. After each step, names that the
    /// next, more derived space declares as its own are dropped: that space
    /// overrides them, so nothing above it may inherit them from further
    /// down. `space` itself is the last "next" step, which keeps own and
    /// derived names disjoint.
    pub(crate) fn inheritable_members(
        &self,
        space: SpaceId,
        kind: MemberKind,
    ) -> ModelResult<NodeData> {
        let chain: Vec<_> = self
            .space_impl(space)?
            .mro
            .iter()
            .rev()
            .filter_map(|id| self.space_impl(*id).ok())
            .collect();

        let mut data = NodeData::new();
        for pair in chain.windows(2) {
            let (base, next) = (pair[0], pair[1]);
            if let Some(own) = self.graph.data(base.nodes.own(kind)) {
                data.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            if let Some(overrides) = self.graph.data(next.nodes.self_members) {
                data.retain(|name, _| !overrides.contains_key(name));
            }
        }
        Ok(data)
    }

    /// Recompute the derived members of `kind` held in `node`.
    pub(crate) fn synthesize_derived(
        &mut self,
        node: NodeId,
        space: SpaceId,
        kind: MemberKind,
    ) -> ModelResult<NodeData> {
        let inheritable = self
            .space_impl(space)?
            .nodes
            .inheritable[kind.index()];
        let inheritable = self.graph.data(inheritable).cloned().unwrap_or_default();

        match kind {
            MemberKind::Cells => self.derive_cells(node, space, inheritable),
            MemberKind::Spaces => self.derive_spaces(node, space, inheritable),
            MemberKind::Refs => Ok(inheritable),
        }
    }

    /// Keep a derived cells while it shares its base's formula; otherwise
    /// replace it with a fresh copy bound to `space`.
    fn derive_cells(
        &mut self,
        node: NodeId,
        space: SpaceId,
        inheritable: NodeData,
    ) -> ModelResult<NodeData> {
        let mut current = self.graph.data(node).cloned().unwrap_or_default();

        let gone: Vec<String> = current
            .keys()
            .filter(|name| !inheritable.contains_key(*name))
            .cloned()
            .collect();
        for name in gone {
            if let Some(Value::Cells(cells)) = current.remove(&name) {
                self.free_cells(cells);
            }
        }

        for (name, base) in &inheritable {
            let Some(base_formula) = base
                .as_cells()
                .and_then(|c| self.cells_impl(c).ok())
                .map(|c| c.formula)
            else {
                continue;
            };
            if let Some(existing) = current.get(name).and_then(Value::as_cells) {
                let same = self
                    .cells_impl(existing)
                    .is_ok_and(|c| c.formula == base_formula);
                if same {
                    continue;
                }
                self.free_cells(existing);
            }
            let cells = self.alloc_cells(name, space, base_formula, true);
            current.insert(name.clone(), Value::Cells(cells));
        }
        Ok(current)
    }

    /// Derived spaces are rebuilt from scratch. Each copy takes the
    /// inherited space as its only base and carries its parameter formula.
    fn derive_spaces(
        &mut self,
        node: NodeId,
        space: SpaceId,
        inheritable: NodeData,
    ) -> ModelResult<NodeData> {
        let old: Vec<SpaceId> = self
            .graph
            .data(node)
            .map(|d| d.values().filter_map(Value::as_space).collect())
            .unwrap_or_default();
        for child in old {
            if self.contains_space(child) {
                self.detach_space(child)?;
            }
        }

        let mut out = NodeData::new();
        for (name, base) in &inheritable {
            let Some(base) = base.as_space() else {
                continue;
            };
            let Ok(param_formula) = self.space_impl(base).map(|s| s.param_formula) else {
                continue;
            };
            let child = self.create_space(
                Some(space),
                name,
                vec![base],
                param_formula,
                SpaceOrigin::Derived,
                NodeData::new(),
            )?;
            out.insert(name.clone(), Value::Space(child));
        }
        Ok(out)
    }
}
