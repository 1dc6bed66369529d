//! Save and restore a model as an opaque CBOR blob.

use modelspace_common::{ModelError, ModelResult, SpaceId, Value};
use rustc_hash::FxHashSet;

use super::model::Model;
use super::space::MemberKind;
use crate::formula::{FormulaId, FormulaRegistry};

impl Model {
    /// Serialize arenas, lazy nodes, result caches and dependency edges.
    /// Formula closures are not part of the blob.
    pub fn save(&self) -> ModelResult<Vec<u8>> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("save", model = %self.name).entered();

        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| ModelError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a blob written by [`Model::save`] and re-link its
    /// formulas; natives are fetched from `registry` by name.
    pub fn load(blob: &[u8], registry: &FormulaRegistry) -> ModelResult<Self> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("load", bytes = blob.len()).entered();

        let mut model: Model =
            ciborium::from_reader(blob).map_err(|e| ModelError::Serialization(e.to_string()))?;
        model.restore_state(registry)?;
        Ok(model)
    }

    /// Walk every space below the top level and link the formulas its
    /// cells and parameter formula use.
    pub fn restore_state(&mut self, registry: &FormulaRegistry) -> ModelResult<()> {
        self.call_stack.clear();

        let mut used = FxHashSet::default();
        let tops: Vec<SpaceId> = self.top_spaces.values().copied().collect();
        for space in tops {
            self.collect_formulas(space, &mut used)?;
        }

        let mut used: Vec<FormulaId> = used.into_iter().collect();
        used.sort_by_key(|id| id.as_index());
        for id in used {
            let Some(slot) = self.formulas.get(id.as_index()) else {
                return Err(ModelError::Restore(format!("formula {id:?} is missing")));
            };
            let unit = registry.link(&slot.source)?;
            self.formulas[id.as_index()].unit = Some(unit);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(spaces = self.spaces.iter().flatten().count(), "restored");
        Ok(())
    }

    fn collect_formulas(
        &self,
        space: SpaceId,
        used: &mut FxHashSet<FormulaId>,
    ) -> ModelResult<()> {
        let s = self.space_impl(space)?;
        used.extend(s.param_formula);

        let mut children: Vec<SpaceId> = s.param_spaces.values().copied().collect();
        for node in [s.nodes.self_spaces, s.nodes.derived(MemberKind::Spaces)] {
            if let Some(data) = self.graph.data(node) {
                children.extend(data.values().filter_map(Value::as_space));
            }
        }
        for node in [s.nodes.self_cells, s.nodes.derived(MemberKind::Cells)] {
            if let Some(data) = self.graph.data(node) {
                for cells in data.values().filter_map(Value::as_cells) {
                    used.insert(self.cells_impl(cells)?.formula);
                }
            }
        }

        for child in children {
            if self.contains_space(child) {
                self.collect_formulas(child, used)?;
            }
        }
        Ok(())
    }
}
