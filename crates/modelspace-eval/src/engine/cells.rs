//! Cells: formula-backed entries with a result cache keyed by argument tuple.

use modelspace_common::{ArgKey, CellsId, ModelError, ModelResult, SpaceId, Value};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::model::{Frame, FrameTarget, Model};
use super::trace::{ResultKey, TraceKey};
use crate::formula::{Formula, FormulaId, FormulaSource, Signature};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CellsImpl {
    pub name: String,
    pub space: SpaceId,
    pub formula: FormulaId,
    /// Synthesized by inheritance rather than created in `space`.
    pub derived: bool,
    pub data: FxHashMap<ArgKey, Value>,
}

impl Model {
    pub(crate) fn alloc_cells(
        &mut self,
        name: &str,
        space: SpaceId,
        formula: FormulaId,
        derived: bool,
    ) -> CellsId {
        let id = CellsId::new(self.cells.len() as u32);
        self.cells.push(Some(CellsImpl {
            name: name.to_string(),
            space,
            formula,
            derived,
            data: FxHashMap::default(),
        }));
        id
    }

    /// Create an own cells in `space`. Without a name it is called
    /// `Cells1`, `Cells2`, ... skipping names already in use.
    pub fn new_cells(
        &mut self,
        space: SpaceId,
        name: Option<&str>,
        formula: Formula,
    ) -> ModelResult<CellsId> {
        let name = match name {
            Some(name) => {
                self.check_new_name(space, name)?;
                name.to_string()
            }
            None => {
                let taken = self.own_names(space)?;
                let prefix = self.config.cells_prefix.clone();
                self.space_impl_mut(space)?
                    .cells_namer
                    .next_name(&prefix, |n| taken.iter().any(|t| t == n))
            }
        };

        let formula = self.add_formula(formula);
        let id = self.alloc_cells(&name, space, formula, false);
        let node = self.space_impl(space)?.nodes.self_cells;
        if let Some(n) = self.graph.get_mut(node) {
            n.data.insert(name, Value::Cells(id));
        }
        self.touch(node, false);
        Ok(id)
    }

    /// Replace the formula of an own cells. Its results are cleared and
    /// cells derived from it are synthesized again.
    pub fn set_formula(&mut self, cells: CellsId, formula: Formula) -> ModelResult<()> {
        let (space, derived) = {
            let c = self.cells_impl(cells)?;
            (c.space, c.derived)
        };
        if derived {
            return Err(ModelError::unsupported(format!(
                "cannot set the formula of derived cells {}",
                self.cells_fullname(cells)
            )));
        }
        let formula = self.add_formula(formula);
        self.cells_impl_mut(cells)?.formula = formula;
        self.clear_all(cells)?;
        let node = self.space_impl(space)?.nodes.self_cells;
        self.touch(node, false);
        Ok(())
    }

    pub fn call(&mut self, cells: CellsId, args: &[Value]) -> ModelResult<Value> {
        self.call_with(cells, args, &[])
    }

    /// Value of `cells` for the given arguments, computed on first request.
    pub fn call_with(
        &mut self,
        cells: CellsId,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> ModelResult<Value> {
        let key = self.bind_args(cells, args, kwargs)?;
        self.eval_cells(cells, key)
    }

    fn bind_args(
        &self,
        cells: CellsId,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> ModelResult<ArgKey> {
        let formula = self.cells_impl(cells)?.formula;
        let unit = self.formula_unit(formula)?;
        unit.signature()
            .bind(&self.cells_fullname(cells), args, kwargs)
    }

    pub(crate) fn eval_cells(&mut self, cells: CellsId, key: ArgKey) -> ModelResult<Value> {
        let (space, formula, cached) = {
            let c = self.cells_impl(cells)?;
            (c.space, c.formula, c.data.get(&key).cloned())
        };
        let rk = ResultKey {
            cells,
            args: key.clone(),
        };
        self.record_read(TraceKey::Result(rk.clone()));
        if let Some(v) = cached {
            return Ok(v);
        }

        let unit = self.formula_unit(formula)?;
        let frame = Frame {
            space,
            target: FrameTarget::Cells(rk.clone()),
        };
        match self.run_frame(&*unit, frame, &key) {
            Ok(value) => {
                if let Ok(c) = self.cells_impl_mut(cells) {
                    c.data.insert(key, value.clone());
                }
                Ok(value)
            }
            Err(e) => {
                self.trace.forget(&rk);
                Err(e)
            }
        }
    }

    /// Store `value` as the result for `args`. Results that read the old
    /// value are cleared.
    pub fn set_value(
        &mut self,
        cells: CellsId,
        args: &[Value],
        value: impl Into<Value>,
    ) -> ModelResult<()> {
        let key = self.bind_args(cells, args, &[])?;
        let rk = ResultKey {
            cells,
            args: key.clone(),
        };
        self.trace.forget(&rk);
        self.cells_impl_mut(cells)?.data.insert(key, value.into());
        self.invalidate_readers(TraceKey::Result(rk));
        Ok(())
    }

    pub fn clear_value(&mut self, cells: CellsId, args: &[Value]) -> ModelResult<()> {
        let key = self.bind_args(cells, args, &[])?;
        self.clear_key(cells, key)
    }

    /// Clear every stored result of `cells`.
    pub fn clear_all(&mut self, cells: CellsId) -> ModelResult<()> {
        let keys: Vec<ArgKey> = self.cells_impl(cells)?.data.keys().cloned().collect();
        for key in keys {
            self.clear_key(cells, key)?;
        }
        Ok(())
    }

    fn clear_key(&mut self, cells: CellsId, key: ArgKey) -> ModelResult<()> {
        self.cells_impl_mut(cells)?.data.remove(&key);
        let rk = ResultKey { cells, args: key };
        self.trace.forget(&rk);
        self.invalidate_readers(TraceKey::Result(rk));
        Ok(())
    }

    /// True when the formula takes no parameters.
    pub fn has_single_value(&self, cells: CellsId) -> ModelResult<bool> {
        Ok(self.formula_signature(cells)?.is_empty())
    }

    pub fn formula_signature(&self, cells: CellsId) -> ModelResult<Signature> {
        let formula = self.cells_impl(cells)?.formula;
        Ok(self.formula_unit(formula)?.signature().clone())
    }

    /// How the formula of `cells` was defined: expression text or native name.
    pub fn cells_formula(&self, cells: CellsId) -> ModelResult<FormulaSource> {
        let formula = self.cells_impl(cells)?.formula;
        self.formula_source(formula)
            .cloned()
            .ok_or_else(|| ModelError::Restore(format!("formula {formula:?} is missing")))
    }

    /// Stored results, without computing anything.
    pub fn cells_items(&self, cells: CellsId) -> ModelResult<Vec<(ArgKey, Value)>> {
        Ok(self
            .cells_impl(cells)?
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    pub fn cells_name(&self, cells: CellsId) -> ModelResult<&str> {
        Ok(&self.cells_impl(cells)?.name)
    }

    pub fn cells_space(&self, cells: CellsId) -> ModelResult<SpaceId> {
        Ok(self.cells_impl(cells)?.space)
    }

    pub fn is_derived_cells(&self, cells: CellsId) -> ModelResult<bool> {
        Ok(self.cells_impl(cells)?.derived)
    }

    /// Remove an own cells. A cells of the same name in a base is derived in
    /// its place on the next read.
    pub fn remove_cells(&mut self, cells: CellsId) -> ModelResult<()> {
        let (name, space, derived) = {
            let c = self.cells_impl(cells)?;
            (c.name.clone(), c.space, c.derived)
        };
        if derived {
            return self.remove_derived(space, &name).map(|_| ());
        }
        let node = self.space_impl(space)?.nodes.self_cells;
        if let Some(n) = self.graph.get_mut(node) {
            n.data.remove(&name);
        }
        self.free_cells(cells);
        self.touch(node, false);
        Ok(())
    }

    /// Release a cells slot, clearing results that read it.
    pub(crate) fn free_cells(&mut self, cells: CellsId) {
        let keys: Vec<ArgKey> = match self.cells_impl(cells) {
            Ok(c) => c.data.keys().cloned().collect(),
            Err(_) => return,
        };
        for key in keys {
            let rk = ResultKey { cells, args: key };
            self.trace.forget(&rk);
            self.invalidate_readers(TraceKey::Result(rk));
        }
        self.cells[cells.as_index()] = None;
    }
}
