//! Bulk value ingestion and read-only export.
//!
//! Table readers and writers live outside the engine. They exchange plain
//! records with it: an ingest record addresses one result of one cells in
//! one (possibly parametrized) space.

use modelspace_common::{ArgKey, ErrorKind, ModelError, ModelResult, SpaceId, Value, format_args_key};

use super::model::Model;
use super::space::MemberKind;
use crate::formula::Formula;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestRecord {
    /// Arguments of the parametrized child; empty for the space itself.
    pub space_args: Vec<Value>,
    pub cells_name: String,
    pub cells_args: Vec<Value>,
    pub value: Value,
}

impl IngestRecord {
    pub fn new(cells_name: impl Into<String>, cells_args: Vec<Value>, value: impl Into<Value>) -> Self {
        Self {
            space_args: Vec::new(),
            cells_name: cells_name.into(),
            cells_args,
            value: value.into(),
        }
    }

    pub fn in_child(mut self, space_args: Vec<Value>) -> Self {
        self.space_args = space_args;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub cells: String,
    pub args: ArgKey,
    pub value: Value,
}

impl Model {
    /// Store every record's value. Cells missing from the target space are
    /// created with a formula returning `NONE` over `cells_params`.
    ///
    /// Returns the number of records stored.
    pub fn ingest(
        &mut self,
        space: SpaceId,
        records: &[IngestRecord],
        cells_params: &[&str],
    ) -> ModelResult<usize> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("ingest", space = %space, records = records.len()).entered();

        for record in records {
            let target = if record.space_args.is_empty() {
                space
            } else {
                self.get_child(space, &record.space_args, &[])?
            };
            let cells = match self.get(target, &record.cells_name) {
                Ok(Value::Cells(cells)) => cells,
                Ok(other) => {
                    return Err(ModelError::name(format!(
                        "'{}' is a '{}' value, not cells",
                        record.cells_name,
                        other.type_name()
                    )));
                }
                Err(e) if e.kind() == ErrorKind::Lookup => self.new_cells(
                    target,
                    Some(&record.cells_name),
                    Formula::blank(cells_params)?,
                )?,
                Err(e) => return Err(e),
            };
            self.set_value(cells, &record.cells_args, record.value.clone())?;
        }
        Ok(records.len())
    }

    /// Stored results of every cells visible in `space`, by cells name and
    /// then argument tuple. Nothing is computed.
    pub fn export(&mut self, space: SpaceId) -> ModelResult<Vec<ExportRow>> {
        let members = self.members(space, MemberKind::Cells)?;
        let mut rows = Vec::new();
        for (name, value) in members {
            let Some(cells) = value.as_cells() else {
                continue;
            };
            let mut items = self.cells_items(cells)?;
            items.sort_by_cached_key(|(args, _)| format_args_key(args));
            rows.extend(items.into_iter().map(|(args, value)| ExportRow {
                cells: name.clone(),
                args,
                value,
            }));
        }
        Ok(rows)
    }
}
