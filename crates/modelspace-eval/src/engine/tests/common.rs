//! Common test helpers
use crate::engine::{Model, SpaceOptions};
use crate::formula::Formula;
use modelspace_common::{CellsId, SpaceId, Value};

pub fn expr(text: &str) -> Formula {
    Formula::expr(text).unwrap()
}

pub fn top_space(model: &mut Model, name: &str) -> SpaceId {
    model.new_space(None, SpaceOptions::named(name)).unwrap()
}

pub fn cells(model: &mut Model, space: SpaceId, name: &str, formula: &str) -> CellsId {
    model.new_cells(space, Some(name), expr(formula)).unwrap()
}

/// Resolve `name` in `space` and expect a cells.
pub fn cells_at(model: &mut Model, space: SpaceId, name: &str) -> CellsId {
    match model.get(space, name).unwrap() {
        Value::Cells(c) => c,
        other => panic!("{name} is {other:?}, not cells"),
    }
}

pub fn space_at(model: &mut Model, space: SpaceId, name: &str) -> SpaceId {
    match model.get(space, name).unwrap() {
        Value::Space(s) => s,
        other => panic!("{name} is {other:?}, not a space"),
    }
}
