pub mod builtins;
pub mod formula;
pub mod interpreter;
pub mod traits;

#[cfg(feature = "tracing")]
pub mod telemetry;

pub mod engine;

pub use engine::{
    ExportRow, IngestRecord, MemberKind, Model, ModelConfig, SpaceOptions, SpaceOrigin, new_model,
};
pub use formula::{Formula, FormulaRegistry, FormulaSource, Param, Signature};
pub use modelspace_common::{
    ArgKey, CellsId, ErrorKind, ModelError, ModelResult, SpaceId, Value, arg_key,
};
pub use traits::{Evaluable, FormulaContext};
