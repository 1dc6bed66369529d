pub mod args;
pub mod error;
pub mod handle;
pub mod value;

pub use args::*;
pub use error::*;
pub use handle::*;
pub use value::*;
