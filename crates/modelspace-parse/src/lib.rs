pub mod parser;
pub mod tokenizer;
pub mod types;

pub use parser::{ASTNode, ASTNodeType, Argument, Parser, ParserError, parse, parse_formula};
pub use tokenizer::{Token, TokenSubType, TokenType, Tokenizer, TokenizerError};
pub use types::{FormulaAst, ParamDef};

// Re-export common types
pub use modelspace_common::{ModelError, Value};
