use crate::Value;
use crate::parser::ASTNode;

/// A declared formula parameter. Defaults are constants folded at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub default: Option<Value>,
}

/// A parsed formula: its parameter list and the expression body.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaAst {
    pub params: Vec<ParamDef>,
    pub body: ASTNode,
}

impl FormulaAst {
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }
}
