use crate::tokenizer::{Associativity, Token, TokenSubType, TokenType, TokenizerError};
use crate::types::{FormulaAst, ParamDef};
use crate::{Tokenizer, Value};

use modelspace_common::ModelError;
use std::error::Error;
use std::fmt::{self, Display};

/// A custom error type for the parser.
#[derive(Debug)]
pub struct ParserError {
    pub message: String,
    /// Byte offset in the formula text, when known.
    pub position: Option<usize>,
}

impl Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = self.position {
            write!(f, "ParserError at position {}: {}", pos, self.message)
        } else {
            write!(f, "ParserError: {}", self.message)
        }
    }
}

impl Error for ParserError {}

impl From<TokenizerError> for ParserError {
    fn from(err: TokenizerError) -> Self {
        ParserError {
            message: err.message,
            position: Some(err.pos),
        }
    }
}

impl From<ParserError> for ModelError {
    fn from(err: ParserError) -> Self {
        ModelError::Formula {
            message: err.message,
            position: err.position.unwrap_or(0),
        }
    }
}

/// One argument of a call or index expression, optionally named (`k := v`).
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub value: ASTNode,
}

/// The different types of AST nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum ASTNodeType {
    Literal(Value),
    /// A free name, resolved against the evaluating space at call time.
    Name(String),
    Attribute {
        target: Box<ASTNode>,
        name: String,
    },
    Call {
        callee: Box<ASTNode>,
        args: Vec<Argument>,
    },
    Index {
        target: Box<ASTNode>,
        args: Vec<Argument>,
    },
    UnaryOp {
        op: String,
        expr: Box<ASTNode>,
    },
    BinaryOp {
        op: String,
        left: Box<ASTNode>,
        right: Box<ASTNode>,
    },
    Array(Vec<ASTNode>),
}

impl Display for ASTNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ASTNodeType::Literal(value) => write!(f, "Literal({value})"),
            ASTNodeType::Name(name) => write!(f, "Name({name})"),
            ASTNodeType::Attribute { target, name } => write!(f, "Attribute({target}, {name})"),
            ASTNodeType::Call { callee, args } => write!(f, "Call({callee}, {})", args.len()),
            ASTNodeType::Index { target, args } => write!(f, "Index({target}, {})", args.len()),
            ASTNodeType::UnaryOp { op, expr } => write!(f, "UnaryOp({op}, {expr})"),
            ASTNodeType::BinaryOp { op, left, right } => {
                write!(f, "BinaryOp({op}, {left}, {right})")
            }
            ASTNodeType::Array(items) => write!(f, "Array({})", items.len()),
        }
    }
}

/// An AST node represents a parsed formula element
#[derive(Debug, Clone, PartialEq)]
pub struct ASTNode {
    pub node_type: ASTNodeType,
    pub source_token: Option<Token>,
}

impl ASTNode {
    pub fn new(node_type: ASTNodeType, source_token: Option<Token>) -> Self {
        ASTNode {
            node_type,
            source_token,
        }
    }

    /// Byte offset of the node in the source, if it came from a token.
    pub fn position(&self) -> Option<usize> {
        self.source_token.as_ref().map(|t| t.start)
    }

    /// The name this node refers to, if it is a bare name.
    pub fn as_name(&self) -> Option<&str> {
        match &self.node_type {
            ASTNodeType::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Fold a constant expression (literal, negated number, array of
    /// constants) into a value. Used for parameter defaults.
    pub fn constant_value(&self) -> Option<Value> {
        match &self.node_type {
            ASTNodeType::Literal(v) => Some(v.clone()),
            ASTNodeType::UnaryOp { op, expr } => match (op.as_str(), expr.constant_value()?) {
                ("-", Value::Int(i)) => Some(Value::Int(-i)),
                ("-", Value::Number(n)) => Some(Value::Number(-n)),
                ("+", v @ (Value::Int(_) | Value::Number(_))) => Some(v),
                _ => None,
            },
            ASTNodeType::Array(items) => items
                .iter()
                .map(ASTNode::constant_value)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            _ => None,
        }
    }

    /// Every free name the expression reads, in first-seen order.
    pub fn free_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match &self.node_type {
            ASTNodeType::Literal(_) => {}
            ASTNodeType::Name(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            ASTNodeType::Attribute { target, .. } => target.collect_names(out),
            ASTNodeType::Call { callee: target, args } | ASTNodeType::Index { target, args } => {
                target.collect_names(out);
                for arg in args {
                    arg.value.collect_names(out);
                }
            }
            ASTNodeType::UnaryOp { expr, .. } => expr.collect_names(out),
            ASTNodeType::BinaryOp { left, right, .. } => {
                left.collect_names(out);
                right.collect_names(out);
            }
            ASTNodeType::Array(items) => {
                for item in items {
                    item.collect_names(out);
                }
            }
        }
    }
}

impl Display for ASTNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_type)
    }
}

/// A parser for converting tokens into an AST.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let filtered_tokens = tokens
            .into_iter()
            .filter(|t| t.token_type != TokenType::Whitespace)
            .collect();
        Parser {
            tokens: filtered_tokens,
            position: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    /// Byte offset of the current token, or of the end of input.
    fn here(&self) -> usize {
        self.peek()
            .map(|t| t.start)
            .or_else(|| self.tokens.last().map(|t| t.end))
            .unwrap_or(0)
    }

    fn error(&self, message: impl Into<String>) -> ParserError {
        ParserError {
            message: message.into(),
            position: Some(self.here()),
        }
    }

    /// Parse the tokens into an AST.
    pub fn parse(&mut self) -> Result<ASTNode, ParserError> {
        if self.tokens.is_empty() {
            return Err(ParserError {
                message: "No tokens to parse".to_string(),
                position: None,
            });
        }

        if self.tokens[0].token_type == TokenType::Literal {
            let token = self.tokens[0].clone();
            return Ok(ASTNode::new(
                ASTNodeType::Literal(Value::Text(token.value.clone())),
                Some(token),
            ));
        }

        let ast = self.parse_expression()?;
        if let Some(token) = self.peek() {
            return Err(self.error(format!("Unexpected token {token}")));
        }
        Ok(ast)
    }

    fn parse_expression(&mut self) -> Result<ASTNode, ParserError> {
        self.parse_binary_op(0)
    }

    fn parse_binary_op(&mut self, min_precedence: u8) -> Result<ASTNode, ParserError> {
        let mut left = self.parse_unary_op()?;

        while let Some(token) = self.peek() {
            if token.token_type != TokenType::OpInfix {
                break;
            }

            let (precedence, associativity) =
                token.get_precedence().unwrap_or((0, Associativity::Left));
            if precedence < min_precedence {
                break;
            }

            let op_token = token.clone();
            self.position += 1;

            let next_min_precedence = if associativity == Associativity::Left {
                precedence + 1
            } else {
                precedence
            };

            let right = self.parse_binary_op(next_min_precedence)?;
            left = ASTNode::new(
                ASTNodeType::BinaryOp {
                    op: op_token.value.clone(),
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Some(op_token),
            );
        }

        Ok(left)
    }

    fn parse_unary_op(&mut self) -> Result<ASTNode, ParserError> {
        if let Some(token) = self.peek() {
            if token.token_type == TokenType::OpPrefix {
                let op_token = token.clone();
                self.position += 1;
                let expr = self.parse_unary_op()?;
                return Ok(ASTNode::new(
                    ASTNodeType::UnaryOp {
                        op: op_token.value.clone(),
                        expr: Box::new(expr),
                    },
                    Some(op_token),
                ));
            }
        }
        self.parse_postfix_op()
    }

    /// Attribute access, calls and indexing bind tighter than any operator.
    fn parse_postfix_op(&mut self) -> Result<ASTNode, ParserError> {
        let mut expr = self.parse_primary()?;

        while let Some(token) = self.peek() {
            let token = token.clone();
            match token.token_type {
                TokenType::Dot => {
                    self.position += 1;
                    let name = match self.peek() {
                        Some(t) if t.is_name() => t.value.clone(),
                        _ => return Err(self.error("Expected a member name after '.'")),
                    };
                    self.position += 1;
                    expr = ASTNode::new(
                        ASTNodeType::Attribute {
                            target: Box::new(expr),
                            name,
                        },
                        Some(token),
                    );
                }
                TokenType::Call if token.subtype == TokenSubType::Open => {
                    self.position += 1;
                    let args = self.parse_arguments(TokenType::Call)?;
                    expr = ASTNode::new(
                        ASTNodeType::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        Some(token),
                    );
                }
                TokenType::Index if token.subtype == TokenSubType::Open => {
                    self.position += 1;
                    let args = self.parse_arguments(TokenType::Index)?;
                    expr = ASTNode::new(
                        ASTNodeType::Index {
                            target: Box::new(expr),
                            args,
                        },
                        Some(token),
                    );
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<ASTNode, ParserError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("Unexpected end of formula"));
        };

        match token.token_type {
            TokenType::Operand => {
                self.position += 1;
                self.parse_operand(token)
            }
            TokenType::Paren if token.subtype == TokenSubType::Open => {
                self.position += 1;
                let expr = self.parse_expression()?;
                match self.peek() {
                    Some(t) if t.is_close(TokenType::Paren) => {
                        self.position += 1;
                        Ok(expr)
                    }
                    _ => Err(self.error("Expected closing parenthesis")),
                }
            }
            TokenType::Array if token.subtype == TokenSubType::Open => {
                self.position += 1;
                self.parse_array(token)
            }
            _ => Err(self.error(format!("Unexpected token {token}"))),
        }
    }

    fn parse_operand(&mut self, token: Token) -> Result<ASTNode, ParserError> {
        let node_type = match token.subtype {
            TokenSubType::Number => ASTNodeType::Literal(parse_number(&token)?),
            TokenSubType::Text => {
                // Strip surrounding quotes and unescape doubled quotes
                let inner = &token.value[1..token.value.len() - 1];
                ASTNodeType::Literal(Value::Text(inner.replace("\"\"", "\"")))
            }
            TokenSubType::Logical => {
                ASTNodeType::Literal(Value::Bool(token.value.eq_ignore_ascii_case("TRUE")))
            }
            TokenSubType::Empty => ASTNodeType::Literal(Value::Empty),
            TokenSubType::Name => ASTNodeType::Name(token.value.clone()),
            _ => {
                return Err(ParserError {
                    message: format!("Unexpected operand subtype: {:?}", token.subtype),
                    position: Some(token.start),
                });
            }
        };
        Ok(ASTNode::new(node_type, Some(token)))
    }

    /// Parse `arg, name := arg, ...` up to the closer of `list_type`.
    fn parse_arguments(&mut self, list_type: TokenType) -> Result<Vec<Argument>, ParserError> {
        let mut args = Vec::new();

        if self.peek().is_some_and(|t| t.is_close(list_type)) {
            self.position += 1;
            return Ok(args);
        }

        loop {
            args.push(self.parse_argument()?);
            match self.peek() {
                Some(t) if t.token_type == TokenType::Sep => {
                    self.position += 1;
                }
                Some(t) if t.is_close(list_type) => {
                    self.position += 1;
                    break;
                }
                Some(t) => {
                    return Err(self.error(format!("Expected ',' or closer in arguments, got {t}")));
                }
                None => return Err(self.error("Unexpected end of arguments")),
            }
        }

        Ok(args)
    }

    fn parse_argument(&mut self) -> Result<Argument, ParserError> {
        if self.peek().is_some_and(|t| t.token_type == TokenType::Sep) {
            return Err(self.error("Empty argument"));
        }
        let named = self.peek().is_some_and(Token::is_name)
            && self
                .tokens
                .get(self.position + 1)
                .is_some_and(|t| t.token_type == TokenType::Assign);
        if named {
            let name = self.tokens[self.position].value.clone();
            self.position += 2;
            let value = self.parse_expression()?;
            return Ok(Argument {
                name: Some(name),
                value,
            });
        }
        Ok(Argument {
            name: None,
            value: self.parse_expression()?,
        })
    }

    fn parse_array(&mut self, open: Token) -> Result<ASTNode, ParserError> {
        let mut items = Vec::new();

        if self.peek().is_some_and(|t| t.is_close(TokenType::Array)) {
            self.position += 1;
            return Ok(ASTNode::new(ASTNodeType::Array(items), Some(open)));
        }

        loop {
            items.push(self.parse_expression()?);
            match self.peek() {
                Some(t) if t.token_type == TokenType::Sep => self.position += 1,
                Some(t) if t.is_close(TokenType::Array) => {
                    self.position += 1;
                    break;
                }
                _ => return Err(self.error("Unexpected token in array")),
            }
        }

        Ok(ASTNode::new(ASTNodeType::Array(items), Some(open)))
    }
}

fn parse_number(token: &Token) -> Result<Value, ParserError> {
    let text = token.value.as_str();
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    text.parse::<f64>()
        .map(Value::Number)
        .map_err(|_| ParserError {
            message: format!("Invalid number: {text}"),
            position: Some(token.start),
        })
}

/// Parse a formula body into an AST.
pub fn parse<T: AsRef<str>>(formula: T) -> Result<ASTNode, ParserError> {
    let tokenizer = Tokenizer::new(formula.as_ref())?;
    let mut parser = Parser::new(tokenizer.items);
    parser.parse()
}

/// Parse a formula with its parameter list.
///
/// `=LAMBDA(a, b := 2, a * b)` declares parameters `a` and `b` (with
/// default 2); any other formula takes no parameters.
pub fn parse_formula<T: AsRef<str>>(formula: T) -> Result<FormulaAst, ParserError> {
    let ast = parse(formula)?;
    let ASTNodeType::Call { callee, args } = &ast.node_type else {
        return Ok(FormulaAst {
            params: Vec::new(),
            body: ast,
        });
    };
    if !callee
        .as_name()
        .is_some_and(|n| n.eq_ignore_ascii_case("LAMBDA"))
    {
        return Ok(FormulaAst {
            params: Vec::new(),
            body: ast,
        });
    }

    let Some((body, param_args)) = args.split_last() else {
        return Err(ParserError {
            message: "LAMBDA needs a body".to_string(),
            position: ast.position(),
        });
    };
    if body.name.is_some() {
        return Err(ParserError {
            message: "LAMBDA body cannot be a named argument".to_string(),
            position: body.value.position(),
        });
    }

    let mut params: Vec<ParamDef> = Vec::with_capacity(param_args.len());
    for arg in param_args {
        let param = match &arg.name {
            Some(name) => {
                let default = arg.value.constant_value().ok_or_else(|| ParserError {
                    message: format!("Default of '{name}' must be a constant"),
                    position: arg.value.position(),
                })?;
                ParamDef {
                    name: name.clone(),
                    default: Some(default),
                }
            }
            None => {
                let name = arg.value.as_name().ok_or_else(|| ParserError {
                    message: "LAMBDA parameters must be names".to_string(),
                    position: arg.value.position(),
                })?;
                if params.iter().any(|p| p.default.is_some()) {
                    return Err(ParserError {
                        message: format!("Parameter '{name}' without default follows a default"),
                        position: arg.value.position(),
                    });
                }
                ParamDef {
                    name: name.to_string(),
                    default: None,
                }
            }
        };
        if params.iter().any(|p| p.name == param.name) {
            return Err(ParserError {
                message: format!("Duplicate parameter '{}'", param.name),
                position: arg.value.position(),
            });
        }
        params.push(param);
    }

    Ok(FormulaAst {
        params,
        body: body.value.clone(),
    })
}
