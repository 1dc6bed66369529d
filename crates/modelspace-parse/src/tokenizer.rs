use std::error::Error;
use std::fmt::{self, Display};

/// Operator associativity, used by the precedence climber.
#[derive(Debug, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// Lexical error with the byte offset it was found at.
#[derive(Debug)]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

impl TokenizerError {
    fn at(pos: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

impl Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.pos)
    }
}

impl Error for TokenizerError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    /// Whole formula text without a leading `=`.
    Literal,
    Operand,
    /// `(` directly after a name or closer: a call.
    Call,
    /// `(` opening a grouped sub-expression.
    Paren,
    /// `[` directly after a name or closer: parametrized child access.
    Index,
    /// `{` array literal.
    Array,
    Sep,
    Dot,
    /// `:=` binding a default or a named argument.
    Assign,
    OpPrefix,
    OpInfix,
    Whitespace,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSubType {
    None,
    Text,
    Number,
    Logical,
    /// The `NONE` literal.
    Empty,
    Name,
    Open,
    Close,
    Arg,
}

/// A token of a formula, with its byte span in the source.
#[derive(Debug, Clone, PartialEq, Hash)]
pub struct Token {
    pub value: String,
    pub token_type: TokenType,
    pub subtype: TokenSubType,
    pub start: usize,
    pub end: usize,
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?} {:?}", self.token_type, self.subtype, self.value)
    }
}

impl Token {
    pub fn is_operator(&self) -> bool {
        matches!(self.token_type, TokenType::OpPrefix | TokenType::OpInfix)
    }

    pub fn is_name(&self) -> bool {
        self.token_type == TokenType::Operand && self.subtype == TokenSubType::Name
    }

    pub fn is_open(&self, token_type: TokenType) -> bool {
        self.token_type == token_type && self.subtype == TokenSubType::Open
    }

    pub fn is_close(&self, token_type: TokenType) -> bool {
        self.token_type == token_type && self.subtype == TokenSubType::Close
    }

    /// Binding power of an operator token. Unary plus/minus binds tightest.
    pub fn get_precedence(&self) -> Option<(u8, Associativity)> {
        use Associativity::{Left, Right};
        if self.token_type == TokenType::OpPrefix {
            return Some((7, Right));
        }
        let power = match self.value.as_str() {
            "^" => 5,
            "*" | "/" => 4,
            "+" | "-" => 3,
            "&" => 2,
            "=" | "<" | ">" | "<=" | ">=" | "<>" => 1,
            _ => return None,
        };
        Some((power, Left))
    }

    fn closer_byte(&self) -> u8 {
        match self.token_type {
            TokenType::Array => b'}',
            TokenType::Index => b']',
            _ => b')',
        }
    }
}

fn operand_subtype(value: &str) -> TokenSubType {
    match value.as_bytes().first() {
        Some(b'"') => TokenSubType::Text,
        Some(b) if b.is_ascii_digit() || *b == b'.' => TokenSubType::Number,
        _ if value.eq_ignore_ascii_case("TRUE") || value.eq_ignore_ascii_case("FALSE") => {
            TokenSubType::Logical
        }
        _ if value.eq_ignore_ascii_case("NONE") => TokenSubType::Empty,
        _ => TokenSubType::Name,
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// Splits formula text into tokens, whitespace included, so that
/// [`Tokenizer::render`] reproduces the source exactly.
pub struct Tokenizer {
    formula: String,
    pub items: Vec<Token>,
    /// Open brackets awaiting their closer.
    open: Vec<Token>,
    pos: usize,
}

impl Tokenizer {
    pub fn new(formula: &str) -> Result<Self, TokenizerError> {
        let mut tokenizer = Tokenizer {
            formula: formula.to_string(),
            items: Vec::new(),
            open: Vec::new(),
            pos: 0,
        };
        tokenizer.run()?;
        Ok(tokenizer)
    }

    fn byte_at(&self, pos: usize) -> Option<u8> {
        self.formula.as_bytes().get(pos).copied()
    }

    fn push(&mut self, token_type: TokenType, subtype: TokenSubType, end: usize) -> Token {
        let token = Token {
            value: self.formula[self.pos..end].to_string(),
            token_type,
            subtype,
            start: self.pos,
            end,
        };
        self.items.push(token.clone());
        self.pos = end;
        token
    }

    fn run(&mut self) -> Result<(), TokenizerError> {
        match self.byte_at(0) {
            None => return Ok(()),
            Some(b'=') => self.pos = 1,
            Some(_) => {
                self.push(TokenType::Literal, TokenSubType::None, self.formula.len());
                return Ok(());
            }
        }

        while let Some(b) = self.byte_at(self.pos) {
            match b {
                b'"' => self.string()?,
                b if is_space(b) => {
                    let mut end = self.pos;
                    while self.byte_at(end).is_some_and(is_space) {
                        end += 1;
                    }
                    self.push(TokenType::Whitespace, TokenSubType::None, end);
                }
                b'0'..=b'9' => self.operand(true),
                b'.' if self.starts_fraction() => self.operand(true),
                b'.' => {
                    self.push(TokenType::Dot, TokenSubType::None, self.pos + 1);
                }
                b if is_word_byte(b) => self.operand(false),
                b'(' | b'{' | b'[' => self.opener(b)?,
                b')' | b'}' | b']' => self.closer(b)?,
                b',' => self.separator()?,
                b'+' | b'-' | b'*' | b'/' | b'^' | b'&' | b'=' | b'>' | b'<' | b':' => {
                    self.operator(b)?
                }
                _ => {
                    let ch = self.formula[self.pos..].chars().next().unwrap_or('?');
                    return Err(TokenizerError::at(
                        self.pos,
                        format!("Unexpected character '{ch}'"),
                    ));
                }
            }
        }

        match self.open.last() {
            Some(open) => Err(TokenizerError::at(
                open.start,
                format!("Unmatched '{}'", open.value),
            )),
            None => Ok(()),
        }
    }

    /// The last token ends a value (operand or closer). With `adjacent`,
    /// whitespace in between does not count.
    fn follows_value(&self, adjacent: bool) -> bool {
        let last = if adjacent {
            self.items.last()
        } else {
            self.items
                .iter()
                .rev()
                .find(|t| t.token_type != TokenType::Whitespace)
        };
        last.is_some_and(|t| t.token_type == TokenType::Operand || t.subtype == TokenSubType::Close)
    }

    /// `.5` starts a number unless it reads an attribute of a value.
    fn starts_fraction(&self) -> bool {
        self.byte_at(self.pos + 1).is_some_and(|b| b.is_ascii_digit()) && !self.follows_value(true)
    }

    /// A name, keyword or number. Numbers take one '.', and an exponent
    /// whose sign stays part of the literal (`1.5e-2`).
    fn operand(&mut self, numeric: bool) {
        let bytes = self.formula.as_bytes();
        let mut end = self.pos;
        if numeric {
            let mut seen_dot = false;
            while let Some(&b) = bytes.get(end) {
                match b {
                    b'0'..=b'9' => end += 1,
                    b'.' if !seen_dot => {
                        seen_dot = true;
                        end += 1;
                    }
                    _ => break,
                }
            }
            if matches!(bytes.get(end), Some(b'e' | b'E')) {
                let digits_at = match bytes.get(end + 1) {
                    Some(b'+' | b'-') => end + 2,
                    _ => end + 1,
                };
                if bytes.get(digits_at).is_some_and(u8::is_ascii_digit) {
                    end = digits_at;
                    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
                        end += 1;
                    }
                }
            }
        }
        // Trailing letters stay on the token; a malformed number is
        // reported by the parser.
        while bytes.get(end).copied().is_some_and(is_word_byte) {
            end += 1;
        }
        let subtype = operand_subtype(&self.formula[self.pos..end]);
        self.push(TokenType::Operand, subtype, end);
    }

    /// Double-quoted text; `""` escapes a quote.
    fn string(&mut self) -> Result<(), TokenizerError> {
        let mut end = self.pos + 1;
        loop {
            match self.byte_at(end) {
                None => {
                    return Err(TokenizerError::at(self.pos, "Unterminated string literal"));
                }
                Some(b'"') if self.byte_at(end + 1) == Some(b'"') => end += 2,
                Some(b'"') => break,
                Some(_) => end += 1,
            }
        }
        self.push(TokenType::Operand, TokenSubType::Text, end + 1);
        Ok(())
    }

    fn operator(&mut self, b: u8) -> Result<(), TokenizerError> {
        let pair = (b, self.byte_at(self.pos + 1).unwrap_or(0));
        let (token_type, width) = match pair {
            (b'>', b'=') | (b'<', b'=') | (b'<', b'>') => (TokenType::OpInfix, 2),
            (b':', b'=') => (TokenType::Assign, 2),
            (b':', _) => return Err(TokenizerError::at(self.pos, "Expected ':=' after ':'")),
            (b'+' | b'-', _) if !self.follows_value(false) => (TokenType::OpPrefix, 1),
            _ => (TokenType::OpInfix, 1),
        };
        self.push(token_type, TokenSubType::None, self.pos + width);
        Ok(())
    }

    /// '(' is a call when it directly follows a value, '[' must.
    fn opener(&mut self, b: u8) -> Result<(), TokenizerError> {
        let adjacent = self.follows_value(true);
        let token_type = match b {
            b'{' => TokenType::Array,
            b'(' if adjacent => TokenType::Call,
            b'(' => TokenType::Paren,
            _ if adjacent => TokenType::Index,
            _ => {
                return Err(TokenizerError::at(
                    self.pos,
                    "'[' must directly follow the space it indexes",
                ));
            }
        };
        let token = self.push(token_type, TokenSubType::Open, self.pos + 1);
        self.open.push(token);
        Ok(())
    }

    fn closer(&mut self, b: u8) -> Result<(), TokenizerError> {
        let Some(open) = self.open.pop() else {
            return Err(TokenizerError::at(
                self.pos,
                format!("'{}' closes nothing", b as char),
            ));
        };
        if open.closer_byte() != b {
            return Err(TokenizerError::at(
                self.pos,
                format!("Mismatched '{}' and '{}'", open.value, b as char),
            ));
        }
        self.push(open.token_type, TokenSubType::Close, self.pos + 1);
        Ok(())
    }

    fn separator(&mut self) -> Result<(), TokenizerError> {
        let in_list = self.open.last().is_some_and(|top| {
            matches!(
                top.token_type,
                TokenType::Call | TokenType::Index | TokenType::Array
            )
        });
        if !in_list {
            return Err(TokenizerError::at(
                self.pos,
                "',' outside of an argument list",
            ));
        }
        self.push(TokenType::Sep, TokenSubType::Arg, self.pos + 1);
        Ok(())
    }

    /// The source text, rebuilt from the tokens.
    pub fn render(&self) -> String {
        match self.items.first() {
            None => String::new(),
            Some(t) if t.token_type == TokenType::Literal => t.value.clone(),
            Some(_) => std::iter::once("=")
                .chain(self.items.iter().map(|t| t.value.as_str()))
                .collect(),
        }
    }
}

impl TryFrom<&str> for Tokenizer {
    type Error = TokenizerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Tokenizer::new(value)
    }
}
