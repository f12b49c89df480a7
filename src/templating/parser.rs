//! Builds the [`Program`] tree from lexer tokens.
//!
//! Tag contents are parsed with a small expression tokenizer that understands
//! string and number literals, paths (including `[segment]` literals and `../`),
//! subexpressions, hash arguments and `as |a b|` block params.

use serde_json::Value;

use super::ast::{
    Block, Expression, InlinePartial, Mustache, Node, Param, PartialBlock, PartialCall, PathExpr,
    Program, RawBlock,
};
use super::error::ParseError;
use super::lexer::{Tag, TagKind, Token, tokenize};

/// A template parsed once and shared by every compiled template that references it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTemplate {
    pub source: String,
    pub program: Program,
    /// External partial references, in discovery order.
    pub references: Vec<String>,
}

/// Parses template source into a [`ParsedTemplate`].
pub fn parse(source: &str) -> Result<ParsedTemplate, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
    };
    let (nodes, stop) = parser.parse_nodes()?;
    match stop {
        Stop::End => {}
        Stop::Close(tag) => {
            return Err(error_at(&tag, format!("Unexpected closing tag '{{{{/{}}}}}'", tag.content)));
        }
        Stop::Else(tag) => return Err(error_at(&tag, "Unexpected '{{else}}' outside of a block")),
    }
    let program = Program { nodes };
    let references = program.partial_references();
    Ok(ParsedTemplate {
        source: source.to_string(),
        program,
        references,
    })
}

enum Stop {
    End,
    Close(Tag),
    Else(Tag),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn error_at(tag: &Tag, message: impl Into<String>) -> ParseError {
    ParseError::new(message, tag.line, tag.column)
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_nodes(&mut self) -> Result<(Vec<Node>, Stop), ParseError> {
        let mut nodes = Vec::new();
        while let Some(token) = self.next() {
            match token {
                Token::Text(text) => nodes.push(Node::Text(text)),
                Token::RawBlock {
                    content,
                    body,
                    line,
                    column,
                } => {
                    let expr = parse_expression(&content)
                        .map_err(|message| ParseError::new(message, line, column))?;
                    nodes.push(Node::RawBlock(RawBlock {
                        expr,
                        body,
                        line,
                    }));
                }
                Token::Tag(tag) => match tag.kind {
                    TagKind::Comment => nodes.push(Node::Comment(tag.content)),
                    TagKind::Variable { escaped } => {
                        let expr =
                            parse_expression(&tag.content).map_err(|m| error_at(&tag, m))?;
                        nodes.push(Node::Mustache(Mustache {
                            expr,
                            escaped,
                            line: tag.line,
                        }));
                    }
                    TagKind::OpenBlock | TagKind::OpenInverse => {
                        nodes.push(Node::Block(self.parse_block(&tag)?));
                    }
                    TagKind::Partial => {
                        let call = parse_partial_call(&tag)?;
                        nodes.push(Node::Partial(call));
                    }
                    TagKind::OpenPartialBlock => {
                        let call = parse_partial_call(&tag)?;
                        let program = self.parse_body_until_close(&tag, &call.name)?;
                        nodes.push(Node::PartialBlock(PartialBlock { call, program }));
                    }
                    TagKind::OpenDecorator => {
                        nodes.push(Node::InlinePartial(self.parse_inline(&tag)?));
                    }
                    TagKind::Close => return Ok((nodes, Stop::Close(tag))),
                    TagKind::Else => return Ok((nodes, Stop::Else(tag))),
                },
            }
        }
        Ok((nodes, Stop::End))
    }

    fn parse_block(&mut self, open: &Tag) -> Result<Block, ParseError> {
        let (expr, block_params) =
            parse_block_expression(&open.content).map_err(|m| error_at(open, m))?;
        let close_name = expr.head_text();
        self.parse_block_rest(
            open,
            &close_name,
            expr,
            block_params,
            open.kind == TagKind::OpenInverse,
        )
    }

    /// Parses a block body through its `{{/name}}`, following `{{else}}` chains.
    fn parse_block_rest(
        &mut self,
        open: &Tag,
        close_name: &str,
        expr: Expression,
        block_params: Vec<String>,
        inverted: bool,
    ) -> Result<Block, ParseError> {
        let (nodes, stop) = self.parse_nodes()?;
        let program = Program { nodes };
        let inverse = match stop {
            Stop::End => {
                return Err(error_at(open, format!("Block '{close_name}' is never closed")));
            }
            Stop::Close(tag) => {
                check_close(&tag, close_name)?;
                None
            }
            Stop::Else(tag) if tag.content.is_empty() => {
                let (nodes, stop) = self.parse_nodes()?;
                match stop {
                    Stop::Close(close) => check_close(&close, close_name)?,
                    Stop::Else(extra) => {
                        return Err(error_at(&extra, "Block has more than one '{{else}}'"));
                    }
                    Stop::End => {
                        return Err(error_at(open, format!("Block '{close_name}' is never closed")));
                    }
                }
                Some(Program { nodes })
            }
            Stop::Else(tag) => {
                // `{{else if cond}}` opens a nested block sharing the outer close tag.
                let (chained, params) =
                    parse_block_expression(&tag.content).map_err(|m| error_at(&tag, m))?;
                let nested = self.parse_block_rest(&tag, close_name, chained, params, false)?;
                Some(Program {
                    nodes: vec![Node::Block(nested)],
                })
            }
        };
        Ok(Block {
            expr,
            block_params,
            program,
            inverse,
            inverted,
            line: open.line,
        })
    }

    fn parse_body_until_close(&mut self, open: &Tag, name: &str) -> Result<Program, ParseError> {
        let (nodes, stop) = self.parse_nodes()?;
        match stop {
            Stop::Close(tag) => {
                check_close(&tag, name)?;
                Ok(Program { nodes })
            }
            Stop::Else(tag) => Err(error_at(&tag, format!("'{{{{else}}}}' is not allowed in '{name}'"))),
            Stop::End => Err(error_at(open, format!("Block '{name}' is never closed"))),
        }
    }

    fn parse_inline(&mut self, open: &Tag) -> Result<InlinePartial, ParseError> {
        let tokens = lex_expression(&open.content).map_err(|m| error_at(open, m))?;
        let name = match tokens.as_slice() {
            [ExprToken::Word(decorator), ExprToken::Str(name)] if decorator == "inline" => {
                name.clone()
            }
            [ExprToken::Word(decorator), ..] if decorator == "inline" => {
                return Err(error_at(open, "Inline partials require a quoted name"));
            }
            _ => {
                return Err(error_at(
                    open,
                    format!("Unsupported decorator '{{{{#*{}}}}}'", open.content),
                ));
            }
        };
        let program = self.parse_body_until_close(open, "inline")?;
        Ok(InlinePartial { name, program })
    }
}

fn check_close(tag: &Tag, expected: &str) -> Result<(), ParseError> {
    if tag.content == expected {
        Ok(())
    } else {
        Err(error_at(
            tag,
            format!("'{expected}' doesn't match '{}'", tag.content),
        ))
    }
}

fn parse_partial_call(tag: &Tag) -> Result<PartialCall, ParseError> {
    let content = tag.content.as_str();
    if content.starts_with('(') {
        return Err(error_at(tag, "Dynamic partial names are not supported"));
    }
    let (name, rest) = if let Some(quote) = content.chars().next().filter(|c| *c == '"' || *c == '\'')
    {
        let (value, consumed) =
            read_string(&content[1..], quote).map_err(|m| error_at(tag, m))?;
        (value, &content[1 + consumed..])
    } else {
        let end = content.find(char::is_whitespace).unwrap_or(content.len());
        (content[..end].to_string(), &content[end..])
    };
    if name.is_empty() {
        return Err(error_at(tag, "Partial name is missing"));
    }

    let tokens = lex_expression(rest).map_err(|m| error_at(tag, m))?;
    let mut stream = ExprStream { tokens, pos: 0 };
    let mut context = None;
    let mut hash = Vec::new();
    while !stream.done() {
        if let Some(key) = stream.hash_key() {
            hash.push((key, stream.param().map_err(|m| error_at(tag, m))?));
        } else if context.is_none() && hash.is_empty() {
            context = Some(stream.param().map_err(|m| error_at(tag, m))?);
        } else {
            return Err(error_at(tag, format!("Unexpected argument in partial '{name}'")));
        }
    }
    Ok(PartialCall {
        name,
        context,
        hash,
        line: tag.line,
    })
}

/// Parses a tag body into an expression.
pub(crate) fn parse_expression(content: &str) -> Result<Expression, String> {
    let (expr, params) = parse_block_expression(content)?;
    if !params.is_empty() {
        return Err("Block params are only allowed on block helpers".to_string());
    }
    Ok(expr)
}

fn parse_block_expression(content: &str) -> Result<(Expression, Vec<String>), String> {
    let tokens = lex_expression(content)?;
    let mut stream = ExprStream { tokens, pos: 0 };
    let expr = stream.expression(false)?;
    let block_params = stream.block_params()?;
    if !stream.done() {
        return Err(format!("Unexpected token in '{content}'"));
    }
    Ok((expr, block_params))
}

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Word(String),
    Str(String),
    Number(Value),
    Open,
    Close,
    Equals,
    Pipe,
}

fn lex_expression(content: &str) -> Result<Vec<ExprToken>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = content.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(ExprToken::Open);
                i += 1;
            }
            ')' => {
                tokens.push(ExprToken::Close);
                i += 1;
            }
            '=' => {
                tokens.push(ExprToken::Equals);
                i += 1;
            }
            '|' => {
                tokens.push(ExprToken::Pipe);
                i += 1;
            }
            '"' | '\'' => {
                let rest: String = chars[i + 1..].iter().collect();
                let (value, consumed) = read_string(&rest, c)?;
                tokens.push(ExprToken::Str(value));
                i += 1 + rest[..consumed].chars().count();
            }
            _ => {
                let start = i;
                let mut in_brackets = false;
                while i < chars.len() {
                    let ch = chars[i];
                    if in_brackets {
                        if ch == ']' {
                            in_brackets = false;
                        }
                    } else if ch == '[' {
                        in_brackets = true;
                    } else if ch.is_whitespace() || matches!(ch, '(' | ')' | '=' | '|') {
                        break;
                    }
                    i += 1;
                }
                if in_brackets {
                    return Err("Unclosed '[' in path".to_string());
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(number_literal(&word).map_or(ExprToken::Word(word), ExprToken::Number));
            }
        }
    }
    Ok(tokens)
}

/// Reads a quoted string whose opening quote was already consumed.
/// Returns the unescaped value and the number of bytes consumed including the closing quote.
fn read_string(input: &str, quote: char) -> Result<(String, usize), String> {
    let mut value = String::new();
    let mut escaped = false;
    for (offset, c) in input.char_indices() {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((value, offset + c.len_utf8()));
        } else {
            value.push(c);
        }
    }
    Err("Unterminated string literal".to_string())
}

fn number_literal(word: &str) -> Option<Value> {
    let first = word.chars().next()?;
    if !(first.is_ascii_digit() || (first == '-' && word.len() > 1)) {
        return None;
    }
    if let Ok(int) = word.parse::<i64>() {
        return Some(Value::from(int));
    }
    word.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

struct ExprStream {
    tokens: Vec<ExprToken>,
    pos: usize,
}

impl ExprStream {
    fn done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.pos)
    }

    fn at_block_params(&self) -> bool {
        matches!(
            (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)),
            (Some(ExprToken::Word(word)), Some(ExprToken::Pipe)) if word == "as"
        )
    }

    /// Consumes `key =` and returns `key` when the stream is at a hash argument.
    fn hash_key(&mut self) -> Option<String> {
        match (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)) {
            (Some(ExprToken::Word(key)), Some(ExprToken::Equals)) => {
                let key = key.clone();
                self.pos += 2;
                Some(key)
            }
            _ => None,
        }
    }

    fn expression(&mut self, nested: bool) -> Result<Expression, String> {
        let head = self.param()?;
        let mut params = Vec::new();
        let mut hash = Vec::new();
        loop {
            match self.peek() {
                None => {
                    if nested {
                        return Err("Unclosed subexpression".to_string());
                    }
                    break;
                }
                Some(ExprToken::Close) if nested => {
                    self.pos += 1;
                    break;
                }
                Some(ExprToken::Close) => return Err("Unexpected ')'".to_string()),
                _ if !nested && self.at_block_params() => break,
                _ => {
                    if let Some(key) = self.hash_key() {
                        hash.push((key, self.param()?));
                    } else if hash.is_empty() {
                        params.push(self.param()?);
                    } else {
                        return Err("Positional arguments must come before hash arguments".to_string());
                    }
                }
            }
        }
        Ok(Expression { head, params, hash })
    }

    fn param(&mut self) -> Result<Param, String> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| "Expected an argument".to_string())?;
        self.pos += 1;
        match token {
            ExprToken::Str(value) => Ok(Param::Literal(Value::String(value))),
            ExprToken::Number(value) => Ok(Param::Literal(value)),
            ExprToken::Open => Ok(Param::SubExpr(Box::new(self.expression(true)?))),
            ExprToken::Word(word) => Ok(match word.as_str() {
                "true" => Param::Literal(Value::Bool(true)),
                "false" => Param::Literal(Value::Bool(false)),
                "null" | "undefined" => Param::Literal(Value::Null),
                _ => Param::Path(parse_path(&word)?),
            }),
            ExprToken::Close | ExprToken::Equals | ExprToken::Pipe => {
                Err("Unexpected token in expression".to_string())
            }
        }
    }

    fn block_params(&mut self) -> Result<Vec<String>, String> {
        if !self.at_block_params() {
            return Ok(Vec::new());
        }
        self.pos += 2;
        let mut names = Vec::new();
        loop {
            match self.tokens.get(self.pos).cloned() {
                Some(ExprToken::Word(name)) => {
                    names.push(name);
                    self.pos += 1;
                }
                Some(ExprToken::Pipe) => {
                    self.pos += 1;
                    break;
                }
                _ => return Err("Malformed block params".to_string()),
            }
        }
        if names.is_empty() {
            return Err("Block params require at least one name".to_string());
        }
        Ok(names)
    }
}

/// Parses a path such as `../a.b`, `this.[x y]`, `@../index` or `a/b`.
pub(crate) fn parse_path(original: &str) -> Result<PathExpr, String> {
    let (data, mut rest) = match original.strip_prefix('@') {
        Some(rest) => (true, rest),
        None => (false, original),
    };

    let mut depth = 0;
    while let Some(stripped) = rest.strip_prefix("../") {
        depth += 1;
        rest = stripped;
    }
    if rest == ".." {
        depth += 1;
        rest = "";
    }

    let mut explicit_this = false;
    if rest == "this" || rest == "." {
        explicit_this = true;
        rest = "";
    } else if let Some(stripped) = rest
        .strip_prefix("this.")
        .or_else(|| rest.strip_prefix("this/"))
        .or_else(|| rest.strip_prefix("./"))
    {
        explicit_this = true;
        rest = stripped;
    }

    let mut parts = Vec::new();
    if !rest.is_empty() {
        let mut current = String::new();
        let mut bracketed = false;
        let mut in_brackets = false;
        for c in rest.chars() {
            match c {
                '[' if !in_brackets && current.is_empty() && !bracketed => {
                    in_brackets = true;
                    bracketed = true;
                }
                ']' if in_brackets => in_brackets = false,
                '.' | '/' if !in_brackets => {
                    if !bracketed && (current.is_empty() || current == "this") {
                        return Err(format!("Invalid path: {original}"));
                    }
                    parts.push(std::mem::take(&mut current));
                    bracketed = false;
                }
                _ => current.push(c),
            }
        }
        if in_brackets || (!bracketed && (current.is_empty() || current == "this")) {
            return Err(format!("Invalid path: {original}"));
        }
        parts.push(current);
    }

    if data && parts.is_empty() {
        return Err(format!("Invalid data path: {original}"));
    }
    if !data && parts.is_empty() && depth == 0 && !explicit_this {
        return Err(format!("Invalid path: {original}"));
    }

    Ok(PathExpr {
        data,
        depth,
        explicit_this,
        parts,
        original: original.to_string(),
    })
}
