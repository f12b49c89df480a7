//! Abstract syntax tree for parsed templates.
//!
//! The parser produces a [`Program`] (a list of [`Node`]s). Programs are immutable
//! once parsed and are shared between compiled templates through `Arc<ParsedTemplate>`.

use serde_json::Value;

use crate::constants::PARTIAL_BLOCK_NAME;

/// A sequence of template nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub nodes: Vec<Node>,
}

/// All template node types.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text copied to the output.
    Text(String),
    /// `{{! ... }}` or `{{!-- ... --}}`; produces no output.
    Comment(String),
    /// `{{expr}}`, `{{{expr}}}` or `{{& expr}}`.
    Mustache(Mustache),
    /// `{{#helper ...}}...{{/helper}}` and `{{^name}}...{{/name}}`.
    Block(Block),
    /// `{{> name ctx key=value}}`.
    Partial(PartialCall),
    /// `{{#> name}}fallback{{/name}}`.
    PartialBlock(PartialBlock),
    /// `{{#*inline "name"}}...{{/inline}}`.
    InlinePartial(InlinePartial),
    /// `{{{{helper args}}}}unparsed body{{{{/helper}}}}`.
    RawBlock(RawBlock),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mustache {
    pub expr: Expression,
    /// Whether the output is HTML-escaped (`{{ }}` vs `{{{ }}}`).
    pub escaped: bool,
    pub line: usize,
}

/// A helper call or a plain path lookup: `head param* key=value*`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub head: Param,
    pub params: Vec<Param>,
    pub hash: Vec<(String, Param)>,
}

impl Expression {
    /// Name of the helper this expression would invoke, if its head is a simple identifier.
    pub fn helper_name(&self) -> Option<&str> {
        match &self.head {
            Param::Path(path) => path.simple_name(),
            _ => None,
        }
    }

    /// Whether the expression carries arguments (which forces a helper call).
    pub fn has_arguments(&self) -> bool {
        !self.params.is_empty() || !self.hash.is_empty()
    }

    /// Original source text of the head, used in error messages.
    pub fn head_text(&self) -> String {
        match &self.head {
            Param::Path(path) => path.original.clone(),
            Param::Literal(value) => value.to_string(),
            Param::SubExpr(_) => "(subexpression)".to_string(),
        }
    }
}

/// An argument or expression head.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Path(PathExpr),
    Literal(Value),
    SubExpr(Box<Expression>),
}

/// A data path such as `foo.bar`, `../name`, `this`, or `@../index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    /// `@`-prefixed data variable.
    pub data: bool,
    /// Number of leading `../` segments.
    pub depth: usize,
    /// Starts with `this` or `.`.
    pub explicit_this: bool,
    /// Remaining segments after `this`/`../`/`@`.
    pub parts: Vec<String>,
    /// The path exactly as written in the template.
    pub original: String,
}

impl PathExpr {
    /// Returns the identifier when this path could name a helper (`foo`, not `foo.bar`).
    pub fn simple_name(&self) -> Option<&str> {
        if !self.data && self.depth == 0 && !self.explicit_this && self.parts.len() == 1 {
            Some(self.parts[0].as_str())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub expr: Expression,
    pub block_params: Vec<String>,
    pub program: Program,
    pub inverse: Option<Program>,
    /// `{{^name}}` inverse section.
    pub inverted: bool,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialCall {
    pub name: String,
    pub context: Option<Param>,
    pub hash: Vec<(String, Param)>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialBlock {
    pub call: PartialCall,
    pub program: Program,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlinePartial {
    pub name: String,
    pub program: Program,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub expr: Expression,
    pub body: String,
    pub line: usize,
}

impl Program {
    /// Partial names referenced anywhere in this program, in discovery order,
    /// without duplicates. `@partial-block` and names defined by inline partials
    /// of this program are excluded; raw block bodies are not scanned.
    pub fn partial_references(&self) -> Vec<String> {
        let mut inline = Vec::new();
        collect_inline_names(self, &mut inline);

        let mut references = Vec::new();
        collect_references(self, &mut references);
        references.retain(|name| name != PARTIAL_BLOCK_NAME && !inline.contains(name));
        references
    }

    /// Inline partials declared at the top level of this program.
    pub fn inline_partials(&self) -> impl Iterator<Item = &InlinePartial> {
        self.nodes.iter().filter_map(|node| match node {
            Node::InlinePartial(inline) => Some(inline),
            _ => None,
        })
    }
}

fn push_unique(references: &mut Vec<String>, name: &str) {
    if !references.iter().any(|existing| existing == name) {
        references.push(name.to_string());
    }
}

fn collect_references(program: &Program, references: &mut Vec<String>) {
    for node in &program.nodes {
        match node {
            Node::Partial(call) => push_unique(references, &call.name),
            Node::PartialBlock(block) => {
                push_unique(references, &block.call.name);
                collect_references(&block.program, references);
            }
            Node::Block(block) => {
                collect_references(&block.program, references);
                if let Some(inverse) = &block.inverse {
                    collect_references(inverse, references);
                }
            }
            Node::InlinePartial(inline) => collect_references(&inline.program, references),
            Node::Text(_) | Node::Comment(_) | Node::Mustache(_) | Node::RawBlock(_) => {}
        }
    }
}

fn collect_inline_names(program: &Program, names: &mut Vec<String>) {
    for node in &program.nodes {
        match node {
            Node::InlinePartial(inline) => {
                push_unique(names, &inline.name);
                collect_inline_names(&inline.program, names);
            }
            Node::PartialBlock(block) => collect_inline_names(&block.program, names),
            Node::Block(block) => {
                collect_inline_names(&block.program, names);
                if let Some(inverse) = &block.inverse {
                    collect_inline_names(inverse, names);
                }
            }
            Node::Text(_)
            | Node::Comment(_)
            | Node::Mustache(_)
            | Node::Partial(_)
            | Node::RawBlock(_) => {}
        }
    }
}
