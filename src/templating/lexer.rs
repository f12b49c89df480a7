//! Splits template source into text runs and mustache tags.
//!
//! The lexer only finds tag boundaries and classifies tags by their sigil; the
//! expression inside a tag is parsed later by [`super::parser`]. Whitespace control
//! markers (`{{~` and `~}}`) are applied here so the parser never sees them.

use super::error::ParseError;

/// Classification of a `{{ ... }}` tag by its leading sigil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `{{expr}}` (escaped) or `{{{expr}}}` / `{{& expr}}` (raw).
    Variable { escaped: bool },
    Comment,
    /// `{{#name ...}}`
    OpenBlock,
    /// `{{^name}}`
    OpenInverse,
    /// `{{/name}}`
    Close,
    /// `{{> name ...}}`
    Partial,
    /// `{{#> name ...}}`
    OpenPartialBlock,
    /// `{{#*decorator ...}}`
    OpenDecorator,
    /// `{{else}}`, `{{^}}` or `{{else if ...}}`.
    Else,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub kind: TagKind,
    /// Tag content with the sigil and whitespace-control markers removed.
    pub content: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    Tag(Tag),
    /// `{{{{content}}}}body{{{{/name}}}}`
    RawBlock {
        content: String,
        body: String,
        line: usize,
        column: usize,
    },
}

struct Pending {
    token: Token,
    strip_before: bool,
    strip_after: bool,
}

/// Tokenizes template source.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer {
        source,
        pos: 0,
        located: (0, 1, 1),
        text: String::new(),
        out: Vec::new(),
    };
    lexer.run()?;
    Ok(apply_whitespace_control(lexer.out))
}

struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    /// Byte offset, line and column of the last located tag.
    located: (usize, usize, usize),
    text: String,
    out: Vec<Pending>,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<(), ParseError> {
        while self.pos < self.source.len() {
            let rest = &self.source[self.pos..];
            let Some(offset) = rest.find("{{") else {
                self.text.push_str(rest);
                self.pos = self.source.len();
                break;
            };
            let start = self.pos + offset;

            // `\{{` emits a literal `{{`; `\\{{` emits a backslash and opens a tag.
            if offset > 0 && rest[..offset].ends_with('\\') {
                let before = &rest[..offset - 1];
                if before.ends_with('\\') {
                    self.text.push_str(before);
                } else {
                    self.text.push_str(before);
                    self.text.push_str("{{");
                    self.pos = start + 2;
                    continue;
                }
            } else {
                self.text.push_str(&rest[..offset]);
            }

            self.flush_text();
            if self.source[start..].starts_with("{{{{") {
                self.raw_block(start)?;
            } else {
                self.tag(start)?;
            }
        }
        self.flush_text();
        Ok(())
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.out.push(Pending {
                token: Token::Text(std::mem::take(&mut self.text)),
                strip_before: false,
                strip_after: false,
            });
        }
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> ParseError {
        let (line, column) = location(self.source, offset);
        ParseError::new(message, line, column)
    }

    /// Line and column of `offset`, advancing from the previous tag so the
    /// source is scanned once overall.
    fn locate(&mut self, offset: usize) -> (usize, usize) {
        let (from, mut line, mut column) = self.located;
        if offset < from {
            return location(self.source, offset);
        }
        for c in self.source[from..offset].chars() {
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        self.located = (offset, line, column);
        (line, column)
    }

    fn tag(&mut self, start: usize) -> Result<(), ParseError> {
        let (line, column) = self.locate(start);
        let mut cursor = start + 2;
        let triple = self.source[cursor..].starts_with('{');
        if triple {
            cursor += 1;
        }
        let strip_before = self.source[cursor..].starts_with('~');
        if strip_before {
            cursor += 1;
        }

        let inner = &self.source[cursor..];
        let (raw_content, consumed) = if !triple && inner.starts_with("!--") {
            let end = find_comment_end(inner)
                .ok_or_else(|| self.error("Unterminated comment", start))?;
            (&inner[..end], end + 2)
        } else {
            let close = if triple { "}}}" } else { "}}" };
            let end = inner
                .find(close)
                .ok_or_else(|| self.error("Unclosed mustache tag", start))?;
            (&inner[..end], end + close.len())
        };
        self.pos = cursor + consumed;

        let (raw_content, strip_after) = match raw_content.strip_suffix('~') {
            Some(stripped) => (stripped, true),
            None => (raw_content, false),
        };

        let (kind, content) = if triple {
            (TagKind::Variable { escaped: false }, raw_content.trim())
        } else {
            classify(raw_content)
        };

        if content.is_empty() && !matches!(kind, TagKind::Comment | TagKind::Else) {
            return Err(self.error("Empty mustache tag", start));
        }

        self.out.push(Pending {
            token: Token::Tag(Tag {
                kind,
                content: content.to_string(),
                line,
                column,
            }),
            strip_before,
            strip_after,
        });
        Ok(())
    }

    fn raw_block(&mut self, start: usize) -> Result<(), ParseError> {
        let (line, column) = self.locate(start);
        let open_start = start + 4;
        let open_len = self.source[open_start..]
            .find("}}}}")
            .ok_or_else(|| self.error("Unclosed raw block tag", start))?;
        let content = self.source[open_start..open_start + open_len].trim();
        if content.starts_with('/') {
            return Err(self.error(format!("Unexpected raw block close '{content}'"), start));
        }
        let name = content.split_whitespace().next().unwrap_or_default();
        if name.is_empty() {
            return Err(self.error("Raw block is missing a helper name", start));
        }

        let body_start = open_start + open_len + 4;
        let open_marker = ["{{{{", name].concat();
        let close_marker = ["{{{{/", name, "}}}}"].concat();
        let mut depth = 1usize;
        let mut scan = body_start;
        loop {
            let Some(found) = self.source[scan..].find("{{{{") else {
                return Err(self.error(format!("Raw block '{name}' is never closed"), start));
            };
            let at = scan + found;
            let here = &self.source[at..];
            if here.starts_with(&close_marker) {
                depth -= 1;
                if depth == 0 {
                    self.out.push(Pending {
                        token: Token::RawBlock {
                            content: content.to_string(),
                            body: self.source[body_start..at].to_string(),
                            line,
                            column,
                        },
                        strip_before: false,
                        strip_after: false,
                    });
                    self.pos = at + close_marker.len();
                    return Ok(());
                }
                scan = at + close_marker.len();
            } else {
                if here.starts_with(&open_marker)
                    && here[open_marker.len()..]
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_whitespace() || c == '}')
                {
                    depth += 1;
                }
                scan = at + 4;
            }
        }
    }
}

fn classify(raw: &str) -> (TagKind, &str) {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("#>") {
        (TagKind::OpenPartialBlock, rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix("#*") {
        (TagKind::OpenDecorator, rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix('#') {
        (TagKind::OpenBlock, rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix('^') {
        let rest = rest.trim();
        if rest.is_empty() {
            (TagKind::Else, "")
        } else {
            (TagKind::OpenInverse, rest)
        }
    } else if let Some(rest) = trimmed.strip_prefix('/') {
        (TagKind::Close, rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix('>') {
        (TagKind::Partial, rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix('&') {
        (TagKind::Variable { escaped: false }, rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix('!') {
        let rest = rest.strip_prefix("--").unwrap_or(rest);
        let rest = rest.strip_suffix("--").unwrap_or(rest);
        (TagKind::Comment, rest)
    } else if trimmed == "else" {
        (TagKind::Else, "")
    } else if let Some(rest) = trimmed.strip_prefix("else ") {
        (TagKind::Else, rest.trim())
    } else {
        (TagKind::Variable { escaped: true }, trimmed)
    }
}

/// Finds the `}}` that terminates a `{{!-- ... --}}` comment; returns the offset of `}}`.
fn find_comment_end(inner: &str) -> Option<usize> {
    let mut from = 3;
    while let Some(found) = inner[from..].find("}}") {
        let end = from + found;
        let before = inner[..end].strip_suffix('~').unwrap_or(&inner[..end]);
        if before.len() >= 5 && before.ends_with("--") {
            return Some(end);
        }
        from = end + 2;
    }
    None
}

fn apply_whitespace_control(pending: Vec<Pending>) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::with_capacity(pending.len());
    let mut strip_next = false;
    for item in pending {
        match item.token {
            Token::Text(text) => {
                let text = if strip_next {
                    text.trim_start().to_string()
                } else {
                    text
                };
                strip_next = false;
                if !text.is_empty() {
                    tokens.push(Token::Text(text));
                }
            }
            token => {
                if item.strip_before
                    && let Some(Token::Text(previous)) = tokens.last_mut()
                {
                    let trimmed_len = previous.trim_end().len();
                    previous.truncate(trimmed_len);
                    if previous.is_empty() {
                        tokens.pop();
                    }
                }
                strip_next = item.strip_after;
                tokens.push(token);
            }
        }
    }
    tokens
}

/// 1-indexed line and column for a byte offset.
pub(crate) fn location(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(newline) => before[newline + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, column)
}
