//! OSS rule text parser.
//!
//! Turns nested selector blocks into flat rules: one rule per block that
//! directly assigns properties, carrying the selectors of every enclosing
//! block. Text after [`GENERATED_RULES_MARKER`] is flagged as generated.

use oss_core::{PropertyMap, Selector, Value, GENERATED_RULES_MARKER};

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRule {
    pub selectors: Vec<Selector>,
    pub properties: PropertyMap,
    /// Came from the machine-generated block of the file.
    pub generated: bool,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Parse a whole rule file.
pub fn parse_rules(text: &str) -> ParseResult<Vec<ParsedRule>> {
    let (user, generated) = match text.find(GENERATED_RULES_MARKER) {
        Some(idx) => (&text[..idx], Some(&text[idx + GENERATED_RULES_MARKER.len()..])),
        None => (text, None),
    };

    let mut rules = Parser::new(user, 1).parse_document(false)?;
    if let Some(generated) = generated {
        let first_line = 1 + text[..text.len() - generated.len()].matches('\n').count();
        rules.extend(Parser::new(generated, first_line).parse_document(true)?);
    }
    Ok(rules)
}

/// Parse a single value, e.g. `[a, "b c"]!`.
pub fn parse_value(text: &str) -> ParseResult<Value> {
    let mut parser = Parser::new(text, 1);
    parser.skip_trivia()?;
    let value = parser.value()?;
    parser.skip_trivia()?;
    if parser.peek().is_some() {
        return Err(parser.error("trailing characters after value"));
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Parser {
    fn new(text: &str, first_line: usize) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: first_line,
            column: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn expect(&mut self, expected: char) -> ParseResult<()> {
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    /// Skip whitespace, `// line` and `/* block */` comments.
    fn skip_trivia(&mut self) -> ParseResult<()> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(self.error("unterminated comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_document(&mut self, generated: bool) -> ParseResult<Vec<ParsedRule>> {
        let mut slots = Vec::new();
        self.block(Vec::new(), &mut slots, false, generated)?;
        Ok(slots.into_iter().flatten().collect())
    }

    /// Parse block contents until `}` (nested) or end of input (top level).
    ///
    /// The block's own rule takes the slot reserved on entry so rules come out
    /// in document order, parents before their nested blocks.
    fn block(
        &mut self,
        selectors: Vec<Selector>,
        out: &mut Vec<Option<ParsedRule>>,
        nested: bool,
        generated: bool,
    ) -> ParseResult<()> {
        let slot = out.len();
        let line = self.line;
        out.push(None);
        let mut properties = PropertyMap::new();

        loop {
            self.skip_trivia()?;
            match self.peek() {
                None if nested => return Err(self.error("unclosed block")),
                None => break,
                Some('}') if nested => {
                    self.bump();
                    break;
                }
                Some('}') => return Err(self.error("unexpected '}'")),
                Some(';') => {
                    self.bump();
                }
                Some(_) => {
                    let key = self.key()?;
                    self.skip_trivia()?;
                    if self.peek() == Some(':') {
                        self.bump();
                        self.skip_trivia()?;
                        let value = self.value()?;
                        self.skip_trivia()?;
                        match self.peek() {
                            Some(';') => {
                                self.bump();
                            }
                            Some('}') if nested => {}
                            None if !nested => {}
                            _ => {
                                let message = format!("expected ';' after property '{key}'");
                                return Err(self.error(message));
                            }
                        }
                        properties.insert(key, value);
                    } else {
                        let mut child = selectors.clone();
                        child.extend(self.selector_chain(key)?);
                        self.block(child, out, true, generated)?;
                    }
                }
            }
        }

        if !properties.is_empty() {
            out[slot] = Some(ParsedRule {
                selectors,
                properties,
                generated,
                line,
            });
        }
        Ok(())
    }

    /// `key[=value] key[=value] ... {`, with the first key already consumed.
    fn selector_chain(&mut self, first_key: String) -> ParseResult<Vec<Selector>> {
        let mut selectors = vec![Selector::new(first_key, true)];
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some('{') => {
                    self.bump();
                    return Ok(selectors);
                }
                Some('=') => {
                    self.bump();
                    self.skip_trivia()?;
                    let value = self.scalar()?;
                    if let Some(last) = selectors.last_mut() {
                        last.value = value;
                    }
                }
                Some(c) if is_ident_start(c) => {
                    let key = self.key()?;
                    selectors.push(Selector::new(key, true));
                }
                Some(c) => return Err(self.error(format!("unexpected '{c}' in selector"))),
                None => return Err(self.error("expected '{' after selectors")),
            }
        }
    }

    fn key(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some('"') | Some('\'') => self.quoted(),
            Some(c) if is_ident_start(c) => Ok(self.identifier()),
            Some(c) => Err(self.error(format!("expected key, found '{c}'"))),
            None => Err(self.error("expected key, found end of input")),
        }
    }

    fn identifier(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if is_ident_part(c) || c == '.' {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }

    fn quoted(&mut self) -> ParseResult<String> {
        let quote = self.bump().ok_or_else(|| self.error("expected quote"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn value(&mut self) -> ParseResult<Value> {
        let value = match self.peek() {
            Some('[') => self.list()?,
            Some('{') => self.map()?,
            _ => self.scalar()?,
        };
        if self.peek() == Some('!') {
            self.bump();
            return Ok(Value::overriding(value));
        }
        Ok(value)
    }

    fn scalar(&mut self) -> ParseResult<Value> {
        match self.peek() {
            Some('"') | Some('\'') => Ok(Value::String(self.quoted()?)),
            Some('$') if self.peek_at(1) == Some('{') => self.expression(),
            Some('$') => {
                self.bump();
                Ok(Value::FieldPath(self.identifier()))
            }
            Some('*') => {
                self.bump();
                Ok(Value::from(oss_core::keys::KEY_ANY))
            }
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) if is_ident_start(c) => Ok(match self.identifier().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                other => Value::String(other.to_string()),
            }),
            Some(c) => Err(self.error(format!("unexpected '{c}' in value"))),
            None => Err(self.error("expected value, found end of input")),
        }
    }

    /// `${ ... }` kept verbatim as a string, braces balanced.
    fn expression(&mut self) -> ParseResult<Value> {
        let mut out = String::new();
        out.push(self.bump().unwrap_or('$'));
        let mut depth = 0usize;
        loop {
            let c = self.bump().ok_or_else(|| self.error("unterminated expression"))?;
            out.push(c);
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Value::String(out));
                    }
                }
                _ => {}
            }
        }
    }

    fn number(&mut self) -> ParseResult<Value> {
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push('-');
            self.bump();
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Int(i));
        }
        text.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| self.error(format!("invalid number '{text}'")))
    }

    fn list(&mut self) -> ParseResult<Value> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.peek() == Some(']') {
                self.bump();
                return Ok(Value::List(items));
            }
            items.push(self.value()?);
            self.skip_trivia()?;
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {}
                _ => return Err(self.error("expected ',' or ']' in list")),
            }
        }
    }

    fn map(&mut self) -> ParseResult<Value> {
        self.expect('{')?;
        let mut map = PropertyMap::new();
        loop {
            self.skip_trivia()?;
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Map(map));
            }
            let key = self.key()?;
            self.skip_trivia()?;
            self.expect(':')?;
            self.skip_trivia()?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_trivia()?;
            match self.peek() {
                Some(';') | Some(',') => {
                    self.bump();
                }
                Some('}') => {}
                _ => return Err(self.error("expected ';' or '}' in map")),
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
