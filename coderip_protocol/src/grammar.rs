//! Recursive-descent parser for a single directive span.
//!
//! ```text
//! directive   := KEYWORD ws '(' ws name ws ',' ws name ws ',' ws code ws tail ')'
//! tail        := (',' ws fourth ws)?          -- required for the diff variant
//! fourth      := code                         -- diff: new code
//!              | text                         -- replace: description
//! name        := quoted                       -- single line, trimmed, non-empty
//! code, text  := fence | quoted
//! fence       := '```' tag? content '```'
//! quoted      := q content q  where q in { " ' ` }
//! ```

use crate::{Directive, DirectiveEdit, GrammarVariant, ProtocolError, CODE_FENCE, NAME_QUOTES};

const FENCE_TAGS: &[&str] = &["lua", "js", "javascript", "text", "txt", "code"];

pub(crate) fn is_keyword_boundary(text: &str, start: usize, keyword_len: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[start + keyword_len..].chars().next();
    !before.is_some_and(is_identifier_char) && !after.is_some_and(is_identifier_char)
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

pub(crate) fn parse_directive(
    text: &str,
    start: usize,
    keyword_len: usize,
    variant: GrammarVariant,
) -> Result<(Directive, usize), ProtocolError> {
    let mut cursor = Cursor::new(text, start + keyword_len);
    if cursor.peek().is_some_and(is_identifier_char) {
        return Err(ProtocolError::Expected {
            expected: "end of directive keyword",
            offset: cursor.pos,
        });
    }
    cursor.skip_whitespace();
    if !cursor.eat('(') {
        return Err(ProtocolError::MissingOpenParen(cursor.pos));
    }

    cursor.skip_whitespace();
    let object = cursor.name(1)?;
    cursor.separator()?;
    let function = cursor.name(2)?;
    cursor.separator()?;
    let third = cursor.payload("code payload")?;
    cursor.skip_whitespace();

    let edit = match variant {
        GrammarVariant::Diff => {
            if third.is_empty() {
                return Err(ProtocolError::EmptyArgument { index: 3 });
            }
            cursor.separator()?;
            let new_code = cursor.payload("replacement code")?;
            cursor.skip_whitespace();
            DirectiveEdit::Diff {
                old_code: third,
                new_code,
            }
        }
        GrammarVariant::Replace => {
            let description = if cursor.eat(',') {
                cursor.skip_whitespace();
                let description = cursor.payload("description")?;
                cursor.skip_whitespace();
                Some(description)
            } else {
                None
            };
            DirectiveEdit::Replace {
                body: third,
                description,
            }
        }
    };

    if cursor.peek() == Some(',') {
        return Err(ProtocolError::TrailingArgument(cursor.pos));
    }
    if !cursor.eat(')') {
        return Err(ProtocolError::Expected {
            expected: "')'",
            offset: cursor.pos,
        });
    }

    Ok((
        Directive {
            object,
            function,
            edit,
        },
        cursor.pos,
    ))
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, pos: usize) -> Self {
        Self { text, pos }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.pos += ch.len_utf8();
        }
    }

    fn separator(&mut self) -> Result<(), ProtocolError> {
        self.skip_whitespace();
        if !self.eat(',') {
            return Err(ProtocolError::Expected {
                expected: "','",
                offset: self.pos,
            });
        }
        self.skip_whitespace();
        Ok(())
    }

    fn name(&mut self, index: usize) -> Result<String, ProtocolError> {
        let offset = self.pos;
        let Some(quote) = self.peek().filter(|ch| NAME_QUOTES.contains(ch)) else {
            return Err(ProtocolError::Expected {
                expected: "quoted name",
                offset,
            });
        };
        self.pos += quote.len_utf8();
        let rest = self.rest();
        let Some(len) = rest.find(|ch: char| ch == quote || ch == '\n') else {
            return Err(ProtocolError::Unterminated {
                what: "name",
                offset,
            });
        };
        if !rest[len..].starts_with(quote) {
            return Err(ProtocolError::Unterminated {
                what: "name",
                offset,
            });
        }
        let value = rest[..len].trim().to_string();
        self.pos += len + quote.len_utf8();
        if value.is_empty() {
            return Err(ProtocolError::EmptyArgument { index });
        }
        Ok(value)
    }

    fn payload(&mut self, what: &'static str) -> Result<String, ProtocolError> {
        if self.rest().starts_with(CODE_FENCE) {
            return self.fenced(what);
        }
        self.quoted(what)
    }

    fn quoted(&mut self, what: &'static str) -> Result<String, ProtocolError> {
        let offset = self.pos;
        let Some(quote) = self.peek().filter(|ch| NAME_QUOTES.contains(ch)) else {
            return Err(ProtocolError::Expected {
                expected: "quoted or fenced argument",
                offset,
            });
        };
        self.pos += quote.len_utf8();
        let rest = self.rest();
        let Some(len) = rest.find(quote) else {
            return Err(ProtocolError::Unterminated { what, offset });
        };
        let value = rest[..len].to_string();
        self.pos += len + quote.len_utf8();
        Ok(value)
    }

    fn fenced(&mut self, what: &'static str) -> Result<String, ProtocolError> {
        let offset = self.pos;
        self.pos += CODE_FENCE.len();
        self.skip_fence_tag();
        let rest = self.rest();
        let Some(len) = rest.find(CODE_FENCE) else {
            return Err(ProtocolError::Unterminated { what, offset });
        };
        let mut value = &rest[..len];
        if let Some(stripped) = value.strip_suffix('\n') {
            value = stripped.strip_suffix('\r').unwrap_or(stripped);
        }
        let value = value.to_string();
        self.pos += len + CODE_FENCE.len();
        Ok(value)
    }

    fn skip_fence_tag(&mut self) {
        let rest = self.rest();
        let Some(line_end) = rest.find('\n') else {
            return;
        };
        let line = rest[..line_end].trim_end_matches('\r');
        if line.trim().is_empty() || FENCE_TAGS.contains(&line.trim().to_ascii_lowercase().as_str())
        {
            self.pos += line_end + 1;
        }
    }
}
