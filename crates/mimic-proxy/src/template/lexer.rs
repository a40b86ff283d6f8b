//! Splitting template text into literal and action segments, and
//! tokenizing action bodies.

use super::RenderError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Segment<'a> {
    Text(&'a str),
    /// Body of a `{{ ... }}` action with trim markers removed.
    Action { body: &'a str, offset: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Ident(String),
    Field(String),
    Str(String),
    Int(i64),
    LParen,
    RParen,
    Pipe,
}

/// Split a template into segments, applying `{{-` / `-}}` whitespace trimming
/// and dropping `{{/* comments */}}`.
pub(super) fn split(template: &str) -> Result<Vec<Segment<'_>>, RenderError> {
    let mut segments = Vec::new();
    let mut trim_next_text = false;
    let mut rest_start = 0;

    while let Some(found) = template[rest_start..].find("{{") {
        let open = rest_start + found;
        let mut text = &template[rest_start..open];
        if trim_next_text {
            text = text.trim_start();
        }

        let inner_start = open + 2;
        let close = find_close(template, inner_start)?;
        let mut inner = &template[inner_start..close];

        let trim_left = inner.starts_with("- ") || inner.starts_with("-\t") || inner.starts_with("-\n");
        if trim_left {
            inner = &inner[1..];
            text = text.trim_end();
        }
        trim_next_text = inner.ends_with(" -") || inner.ends_with("\t-") || inner.ends_with("\n-");
        if trim_next_text {
            inner = &inner[..inner.len() - 1];
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        let body = inner.trim();
        let is_comment = body.starts_with("/*") && body.ends_with("*/") && body.len() >= 4;
        if !is_comment {
            segments.push(Segment::Action {
                body,
                offset: inner_start,
            });
        }
        rest_start = close + 2;
    }

    let mut tail = &template[rest_start..];
    if trim_next_text {
        tail = tail.trim_start();
    }
    if !tail.is_empty() {
        segments.push(Segment::Text(tail));
    }
    Ok(segments)
}

/// Byte offset of the `}}` closing the action that starts at `from`,
/// skipping over quoted strings.
fn find_close(template: &str, from: usize) -> Result<usize, RenderError> {
    let bytes = template.as_bytes();
    let mut i = from;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'"') if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'`' => quote = Some(b),
            None if b == b'}' && bytes.get(i + 1) == Some(&b'}') => return Ok(i),
            None => {}
        }
        i += 1;
    }

    Err(RenderError::Syntax {
        offset: from,
        message: "unclosed action".into(),
    })
}

pub(super) fn tokenize(body: &str, offset: usize) -> Result<Vec<Token>, RenderError> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = body.char_indices().collect();
    let mut i = 0;
    let syntax = |at: usize, message: String| RenderError::Syntax {
        offset: offset + at,
        message,
    };

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '"' => {
                let mut value = String::new();
                i += 1;
                loop {
                    let Some(&(_, c)) = chars.get(i) else {
                        return Err(syntax(pos, "unterminated string".into()));
                    };
                    i += 1;
                    match c {
                        '"' => break,
                        '\\' => {
                            let Some(&(_, escaped)) = chars.get(i) else {
                                return Err(syntax(pos, "unterminated string".into()));
                            };
                            i += 1;
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => other,
                            });
                        }
                        other => value.push(other),
                    }
                }
                tokens.push(Token::Str(value));
            }
            '`' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&(_, c)| c == '`')
                    .map(|p| start + p)
                    .ok_or_else(|| syntax(pos, "unterminated raw string".into()))?;
                tokens.push(Token::Str(chars[start..end].iter().map(|&(_, c)| c).collect()));
                i = end + 1;
            }
            '.' => {
                let start = i + 1;
                let mut end = start;
                while chars.get(end).is_some_and(|&(_, c)| c.is_alphanumeric() || c == '_') {
                    end += 1;
                }
                if end == start {
                    return Err(syntax(pos, "expected field name after '.'".into()));
                }
                tokens.push(Token::Field(chars[start..end].iter().map(|&(_, c)| c).collect()));
                i = end;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|&(_, n)| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while chars.get(i).is_some_and(|&(_, c)| c.is_ascii_digit()) {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().map(|&(_, c)| c).collect();
                let value = literal
                    .parse()
                    .map_err(|_| syntax(pos, format!("invalid number '{literal}'")))?;
                tokens.push(Token::Int(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars.get(i).is_some_and(|&(_, c)| c.is_alphanumeric() || c == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().map(|&(_, c)| c).collect()));
            }
            other => return Err(syntax(pos, format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}
