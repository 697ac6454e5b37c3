use crate::errors::CoreError;

use super::condition::{Condition, Operator};
use super::Query;

#[derive(Debug, Clone)]
struct Token {
    text: String,
    /// Byte offset in the original input, for error reporting.
    offset: usize,
}

/// Split into tokens on whitespace and parentheses. `\` escapes the next
/// character; `"..."` quotes a token (only `\"` is special inside).
fn tokenize(input: &str) -> Result<Vec<Token>, CoreError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut start = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    let mut chars = input.char_indices().peekable();

    let mut push = |current: &mut String, start: usize, tokens: &mut Vec<Token>| {
        if !current.is_empty() {
            tokens.push(Token {
                text: std::mem::take(current),
                offset: start,
            });
        }
    };

    while let Some((i, c)) = chars.next() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                if current.is_empty() {
                    start = i;
                }
                escaped = true;
            }
            '"' => {
                if in_quote {
                    // Closing quote always emits, so "" is a valid empty token.
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        offset: start,
                    });
                    in_quote = false;
                } else {
                    push(&mut current, start, &mut tokens);
                    start = i;
                    in_quote = true;
                }
            }
            '(' | ')' if !in_quote => {
                push(&mut current, start, &mut tokens);
                tokens.push(Token {
                    text: c.to_string(),
                    offset: i,
                });
            }
            c if c.is_whitespace() && !in_quote => {
                push(&mut current, start, &mut tokens);
            }
            c => {
                if current.is_empty() {
                    start = i;
                }
                current.push(c);
            }
        }
    }

    if in_quote {
        return Err(CoreError::parse(start, "unterminated quote"));
    }
    if escaped {
        return Err(CoreError::parse(input.len(), "dangling escape"));
    }
    push(&mut current, start, &mut tokens);
    Ok(tokens)
}

/// Parse `query <prefix>[ where <cond>][ orderby <k>][ limit <n>][ offset <n>]`.
pub fn parse_query(text: &str) -> Result<Query, CoreError> {
    let tokens = tokenize(text)?;
    let mut pos = 0usize;

    let word = tokens
        .get(pos)
        .ok_or_else(|| CoreError::parse(0, "empty query"))?;
    if word.text != "query" {
        return Err(CoreError::parse(word.offset, "expected keyword query"));
    }
    pos += 1;

    let prefix = tokens
        .get(pos)
        .ok_or_else(|| CoreError::parse(text.len(), "missing database prefix"))?;
    let mut query = Query::new(&prefix.text);
    pos += 1;

    while pos < tokens.len() {
        let keyword = &tokens[pos];
        match keyword.text.as_str() {
            "where" => {
                pos += 1;
                let end = find_clause_end(&tokens, pos);
                if pos == end {
                    return Err(CoreError::parse(keyword.offset, "empty where clause"));
                }
                let cond = parse_sequence(&tokens, &mut pos, end)?;
                if pos != end {
                    let t = &tokens[pos];
                    return Err(CoreError::parse(t.offset, format!("unexpected {:?}", t.text)));
                }
                query.filter = Some(cond);
            }
            "orderby" => {
                pos += 1;
                let key = tokens
                    .get(pos)
                    .ok_or_else(|| CoreError::parse(keyword.offset, "missing orderby key"))?;
                query.order_by = Some(key.text.clone());
                pos += 1;
            }
            "limit" => {
                pos += 1;
                query.limit = Some(parse_number(&tokens, pos, keyword.offset, "limit")?);
                pos += 1;
            }
            "offset" => {
                pos += 1;
                query.offset = Some(parse_number(&tokens, pos, keyword.offset, "offset")?);
                pos += 1;
            }
            other => {
                return Err(CoreError::parse(
                    keyword.offset,
                    format!("unexpected token {other:?}"),
                ));
            }
        }
    }

    Ok(query)
}

fn parse_number(tokens: &[Token], pos: usize, kw_offset: usize, what: &str) -> Result<i32, CoreError> {
    let token = tokens
        .get(pos)
        .ok_or_else(|| CoreError::parse(kw_offset, format!("missing {what} value")))?;
    token
        .text
        .parse::<i32>()
        .map_err(|_| CoreError::parse(token.offset, format!("invalid {what}: {:?}", token.text)))
}

/// Index of the next top-level clause keyword, or the end of input.
fn find_clause_end(tokens: &[Token], mut pos: usize) -> usize {
    let mut depth = 0i32;
    while pos < tokens.len() {
        match tokens[pos].text.as_str() {
            "(" => depth += 1,
            ")" => depth -= 1,
            "orderby" | "limit" | "offset" if depth == 0 => return pos,
            _ => {}
        }
        pos += 1;
    }
    tokens.len()
}

/// Left-associative sequence of elements joined by a single connective.
/// Mixing `and` and `or` at the same parenthesis level is an error.
fn parse_sequence(tokens: &[Token], pos: &mut usize, end: usize) -> Result<Condition, CoreError> {
    let mut parts = vec![parse_element(tokens, pos, end)?];
    let mut connective: Option<&'static str> = None;

    while *pos < end && tokens[*pos].text != ")" {
        let token = &tokens[*pos];
        let conn = match token.text.as_str() {
            "and" => "and",
            "or" => "or",
            other => {
                return Err(CoreError::parse(
                    token.offset,
                    format!("expected and/or, got {other:?}"),
                ));
            }
        };
        match connective {
            Some(existing) if existing != conn => {
                return Err(CoreError::parse(
                    token.offset,
                    "mixing and/or requires parentheses",
                ));
            }
            _ => connective = Some(conn),
        }
        *pos += 1;
        parts.push(parse_element(tokens, pos, end)?);
    }

    if parts.len() == 1 {
        return Ok(parts.pop().expect("one element"));
    }
    Ok(match connective {
        Some("or") => Condition::Or(parts),
        _ => Condition::And(parts),
    })
}

/// One element: a parenthesised group, a `not`-prefixed element, or a
/// single `key op [value]` predicate.
fn parse_element(tokens: &[Token], pos: &mut usize, end: usize) -> Result<Condition, CoreError> {
    let token = tokens
        .get(*pos)
        .filter(|_| *pos < end)
        .ok_or_else(|| CoreError::parse(0, "unexpected end of condition"))?;

    match token.text.as_str() {
        "(" => {
            *pos += 1;
            let inner = parse_sequence(tokens, pos, end)?;
            let closing = tokens.get(*pos).filter(|_| *pos < end);
            match closing {
                Some(t) if t.text == ")" => {
                    *pos += 1;
                    Ok(inner)
                }
                _ => Err(CoreError::parse(token.offset, "unclosed parenthesis")),
            }
        }
        ")" => Err(CoreError::parse(token.offset, "unexpected closing parenthesis")),
        "not" => {
            *pos += 1;
            let inner = parse_element(tokens, pos, end)?;
            Ok(Condition::Not(Box::new(inner)))
        }
        _ => {
            let key = token.text.clone();
            *pos += 1;

            let op_token = tokens
                .get(*pos)
                .filter(|_| *pos < end)
                .ok_or_else(|| CoreError::parse(token.offset, "missing operator"))?;
            let op = Operator::parse(&op_token.text).ok_or_else(|| {
                CoreError::parse(op_token.offset, format!("unknown operator {:?}", op_token.text))
            })?;
            *pos += 1;

            if !op.takes_value() {
                return Ok(Condition::Where {
                    key,
                    op,
                    value: super::condition::Value::None,
                });
            }

            let value_token = tokens
                .get(*pos)
                .filter(|_| *pos < end && tokens[*pos].text != ")")
                .ok_or_else(|| CoreError::parse(op_token.offset, "missing value"))?;
            *pos += 1;

            // A value of the wrong type becomes a deferred error condition
            // so the caller still gets position information at check time.
            match op.parse_value(&value_token.text) {
                Ok(value) => Ok(Condition::Where { key, op, value }),
                Err(message) => Ok(Condition::Error {
                    message,
                    offset: value_token.offset,
                }),
            }
        }
    }
}
