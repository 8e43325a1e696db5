//! Minimal S-expression reader for the text tree notation.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
    Atom { text: String, quoted: bool, line: usize },
    List { items: Vec<SExpr>, line: usize },
}

impl SExpr {
    pub fn line(&self) -> usize {
        match self {
            SExpr::Atom { line, .. } | SExpr::List { line, .. } => *line,
        }
    }

    pub fn as_list(&self) -> Option<&[SExpr]> {
        match self {
            SExpr::List { items, .. } => Some(items),
            SExpr::Atom { .. } => None,
        }
    }

    /// Text of an atom, quoted or not.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExpr::Atom { text, .. } => Some(text),
            SExpr::List { .. } => None,
        }
    }

    /// Text of an unquoted atom.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            SExpr::Atom { text, quoted: false, .. } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Open,
    Close,
    Atom(String, bool),
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    for (n, raw) in text.lines().enumerate() {
        let line = n + 1;
        if raw.trim_start().starts_with(";;") {
            continue;
        }
        let mut chars = raw.chars().peekable();
        while let Some(&c) = chars.peek() {
            match c {
                '(' => {
                    chars.next();
                    tokens.push((Token::Open, line));
                }
                ')' => {
                    chars.next();
                    tokens.push((Token::Close, line));
                }
                '"' => {
                    chars.next();
                    let mut s = String::new();
                    let mut closed = false;
                    while let Some(c) = chars.next() {
                        match c {
                            '\\' => match chars.next() {
                                Some(escaped) => s.push(escaped),
                                None => break,
                            },
                            '"' => {
                                closed = true;
                                break;
                            }
                            other => s.push(other),
                        }
                    }
                    if !closed {
                        return Err(Error::parse(line, "unterminated string"));
                    }
                    tokens.push((Token::Atom(s, true), line));
                }
                c if c.is_whitespace() => {
                    chars.next();
                }
                _ => {
                    let mut s = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                            break;
                        }
                        s.push(c);
                        chars.next();
                    }
                    tokens.push((Token::Atom(s, false), line));
                }
            }
        }
    }
    Ok(tokens)
}

/// Parses every top-level expression in `text`.
pub fn parse_all(text: &str) -> Result<Vec<SExpr>> {
    let tokens = tokenize(text)?;
    // Open lists: (items, line of the opening parenthesis).
    let mut stack: Vec<(Vec<SExpr>, usize)> = Vec::new();
    let mut top = Vec::new();
    let mut last_line = 1;
    for (token, line) in tokens {
        last_line = line;
        match token {
            Token::Open => stack.push((Vec::new(), line)),
            Token::Close => {
                let (items, open_line) = stack
                    .pop()
                    .ok_or_else(|| Error::parse(line, "unexpected ')'"))?;
                let list = SExpr::List { items, line: open_line };
                match stack.last_mut() {
                    Some((parent, _)) => parent.push(list),
                    None => top.push(list),
                }
            }
            Token::Atom(text, quoted) => {
                let atom = SExpr::Atom { text, quoted, line };
                match stack.last_mut() {
                    Some((parent, _)) => parent.push(atom),
                    None => top.push(atom),
                }
            }
        }
    }
    if let Some((_, open_line)) = stack.last() {
        return Err(Error::parse(
            last_line,
            format!("unbalanced parenthesis: list opened at line {open_line} is never closed"),
        ));
    }
    Ok(top)
}

/// Parses exactly one top-level expression.
pub fn parse_one(text: &str) -> Result<SExpr> {
    let mut all = parse_all(text)?;
    match all.len() {
        1 => Ok(all.remove(0)),
        0 => Err(Error::parse(1, "empty tree text")),
        _ => Err(Error::parse(all[1].line(), "unexpected content after the tree")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_lists_and_quotes() {
        let e = parse_one("((phone is \"a \\\"b\\\"\") (x))").unwrap();
        let items = e.as_list().unwrap();
        let q = items[0].as_list().unwrap();
        assert_eq!(q[0].as_symbol(), Some("phone"));
        assert_eq!(q[2].as_atom(), Some("a \"b\""));
        assert_eq!(q[2].as_symbol(), None);
    }

    #[test]
    fn comment_lines_are_skipped() {
        let e = parse_one(";; header\n;; more\n(a b)\n").unwrap();
        assert_eq!(e.line(), 3);
    }

    #[test]
    fn unbalanced_input_reports_line() {
        let err = parse_one("(a\n(b)\n").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        let err = parse_one("(a))").unwrap_err();
        assert!(err.to_string().contains("unexpected ')'"));
    }

    #[test]
    fn trailing_content_is_rejected() {
        assert!(parse_one("(a) (b)").is_err());
        assert!(parse_one("   ").is_err());
    }
}
