//! Human ordering for file names: `img2` sorts before `img10`.
//!
//! Names are split into alternating runs of ASCII digits and other text. Digit
//! runs compare by integer value (arbitrary length, no overflow), text runs
//! compare case-insensitively, and a digit run sorts before a text run at the
//! same position. Names that tie on all runs (`01` vs `1`, `A` vs `a`) fall back
//! to byte order so the result is a total order.

use std::cmp::Ordering;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Number(&'a str),
    Text(&'a str),
}

struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let first = self.rest.chars().next()?;
        let numeric = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != numeric)
            .map(|(idx, _)| idx)
            .unwrap_or(self.rest.len());

        let (run, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if numeric {
            Token::Number(run)
        } else {
            Token::Text(run)
        })
    }
}

fn tokens(s: &str) -> Tokens<'_> {
    Tokens { rest: s }
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_text(a: &str, b: &str) -> Ordering {
    let a = a.chars().flat_map(char::to_lowercase);
    let b = b.chars().flat_map(char::to_lowercase);
    a.cmp(b)
}

fn compare_tokens(a: Token<'_>, b: Token<'_>) -> Ordering {
    match (a, b) {
        (Token::Number(x), Token::Number(y)) => compare_numbers(x, y),
        (Token::Text(x), Token::Text(y)) => compare_text(x, y),
        (Token::Number(_), Token::Text(_)) => Ordering::Less,
        (Token::Text(_), Token::Number(_)) => Ordering::Greater,
    }
}

/// Compare two names in natural order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = tokens(a);
    let mut right = tokens(b);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match compare_tokens(x, y) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// Compare two paths by their final component only; directories are ignored.
pub fn natural_cmp_file_names(a: &Path, b: &Path) -> Ordering {
    let a_name = a.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let b_name = b.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    natural_cmp(&a_name, &b_name).then_with(|| a.cmp(b))
}
