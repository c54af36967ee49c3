//! Shell-style name patterns.
//!
//! Supports the `fnmatch` subset used for test selection: `*`, `?`, bracket
//! classes with ranges (`[a-c]`) and negation (`[!x]`). An unterminated `[`
//! matches itself literally. Matching is case-sensitive.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassItem {
    Char(char),
    Range(char, char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyChar,
    AnySequence,
    Class { negated: bool, items: Vec<ClassItem> },
}

impl Token {
    fn matches(&self, c: char) -> bool {
        match self {
            Self::Literal(l) => *l == c,
            Self::AnyChar => true,
            Self::AnySequence => false,
            Self::Class { negated, items } => {
                let hit = items.iter().any(|item| match *item {
                    ClassItem::Char(x) => x == c,
                    ClassItem::Range(lo, hi) => lo <= c && c <= hi,
                });
                hit != *negated
            }
        }
    }
}

/// A compiled glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    source: String,
    tokens: Vec<Token>,
}

impl GlobPattern {
    /// Compiles `pattern`. Every string is a valid pattern.
    pub fn new(pattern: &str) -> Self {
        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens = Vec::with_capacity(chars.len());
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '*' => {
                    // Runs of stars are equivalent to one.
                    if tokens.last() != Some(&Token::AnySequence) {
                        tokens.push(Token::AnySequence);
                    }
                    i += 1;
                }
                '?' => {
                    tokens.push(Token::AnyChar);
                    i += 1;
                }
                '[' => match parse_class(&chars, i + 1) {
                    Some((token, next)) => {
                        tokens.push(token);
                        i = next;
                    }
                    None => {
                        tokens.push(Token::Literal('['));
                        i += 1;
                    }
                },
                c => {
                    tokens.push(Token::Literal(c));
                    i += 1;
                }
            }
        }
        Self {
            source: pattern.to_string(),
            tokens,
        }
    }

    /// Pattern matching every name.
    pub fn any() -> Self {
        Self::new("*")
    }

    /// Original pattern text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns `true` if the whole of `name` matches.
    pub fn matches(&self, name: &str) -> bool {
        let text: Vec<char> = name.chars().collect();
        let (mut t, mut c) = (0usize, 0usize);
        // Most recent `*`: (token index, text index it currently absorbs up to).
        let mut backtrack: Option<(usize, usize)> = None;

        while c < text.len() {
            match self.tokens.get(t) {
                Some(Token::AnySequence) => {
                    backtrack = Some((t, c));
                    t += 1;
                    continue;
                }
                Some(token) if token.matches(text[c]) => {
                    t += 1;
                    c += 1;
                    continue;
                }
                _ => {}
            }
            match backtrack {
                Some((star, absorbed)) => {
                    t = star + 1;
                    c = absorbed + 1;
                    backtrack = Some((star, absorbed + 1));
                }
                None => return false,
            }
        }
        self.tokens[t..].iter().all(|tok| *tok == Token::AnySequence)
    }
}

impl Default for GlobPattern {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parses a bracket class whose body starts at `start`; returns the token and
/// the index after the closing `]`.
fn parse_class(chars: &[char], start: usize) -> Option<(Token, usize)> {
    let mut i = start;
    let negated = matches!(chars.get(i), Some('!'));
    if negated {
        i += 1;
    }
    let mut items = Vec::new();
    let mut first = true;
    loop {
        let c = *chars.get(i)?;
        if c == ']' && !first {
            return Some((Token::Class { negated, items }, i + 1));
        }
        first = false;
        match (chars.get(i + 1), chars.get(i + 2)) {
            (Some('-'), Some(&hi)) if hi != ']' => {
                items.push(ClassItem::Range(c, hi));
                i += 3;
            }
            _ => {
                items.push(ClassItem::Char(c));
                i += 1;
            }
        }
    }
}
