//! Lexical helpers over raw SQL text.

use regex::Regex;
use std::sync::LazyLock;

macro_rules! sql_pattern {
    ($name:ident, $regex_str:expr) => {
        pub(crate) static $name: LazyLock<Option<Regex>> =
            LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

sql_pattern!(
    RE_FORBIDDEN,
    r"(?i)\b(DELETE|DROP|TRUNCATE|ALTER|GRANT|REVOKE)\b"
);
// `EXTRACT(YEAR FROM d)` and friends use FROM as an argument separator.
sql_pattern!(
    RE_FUNCTION_FROM,
    r"(?i)\b(EXTRACT|SUBSTRING|TRIM|OVERLAY)\s*\(([^()]*?)\bFROM\b"
);
// `a IS [NOT] DISTINCT FROM b` is a comparison, not a table source.
sql_pattern!(
    RE_DISTINCT_FROM,
    r"(?i)\bIS\s+(?:NOT\s+)?DISTINCT\s+FROM\b"
);
sql_pattern!(RE_TABLE_KEYWORD, r"(?i)\b(?:FROM|JOIN|INTO)\b\s*");
sql_pattern!(
    RE_CTE,
    r"(?i)(?:\bWITH(?:\s+RECURSIVE)?|,)\s*([A-Za-z_]\w*)(?:\s*\([^)]*\))?\s+AS\s*\("
);
sql_pattern!(RE_LIMIT, r"(?i)\bLIMIT\b");
sql_pattern!(RE_ORDER_BY, r"(?i)\bORDER\s+BY\b");
sql_pattern!(RE_WORD, r"[A-Za-z_]\w*");

/// Whether `re` compiled and matches `text`.
pub(crate) fn matches(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|r| r.is_match(text))
}

/// Drop comments, blank string literals to `''` and unquote `"identifiers"`.
/// Positions of everything else are not preserved.
pub(crate) fn mask(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                out.push_str("''");
                while let Some(n) = chars.next() {
                    if n == '\'' {
                        if chars.peek() == Some(&'\'') {
                            chars.next();
                            continue;
                        }
                        break;
                    }
                }
            }
            '"' => {
                for n in chars.by_ref() {
                    if n == '"' {
                        break;
                    }
                    out.push(n);
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Masked SQL with every `FROM` that does not introduce a table source
/// neutralized.
pub(crate) fn prepare(sql: &str) -> String {
    let mut text = mask(sql);
    if let Some(re) = RE_FUNCTION_FROM.as_ref() {
        text = re.replace_all(&text, "$1($2,").into_owned();
    }
    if let Some(re) = RE_DISTINCT_FROM.as_ref() {
        text = re.replace_all(&text, "<>").into_owned();
    }
    text
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// `word` (ASCII, case-insensitive) starts at byte `at` on word boundaries.
pub(crate) fn starts_word(sql: &str, at: usize, word: &str) -> bool {
    let bytes = sql.as_bytes();
    let end = at + word.len();
    let Some(slice) = sql.get(at..end) else {
        return false;
    };
    slice.eq_ignore_ascii_case(word)
        && (at == 0 || !is_word_byte(bytes[at - 1]))
        && (end >= bytes.len() || !is_word_byte(bytes[end]))
}

/// First occurrence of `keyword` at or after `from` outside any parentheses.
/// `from` must itself be outside parentheses.
pub(crate) fn find_top_level(sql: &str, keyword: &str, from: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && starts_word(sql, i, keyword) => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Parenthesis nesting depth at byte `at`.
pub(crate) fn depth_at(sql: &str, at: usize) -> usize {
    sql.as_bytes()[..at.min(sql.len())]
        .iter()
        .fold(0usize, |depth, b| match b {
            b'(' => depth + 1,
            b')' => depth.saturating_sub(1),
            _ => depth,
        })
}

/// Byte offset of the `)` closing the `(` at `open`.
pub(crate) fn matching_paren(sql: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in sql.bytes().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on `sep` where it is not nested in parentheses.
pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Identifier (possibly dotted) starting at byte `at` after optional
/// whitespace. Returns the identifier and the byte offset after it.
pub(crate) fn read_identifier(s: &str, at: usize) -> Option<(&str, usize)> {
    let rest = s.get(at..)?;
    let skipped = rest.len() - rest.trim_start().len();
    let start = at + skipped;
    let bytes = s.as_bytes();
    let first = *bytes.get(start)?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut end = start;
    while end < bytes.len() {
        let b = bytes[end];
        let dotted = b == b'.'
            && bytes
                .get(end + 1)
                .is_some_and(|n| n.is_ascii_alphabetic() || *n == b'_');
        if is_word_byte(b) || dotted {
            end += 1;
        } else {
            break;
        }
    }
    Some((&s[start..end], end))
}

/// Levenshtein distance over ASCII-lowercased characters.
pub(crate) fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.to_ascii_lowercase().chars().collect();
    let b: Vec<char> = b.to_ascii_lowercase().chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut cur = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        prev = cur;
    }
    prev[b.len()]
}
