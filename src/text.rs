//! Small text utilities shared by define-expansion and directive argument parsing:
//! quote/paren-aware comma splitting and quoted-string unescaping.

use crate::driver::Driver;
use crate::error::Result;

/// Splits `s` on commas, ignoring commas inside `"..."`/`'...'` or `(...)`, and
/// trims each piece. Used both for user call-site argument lists (`name(a, b)`) and
/// for splitting a `db`/`dw`/... directive's operand list.
pub fn split_args(driver: &mut Driver, s: &str) -> Result<Vec<String>> {
    let mut result = Vec::new();
    let mut offset = 0;
    let mut quoted: Option<char> = None;
    let mut depth: i32 = 0;
    let chars: Vec<char> = s.chars().collect();

    for (n, &c) in chars.iter().enumerate() {
        match quoted {
            None => {
                if c == '"' || c == '\'' {
                    quoted = Some(c);
                }
            }
            Some(q) if q == c => quoted = None,
            _ => {}
        }
        if quoted.is_none() {
            if c == '(' {
                depth += 1;
            }
            if c == ')' {
                depth -= 1;
            }
            if c == ',' && depth == 0 {
                result.push(chars[offset..n].iter().collect::<String>().trim().to_owned());
                offset = n + 1;
            }
        }
    }
    if offset < chars.len() {
        result.push(chars[offset..].iter().collect::<String>().trim().to_owned());
    }
    if quoted.is_some() {
        return driver.fatal("mismatched quotes in expression");
    }
    if depth != 0 {
        return driver.fatal("mismatched parentheses in expression");
    }
    Ok(result)
}

/// Strips the surrounding `"..."` from a string literal and applies the escape
/// table shared with character literals (`\s`, `\d`, `\c`, `\b`, `\n`, `\\`).
/// An unquoted value is a warning, not a hard error.
pub fn unquote(driver: &mut Driver, s: &str) -> Result<String> {
    let inner = if s.starts_with('"') && s.ends_with('"') && s.len() >= 2 {
        &s[1..s.len() - 1]
    } else {
        driver.warn(format!("string value is unquoted: {s}"))?;
        s
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('s') => {
                    out.push('\'');
                    chars.next();
                }
                Some('d') => {
                    out.push('"');
                    chars.next();
                }
                Some('c') => {
                    out.push(',');
                    chars.next();
                }
                Some('b') => {
                    out.push(';');
                    chars.next();
                }
                Some('n') => {
                    out.push('\n');
                    chars.next();
                }
                Some('\\') => {
                    out.push('\\');
                    chars.next();
                }
                _ => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// First unquoted occurrence of `needle`, or `None`. Used to find a `//` comment
/// marker without tripping on one written inside a quoted string.
pub fn find_unquoted(s: &str, needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    let chars: Vec<char> = s.chars().collect();
    let mut quoted: Option<char> = None;
    for i in 0..chars.len() {
        match quoted {
            None => {
                if chars[i] == '"' || chars[i] == '\'' {
                    quoted = Some(chars[i]);
                }
            }
            Some(q) if q == chars[i] => quoted = None,
            _ => {}
        }
        if quoted.is_none() && chars[i..].starts_with(&needle[..]) {
            return Some(i);
        }
    }
    None
}

/// Splits `s` on unquoted occurrences of `delim` (a single char, no depth
/// tracking) — the `;`-statement split a source line goes through.
pub fn split_unquoted(s: &str, delim: char) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut result = Vec::new();
    let mut quoted: Option<char> = None;
    let mut start = 0;
    for i in 0..chars.len() {
        match quoted {
            None => {
                if chars[i] == '"' || chars[i] == '\'' {
                    quoted = Some(chars[i]);
                }
            }
            Some(q) if q == chars[i] => quoted = None,
            _ => {}
        }
        if quoted.is_none() && chars[i] == delim {
            result.push(chars[start..i].iter().collect());
            start = i + 1;
        }
    }
    result.push(chars[start..].iter().collect());
    result
}

/// Collapses runs of unquoted spaces down to a single space.
pub fn collapse_whitespace(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut quoted: Option<char> = None;
    for i in 0..chars.len() {
        match quoted {
            None => {
                if chars[i] == '"' || chars[i] == '\'' {
                    quoted = Some(chars[i]);
                }
            }
            Some(q) if q == chars[i] => quoted = None,
            _ => {}
        }
        if quoted.is_none() && chars[i] == ' ' && chars.get(i + 1) == Some(&' ') {
            continue;
        }
        out.push(chars[i]);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_args_respects_quotes_and_parens() {
        let mut driver = Driver::new();
        let parts = split_args(&mut driver, r#"a, f(1, 2), "b, c""#).unwrap();
        assert_eq!(vec!["a", "f(1, 2)", "\"b, c\""], parts);
    }

    #[test]
    fn unquote_applies_escape_table() {
        let mut driver = Driver::new();
        assert_eq!("a,b;c\n", unquote(&mut driver, r#""a\cb\bc\n""#).unwrap());
    }

    #[test]
    fn unquote_warns_without_error_when_unquoted() {
        let mut driver = Driver::new();
        assert_eq!("bare", unquote(&mut driver, "bare").unwrap());
    }

    #[test]
    fn find_unquoted_skips_marker_inside_string() {
        assert_eq!(None, find_unquoted(r#""a // b""#, "//"));
        assert_eq!(Some(3), find_unquoted(r#"ok // trailing"#, "//"));
    }

    #[test]
    fn split_unquoted_respects_quotes() {
        assert_eq!(vec!["a", r#" "b; c" "#, "d"], split_unquoted(r#"a; "b; c" ;d"#, ';'));
    }

    #[test]
    fn collapse_whitespace_preserves_quoted_runs() {
        assert_eq!(r#"a b "c  d""#, collapse_whitespace(r#"a   b "c  d""#));
    }
}
