//! Text-substitution `{...}` expansion, i.e. `Bass::evaluateDefines`.
//!
//! Unlike macro/function expansion this runs over raw, not-yet-parsed statement
//! text: it finds the innermost `{name}` or `{name(args)}` span (scanning right to
//! left, so the closing brace seen most recently pairs with the next opening brace),
//! replaces it with the matching define's value, and restarts the scan over the
//! whole rebuilt string. One substitution per pass, by design — a define whose body
//! itself contains `{...}` gets expanded when its value is recursively run through
//! `expand` before splicing, not by the outer scan revisiting it in place.

use crate::driver::Driver;
use crate::error::Result;
use crate::expr::Evaluation;
use crate::symbols::{find_scoped, Define, Level};
use crate::text;

pub fn expand(driver: &mut Driver, s: &str) -> Result<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut close: Option<usize> = None;

    for x in (0..chars.len()).rev() {
        if chars[x] == '}' {
            close = Some(x);
        }
        if chars[x] != '{' {
            continue;
        }
        let y = match close {
            Some(y) if y > x => y,
            _ => continue,
        };
        let name: String = chars[x + 1..y].iter().collect();
        let before: String = chars[..x].iter().collect();
        let after: String = chars[y + 1..].iter().collect();

        if let Some(target) = name.strip_prefix("defined ") {
            let found = find_scoped::<Define>(&driver.frames, &driver.scope, target.trim()).is_some();
            let rebuilt = format!("{before}{}{after}", i32::from(found));
            return expand(driver, &rebuilt);
        }

        let (name, parameters) = split_call(driver, &name)?;
        let key = if parameters.is_empty() { name } else { format!("{name}#{}", parameters.len()) };

        let define = match find_scoped::<Define>(&driver.frames, &driver.scope, &key) {
            Some(define) => define.clone(),
            None => continue,
        };

        if !parameters.is_empty() {
            driver.push_inline_frame();
        }
        for (spec, argument) in define.parameters.iter().zip(&parameters) {
            bind_parameter(driver, spec, argument)?;
        }
        let expanded_value = expand(driver, &define.value);
        if !parameters.is_empty() {
            driver.pop_frame();
        }

        let rebuilt = format!("{before}{}{after}", expanded_value?);
        return expand(driver, &rebuilt);
    }

    Ok(s.to_owned())
}

/// Splits `name(a, b)` into `("name", ["a", "b"])`; bare `name` has no parameters.
fn split_call(driver: &mut Driver, name: &str) -> Result<(String, Vec<String>)> {
    let trimmed = name.trim_end();
    if let Some(open) = trimmed.find('(') {
        if trimmed.ends_with(')') {
            let inner = &trimmed[open + 1..trimmed.len() - 1];
            let bare = trimmed[..open].trim().to_owned();
            let params = text::split_args(driver, inner)?;
            return Ok((bare, params));
        }
    }
    Ok((name.trim().to_owned(), Vec::new()))
}

/// Binds one call-site argument to a define's declared parameter, per its type tag
/// (`define`/`string`/`evaluate`; untagged defaults to `define`).
fn bind_parameter(driver: &mut Driver, spec: &str, argument: &str) -> Result<()> {
    let mut parts = spec.splitn(2, ' ');
    let first = parts.next().unwrap_or("").trim();
    let (kind, name) = match parts.next() {
        Some(rest) => (first, rest.trim()),
        None => ("define", first),
    };

    let value = match kind {
        "define" => argument.to_owned(),
        "string" => text::unquote(driver, argument)?,
        "evaluate" => driver.evaluate(argument, Evaluation::Default)?.to_string(),
        other => return driver.fatal(format!("unsupported parameter type: {other}")),
    };
    driver.set_symbol(Level::Inline, name, Define { parameters: Vec::new(), value });
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scope::Scope;
    use crate::symbols::set_scoped;

    fn define(driver: &mut Driver, name: &str, parameters: Vec<&str>, value: &str) {
        set_scoped(
            &mut driver.frames,
            &Scope::new(),
            Level::Global,
            name,
            Define { parameters: parameters.into_iter().map(str::to_owned).collect(), value: value.to_owned() },
        );
    }

    #[test]
    fn bare_define_is_substituted() {
        let mut driver = Driver::new();
        define(&mut driver, "FOO", vec![], "42");
        assert_eq!("x = 42;", expand(&mut driver, "x = {FOO};").unwrap());
    }

    #[test]
    fn defined_predicate_reports_presence() {
        let mut driver = Driver::new();
        define(&mut driver, "FOO", vec![], "1");
        assert_eq!("1 0", expand(&mut driver, "{defined FOO} {defined BAR}").unwrap());
    }

    #[test]
    fn parameterized_define_binds_raw_text() {
        let mut driver = Driver::new();
        define(&mut driver, "DOUBLE#1", vec!["define x"], "{x}+{x}");
        assert_eq!("5+5", expand(&mut driver, "{DOUBLE(5)}").unwrap());
    }

    #[test]
    fn evaluate_parameter_computes_before_binding() {
        let mut driver = Driver::new();
        define(&mut driver, "SQ#1", vec!["evaluate n"], "{n}");
        assert_eq!("9", expand(&mut driver, "{SQ(3*3)}").unwrap());
    }

    #[test]
    fn string_parameter_is_unquoted() {
        let mut driver = Driver::new();
        define(&mut driver, "ID#1", vec!["string s"], "{s}");
        assert_eq!("hi", expand(&mut driver, r#"{ID("hi")}"#).unwrap());
    }

    #[test]
    fn nested_define_bodies_expand_before_splicing() {
        let mut driver = Driver::new();
        define(&mut driver, "INNER", vec![], "1");
        define(&mut driver, "OUTER", vec![], "{INNER}+{INNER}");
        assert_eq!("1+1", expand(&mut driver, "{OUTER}").unwrap());
    }
}
