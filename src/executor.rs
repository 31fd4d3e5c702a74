//! The `query`/`write` phases: walks the flattened program a second and third time,
//! now actually resolving names and emitting bytes (`query` evaluates every
//! statement exactly as `write` does, just with `Driver::write` suppressed by
//! `phase`, so addresses settle before anything is emitted for real).
//!
//! Grounded on `Bass::execute`/`executeInstruction`: the dispatch order below
//! (frame specifiers, then macro/define/evaluate/expression/variable, then
//! if/while, then macro invocation, then directives, then bare-expression
//! fallback) matches that function's match chain exactly, including reusing the
//! condition text `analyze()` only pre-trims for block pairing — the executor
//! re-extracts it itself rather than trusting anything analyze left behind.

use crate::defines;
use crate::directives;
use crate::driver::Driver;
use crate::error::{Location, Result};
use crate::expr::Evaluation;
use crate::symbols::{find_scoped, validate_identifier, Define, Expression, Frame, Level, Macro, Variable};
use crate::text;

pub fn execute(driver: &mut Driver) -> Result<()> {
    driver.frames = vec![Frame::new(0, false)];
    driver.conditionals.clear();
    driver.macro_invocation_counter = 0;
    driver.initialize();

    for (name, value) in driver.initial_defines.clone() {
        driver.set_symbol(Level::Global, &name, Define { parameters: Vec::new(), value });
    }

    let mut ip = 0usize;
    while ip < driver.program.len() {
        let current = ip;
        let mut next_ip = ip + 1;
        driver.active_location = Some(location(driver, current));
        execute_instruction(driver, current, &mut next_ip)?;
        ip = next_ip;
    }
    Ok(())
}

fn location(driver: &Driver, ip: usize) -> Location {
    let instruction = &driver.program[ip];
    Location {
        file: driver.source_filenames.get(instruction.file_number as usize).cloned().unwrap_or_default(),
        line: instruction.line_number,
        block: instruction.block_number,
        statement: instruction.statement.clone(),
    }
}

fn execute_instruction(driver: &mut Driver, ip: usize, next_ip: &mut usize) -> Result<()> {
    let mut s = defines::expand(driver, &driver.program[ip].statement.clone())?;

    let global = s.starts_with("global ");
    let parent = s.starts_with("parent ");
    if global && parent {
        return driver.fatal("multiple frame specifiers are not allowed");
    }
    let mut level = Level::Active;
    if global {
        s = s["global ".len()..].to_owned();
        level = Level::Global;
    }
    if parent {
        s = s["parent ".len()..].to_owned();
        level = Level::Parent;
    }

    if let Some((name, params)) = block_header(&s, "macro ") {
        define_macro(driver, level, name, params, ip, false)?;
        *next_ip = driver.program[ip].ip as usize;
        return Ok(());
    }
    if let Some((name, params)) = block_header(&s, "inline ") {
        define_macro(driver, level, name, params, ip, true)?;
        *next_ip = driver.program[ip].ip as usize;
        return Ok(());
    }

    if let Some(rest) = s.strip_prefix("define ") {
        let (lhs, value) = split_once_eq(driver, rest)?;
        match parse_params(&lhs) {
            Some((name, params)) => define_symbol(driver, level, &name, Define { parameters: params, value })?,
            None => define_symbol(driver, level, lhs.trim(), Define { parameters: Vec::new(), value })?,
        }
        return Ok(());
    }

    if let Some(rest) = s.strip_prefix("evaluate ") {
        let (name, expr) = split_once_eq(driver, rest)?;
        let value = driver.evaluate(&expr, Evaluation::Default)?;
        define_symbol(driver, level, name.trim(), Define { parameters: Vec::new(), value: value.to_string() })?;
        return Ok(());
    }

    if let Some(rest) = s.strip_prefix("expression ") {
        let (lhs, value) = split_once_eq(driver, rest)?;
        let (name, params) = parse_params(&lhs).unwrap_or_else(|| (lhs.trim().to_owned(), Vec::new()));
        define_symbol(driver, level, &arity_key(&name, &params), Expression { parameters: params, value })?;
        return Ok(());
    }

    if let Some(rest) = s.strip_prefix("variable ") {
        let (name, expr) = split_once_eq(driver, rest)?;
        let value = driver.evaluate(&expr, Evaluation::Default)?;
        if !validate_identifier(name.trim()) {
            return driver.fatal(format!("invalid variable identifier: {}", name.trim()));
        }
        driver.set_symbol(level, name.trim(), Variable { value });
        return Ok(());
    }

    if global || parent {
        return driver.fatal("invalid frame specifier");
    }

    if let Some(condition) = wrapped(&s, "if ", " {") {
        let matched = driver.evaluate(condition, Evaluation::Strict)? != 0;
        driver.conditionals.push(matched);
        if !matched {
            *next_ip = driver.program[ip].ip as usize;
        }
        return Ok(());
    }

    if let Some(condition) = wrapped(&s, "} else if ", " {") {
        if *driver.conditionals.last().unwrap_or(&false) {
            *next_ip = driver.program[ip].ip as usize;
        } else {
            let matched = driver.evaluate(condition, Evaluation::Strict)? != 0;
            if let Some(last) = driver.conditionals.last_mut() {
                *last = matched;
            }
            if !matched {
                *next_ip = driver.program[ip].ip as usize;
            }
        }
        return Ok(());
    }

    if s == "} else {" {
        if *driver.conditionals.last().unwrap_or(&false) {
            *next_ip = driver.program[ip].ip as usize;
        } else if let Some(last) = driver.conditionals.last_mut() {
            *last = true;
        }
        return Ok(());
    }

    if s == "} endif" {
        driver.conditionals.pop();
        return Ok(());
    }

    if let Some(condition) = wrapped(&s, "while ", " {") {
        let matched = driver.evaluate(condition, Evaluation::Strict)? != 0;
        if !matched {
            *next_ip = driver.program[ip].ip as usize;
        }
        return Ok(());
    }

    if s == "} endwhile" {
        *next_ip = driver.program[ip].ip as usize;
        return Ok(());
    }

    if let Some((name, args_text)) = call_pattern(&s) {
        let params = if args_text.trim().is_empty() { Vec::new() } else { text::split_args(driver, args_text)? };
        let key = arity_key(name, &params);
        if let Some(makro) = find_scoped::<Macro>(&driver.frames, &driver.scope, &key).cloned() {
            let return_ip = *next_ip as u32;
            driver.frames.push(Frame { ip: return_ip, inlined: makro.inlined, ..Frame::default() });
            if !makro.inlined {
                driver.scope.push(name.to_owned());
            }
            let counter = driver.macro_invocation_counter;
            driver.macro_invocation_counter += 1;
            driver.set_symbol(Level::Inline, "#", Define { parameters: Vec::new(), value: format!("_{counter}_") });
            for (spec, argument) in makro.parameters.iter().zip(&params) {
                bind_macro_parameter(driver, spec, argument)?;
            }
            *next_ip = makro.ip as usize;
            return Ok(());
        }
    }

    if s == "} endmacro" || s == "} endinline" {
        let frame = driver.frames.last().expect("unbalanced macro frame");
        *next_ip = frame.ip as usize;
        if !frame.inlined {
            driver.scope.pop();
        }
        driver.frames.pop();
        return Ok(());
    }

    if directives::assemble(driver, &s)? {
        return Ok(());
    }

    driver.evaluate(&s, Evaluation::Default)?;
    Ok(())
}

fn wrapped<'a>(s: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    s.strip_prefix(prefix)?.strip_suffix(suffix).map(str::trim)
}

fn block_header(s: &str, prefix: &str) -> Option<(String, Vec<String>)> {
    let rest = s.strip_prefix(prefix)?.strip_suffix(") {")?;
    let (name, params) = rest.split_once('(')?;
    Some((name.trim().to_owned(), comma_list(params)))
}

fn parse_params(lhs: &str) -> Option<(String, Vec<String>)> {
    let lhs = lhs.trim();
    let rest = lhs.strip_suffix(')')?;
    let (name, params) = rest.split_once('(')?;
    Some((name.trim().to_owned(), comma_list(params)))
}

fn comma_list(s: &str) -> Vec<String> {
    if s.trim().is_empty() {
        Vec::new()
    } else {
        s.split(',').map(|p| p.trim().to_owned()).collect()
    }
}

fn arity_key(name: &str, params: &[String]) -> String {
    if params.is_empty() {
        name.to_owned()
    } else {
        format!("{name}#{}", params.len())
    }
}

fn split_once_eq(driver: &mut Driver, s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((lhs, rhs)) => Ok((lhs.trim().to_owned(), rhs.trim().to_owned())),
        None => driver.fatal(format!("malformed assignment: {s}")),
    }
}

fn define_macro(driver: &mut Driver, level: Level, name: String, params: Vec<String>, ip: usize, inlined: bool) -> Result<()> {
    if !validate_identifier(&name) {
        return driver.fatal(format!("invalid macro identifier: {name}"));
    }
    let key = arity_key(&name, &params);
    driver.set_symbol(level, &key, Macro { parameters: params, ip: (ip + 1) as u32, inlined });
    Ok(())
}

fn define_symbol<T>(driver: &mut Driver, level: Level, name: &str, value: T) -> Result<()>
where
    Frame: crate::symbols::HasStore<T>,
{
    if !validate_identifier(name) {
        return driver.fatal(format!("invalid identifier: {name}"));
    }
    driver.set_symbol(level, name, value);
    Ok(())
}

fn bind_macro_parameter(driver: &mut Driver, spec: &str, argument: &str) -> Result<()> {
    let (kind, name) = match spec.split_once(' ') {
        Some((kind, name)) => (kind, name.trim()),
        None => ("define", spec),
    };
    match kind {
        "define" => driver.set_symbol(Level::Inline, name, Define { parameters: Vec::new(), value: argument.to_owned() }),
        "string" => {
            let value = text::unquote(driver, argument)?;
            driver.set_symbol(Level::Inline, name, Define { parameters: Vec::new(), value });
        }
        "evaluate" => {
            let value = driver.evaluate(argument, Evaluation::Default)?;
            driver.set_symbol(Level::Inline, name, Define { parameters: Vec::new(), value: value.to_string() });
        }
        "variable" => {
            let value = driver.evaluate(argument, Evaluation::Default)?;
            driver.set_symbol(Level::Inline, name, Variable { value });
        }
        other => return driver.fatal(format!("unsupported parameter type: {other}")),
    }
    Ok(())
}

fn call_pattern(s: &str) -> Option<(&str, &str)> {
    if !s.ends_with(')') {
        return None;
    }
    let idx = s.find('(')?;
    let name = s[..idx].trim();
    if name.is_empty() || !validate_identifier(name) {
        return None;
    }
    Some((name, &s[idx + 1..s.len() - 1]))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analyzer;
    use crate::source::Instruction;

    fn program(statements: &[&str]) -> Vec<Instruction> {
        statements
            .iter()
            .enumerate()
            .map(|(n, s)| Instruction { statement: s.to_string(), file_number: 0, line_number: n as u32, block_number: 1, ip: 0 })
            .collect()
    }

    fn run(statements: &[&str]) -> Driver {
        let mut driver = Driver::new();
        driver.program = program(statements);
        analyzer::analyze(&mut driver).unwrap();
        execute(&mut driver).unwrap();
        driver
    }

    #[test]
    fn variable_directive_round_trips() {
        let driver = run(&["variable x = 41", "variable x = x + 1"]);
        assert_eq!(
            Some(&Variable { value: 42 }),
            find_scoped::<Variable>(&driver.frames, &driver.scope, "x")
        );
    }

    #[test]
    fn if_else_selects_matching_branch() {
        let driver = run(&[
            "variable hit = 0",
            "if 0 {",
            "variable hit = 1",
            "} else {",
            "variable hit = 2",
            "}",
        ]);
        assert_eq!(
            Some(&Variable { value: 2 }),
            find_scoped::<Variable>(&driver.frames, &driver.scope, "hit")
        );
    }

    #[test]
    fn while_loop_runs_until_condition_false() {
        let driver = run(&[
            "variable i = 0",
            "variable sum = 0",
            "while i < 5 {",
            "variable sum = sum + i",
            "variable i = i + 1",
            "}",
        ]);
        assert_eq!(
            Some(&Variable { value: 10 }),
            find_scoped::<Variable>(&driver.frames, &driver.scope, "sum")
        );
    }

    #[test]
    fn macro_call_binds_define_parameter_and_runs_body() {
        // Default (untagged) macro parameters bind raw call-site text, substituted via
        // `{value}` brace-expansion rather than looked up as a variable; `global`
        // escapes the binding to frame 0 before the macro's own frame is torn down.
        let driver = run(&[
            "macro emit(define value) {",
            "global variable seen = {value}",
            "}",
            "emit(99)",
        ]);
        assert_eq!(
            Some(&Variable { value: 99 }),
            find_scoped::<Variable>(&driver.frames, &driver.scope, "emit.seen")
        );
    }

    #[test]
    fn implicit_hash_define_is_underscore_wrapped_and_increments_per_call() {
        // `{#}` is how a macro body builds a unique label per invocation (`loop{#}:`);
        // the original wraps the raw counter in underscores (`_0_`, `_1_`, ...) rather
        // than emitting the bare number.
        let driver = run(&[
            "macro tag() {",
            "global define first = {#}",
            "}",
            "tag()",
            "macro tag2() {",
            "global define second = {#}",
            "}",
            "tag2()",
        ]);
        // `global` only escapes to the base frame, not out of the macro's own scope
        // push, so the names land as `tag.first`/`tag2.second` (see
        // `non_inlined_macro_body_is_scoped_under_its_call_name` below).
        assert_eq!(
            Some(&Define { parameters: Vec::new(), value: "_0_".to_owned() }),
            find_scoped::<Define>(&driver.frames, &driver.scope, "tag.first")
        );
        assert_eq!(
            Some(&Define { parameters: Vec::new(), value: "_1_".to_owned() }),
            find_scoped::<Define>(&driver.frames, &driver.scope, "tag2.second")
        );
    }

    #[test]
    fn non_inlined_macro_body_is_scoped_under_its_call_name() {
        let driver = run(&["macro once() {", "global variable x = 1", "}", "once()"]);
        assert!(find_scoped::<Variable>(&driver.frames, &driver.scope, "once.x").is_some());
        assert!(find_scoped::<Variable>(&driver.frames, &driver.scope, "x").is_none());
    }
}
