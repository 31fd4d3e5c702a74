//! The `analyze` phase: walks the flat program once, pairing every block-opening
//! statement with its closing `}` and rewriting both into the canonical forms the
//! executor dispatches on (`{` becomes `block {`, a bare `}` becomes `} endblock` /
//! `} endif` / etc. depending on what it closes). Jump targets threaded through
//! `Instruction::ip` let the executor skip a whole block, or loop one, in O(1)
//! rather than re-scanning for the matching brace every time.
//!
//! Grounded directly on `Bass::analyzeInstruction`'s match chain; the `ip`
//! bookkeeping for `if`/`else if`/`else` chains is preserved exactly as found there,
//! including that an `else if`/`else` rewrites the *previous* branch's skip target
//! in place rather than allocating a new block frame.

use crate::driver::Driver;
use crate::error::Result;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Block {
    pub ip: usize,
    pub kind: &'static str,
}

pub fn analyze(driver: &mut Driver) -> Result<()> {
    driver.blocks.clear();
    let mut ip = 0;
    while ip < driver.program.len() {
        let current = ip;
        ip += 1;
        analyze_instruction(driver, current)?;
    }
    if !driver.blocks.is_empty() {
        return driver.fatal("unterminated block");
    }
    Ok(())
}

fn top_is(driver: &Driver, kind: &str) -> bool {
    driver.blocks.last().is_some_and(|b| b.kind == kind)
}

fn is_wrapped(s: &str, prefix: &str, suffix: &str) -> bool {
    s.len() > prefix.len() + suffix.len() && s.starts_with(prefix) && s.ends_with(suffix)
}

fn is_macro_like(s: &str, prefix: &str) -> bool {
    let Some(rest) = s.strip_prefix(prefix) else { return false };
    let Some(name_and_params) = rest.strip_suffix(") {") else { return false };
    matches!(name_and_params.find('('), Some(paren) if paren > 0)
}

fn is_constant_label_open(s: &str) -> bool {
    s == "- {" || s == "+ {" || (s.len() > 3 && s.ends_with(": {"))
}

fn analyze_instruction(driver: &mut Driver, ip: usize) -> Result<()> {
    let s = driver.program[ip].statement.clone();

    if s == "}" && driver.blocks.is_empty() {
        return driver.fatal("} without matching {");
    }

    if s == "{" {
        driver.blocks.push(Block { ip, kind: "block" });
        driver.program[ip].statement = "block {".to_owned();
        return Ok(());
    }
    if s == "}" && top_is(driver, "block") {
        driver.blocks.pop();
        driver.program[ip].statement = "} endblock".to_owned();
        return Ok(());
    }

    if is_wrapped(&s, "namespace ", " {") {
        driver.blocks.push(Block { ip, kind: "namespace" });
        return Ok(());
    }
    if s == "}" && top_is(driver, "namespace") {
        driver.blocks.pop();
        driver.program[ip].statement = "} endnamespace".to_owned();
        return Ok(());
    }

    if is_wrapped(&s, "function ", " {") {
        driver.blocks.push(Block { ip, kind: "function" });
        return Ok(());
    }
    if s == "}" && top_is(driver, "function") {
        driver.blocks.pop();
        driver.program[ip].statement = "} endfunction".to_owned();
        return Ok(());
    }

    if is_macro_like(&s, "macro ") {
        driver.blocks.push(Block { ip, kind: "macro" });
        return Ok(());
    }
    if s == "}" && top_is(driver, "macro") {
        let rp = driver.blocks.last().unwrap().ip;
        driver.program[rp].ip = (ip + 1) as u32;
        driver.blocks.pop();
        driver.program[ip].statement = "} endmacro".to_owned();
        return Ok(());
    }

    if is_macro_like(&s, "inline ") {
        driver.blocks.push(Block { ip, kind: "inline" });
        return Ok(());
    }
    if s == "}" && top_is(driver, "inline") {
        let rp = driver.blocks.last().unwrap().ip;
        driver.program[rp].ip = (ip + 1) as u32;
        driver.blocks.pop();
        driver.program[ip].statement = "} endinline".to_owned();
        return Ok(());
    }

    if is_constant_label_open(&s) {
        driver.blocks.push(Block { ip, kind: "constant" });
        return Ok(());
    }
    if s == "}" && top_is(driver, "constant") {
        driver.blocks.pop();
        driver.program[ip].statement = "} endconstant".to_owned();
        return Ok(());
    }

    if is_wrapped(&s, "if ", " {") {
        driver.blocks.push(Block { ip, kind: "if" });
        return Ok(());
    }
    if is_wrapped(&s, "} else if ", " {") {
        let rp = driver.blocks.last().unwrap().ip;
        driver.program[rp].ip = ip as u32;
        driver.blocks.last_mut().unwrap().ip = ip;
        return Ok(());
    }
    if s == "} else {" {
        let rp = driver.blocks.last().unwrap().ip;
        driver.program[rp].ip = ip as u32;
        driver.blocks.last_mut().unwrap().ip = ip;
        return Ok(());
    }
    if s == "}" && top_is(driver, "if") {
        let rp = driver.blocks.last().unwrap().ip;
        driver.program[rp].ip = ip as u32;
        driver.blocks.pop();
        driver.program[ip].statement = "} endif".to_owned();
        return Ok(());
    }

    if is_wrapped(&s, "while ", " {") {
        driver.blocks.push(Block { ip, kind: "while" });
        return Ok(());
    }
    if s == "}" && top_is(driver, "while") {
        let rp = driver.blocks.last().unwrap().ip;
        driver.program[rp].ip = (ip + 1) as u32;
        driver.blocks.pop();
        driver.program[ip].statement = "} endwhile".to_owned();
        driver.program[ip].ip = rp as u32;
        return Ok(());
    }

    Ok(())
}
