//! Core assembler directives: everything `executeInstruction` falls through to once
//! it has ruled out macro/define/conditional/loop syntax. Anything not recognized
//! here is offered to the active [`crate::architecture::Architecture`] last.
//!
//! Grounded on `Bass::assemble` (the directive dispatch chain in `core.cpp`),
//! statement by statement, in the same order it checks them.

use crate::architecture::NoneArchitecture;
use crate::driver::Endian;
use crate::driver::Driver;
use crate::error::Result;
use crate::expr::Evaluation;
use crate::text;
use std::path::PathBuf;

pub fn assemble(driver: &mut Driver, statement: &str) -> Result<bool> {
    let s = statement;

    if s == "block {" || s == "} endblock" {
        return Ok(true);
    }

    if let Some(name) = wrapped(s, "namespace ", "{") {
        if !crate::symbols::validate_identifier(name) {
            return driver.fatal(format!("invalid namespace specifier: {name}"));
        }
        driver.scope.push(name);
        return Ok(true);
    }
    if s == "} endnamespace" {
        driver.scope.pop();
        return Ok(true);
    }

    if let Some(name) = wrapped(s, "function ", "{") {
        let pc = driver.pc();
        driver.set_constant(name, pc)?;
        driver.scope.push(name);
        return Ok(true);
    }
    if s == "} endfunction" {
        driver.scope.pop();
        return Ok(true);
    }

    if let Some(rest) = s.strip_prefix("constant ") {
        let (name, expr) = split_assign(driver, rest)?;
        let value = driver.evaluate(&expr, Evaluation::Default)?;
        driver.set_constant(name.trim(), value)?;
        return Ok(true);
    }

    if let Some(name) = label_name(s) {
        let pc = driver.pc();
        driver.set_constant(name, pc)?;
        return Ok(true);
    }

    if s == "-" || s == "- {" {
        let key = format!("lastLabel#{}", driver.last_label_counter);
        driver.last_label_counter += 1;
        let pc = driver.pc();
        driver.set_constant(&key, pc)?;
        return Ok(true);
    }
    if s == "+" || s == "+ {" {
        let key = format!("nextLabel#{}", driver.next_label_counter);
        driver.next_label_counter += 1;
        let pc = driver.pc();
        driver.set_constant(&key, pc)?;
        return Ok(true);
    }
    if s == "} endconstant" {
        return Ok(true);
    }

    if let Some(rest) = s.strip_prefix("output ") {
        let parts = text::split_args(driver, rest)?;
        let Some(raw_filename) = parts.first() else {
            return driver.fatal("output requires a filename");
        };
        let filename = unquote_filename(raw_filename);
        let create = matches!(parts.get(1).map(String::as_str), Some("create"));
        let path = driver.active_source_directory().join(filename);
        driver.set_output_target(Some(path), create)?;
        return Ok(true);
    }

    if let Some(rest) = s.strip_prefix("architecture ") {
        if rest == "none" {
            driver.architecture = Box::new(NoneArchitecture);
            return Ok(true);
        }
        return match locate_architecture_file(rest) {
            Some(_) => driver.fatal(format!("architecture table format is not supported: {rest}")),
            None => driver.fatal(format!("unknown architecture: {rest}")),
        };
    }

    if let Some(rest) = s.strip_prefix("endian ") {
        match rest {
            "lsb" => driver.endian = Endian::Lsb,
            "msb" => driver.endian = Endian::Msb,
            _ => return driver.fatal("invalid endian mode"),
        }
        return Ok(true);
    }

    if let Some(rest) = s.strip_prefix("origin ") {
        let value = driver.evaluate(rest, Evaluation::Default)?;
        driver.origin = value;
        driver.seek(value);
        return Ok(true);
    }

    if let Some(rest) = s.strip_prefix("base ") {
        let value = driver.evaluate(rest, Evaluation::Default)? - driver.origin;
        driver.base = value;
        return Ok(true);
    }

    if let Some(rest) = s.strip_prefix("enqueue ") {
        for token in text::split_args(driver, rest)? {
            match token.as_str() {
                "origin" => driver.queue.push(driver.origin),
                "base" => driver.queue.push(driver.base),
                "pc" => {
                    driver.queue.push(driver.origin);
                    driver.queue.push(driver.base);
                }
                other => return driver.fatal(format!("unrecognized enqueue variable: {other}")),
            }
        }
        return Ok(true);
    }

    if let Some(rest) = s.strip_prefix("dequeue ") {
        for token in text::split_args(driver, rest)? {
            match token.as_str() {
                "origin" => {
                    let origin = pop_queue(driver)?;
                    driver.origin = origin;
                    driver.seek(origin);
                }
                "base" => driver.base = pop_queue(driver)?,
                "pc" => {
                    driver.base = pop_queue(driver)?;
                    let origin = pop_queue(driver)?;
                    driver.origin = origin;
                    driver.seek(origin);
                }
                other => return driver.fatal(format!("unrecognized dequeue variable: {other}")),
            }
        }
        return Ok(true);
    }

    if let Some(rest) = s.strip_prefix("insert ") {
        return insert(driver, rest).map(|()| true);
    }

    if let Some(rest) = s.strip_prefix("fill ") {
        let parts = text::split_args(driver, rest)?;
        let Some(length_expr) = parts.first() else {
            return driver.fatal("fill requires a length");
        };
        let mut length = driver.evaluate(length_expr, Evaluation::Default)?;
        let byte = match parts.get(1) {
            Some(expr) => driver.evaluate(expr, Evaluation::Default)?,
            None => 0,
        };
        while length > 0 {
            driver.write(byte as u64, 1);
            length -= 1;
        }
        return Ok(true);
    }

    if let Some(rest) = s.strip_prefix("map ") {
        let parts = text::split_args(driver, rest)?;
        let Some(index_expr) = parts.first() else {
            return driver.fatal("map requires an index");
        };
        let index = driver.evaluate(index_expr, Evaluation::Default)?;
        let value = match parts.get(1) {
            Some(expr) => driver.evaluate(expr, Evaluation::Default)?,
            None => 0,
        };
        let length = match parts.get(2) {
            Some(expr) => driver.evaluate(expr, Evaluation::Default)?,
            None => 1,
        };
        for n in 0..length {
            driver.string_table[(index + n) as usize] = (value + n) as u8;
        }
        return Ok(true);
    }

    if let Some(length) = data_length(s) {
        let rest = &s[length.prefix_len..];
        for token in text::split_args(driver, rest)? {
            if token.starts_with('"') && token.ends_with('"') {
                let unquoted = text::unquote(driver, &token)?;
                for byte in unquoted.bytes() {
                    let mapped = driver.string_table[byte as usize];
                    driver.write(mapped as u64, length.bytes);
                }
            } else {
                let value = driver.evaluate(&token, Evaluation::Default)?;
                driver.write(value as u64, length.bytes);
            }
        }
        return Ok(true);
    }

    if let Some(rest) = s.strip_prefix("print ") {
        if driver.phase == crate::driver::Phase::Write {
            for token in text::split_args(driver, rest.trim())? {
                print_token(driver, &token)?;
            }
        }
        return Ok(true);
    }

    if let Some(rest) = s.strip_prefix("notice ") {
        if driver.phase == crate::driver::Phase::Write {
            let text = text::unquote(driver, rest.trim())?;
            driver.notice(text);
        }
        return Ok(true);
    }
    if let Some(rest) = s.strip_prefix("warning ") {
        if driver.phase == crate::driver::Phase::Write {
            let text = text::unquote(driver, rest.trim())?;
            driver.warn(text)?;
        }
        return Ok(true);
    }
    if let Some(rest) = s.strip_prefix("error ") {
        if driver.phase == crate::driver::Phase::Write {
            let text = text::unquote(driver, rest.trim())?;
            return driver.fatal(text);
        }
        return Ok(true);
    }

    let mut architecture = std::mem::replace(&mut driver.architecture, Box::new(NoneArchitecture));
    let handled = architecture.assemble(driver, statement);
    driver.architecture = architecture;
    handled
}

fn wrapped<'a>(s: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    s.strip_prefix(prefix)?.strip_suffix(suffix).map(str::trim)
}

fn label_name(s: &str) -> Option<&str> {
    if s == "- {" || s == "+ {" || s == "-" || s == "+" {
        return None;
    }
    let body = s.strip_suffix(" {").unwrap_or(s);
    body.strip_suffix(':')
}

fn split_assign(driver: &mut Driver, s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((name, expr)) => Ok((name.trim().to_owned(), expr.trim().to_owned())),
        None => driver.fatal(format!("malformed assignment: {s}")),
    }
}

fn unquote_filename(s: &str) -> String {
    s.trim().trim_matches('"').to_owned()
}

/// Probes `./bass/architectures/<name>.arch`, then `<program-dir>/architectures/<name>.arch`
/// (the running executable's own directory), matching the original's architecture lookup.
fn locate_architecture_file(name: &str) -> Option<PathBuf> {
    let local = PathBuf::from("bass/architectures").join(format!("{name}.arch"));
    if local.exists() {
        return Some(local);
    }
    let program_dir = std::env::current_exe().ok()?.parent()?.to_path_buf();
    let beside_program = program_dir.join("architectures").join(format!("{name}.arch"));
    beside_program.exists().then_some(beside_program)
}

fn pop_queue(driver: &mut Driver) -> Result<i64> {
    match driver.queue.pop() {
        Some(value) => Ok(value),
        None => driver.fatal("dequeue from an empty queue"),
    }
}

struct DataLength {
    bytes: u32,
    prefix_len: usize,
}

fn data_length(s: &str) -> Option<DataLength> {
    let bytes = match s.get(0..3)? {
        "db " => 1,
        "dw " => 2,
        "dl " => 3,
        "dd " => 4,
        "dq " => 8,
        _ => return None,
    };
    Some(DataLength { bytes, prefix_len: 3 })
}

fn insert(driver: &mut Driver, rest: &str) -> Result<()> {
    let mut parts = text::split_args(driver, rest)?;
    if parts.is_empty() {
        return driver.fatal("insert requires a filename");
    }
    let name = if parts[0].starts_with('"') { None } else { Some(parts.remove(0)) };
    if parts.is_empty() || !parts[0].starts_with('"') {
        return driver.fatal("missing filename");
    }
    let filename = unquote_filename(&parts.remove(0));
    let data = std::fs::read(&filename).map_err(|_| ())
        .or_else(|()| driver.fatal::<Vec<u8>>(format!("file not found: {filename}")))?;

    let offset = match parts.first() {
        Some(expr) => driver.evaluate(expr, Evaluation::Default)? as usize,
        None => 0,
    }
    .min(data.len());
    let requested = match parts.get(1) {
        Some(expr) => driver.evaluate(expr, Evaluation::Default)? as usize,
        None => 0,
    };
    let length = if requested == 0 { data.len() - offset } else { requested };

    if let Some(name) = name {
        let pc = driver.pc();
        driver.set_constant(&name, pc)?;
        driver.set_constant(&format!("{name}.size"), length as i64)?;
    }
    for &byte in data[offset..offset + length].iter() {
        driver.write(byte as u64, 1);
    }
    Ok(())
}

fn print_token(driver: &mut Driver, token: &str) -> Result<()> {
    if token.starts_with('"') && token.ends_with('"') {
        eprint!("{}", text::unquote(driver, token)?);
    } else if let Some(expr) = token.strip_prefix("binary:") {
        let value = driver.evaluate(expr, Evaluation::Default)?;
        eprint!("{value:b}");
    } else if let Some(expr) = token.strip_prefix("hex:") {
        let value = driver.evaluate(expr, Evaluation::Default)?;
        eprint!("{value:x}");
    } else if let Some(expr) = token.strip_prefix("char:") {
        let value = driver.evaluate(expr, Evaluation::Default)?;
        eprint!("{}", value as u8 as char);
    } else {
        let value = driver.evaluate(token, Evaluation::Default)?;
        eprint!("{value}");
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::Phase;

    #[test]
    fn label_sets_constant_to_current_pc() {
        let mut driver = Driver::new();
        driver.origin = 0x10;
        assert!(assemble(&mut driver, "start:").unwrap());
        assert_eq!(Some(0x10), driver.find_constant("start"));
    }

    #[test]
    fn relative_labels_count_up_independently() {
        let mut driver = Driver::new();
        driver.origin = 4;
        assemble(&mut driver, "-").unwrap();
        driver.origin = 8;
        assemble(&mut driver, "-").unwrap();
        assert_eq!(Some(4), driver.find_constant("lastLabel#1"));
        assert_eq!(Some(8), driver.find_constant("lastLabel#2"));
    }

    #[test]
    fn origin_and_base_directives_compose_into_pc() {
        let mut driver = Driver::new();
        assemble(&mut driver, "origin 0x100").unwrap();
        assemble(&mut driver, "base 0x8000").unwrap();
        assert_eq!(0x8000, driver.pc());
    }

    #[test]
    fn enqueue_dequeue_pc_round_trips() {
        let mut driver = Driver::new();
        driver.origin = 4;
        driver.base = 0x8000;
        assemble(&mut driver, "enqueue pc").unwrap();
        driver.origin = 99;
        driver.base = 1;
        assemble(&mut driver, "dequeue pc").unwrap();
        assert_eq!(4, driver.origin);
        assert_eq!(0x8000, driver.base);
    }

    #[test]
    fn db_writes_bytes_and_strings() {
        let mut driver = Driver::new();
        driver.phase = Phase::Write;
        assemble(&mut driver, "db 1, 2, \"ab\"").unwrap();
        assert_eq!(vec![1, 2, b'a', b'b'], driver.output);
    }

    #[test]
    fn dw_writes_two_byte_little_endian_values() {
        let mut driver = Driver::new();
        driver.phase = Phase::Write;
        assemble(&mut driver, "dw 0x1234").unwrap();
        assert_eq!(vec![0x34, 0x12], driver.output);
    }

    #[test]
    fn fill_repeats_byte_value() {
        let mut driver = Driver::new();
        driver.phase = Phase::Write;
        assemble(&mut driver, "fill 3, 0x20").unwrap();
        assert_eq!(vec![0x20, 0x20, 0x20], driver.output);
    }

    #[test]
    fn fill_without_operand_is_fatal_not_a_panic() {
        let mut driver = Driver::new();
        assert!(assemble(&mut driver, "fill ").unwrap_err().message.contains("length"));
    }

    #[test]
    fn map_without_operand_is_fatal_not_a_panic() {
        let mut driver = Driver::new();
        assert!(assemble(&mut driver, "map ").unwrap_err().message.contains("index"));
    }

    #[test]
    fn output_without_filename_is_fatal_not_a_panic() {
        let mut driver = Driver::new();
        assert!(assemble(&mut driver, "output ").unwrap_err().message.contains("filename"));
    }

    #[test]
    fn namespace_qualifies_subsequent_labels() {
        let mut driver = Driver::new();
        assemble(&mut driver, "namespace foo {").unwrap();
        assemble(&mut driver, "start:").unwrap();
        assemble(&mut driver, "} endnamespace").unwrap();
        assert_eq!(Some(0), driver.find_constant("foo.start"));
    }

    #[test]
    fn unhandled_statement_falls_through_to_architecture() {
        let mut driver = Driver::new();
        assert!(!assemble(&mut driver, "nop").unwrap());
    }
}
