//! The assembler's run state: frames, scope, constants, output position, and the
//! notice/warning/error sink every other module raises diagnostics through.
//!
//! Kept deliberately thin here; the bulk of the orchestration (`assemble`, the
//! three-phase pipeline, source loading, directive dispatch) lives in the modules
//! that implement it and attach further `impl Driver` blocks, the way the teacher
//! project spreads `Driver`-equivalent behaviour (`assemble_addressed` and friends)
//! across `lib.rs`, `instructions.rs` and `data.rs` rather than one giant file.

use crate::architecture::{Architecture, NoneArchitecture};
use crate::error::{Diagnostic, Kind, Location, Result};
use crate::expr::Evaluation;
use crate::scope::Scope;
use crate::symbols::{validate_identifier, Frame};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::collections::HashMap;
use std::io::{IsTerminal, Write as _};
use std::path::{Path, PathBuf};

/// Which of the three passes is currently running. `analyze` builds block
/// structure, `query` resolves addresses without emitting, `write` realizes
/// emission. See `spec.md` §2.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Analyze,
    Query,
    Write,
}

/// Byte order `write()` emits multi-byte values in, set by the `endian` directive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Endian {
    Lsb,
    Msb,
}

pub struct Driver {
    pub phase: Phase,
    pub strict: bool,

    pub frames: Vec<Frame>,
    pub scope: Scope,
    pub constants: HashMap<String, i64>,

    pub last_label_counter: u32,
    pub next_label_counter: u32,

    /// Running output cursor, advanced by every `write()` regardless of phase —
    /// this is what lets `Query` resolve addresses without ever touching `output`.
    pub origin: i64,
    /// Address bias set by the `base` directive so `pc()` reports a different
    /// address than the true output position `origin` tracks.
    pub base: i64,
    pub endian: Endian,

    /// The assembled image, indexed by `origin` (not file-backed; the CLI layer
    /// writes this out once assembly finishes).
    pub output: Vec<u8>,

    /// `(file, line, block, statement)` of whichever instruction is currently
    /// executing, attached to diagnostics raised while it runs.
    pub active_location: Option<Location>,

    /// The flattened program, one entry per `;`-delimited statement across every
    /// source file loaded (directly or via `include`).
    pub program: Vec<crate::source::Instruction>,
    /// Paths of every file `source()` has loaded, indexed by `Instruction::file_number`.
    pub source_filenames: Vec<String>,
    /// Open block stack used by `analyze()` to pair `{`/`}` and thread jump targets.
    pub blocks: Vec<crate::analyzer::Block>,

    /// `if`/`while` condition results, one per currently-open conditional block.
    pub conditionals: Vec<bool>,
    /// Disambiguates recursive/repeated macro calls; fed to each invocation's
    /// implicit `{#}` define.
    pub macro_invocation_counter: u32,
    /// `enqueue`/`dequeue` scratch stack for saving and restoring `origin`/`base`.
    pub queue: Vec<i64>,
    /// `map`-directive output character remapping table, identity by default.
    pub string_table: [u8; 256],
    /// Where `output` directed the assembled image to be written once assembly finishes.
    pub output_path: Option<PathBuf>,

    /// The backend turning architecture-specific mnemonics into bytes; `none` by default.
    pub architecture: Box<dyn Architecture>,

    /// `(name, value)` pairs seeded by `Driver::define`, re-installed as global defines
    /// at the start of every phase's `execute()` (`Bass::defines`).
    pub initial_defines: Vec<(String, String)>,
}

impl Driver {
    pub fn new() -> Self {
        let mut string_table = [0u8; 256];
        for (n, slot) in string_table.iter_mut().enumerate() {
            *slot = n as u8;
        }
        Driver {
            phase: Phase::Analyze,
            strict: false,
            frames: vec![Frame::new(0, false)],
            scope: Scope::new(),
            constants: HashMap::new(),
            last_label_counter: 1,
            next_label_counter: 1,
            origin: 0,
            base: 0,
            endian: Endian::Lsb,
            output: Vec::new(),
            active_location: None,
            program: Vec::new(),
            source_filenames: Vec::new(),
            blocks: Vec::new(),
            conditionals: Vec::new(),
            macro_invocation_counter: 0,
            queue: Vec::new(),
            string_table,
            output_path: None,
            architecture: Box::new(NoneArchitecture),
            initial_defines: Vec::new(),
        }
    }

    /// Resets everything `execute()` re-initializes at the start of a fresh pass,
    /// matching `Bass::initialize`.
    pub fn initialize(&mut self) {
        self.queue.clear();
        self.scope = Scope::new();
        for (n, slot) in self.string_table.iter_mut().enumerate() {
            *slot = n as u8;
        }
        self.endian = Endian::Lsb;
        self.origin = 0;
        self.base = 0;
        self.last_label_counter = 1;
        self.next_label_counter = 1;
    }

    /// Current program-counter value as seen by `pc()` inside expressions.
    pub fn pc(&self) -> i64 {
        self.origin + self.base
    }

    /// Moves the output cursor to an absolute position. Callers always pass the
    /// `origin` they just set, so this is mostly an assertion of that invariant;
    /// kept as its own method since `dequeue origin`/`dequeue pc` restore a cursor
    /// that didn't come from a plain assignment.
    pub fn seek(&mut self, offset: i64) {
        self.origin = offset;
    }

    /// Emits `length` low bytes of `data` at the current cursor in `self.endian`
    /// order during `Write`; always advances `origin` so `Query` tracks addresses
    /// without producing output.
    pub fn write(&mut self, data: u64, length: u32) {
        if self.phase == Phase::Write {
            let cursor = self.origin.max(0) as usize;
            let len = length as usize;
            if cursor + len > self.output.len() {
                self.output.resize(cursor + len, 0);
            }
            // Truncates to the low `len` bytes rather than rejecting an out-of-range
            // `data`, matching `Bass::write`'s `fputc(data >> n * 8, ...)` loop.
            let truncated = if len >= 8 { data } else { data & ((1u64 << (len * 8)) - 1) };
            let slice = &mut self.output[cursor..cursor + len];
            match self.endian {
                Endian::Lsb => LittleEndian::write_uint(slice, truncated, len),
                Endian::Msb => BigEndian::write_uint(slice, truncated, len),
            }
        }
        self.origin += length as i64;
    }

    pub fn push_inline_frame(&mut self) {
        self.frames.push(Frame::new(0, true));
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub fn find_constant(&self, name: &str) -> Option<i64> {
        for key in self.scope.lookup_keys(name) {
            if let Some(value) = self.constants.get(&key) {
                return Some(*value);
            }
        }
        None
    }

    /// Declares a constant at the current scope. A name already bound in the
    /// Query phase is fatal (constants are immutable once the address-resolution
    /// pass has fixed them); a later phase re-declaring the same name overwrites
    /// it without comparison, matching `Bass::setConstant` exactly (the "values
    /// must agree between query and write" invariant of `spec.md` §3 is a property
    /// to test for, not one this method enforces at runtime).
    pub fn set_constant(&mut self, name: &str, value: i64) -> Result<()> {
        if !validate_identifier(name) {
            return self.fatal(format!("invalid constant identifier: {name}"));
        }
        let key = self.scope.qualify(name);
        if self.constants.contains_key(&key) && self.phase == Phase::Query {
            return self.fatal(format!("constant cannot be modified: {key}"));
        }
        self.constants.insert(key, value);
        Ok(())
    }

    fn current_location(&self) -> Option<Location> {
        self.active_location.clone()
    }

    /// Prints the error immediately (`kind: message\n<file>:<line>:<block>:
    /// <statement>\n`) and returns it as an `Err`, matching `Bass::error`.
    pub fn fatal<T>(&mut self, message: impl Into<String>) -> Result<T> {
        let diagnostic = Diagnostic::new(Kind::Error, message, self.current_location());
        eprint!("{diagnostic}");
        Err(diagnostic)
    }

    /// Always prints, matching `Bass::warning`; additionally returns `Err` when
    /// `strict` is set, promoting the warning to a fatal condition.
    pub fn warn(&mut self, message: impl Into<String>) -> Result<()> {
        let diagnostic = Diagnostic::new(Kind::Warning, message, self.current_location());
        eprint!("{diagnostic}");
        if self.strict {
            return Err(diagnostic);
        }
        Ok(())
    }

    pub fn notice(&mut self, message: impl Into<String>) {
        eprint!("{}", Diagnostic::new(Kind::Notice, message, self.current_location()));
    }

    /// Directory the currently executing instruction's source file lives in, used
    /// to resolve `output`/`insert`/`include` paths relative to it rather than the
    /// process's current directory.
    pub fn active_source_directory(&self) -> PathBuf {
        self.active_location
            .as_ref()
            .filter(|location| !location.file.is_empty())
            .and_then(|location| Path::new(&location.file).parent())
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Retargets the assembled image to `path` (or closes the current target if
    /// `None`), matching `Bass::target`. Flushes whatever was buffered for the
    /// previous target first. `create` truncates; otherwise an existing file's
    /// bytes are preloaded so writes outside the touched range survive. Failure to
    /// read an existing target is a warning, not a hard error.
    pub fn set_output_target(&mut self, path: Option<PathBuf>, create: bool) -> Result<()> {
        self.flush_output();
        match path {
            None => {
                self.output_path = None;
                self.output = Vec::new();
            }
            Some(path) => {
                let buffer = if create || !path.exists() {
                    Vec::new()
                } else {
                    match std::fs::read(&path) {
                        Ok(bytes) => bytes,
                        Err(_) => {
                            self.warn(format!("unable to open target file: {}", path.display()))?;
                            Vec::new()
                        }
                    }
                };
                self.output_path = Some(path);
                self.output = buffer;
            }
        }
        Ok(())
    }

    fn flush_output(&mut self) {
        if let Some(path) = &self.output_path {
            let _ = std::fs::write(path, &self.output);
        }
    }

    /// Loads `path` (and, recursively, anything it `include`s) into `program`,
    /// matching the CLI-level `Bass::source` entry point.
    pub fn source(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        crate::source::source(self, path)
    }

    /// Seeds a global, parameterless define visible from the very start of every
    /// phase, matching `Bass::define`.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.initial_defines.push((name.into(), value.into()));
    }

    /// Evaluates `value` in `Strict` mode immediately and binds it as a constant.
    /// A value that fails to evaluate is silently dropped — no phase or scope
    /// context exists yet for it to resolve against — matching `Bass::constant`'s
    /// try/catch-and-ignore.
    pub fn constant(&mut self, name: &str, value: &str) {
        if let Ok(value) = self.evaluate(value, Evaluation::Strict) {
            self.constants.insert(name.to_owned(), value);
        }
    }

    /// Runs Analyze, then Query, then Write, matching `Bass::assemble`. Any fatal
    /// diagnostic anywhere aborts the whole call (it has already been printed by
    /// whichever `fatal`/promoted `warn` raised it); the driver is left reset and
    /// reusable for a fresh `assemble()` call afterward.
    pub fn assemble(&mut self, strict: bool) -> bool {
        self.strict = strict;
        self.run_pipeline().is_ok()
    }

    fn run_pipeline(&mut self) -> Result<()> {
        self.phase = Phase::Analyze;
        crate::analyzer::analyze(self)?;

        self.phase = Phase::Query;
        self.architecture = Box::new(NoneArchitecture);
        crate::executor::execute(self)?;

        self.phase = Phase::Write;
        self.architecture = Box::new(NoneArchitecture);
        crate::executor::execute(self)?;

        self.flush_output();
        if self.output_path.is_none() && !std::io::stdout().is_terminal() {
            let _ = std::io::stdout().write_all(&self.output);
        }
        Ok(())
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pc_tracks_origin_and_base() {
        let mut driver = Driver::new();
        driver.base = 0x8000;
        driver.origin = 4;
        assert_eq!(0x8004, driver.pc());
    }

    #[test]
    fn write_advances_origin_and_is_inert_outside_write_phase() {
        let mut driver = Driver::new();
        driver.phase = Phase::Query;
        driver.write(0xff, 1);
        assert_eq!(1, driver.origin);
        assert!(driver.output.is_empty());

        driver.phase = Phase::Write;
        driver.write(0x1234, 2);
        assert_eq!(3, driver.origin);
        assert_eq!(vec![0x34, 0x12], &driver.output[1..3]);
    }

    #[test]
    fn msb_endian_emits_big_end_first() {
        let mut driver = Driver::new();
        driver.phase = Phase::Write;
        driver.endian = Endian::Msb;
        driver.write(0x1234, 2);
        assert_eq!(vec![0x12, 0x34], driver.output);
    }

    #[test]
    fn duplicate_constant_is_fatal_in_query_phase() {
        let mut driver = Driver::new();
        driver.phase = Phase::Query;
        driver.set_constant("x", 1).unwrap();
        assert!(driver.set_constant("x", 2).is_err());
    }

    #[test]
    fn duplicate_constant_overwrites_in_write_phase() {
        let mut driver = Driver::new();
        driver.phase = Phase::Query;
        driver.set_constant("x", 1).unwrap();
        driver.phase = Phase::Write;
        driver.set_constant("x", 2).unwrap();
        assert_eq!(Some(2), driver.find_constant("x"));
    }

    #[test]
    fn invalid_constant_identifier_is_fatal() {
        let mut driver = Driver::new();
        assert!(driver.set_constant("1bad", 1).is_err());
    }

    #[test]
    fn warning_is_fatal_in_strict_mode() {
        let mut driver = Driver::new();
        driver.strict = true;
        assert!(driver.warn("careful").is_err());
    }

    /// Writes `source` to a uniquely named temp file, assembles it to another temp
    /// file, and returns the produced bytes. One file per caller (keyed by `tag`)
    /// keeps parallel test runs from colliding on the same path.
    fn assemble_to_bytes(tag: &str, source: &str) -> Vec<u8> {
        let dir = std::env::temp_dir();
        let input = dir.join(format!("bassette-test-{tag}.s"));
        let output = dir.join(format!("bassette-test-{tag}.bin"));
        std::fs::write(&input, source).unwrap();

        let mut driver = Driver::new();
        driver.set_output_target(Some(output.clone()), true).unwrap();
        assert!(driver.source(&input).unwrap());
        assert!(driver.assemble(false));

        std::fs::read(&output).unwrap()
    }

    #[test]
    fn scenario_a_db_sequence_writes_bytes_in_order() {
        let bytes = assemble_to_bytes("scenario-a", "origin 0\nbase 0\ndb 1,2,3,4");
        assert_eq!(vec![1, 2, 3, 4], bytes);
    }

    #[test]
    fn scenario_b_dw_respects_endian_directive() {
        let lsb = assemble_to_bytes("scenario-b-lsb", "origin 0\nendian lsb\ndw $1234");
        assert_eq!(vec![0x34, 0x12], lsb);

        let msb = assemble_to_bytes("scenario-b-msb", "origin 0\nendian msb\ndw $1234");
        assert_eq!(vec![0x12, 0x34], msb);
    }

    #[test]
    fn scenario_c_macro_parameters_compute_before_binding() {
        // `evaluate` binds a define, not a variable, so `db` must reference it through
        // `{sum}` brace-expansion — matching `Bass::evaluateLiteral`, which never falls
        // back to the define table for a bare identifier.
        let bytes = assemble_to_bytes(
            "scenario-c",
            "macro add3(a,b,c) {\nevaluate sum = {a}+{b}+{c}\ndb {sum}\n}\norigin 0\nadd3(1,2,3)",
        );
        assert_eq!(vec![6], bytes);
    }

    #[test]
    fn scenario_e_nested_namespace_constant_is_dot_qualified() {
        let bytes = assemble_to_bytes(
            "scenario-e",
            "namespace a {\nnamespace b {\nconstant x = 7\n}\n}\norigin 0\ndb a.b.x",
        );
        assert_eq!(vec![7], bytes);
    }

    #[test]
    fn scenario_f_if_else_selects_the_else_branch() {
        let bytes = assemble_to_bytes(
            "scenario-f",
            "variable n = 0\norigin 0\nif n==1 {\ndb 1\n} else {\ndb 2\n}",
        );
        assert_eq!(vec![2], bytes);
    }

    #[test]
    fn invariant_pc_advances_by_total_bytes_written() {
        let mut driver = Driver::new();
        driver.phase = Phase::Write;
        let start = driver.pc();
        for _ in 0..5 {
            driver.write(0, 1);
        }
        assert_eq!(start + 5, driver.pc());
    }

    #[test]
    fn invariant_query_and_write_phase_agree_on_pure_expression() {
        let mut driver = Driver::new();
        driver.phase = Phase::Query;
        let query_value = driver.evaluate("2 + 3 * 4", Evaluation::Default).unwrap();
        driver.phase = Phase::Write;
        let write_value = driver.evaluate("2 + 3 * 4", Evaluation::Default).unwrap();
        assert_eq!(query_value, write_value);
    }

    #[test]
    fn reused_driver_resets_cleanly_after_a_fatal_assemble() {
        let dir = std::env::temp_dir();
        let failing = dir.join("bassette-test-reuse-fail.s");
        let ok = dir.join("bassette-test-reuse-ok.s");
        let output = dir.join("bassette-test-reuse.bin");
        std::fs::write(&failing, "db undefined_name").unwrap();
        std::fs::write(&ok, "origin 0\ndb 9").unwrap();

        let mut driver = Driver::new();
        driver.set_output_target(Some(output.clone()), true).unwrap();
        driver.source(&failing).unwrap();
        assert!(!driver.assemble(false));

        let mut driver = Driver::new();
        driver.set_output_target(Some(output.clone()), true).unwrap();
        driver.source(&ok).unwrap();
        assert!(driver.assemble(false));
        assert_eq!(vec![9], std::fs::read(&output).unwrap());
    }
}
